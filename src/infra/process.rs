//! External process helpers shared by the build primitives

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::core::primitive::PrimitiveError;

/// Run a command to completion, returning its combined output.
///
/// A non-zero exit becomes [`PrimitiveError::Failed`] carrying stdout and
/// stderr verbatim.
pub fn run(command: &mut Command) -> Result<String, PrimitiveError> {
    let program = command.get_program().to_string_lossy().into_owned();
    tracing::debug!("Running {command:?}");

    let output = command.output().map_err(|e| PrimitiveError::Spawn {
        program: program.clone(),
        error: e.to_string(),
    })?;

    let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
    log.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(log)
    } else {
        Err(PrimitiveError::Failed {
            program,
            status: output.status.to_string(),
            output: log,
        })
    }
}

/// Write request files below `dir`, creating parent directories
pub fn stage_files(dir: &Path, files: &BTreeMap<String, String>) -> Result<(), PrimitiveError> {
    for (relative, contents) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| staging_error(parent, &e))?;
        }
        std::fs::write(&path, contents).map_err(|e| staging_error(&path, &e))?;
    }
    Ok(())
}

/// Staging failure for `path`
pub fn staging_error(path: &Path, error: &dyn std::fmt::Display) -> PrimitiveError {
    PrimitiveError::Staging {
        error: format!("{}: {error}", path.display()),
    }
}
