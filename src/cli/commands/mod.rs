//! CLI command implementations
//!
//! Each command is implemented in its own submodule. Shared setup (project
//! loading, store and primitive selection) lives here.

pub mod build;
pub mod cache;
pub mod check;
pub mod graph;
pub mod manifest;
pub mod output;
pub mod plan;
pub mod sysroot;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};

use crate::config::defaults;
use crate::core::global_config::GlobalConfig;
use crate::core::pipeline::Pipeline;
use crate::core::primitive::BuildPrimitive;
use crate::core::project::Project;
use crate::infra::cargo::CargoPrimitive;
use crate::infra::command::CommandPrimitive;
use crate::infra::dirs::LayerforgeDirs;
use crate::infra::store::ArtifactStore;
use crate::infra::strip::StripTool;

/// Graph output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    #[default]
    Tree,
    Dot,
}

/// Build options shared by `build` and `sysroot`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Build primitive (`cargo` or `command`)
    #[arg(long)]
    pub primitive: Option<String>,

    /// Command for the `command` primitive (may be repeated)
    #[arg(long = "command", value_name = "ARG", num_args = 1.., allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the project without building
    Check,

    /// Show the layers the crate graph is built in
    Plan,

    /// Display the crate graph
    Graph {
        /// Output format
        #[arg(long, value_enum, default_value_t = GraphFormat::Tree)]
        format: GraphFormat,
    },

    /// Print the merged manifest of a layer
    Manifest {
        /// Layer index (defaults to the last layer)
        layer: Option<usize>,

        /// Print the sysroot manifest instead
        #[arg(long, conflicts_with = "layer")]
        sysroot: bool,
    },

    /// Build only the sysroot
    Sysroot {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Build all layers
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Print the path of a named output of the last build
    Output {
        /// Output name (defaults to the primary output)
        name: Option<String>,
    },

    /// Manage the artifact store
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Artifact store subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show store location, size and artifact count
    Info,

    /// Remove store contents
    Clean {
        /// Only remove staging directories and stale locks of interrupted builds
        #[arg(long)]
        staging: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, project_dir: &Path) -> Result<()> {
        match self {
            Self::Check => check::execute(project_dir).await,
            Self::Plan => plan::execute(project_dir).await,
            Self::Graph { format } => graph::execute(project_dir, format).await,
            Self::Manifest { layer, sysroot } => {
                manifest::execute(project_dir, layer, sysroot).await
            }
            Self::Sysroot { args } => sysroot::execute(project_dir, &args).await,
            Self::Build { args } => build::execute(project_dir, &args).await,
            Self::Output { name } => output::execute(project_dir, name.as_deref()).await,
            Self::Cache { command } => match command {
                CacheCommands::Info => cache::execute_info().await,
                CacheCommands::Clean { staging } => cache::execute_clean(staging).await,
            },
        }
    }
}

/// Load the project file in `dir`
pub(crate) fn load_project(dir: &Path) -> Result<Project> {
    Project::find(dir).with_context(|| format!("Failed to load project in '{}'", dir.display()))
}

/// Load the global configuration
pub(crate) fn load_global() -> Result<(LayerforgeDirs, GlobalConfig)> {
    let dirs = LayerforgeDirs::new();
    let global = GlobalConfig::load(&dirs).context("Failed to load global configuration")?;
    Ok((dirs, global))
}

/// Open the shared artifact store
pub(crate) fn open_store(dirs: &LayerforgeDirs, global: &GlobalConfig) -> Arc<ArtifactStore> {
    Arc::new(ArtifactStore::new(global.store_dir(dirs), global.lock_timeout()))
}

/// Effective build settings, CLI flags first, then the project file, the
/// global configuration and the defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub jobs: usize,
    pub primitive: String,
    pub command: Vec<String>,
}

impl Settings {
    pub(crate) fn resolve(args: &BuildArgs, project: &Project, global: &GlobalConfig) -> Self {
        let jobs = args
            .jobs
            .or(project.build.jobs)
            .unwrap_or_else(|| global.build_jobs());
        let primitive = args
            .primitive
            .clone()
            .or_else(|| project.build.primitive.clone())
            .unwrap_or_else(|| global.primitive().to_string());
        let command = [
            args.command.clone(),
            project.build.command.clone(),
            global.build.command.clone().unwrap_or_default(),
        ]
        .into_iter()
        .find(|c| !c.is_empty())
        .unwrap_or_default();

        Self {
            jobs,
            primitive,
            command,
        }
    }
}

/// Instantiate the selected build primitive
pub(crate) fn select_primitive(settings: &Settings) -> Result<Arc<dyn BuildPrimitive>> {
    match settings.primitive.as_str() {
        defaults::DEFAULT_PRIMITIVE => {
            let cargo = CargoPrimitive::new().context("Failed to locate cargo")?;
            Ok(Arc::new(cargo))
        }
        "command" => {
            let command = CommandPrimitive::new(&settings.command)
                .context("The 'command' primitive needs a command (--command or [build] command)")?;
            Ok(Arc::new(command))
        }
        other => bail!("Unknown build primitive '{other}'. Expected 'cargo' or 'command'."),
    }
}

/// Pipeline configured from the project
pub(crate) fn pipeline(
    project: &Project,
    store: Arc<ArtifactStore>,
    primitive: Arc<dyn BuildPrimitive>,
    jobs: usize,
) -> Pipeline {
    Pipeline::new(store, primitive, project.target.clone(), project.profile.clone())
        .with_name(&project.name)
        .with_binary(project.binary.clone())
        .with_sysroot_overrides(project.sysroot_overrides.clone())
        .with_modifications(project.modifications.clone())
        .with_strip_tool(StripTool::find())
        .with_jobs(jobs)
}
