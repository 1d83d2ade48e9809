//! Test utilities
//!
//! Proptest generators, a recording build primitive and a fake strip tool.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid crate name (lowercase alphanumeric with hyphens)
    pub fn crate_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a valid semver version string
    pub fn semver_version() -> impl Strategy<Value = String> {
        (0u32..10, 0u32..100, 0u32..100)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate a bare-metal target triple
    pub fn target_triple() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("aarch64-unknown-none".to_string()),
            Just("riscv64imac-unknown-none-elf".to_string()),
            Just("thumbv7em-none-eabihf".to_string()),
            Just("x86_64-unknown-none".to_string()),
        ]
    }
}

#[cfg(test)]
pub mod primitive {
    use std::sync::Mutex;

    use crate::core::primitive::{BuildOutput, BuildPrimitive, BuildRequest, PrimitiveError};

    /// Records every request and writes a marker file per package into the
    /// output directory. Fails requests whose label is listed in `fail_on`.
    #[derive(Default)]
    pub struct RecordingPrimitive {
        pub requests: Mutex<Vec<BuildRequest>>,
        pub fail_on: Vec<String>,
    }

    impl RecordingPrimitive {
        pub fn failing_on(label: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail_on: vec![label.to_string()],
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn labels(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.label.clone()).collect()
        }
    }

    impl BuildPrimitive for RecordingPrimitive {
        fn name(&self) -> &str {
            "recording"
        }

        fn build(&self, request: &BuildRequest) -> Result<BuildOutput, PrimitiveError> {
            self.requests.lock().unwrap().push(request.clone());

            if self.fail_on.contains(&request.label) {
                return Err(PrimitiveError::Failed {
                    program: "fake".to_string(),
                    status: "exit status: 101".to_string(),
                    output: format!("error: could not compile {}", request.label),
                });
            }

            let dir = request
                .out_dir
                .join("target")
                .join(request.target.target_dir_name())
                .join(request.profile.dir_name());
            std::fs::create_dir_all(&dir).unwrap();
            for package in request.packages() {
                std::fs::write(dir.join(package), package).unwrap();
            }
            std::fs::write(request.out_dir.join("Cargo.toml"), &request.manifest).unwrap();

            Ok(BuildOutput {
                log: format!("built {}", request.label),
            })
        }
    }
}

#[cfg(all(test, unix))]
pub mod strip {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use crate::infra::strip::StripTool;

    /// A `strip` stand-in that copies its input and appends a marker line
    pub fn fake_strip_tool(dir: &Path) -> StripTool {
        let path = dir.join("fake-strip");
        std::fs::write(&path, "#!/bin/sh\ncp \"$4\" \"$3\"\necho stripped >> \"$3\"\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        StripTool::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_crate_names_are_valid(name in crate_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().next().unwrap().is_ascii_lowercase());
        }

        #[test]
        fn prop_versions_parse(version in semver_version()) {
            prop_assert!(semver::Version::parse(&version).is_ok());
        }

        #[test]
        fn prop_triples_are_bare_metal(triple in target_triple()) {
            prop_assert!(triple.contains("none"));
        }
    }
}
