//! Integration tests for the read-only commands
//!
//! Runs the layerforge binary against sample projects: check, plan, graph,
//! manifest, output and cache info.

mod common;

use assert_fs::prelude::*;
use common::{combined, TestProject};
use predicates::prelude::*;

#[test]
fn test_version_flag() {
    let output = TestProject::new().run(&["--version"]);
    assert!(output.status.success());
    assert!(predicate::str::contains(env!("CARGO_PKG_VERSION")).eval(&combined(&output)));
}

#[test]
fn test_check_sample_project() {
    let project = TestProject::sample();
    let output = project.run(&["check"]);
    let text = combined(&output);

    assert!(output.status.success(), "{text}");
    assert!(text.contains("Project file is valid"));
    assert!(text.contains("3 local crates"));
    assert!(text.contains("2 layers planned"));
}

#[test]
fn test_check_without_project_file_fails() {
    let project = TestProject::new();
    let output = project.run(&["check"]);

    assert!(!output.status.success());
    assert!(predicate::str::contains("Project file not found").eval(&combined(&output)));
}

#[test]
fn test_check_reports_cycle() {
    let project = TestProject::new();
    project.create_file(
        "layerforge.toml",
        r#"
[project]
name = "loop"
root = "a"

[target]
triple = "x86_64-unknown-none"

[crates.a]
path = "a"
dependencies = ["b"]

[crates.b]
path = "b"
dependencies = ["a"]
"#,
    );

    let output = project.run(&["check"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("Dependency cycle detected"));
}

#[test]
fn test_check_warns_about_missing_crate_dir() {
    let project = TestProject::new();
    project.create_file("layerforge.toml", common::SAMPLE_PROJECT);

    let output = project.run(&["check"]);
    let text = combined(&output);
    assert!(output.status.success(), "{text}");
    assert!(text.contains("path does not exist"));
}

#[test]
fn test_check_warns_about_unreachable_crate() {
    let project = TestProject::sample();
    let content = format!("{}\n[crates.orphan]\npath = \"net\"\n", common::SAMPLE_PROJECT);
    project.create_file("layerforge.toml", &content);

    let output = project.run(&["check"]);
    let text = combined(&output);
    assert!(output.status.success(), "{text}");
    assert!(text.contains("Crate 'orphan' is not reachable from root 'app'"), "{text}");
    assert!(text.contains("2 layers planned"), "{text}");
}

#[test]
fn test_plan_json() {
    let project = TestProject::sample();
    let output = project.run(&["plan", "--json"]);
    assert!(output.status.success(), "{}", combined(&output));

    let layers: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let layers = layers.as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0]["crates"], serde_json::json!(["net", "timers"]));
    assert_eq!(layers[0]["modifications"], serde_json::json!([]));
    assert_eq!(layers[1]["crates"], serde_json::json!(["app"]));
    assert_eq!(layers[1]["modifications"], serde_json::json!(["image"]));
    assert_eq!(layers[1]["is_last"], true);
}

#[test]
fn test_plan_text_with_directory_flag() {
    let project = TestProject::sample();
    let output = project
        .command()
        .current_dir(std::env::temp_dir())
        .args(["plan", "-C"])
        .arg(project.path())
        .output()
        .unwrap();
    let text = combined(&output);

    assert!(output.status.success(), "{text}");
    assert!(text.contains("Layer 0: net, timers"));
    assert!(text.contains("Layer 1 (root): app"));
    assert!(text.contains("modifications: image"));
}

#[test]
fn test_graph_tree_and_dot() {
    let project = TestProject::sample();

    let tree = project.run(&["graph"]);
    let text = String::from_utf8_lossy(&tree.stdout);
    assert!(text.contains("app [layer 1]"));
    assert!(text.contains("net [layer 0]"));
    assert!(text.contains("smoltcp [external]"));

    let dot = project.run(&["graph", "--format", "dot"]);
    let text = String::from_utf8_lossy(&dot.stdout);
    assert!(text.starts_with("digraph crates {"));
    assert!(text.contains("subgraph cluster_layer_1"));
}

#[test]
fn test_manifest_of_last_layer() {
    let project = TestProject::sample();
    let output = project.run(&["manifest"]);
    let text = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", combined(&output));
    assert!(text.contains("name = \"demo-layer-1\""));
    assert!(text.contains("# env CONFIG_PATH="));
    assert!(text.contains("# env IMAGE_NAME=demo.img"));
    assert!(text.contains("# file inputs/config.json"));
}

#[test]
fn test_manifest_of_first_layer_has_no_injection() {
    let project = TestProject::sample();
    let output = project.run(&["manifest", "0"]);
    let text = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", combined(&output));
    assert!(text.contains("name = \"demo-layer-0\""));
    assert!(text.contains("smoltcp"));
    assert!(!text.contains("CONFIG_PATH"));
}

#[test]
fn test_manifest_of_sysroot() {
    let project = TestProject::sample();
    let output = project.run(&["manifest", "--sysroot"]);
    let text = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", combined(&output));
    assert!(text.contains("compiler_builtins"));
    assert!(text.contains("@rust-src@/library/core"));
}

#[test]
fn test_manifest_unknown_layer() {
    let project = TestProject::sample();
    let output = project.run(&["manifest", "5"]);

    assert!(!output.status.success());
    assert!(combined(&output).contains("Layer 5 does not exist"));
}

#[test]
fn test_output_without_build_record() {
    let project = TestProject::sample();
    let output = project.run(&["output"]);

    assert!(!output.status.success());
    assert!(combined(&output).contains("No build record found"));
}

#[test]
fn test_cache_info_on_empty_store() {
    let project = TestProject::new();
    let output = project.run(&["cache", "info", "--json"]);
    assert!(output.status.success(), "{}", combined(&output));

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["artifact_count"], 0);
    assert_eq!(info["exists"], false);
    assert_eq!(info["path"], project.store_dir().display().to_string());
}

#[test]
fn test_extends_and_env_substitution() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("base.toml")
        .write_str(
            r#"
[target]
triple = "riscv64imac-unknown-none-elf"

[profile]
name = "release"
"#,
        )
        .unwrap();
    temp.child("layerforge.toml")
        .write_str(
            r#"
extends = "base.toml"

[project]
name = "${LF_TEST_NAME}"
root = "app"

[crates.app]
path = "app"
"#,
        )
        .unwrap();
    temp.child("app/src/lib.rs").write_str("#![no_std]\n").unwrap();

    let project = TestProject::new();
    let output = project
        .command()
        .env("LF_TEST_NAME", "substituted")
        .args(["check", "--json", "-C"])
        .arg(temp.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["project"], "substituted");
    assert_eq!(report["target"], "riscv64imac-unknown-none-elf");
    temp.child("layerforge.lock").assert(predicate::path::missing());
}
