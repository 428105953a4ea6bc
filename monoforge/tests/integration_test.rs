use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn create_project(root: &Path, name: &str, scripts: &[(&str, &str)]) {
    let dir = root.join("projects").join(name);
    fs::create_dir_all(&dir).unwrap();

    let scripts: serde_json::Map<String, serde_json::Value> = scripts
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    let manifest = serde_json::json!({
        "name": format!("@acme/{}", name),
        "version": "1.0.0",
        "scripts": scripts,
    });
    fs::write(
        dir.join("package.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
}

/// A, B -> A, C -> B, each with a shell build script appending to build.log.
fn create_chain_workspace() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let log = root.join("build.log");

    for name in ["a", "b", "c"] {
        let script = format!("echo {} >> {}", name, log.display());
        create_project(root, name, &[("build", &script)]);
    }

    fs::write(
        root.join("monoforge.toml"),
        r#"
script_launcher = "shell"

[project_defaults]
build = "script"

[projects.b]
dependencies = ["a"]

[projects.c]
dependencies = ["b"]
"#,
    )
    .unwrap();

    temp_dir
}

fn monoforge_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_monoforge"))
}

fn run(root: &Path, args: &[&str]) -> Output {
    Command::new(monoforge_binary())
        .args(args)
        .arg("--root")
        .arg(root)
        .arg("--quiet")
        .output()
        .expect("Failed to execute monoforge")
}

#[test]
fn test_graph_json_reports_build_order() {
    let temp_dir = create_chain_workspace();

    let output = run(temp_dir.path(), &["graph", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let graph: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(graph["order"], serde_json::json!(["a", "b", "c"]));
    assert_eq!(graph["edges"].as_array().unwrap().len(), 2);
}

#[test]
fn test_list_json_includes_manifest_data() {
    let temp_dir = create_chain_workspace();

    let output = run(temp_dir.path(), &["list", "--json"]);
    assert!(output.status.success());

    let projects: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let projects = projects.as_array().unwrap();
    assert_eq!(projects.len(), 3);
    assert_eq!(projects[1]["name"], "b");
    assert_eq!(projects[1]["package"], "@acme/b");
    assert_eq!(projects[1]["dependencies"], serde_json::json!(["a"]));
}

#[test]
fn test_build_runs_in_dependency_order() {
    let temp_dir = create_chain_workspace();

    let output = run(temp_dir.path(), &["build"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let log = fs::read_to_string(temp_dir.path().join("build.log")).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["a", "b", "c"]);
}

#[test]
fn test_build_stops_at_first_failure() {
    let temp_dir = create_chain_workspace();
    create_project(temp_dir.path(), "b", &[("build", "exit 3")]);

    let output = run(temp_dir.path(), &["build"]);
    assert!(!output.status.success());

    let log = fs::read_to_string(temp_dir.path().join("build.log")).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["a"]);
}

#[test]
fn test_cycle_exits_non_zero() {
    let temp_dir = create_chain_workspace();
    let config = fs::read_to_string(temp_dir.path().join("monoforge.toml")).unwrap();
    fs::write(
        temp_dir.path().join("monoforge.toml"),
        format!("{}\n[projects.a]\ndependencies = [\"c\"]\n", config),
    )
    .unwrap();

    let output = run(temp_dir.path(), &["graph"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Circular dependency"));
}

#[test]
fn test_unknown_plugin_reports_remedy() {
    let temp_dir = create_chain_workspace();
    fs::write(
        temp_dir.path().join("monoforge.toml"),
        "[projects.a]\ncompiler = \"babel\"\n",
    )
    .unwrap();

    let output = run(temp_dir.path(), &["list"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("npm install monoforge-plugin-compiler-babel"));
}

#[test]
fn test_deploy_without_plugin_fails() {
    let temp_dir = create_chain_workspace();

    let output = run(temp_dir.path(), &["deploy", "a", "/tmp/target"]);
    assert!(!output.status.success());
}
