use std::collections::HashMap;
use std::fs;

use monoforge_core::error::Error;
use monoforge_core::manifest::{stamp_versions, Manifest};
use tempfile::TempDir;

const MANIFEST: &str = r#"{
  "name": "@acme/web",
  "version": "1.0.0",
  "description": "web client",
  "scripts": {
    "build": "tsc",
    "start": "node server.js",
    "empty": "  "
  },
  "dependencies": {
    "@acme/lib": "^1.0.0",
    "react": "^18.0.0"
  },
  "devDependencies": {
    "@acme/tools": "1.0.0"
  }
}
"#;

#[test]
fn test_read_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("package.json");
    fs::write(&path, MANIFEST).unwrap();

    let manifest = Manifest::read(&path).unwrap();
    assert_eq!(manifest.name, "@acme/web");
    assert_eq!(manifest.version.as_deref(), Some("1.0.0"));
    assert_eq!(manifest.script("start"), Some("node server.js"));
    assert_eq!(manifest.script("empty"), None);
    assert_eq!(manifest.script("missing"), None);
    assert_eq!(manifest.dev_dependencies.len(), 1);
}

#[test]
fn test_read_missing_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("package.json");

    assert!(matches!(Manifest::read(&path), Err(Error::ManifestRead { .. })));
}

#[test]
fn test_stamp_versions_pins_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("package.json");
    fs::write(&path, MANIFEST).unwrap();

    let versions: HashMap<String, String> = [
        ("@acme/web".to_string(), "2.0.0".to_string()),
        ("@acme/lib".to_string(), "1.4.0".to_string()),
        ("@acme/tools".to_string(), "2.0.0".to_string()),
    ]
    .into_iter()
    .collect();
    stamp_versions(&path, "2.0.0", &versions).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.ends_with('\n'));
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(json["version"], "2.0.0");
    assert_eq!(json["dependencies"]["@acme/lib"], "1.4.0");
    assert_eq!(json["dependencies"]["react"], "^18.0.0");
    assert_eq!(json["devDependencies"]["@acme/tools"], "2.0.0");
    assert_eq!(json["description"], "web client");

    // Key order of the original file is kept.
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["name", "version", "description", "scripts", "dependencies", "devDependencies"]);
}
