//! Package manifest (`package.json`) reading and version stamping.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "package.json";

const DEPENDENCY_SECTIONS: [&str; 3] = ["dependencies", "devDependencies", "peerDependencies"];

/// The parts of a package manifest the orchestrator reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Reads and parses a manifest.
    ///
    /// # Errors
    ///
    /// Returns `ManifestRead` if the file is missing, unreadable or malformed.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::ManifestRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| Error::ManifestRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Returns the body of a script, ignoring blank entries.
    #[inline]
    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts
            .get(name)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Rewrites the `version` of the manifest at `path` and pins every dependency
/// found in `versions` (keyed by package name) to its assigned version.
///
/// Key order and unrelated fields are preserved.
pub fn stamp_versions(path: &Path, version: &str, versions: &HashMap<String, String>) -> Result<()> {
    let content = fs::read_to_string(path).map_err(|e| Error::ManifestRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut json: Value = serde_json::from_str(&content).map_err(|e| Error::ManifestRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let root = json.as_object_mut().ok_or_else(|| Error::ManifestRead {
        path: path.to_path_buf(),
        message: "manifest root must be an object".to_string(),
    })?;

    root.insert("version".to_string(), Value::String(version.to_string()));

    for section in DEPENDENCY_SECTIONS {
        if let Some(deps) = root.get_mut(section).and_then(|v| v.as_object_mut()) {
            for (name, range) in deps.iter_mut() {
                if let Some(sibling_version) = versions.get(name) {
                    *range = Value::String(sibling_version.clone());
                }
            }
        }
    }

    let mut output = serde_json::to_string_pretty(&json)?;
    output.push('\n');
    fs::write(path, output)?;
    Ok(())
}
