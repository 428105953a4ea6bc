//! TOML configuration parsing for the workspace and its projects.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::package_client::{PackageClient, ScriptLauncher};

pub const CONFIG_FILE: &str = "monoforge.toml";

const DEFAULT_BRANCH: &str = "master";
const DEFAULT_REMOTE: &str = "origin";

/// A plugin declaration: either a bare plugin name or a table carrying the
/// plugin name and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginValue {
    Simple(String),
    Detailed {
        plugin: String,
        #[serde(flatten)]
        options: toml::Table,
    },
}

impl PluginValue {
    pub fn name(&self) -> &str {
        match self {
            PluginValue::Simple(name) => name,
            PluginValue::Detailed { plugin, .. } => plugin,
        }
    }

    pub fn options(&self) -> toml::Table {
        match self {
            PluginValue::Simple(_) => toml::Table::new(),
            PluginValue::Detailed { options, .. } => options.clone(),
        }
    }
}

/// What a project produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Library,
    Server,
    Client,
}

/// Merged per-project configuration.
///
/// Keys this crate does not know about are kept in `extra` so plugins can
/// read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_compiler")]
    pub compiler: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub bundled_dependencies: Vec<String>,
    #[serde(default)]
    pub build: Option<PluginValue>,
    #[serde(default)]
    pub develop: Option<PluginValue>,
    #[serde(default)]
    pub deploy: Option<PluginValue>,
    #[serde(flatten)]
    pub extra: toml::Table,
}

fn default_compiler() -> String {
    "none".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            compiler: default_compiler(),
            dependencies: Vec::new(),
            bundled_dependencies: Vec::new(),
            build: None,
            develop: None,
            deploy: None,
            extra: toml::Table::new(),
        }
    }
}

impl ProjectConfig {
    fn builtin_defaults() -> toml::Table {
        let mut table = toml::Table::new();
        table.insert("role".into(), toml::Value::String("library".into()));
        table.insert("compiler".into(), toml::Value::String(default_compiler()));
        table.insert("dependencies".into(), toml::Value::Array(Vec::new()));
        table.insert("bundled_dependencies".into(), toml::Value::Array(Vec::new()));
        table
    }

    /// Merges built-in defaults, workspace project defaults and the project's
    /// own table, later layers replacing earlier keys wholesale.
    pub fn merged(
        project_name: &str,
        defaults: &toml::Table,
        overrides: Option<&toml::Table>,
    ) -> Result<Self> {
        let mut merged = Self::builtin_defaults();
        for (key, value) in defaults {
            merged.insert(key.clone(), value.clone());
        }
        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|error| Error::Toml {
                error,
                context: format!("{} [projects.{}]", CONFIG_FILE, project_name),
            })
    }

    /// `None` when no compiler is configured.
    pub fn compiler(&self) -> Option<&str> {
        let compiler = self.compiler.trim();
        if compiler.is_empty() || compiler == "none" {
            None
        } else {
            Some(compiler)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitPublishConfig {
    pub branch: Option<String>,
    pub remote: Option<String>,
}

impl GitPublishConfig {
    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    pub fn remote(&self) -> &str {
        self.remote.as_deref().unwrap_or(DEFAULT_REMOTE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishingConfig {
    #[serde(default)]
    pub git: GitPublishConfig,
}

/// Workspace-level configuration as defined in `monoforge.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub package_client: Option<String>,
    pub script_launcher: Option<String>,
    #[serde(default)]
    pub project_defaults: toml::Table,
    #[serde(default)]
    pub projects: BTreeMap<String, toml::Table>,
    #[serde(default)]
    pub publishing: PublishingConfig,
    /// Path of the file this config was read from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `monoforge.toml` from the workspace root. A missing file yields
    /// the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let mut config: AppConfig = toml::from_str(&content).map_err(|error| Error::Toml {
            error,
            context: path.display().to_string(),
        })?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// Walks up from `start` looking for `monoforge.toml`, stopping at the
    /// repository root. Falls back to `start` when no file is found.
    pub fn discover_root(start: &Path) -> PathBuf {
        let mut current = start;
        loop {
            if current.join(CONFIG_FILE).exists() {
                return current.to_path_buf();
            }
            if current.join(".git").exists() {
                break;
            }
            match current.parent() {
                Some(parent) if parent != current => current = parent,
                _ => break,
            }
        }
        start.to_path_buf()
    }

    pub fn parse_package_client(&self) -> Result<PackageClient> {
        match &self.package_client {
            Some(client) => PackageClient::parse(client),
            None => Ok(PackageClient::default()),
        }
    }

    pub fn parse_script_launcher(&self) -> Result<ScriptLauncher> {
        let client = self.parse_package_client()?;
        match &self.script_launcher {
            Some(launcher) => ScriptLauncher::parse(launcher, client),
            None => Ok(ScriptLauncher::PackageClient(client)),
        }
    }

    pub fn project_config(&self, project_name: &str) -> Result<ProjectConfig> {
        ProjectConfig::merged(
            project_name,
            &self.project_defaults,
            self.projects.get(project_name),
        )
    }
}
