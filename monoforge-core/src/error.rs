//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in {context}: {error}")]
    Toml {
        error: toml::de::Error,
        context: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not resolve \"{plugin}\" {kind} plugin for {project}. Make sure you have the plugin installed:\n  {remedy}")]
    ConfigResolution {
        project: String,
        kind: String,
        plugin: String,
        remedy: String,
    },

    #[error("Could not read manifest {}: {message}", path.display())]
    ManifestRead { path: PathBuf, message: String },

    #[error("Circular dependency detected involving: {0}. Use 'monoforge graph' to inspect the dependency order.")]
    CyclicDependency(String),

    #[error("Duplicate project name: {0}")]
    DuplicateProject(String),

    #[error("Project not found: {name}. Available projects: {available}")]
    ProjectNotFound { name: String, available: String },

    #[error("No scriptName was provided for the develop configuration of {project}.")]
    MissingScriptName { project: String },

    #[error("Could not resolve script named \"{script}\" on {project}")]
    UnknownScript { project: String, script: String },

    #[error("The following projects have uncommitted changes within them. Please commit your changes and then try again.\n{}", projects.join(", "))]
    UncommittedChanges { projects: Vec<String> },

    #[error("Publishing requires that your workspace is initialised as a Git repository.")]
    UninitializedRepository,

    #[error("Could not switch to the publish branch ({branch}): {message}")]
    BranchSwitch { branch: String, message: String },

    #[error("Child process failed for {project}: {message}")]
    ChildProcess { project: String, message: String },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Unsupported package_client in monoforge.toml: {0}. Supported clients: npm, yarn")]
    UnsupportedPackageClient(String),

    #[error("Plugin error for {project}: {message}")]
    Plugin { project: String, message: String },

    #[error("File watcher error: {0}")]
    Watcher(String),
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Toml {
            error,
            context: "monoforge.toml".to_string(),
        }
    }
}

impl From<notify::Error> for Error {
    fn from(error: notify::Error) -> Self {
        Error::Watcher(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
