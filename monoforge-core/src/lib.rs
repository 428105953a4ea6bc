//! Core library for monorepo build orchestration.

pub mod config;
pub mod error;
pub mod git;
pub mod graph;
pub mod lifecycle;
pub mod manifest;
pub mod package_client;
pub mod plugin;
pub mod process;
pub mod project;
pub mod publish;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod supervisor;
pub mod watcher;
pub mod workspace;

pub use config::{AppConfig, GitPublishConfig, PluginValue, ProjectConfig, Role};
pub use error::{Error, Result};
pub use git::GitRepository;
pub use graph::ProjectGraph;
pub use manifest::Manifest;
pub use package_client::{PackageClient, ScriptLauncher};
pub use plugin::{
    BuildContext, BuildPlugin, DeployPlugin, DevelopInstance, DevelopPlugin, PluginKind,
    PluginOptions, PluginRegistry, ProjectWatcher,
};
pub use project::{Project, ProjectPaths};
pub use publish::{
    PublishOptions, PublishOutcome, PublishPipeline, PublishPlan, PublishReporter, PublishStage,
    RegistryClient, VersionControl, VersionPrompt,
};
pub use registry::PackageClientRegistry;
pub use resolver::ProjectResolver;
pub use scanner::Scanner;
pub use supervisor::{DevelopHandle, DevelopOptions, OutputMode, ProcessSupervisor};
pub use watcher::{FileWatcher, WatchToggle, WatcherConfig};
pub use workspace::Workspace;
