//! Project data model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::ProjectConfig;
use crate::error::Result;
use crate::manifest::MANIFEST_FILE;
use crate::plugin::{BuildContext, DevelopInstance, ProjectPlugins, ProjectWatcher};

pub const PROJECTS_DIR: &str = "projects";
pub const BUILD_DIR: &str = "build";
pub const INSTALL_DIR: &str = "node_modules";
pub const TOOL_CACHE_DIR: &str = ".toolcache";

/// Absolute filesystem locations of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub manifest: PathBuf,
    pub lock_file: PathBuf,
    pub install_dir: PathBuf,
    pub modules: PathBuf,
    pub modules_entry: PathBuf,
    pub tool_cache: PathBuf,
    pub build_root: PathBuf,
    pub build_manifest: PathBuf,
    pub build_modules: PathBuf,
    pub build_modules_entry: PathBuf,
    pub build_install_dir: PathBuf,
}

impl ProjectPaths {
    /// Computes the paths of `name` inside `workspace_root`.
    ///
    /// Without a compiler the build paths are the source paths.
    pub fn new(workspace_root: &Path, name: &str, lock_file: &str, compiled: bool) -> Self {
        let root = workspace_root.join(PROJECTS_DIR).join(name);
        let compiled_root = workspace_root.join(BUILD_DIR).join(name);
        let build_root = if compiled {
            compiled_root.clone()
        } else {
            root.clone()
        };

        Self {
            manifest: root.join(MANIFEST_FILE),
            lock_file: root.join(lock_file),
            install_dir: root.join(INSTALL_DIR),
            modules: root.join("modules"),
            modules_entry: root.join("modules").join("index.js"),
            tool_cache: compiled_root.join(TOOL_CACHE_DIR),
            build_manifest: build_root.join(MANIFEST_FILE),
            build_modules: build_root.join("modules"),
            build_modules_entry: build_root.join("modules").join("index.js"),
            build_install_dir: build_root.join(INSTALL_DIR),
            build_root,
            root,
        }
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.build_root != self.root
    }
}

/// A sub-project of the workspace.
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory name; the unique key.
    pub name: String,
    /// Name declared in the manifest.
    pub package_name: String,
    /// Version declared in the manifest.
    pub version: Option<String>,
    pub config: ProjectConfig,
    pub paths: ProjectPaths,
    /// Resolved direct dependencies, filled in by the graph.
    pub dependencies: Vec<String>,
    /// Resolved bundled dependencies, filled in by the graph.
    pub bundled_dependencies: Vec<String>,
    /// Projects depending directly on this one.
    pub dependants: Vec<String>,
    /// Every project depending on this one, in build order.
    pub all_dependants: Vec<String>,
    pub plugins: ProjectPlugins,
}

impl Project {
    /// Creates a project without plugins whose manifest name equals `name`.
    pub fn new(name: impl Into<String>, workspace_root: &Path) -> Self {
        let name = name.into();
        let paths = ProjectPaths::new(workspace_root, &name, "package-lock.json", false);
        Self {
            package_name: name.clone(),
            name,
            version: None,
            config: ProjectConfig::default(),
            paths,
            dependencies: Vec::new(),
            bundled_dependencies: Vec::new(),
            dependants: Vec::new(),
            all_dependants: Vec::new(),
            plugins: ProjectPlugins::default(),
        }
    }

    /// Declares dependencies in the project's configuration.
    pub fn with_dependencies<S: Into<String>>(mut self, deps: impl IntoIterator<Item = S>) -> Self {
        self.config.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Declares bundled dependencies in the project's configuration.
    pub fn with_bundled_dependencies<S: Into<String>>(
        mut self,
        deps: impl IntoIterator<Item = S>,
    ) -> Self {
        self.config.bundled_dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_plugins(mut self, plugins: ProjectPlugins) -> Self {
        self.plugins = plugins;
        self
    }

    /// Dependencies followed by bundled dependencies. Duplicates are kept.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &str> + '_ {
        self.dependencies
            .iter()
            .chain(self.bundled_dependencies.iter())
            .map(|s| s.as_str())
    }

    #[inline]
    pub fn depends_on(&self, name: &str) -> bool {
        self.all_dependencies().any(|d| d == name)
    }

    /// Runs the build capability. Returns `false` when the project has none.
    pub async fn build(&self, ctx: &BuildContext) -> Result<bool> {
        match &self.plugins.build {
            Some(binding) => {
                binding.plugin.build(self, &binding.options, ctx).await?;
                Ok(true)
            }
            None => {
                debug!("{} has no build plugin, skipping build", self.name);
                Ok(false)
            }
        }
    }

    pub async fn clean(&self) -> Result<bool> {
        match &self.plugins.build {
            Some(binding) => {
                binding.plugin.clean(self, &binding.options).await?;
                Ok(true)
            }
            None => {
                debug!("{} has no build plugin, skipping clean", self.name);
                Ok(false)
            }
        }
    }

    pub async fn deploy(&self, path: &str) -> Result<bool> {
        match &self.plugins.deploy {
            Some(binding) => {
                binding.plugin.deploy(self, &binding.options, path).await?;
                Ok(true)
            }
            None => {
                debug!("{} has no deploy plugin, skipping deploy", self.name);
                Ok(false)
            }
        }
    }

    pub async fn develop(
        &self,
        watcher: Arc<dyn ProjectWatcher>,
    ) -> Result<Option<Box<dyn DevelopInstance>>> {
        match &self.plugins.develop {
            Some(binding) => {
                let instance = binding
                    .plugin
                    .develop(self, &binding.options, watcher)
                    .await?;
                Ok(Some(instance))
            }
            None => {
                debug!("{} has no develop plugin, skipping develop", self.name);
                Ok(None)
            }
        }
    }
}
