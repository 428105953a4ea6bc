//! The per-run context: root, configuration, plugin registry and the lazily
//! built project graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::graph::ProjectGraph;
use crate::package_client::{PackageClient, ScriptLauncher};
use crate::plugin::PluginRegistry;
use crate::project::BUILD_DIR;
use crate::resolver::ProjectResolver;
use crate::scanner::Scanner;

pub struct Workspace {
    root: PathBuf,
    config: AppConfig,
    registry: PluginRegistry,
    graph: OnceCell<Arc<ProjectGraph>>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, config: AppConfig, registry: PluginRegistry) -> Self {
        Self {
            root: root.into(),
            config,
            registry,
            graph: OnceCell::new(),
        }
    }

    /// Loads `monoforge.toml` from `root` and wraps it with `registry`.
    pub fn load(root: impl Into<PathBuf>, registry: PluginRegistry) -> Result<Self> {
        let root = root.into();
        let config = AppConfig::load(&root)?;
        Ok(Self::new(root, config, registry))
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn package_client(&self) -> Result<PackageClient> {
        self.config.parse_package_client()
    }

    pub fn script_launcher(&self) -> Result<ScriptLauncher> {
        self.config.parse_script_launcher()
    }

    /// Shared build output directory.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(BUILD_DIR)
    }

    /// Returns every project, building the graph on first use.
    ///
    /// A failed build is not cached; the next call tries again.
    pub fn projects(&self) -> Result<Arc<ProjectGraph>> {
        self.graph
            .get_or_try_init(|| {
                let resolver = ProjectResolver::new(&self.root, &self.config, &self.registry)?;
                let names = Scanner::new(&self.root).discover()?;
                debug!("Discovered {} projects", names.len());

                let projects = names
                    .iter()
                    .map(|name| resolver.resolve(name))
                    .collect::<Result<Vec<_>>>()?;

                Ok::<_, Error>(Arc::new(ProjectGraph::new(projects)?))
            })
            .map(Arc::clone)
    }
}
