//! Lifecycle plugin contracts and the registry that resolves them by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::project::Project;

/// Options table attached to a plugin declaration.
pub type PluginOptions = toml::Table;

/// Per-invocation data handed to build plugins.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// Version assigned to every project for this run, keyed by project name.
    pub versions: Option<HashMap<String, String>>,
}

impl BuildContext {
    pub fn with_versions(versions: HashMap<String, String>) -> Self {
        Self {
            versions: Some(versions),
        }
    }

    #[inline]
    pub fn version_for(&self, project_name: &str) -> Option<&str> {
        self.versions
            .as_ref()
            .and_then(|v| v.get(project_name))
            .map(|s| s.as_str())
    }
}

/// Compiles a project into its build paths and removes the output again.
#[async_trait]
pub trait BuildPlugin: Send + Sync {
    fn name(&self) -> &str;
    async fn build(&self, project: &Project, options: &PluginOptions, ctx: &BuildContext)
        -> Result<()>;
    async fn clean(&self, project: &Project, options: &PluginOptions) -> Result<()>;
}

/// Ships a built project to a target location.
#[async_trait]
pub trait DeployPlugin: Send + Sync {
    fn name(&self) -> &str;
    async fn deploy(&self, project: &Project, options: &PluginOptions, path: &str) -> Result<()>;
}

/// Pauses and resumes change notifications for the project a develop plugin
/// is running, e.g. while it rewrites files inside the project.
pub trait ProjectWatcher: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// A running develop session.
#[async_trait]
pub trait DevelopInstance: Send + Sync {
    async fn kill(&self) -> Result<()>;
}

/// Starts a long-running development process for a project.
#[async_trait]
pub trait DevelopPlugin: Send + Sync {
    fn name(&self) -> &str;
    async fn develop(
        &self,
        project: &Project,
        options: &PluginOptions,
        watcher: Arc<dyn ProjectWatcher>,
    ) -> Result<Box<dyn DevelopInstance>>;
}

/// A resolved plugin together with the options declared for one project.
pub struct PluginBinding<T: ?Sized> {
    pub plugin: Arc<T>,
    pub options: PluginOptions,
}

impl<T: ?Sized> PluginBinding<T> {
    pub fn new(plugin: Arc<T>, options: PluginOptions) -> Self {
        Self { plugin, options }
    }
}

impl<T: ?Sized> Clone for PluginBinding<T> {
    fn clone(&self) -> Self {
        Self {
            plugin: Arc::clone(&self.plugin),
            options: self.options.clone(),
        }
    }
}

/// The optional lifecycle capabilities of a project.
#[derive(Clone, Default)]
pub struct ProjectPlugins {
    pub build: Option<PluginBinding<dyn BuildPlugin>>,
    pub deploy: Option<PluginBinding<dyn DeployPlugin>>,
    pub develop: Option<PluginBinding<dyn DevelopPlugin>>,
}

impl fmt::Debug for ProjectPlugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectPlugins")
            .field("build", &self.build.as_ref().map(|b| b.plugin.name()))
            .field("deploy", &self.deploy.as_ref().map(|b| b.plugin.name()))
            .field("develop", &self.develop.as_ref().map(|b| b.plugin.name()))
            .finish()
    }
}

/// Plugin categories, used for lookups and install hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Compiler,
    Build,
    Deploy,
    Develop,
}

impl PluginKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Compiler => "compiler",
            PluginKind::Build => "build",
            PluginKind::Deploy => "deploy",
            PluginKind::Develop => "develop",
        }
    }

    /// Package a user would install to provide the plugin.
    pub fn package_name(&self, plugin: &str) -> String {
        format!("monoforge-plugin-{}-{}", self.as_str(), plugin)
    }
}

type Factory<T> = Box<dyn Fn() -> Arc<T> + Send + Sync>;

struct Slot<T: ?Sized> {
    factories: HashMap<String, Factory<T>>,
    resolved: Mutex<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Slot<T> {
    fn new() -> Self {
        Self {
            factories: HashMap::new(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    fn register(&mut self, name: &str, factory: Factory<T>) {
        self.factories.insert(name.to_string(), factory);
    }

    fn resolve(&self, name: &str) -> Option<Arc<T>> {
        let mut resolved = self
            .resolved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(plugin) = resolved.get(name) {
            return Some(Arc::clone(plugin));
        }

        let plugin = (self.factories.get(name)?)();
        resolved.insert(name.to_string(), Arc::clone(&plugin));
        Some(plugin)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Registry of plugin factories, populated explicitly at startup.
///
/// Plugins are stateless once created, so each name is instantiated at most
/// once per registry and shared by every project that declares it.
pub struct PluginRegistry {
    compilers: Slot<dyn BuildPlugin>,
    build: Slot<dyn BuildPlugin>,
    deploy: Slot<dyn DeployPlugin>,
    develop: Slot<dyn DevelopPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            compilers: Slot::new(),
            build: Slot::new(),
            deploy: Slot::new(),
            develop: Slot::new(),
        }
    }

    pub fn register_compiler<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn BuildPlugin> + Send + Sync + 'static,
    {
        self.compilers.register(name, Box::new(factory));
    }

    pub fn register_build<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn BuildPlugin> + Send + Sync + 'static,
    {
        self.build.register(name, Box::new(factory));
    }

    pub fn register_deploy<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn DeployPlugin> + Send + Sync + 'static,
    {
        self.deploy.register(name, Box::new(factory));
    }

    pub fn register_develop<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn DevelopPlugin> + Send + Sync + 'static,
    {
        self.develop.register(name, Box::new(factory));
    }

    pub fn compiler(&self, name: &str) -> Option<Arc<dyn BuildPlugin>> {
        self.compilers.resolve(name)
    }

    pub fn build(&self, name: &str) -> Option<Arc<dyn BuildPlugin>> {
        self.build.resolve(name)
    }

    pub fn deploy(&self, name: &str) -> Option<Arc<dyn DeployPlugin>> {
        self.deploy.resolve(name)
    }

    pub fn develop(&self, name: &str) -> Option<Arc<dyn DevelopPlugin>> {
        self.develop.resolve(name)
    }

    /// Lists registered plugin names for a kind.
    pub fn registered(&self, kind: PluginKind) -> Vec<String> {
        match kind {
            PluginKind::Compiler => self.compilers.names(),
            PluginKind::Build => self.build.names(),
            PluginKind::Deploy => self.deploy.names(),
            PluginKind::Develop => self.develop.names(),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
