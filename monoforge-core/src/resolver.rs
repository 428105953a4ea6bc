//! Turns a project directory name into a fully resolved [`Project`].

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::{AppConfig, PluginValue};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::package_client::PackageClient;
use crate::plugin::{PluginBinding, PluginKind, PluginOptions, PluginRegistry, ProjectPlugins};
use crate::project::{Project, ProjectPaths};

/// Config key holding the options passed to a project's compiler.
pub const COMPILER_OPTIONS_KEY: &str = "compiler_options";

pub struct ProjectResolver<'a> {
    root: &'a Path,
    config: &'a AppConfig,
    registry: &'a PluginRegistry,
    client: PackageClient,
}

impl<'a> ProjectResolver<'a> {
    pub fn new(root: &'a Path, config: &'a AppConfig, registry: &'a PluginRegistry) -> Result<Self> {
        Ok(Self {
            root,
            config,
            registry,
            client: config.parse_package_client()?,
        })
    }

    /// Resolves one project: merged config, manifest, paths and plugins.
    ///
    /// # Errors
    ///
    /// Returns `ConfigResolution` if a declared plugin or compiler is not
    /// registered, and `ManifestRead` if the project's manifest is unusable.
    /// Dependency names are not validated here; the graph does that.
    pub fn resolve(&self, project_name: &str) -> Result<Project> {
        let config = self.config.project_config(project_name)?;

        let compiler = match config.compiler() {
            Some(compiler) => Some(self.require(
                project_name,
                PluginKind::Compiler,
                compiler,
                self.registry.compiler(compiler),
            )?),
            None => None,
        };

        let paths = ProjectPaths::new(
            self.root,
            project_name,
            self.client.lock_file(),
            compiler.is_some(),
        );
        let manifest = Manifest::read(&paths.manifest)?;

        let build = match &config.build {
            Some(value) => Some(self.bind(project_name, PluginKind::Build, value, |n| {
                self.registry.build(n)
            })?),
            None => compiler.map(|plugin| {
                let options = config
                    .extra
                    .get(COMPILER_OPTIONS_KEY)
                    .and_then(|v| v.as_table())
                    .cloned()
                    .unwrap_or_default();
                PluginBinding::new(plugin, options)
            }),
        };
        let deploy = match &config.deploy {
            Some(value) => Some(self.bind(project_name, PluginKind::Deploy, value, |n| {
                self.registry.deploy(n)
            })?),
            None => None,
        };
        let develop = match &config.develop {
            Some(value) => Some(self.bind(project_name, PluginKind::Develop, value, |n| {
                self.registry.develop(n)
            })?),
            None => None,
        };

        debug!(
            "Resolved {} ({}) at {}",
            project_name,
            manifest.name,
            paths.root.display()
        );

        Ok(Project {
            name: project_name.to_string(),
            package_name: manifest.name,
            version: manifest.version,
            config,
            paths,
            dependencies: Vec::new(),
            bundled_dependencies: Vec::new(),
            dependants: Vec::new(),
            all_dependants: Vec::new(),
            plugins: ProjectPlugins {
                build,
                deploy,
                develop,
            },
        })
    }

    fn bind<T: ?Sized>(
        &self,
        project_name: &str,
        kind: PluginKind,
        value: &PluginValue,
        lookup: impl Fn(&str) -> Option<Arc<T>>,
    ) -> Result<PluginBinding<T>> {
        let plugin = self.require(project_name, kind, value.name(), lookup(value.name()))?;
        let options: PluginOptions = value.options();
        Ok(PluginBinding::new(plugin, options))
    }

    fn require<T: ?Sized>(
        &self,
        project_name: &str,
        kind: PluginKind,
        plugin: &str,
        found: Option<Arc<T>>,
    ) -> Result<Arc<T>> {
        found.ok_or_else(|| Error::ConfigResolution {
            project: project_name.to_string(),
            kind: kind.as_str().to_string(),
            plugin: plugin.to_string(),
            remedy: self.client.install_remedy(&kind.package_name(plugin)),
        })
    }
}
