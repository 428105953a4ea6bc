//! Runs manifest scripts for every lifecycle step.
//!
//! Build, clean and deploy run a script to completion. Develop hands the
//! script to the [`ProcessSupervisor`], which keeps one live process per
//! project.

use std::sync::Arc;

use async_trait::async_trait;
use monoforge_core::error::{Error, Result};
use monoforge_core::manifest::Manifest;
use monoforge_core::plugin::{
    BuildContext, BuildPlugin, DeployPlugin, DevelopInstance, DevelopPlugin, PluginOptions,
    ProjectWatcher,
};
use monoforge_core::process;
use monoforge_core::project::Project;
use monoforge_core::supervisor::{DevelopOptions, ProcessSupervisor};
use tracing::{debug, info};

pub const NAME: &str = "script";

/// Environment variable carrying the release version during a publish build.
pub const VERSION_ENV: &str = "MONOFORGE_VERSION";
/// Environment variable carrying the deploy target.
pub const DEPLOY_PATH_ENV: &str = "MONOFORGE_DEPLOY_PATH";

const DEFAULT_BUILD_SCRIPT: &str = "build";
const DEFAULT_DEPLOY_SCRIPT: &str = "deploy";

pub struct ScriptPlugin {
    supervisor: ProcessSupervisor,
}

impl ScriptPlugin {
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self { supervisor }
    }

    fn option<'a>(options: &'a PluginOptions, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .find_map(|key| options.get(*key).and_then(|v| v.as_str()))
    }

    fn script_name<'a>(options: &'a PluginOptions, default: &'a str) -> &'a str {
        Self::option(options, &["script_name", "scriptName"]).unwrap_or(default)
    }

    /// Runs `script_name` from the project's manifest and waits for it.
    async fn run_script(&self, project: &Project, script_name: &str, env: &[(&str, &str)]) -> Result<()> {
        let manifest = Manifest::read(&project.paths.manifest)?;
        let body = manifest
            .script(script_name)
            .ok_or_else(|| Error::UnknownScript {
                project: project.name.clone(),
                script: script_name.to_string(),
            })?;

        let launcher = self.supervisor.launcher();
        let mut command = launcher.command(script_name, body);
        process::prepare(&mut command, &project.paths.root);
        for (key, value) in env {
            command.env(key, value);
        }

        info!("Executing script \"{}\" for {}", script_name, project.name);
        process::run_inherited(&project.name, command, &launcher.describe(script_name)).await
    }
}

#[async_trait]
impl BuildPlugin for ScriptPlugin {
    fn name(&self) -> &str {
        NAME
    }

    async fn build(&self, project: &Project, options: &PluginOptions, ctx: &BuildContext) -> Result<()> {
        let script_name = Self::script_name(options, DEFAULT_BUILD_SCRIPT);
        let env: Vec<(&str, &str)> = ctx
            .version_for(&project.name)
            .map(|version| vec![(VERSION_ENV, version)])
            .unwrap_or_default();
        self.run_script(project, script_name, &env).await
    }

    /// Runs `clean_script` when configured; otherwise there is nothing to do.
    async fn clean(&self, project: &Project, options: &PluginOptions) -> Result<()> {
        match Self::option(options, &["clean_script", "cleanScript"]) {
            Some(script_name) => self.run_script(project, script_name, &[]).await,
            None => {
                debug!("No clean script configured for {}", project.name);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DeployPlugin for ScriptPlugin {
    fn name(&self) -> &str {
        NAME
    }

    async fn deploy(&self, project: &Project, options: &PluginOptions, path: &str) -> Result<()> {
        let script_name = Self::script_name(options, DEFAULT_DEPLOY_SCRIPT);
        self.run_script(project, script_name, &[(DEPLOY_PATH_ENV, path)])
            .await
    }
}

#[async_trait]
impl DevelopPlugin for ScriptPlugin {
    fn name(&self) -> &str {
        NAME
    }

    async fn develop(
        &self,
        project: &Project,
        options: &PluginOptions,
        _watcher: Arc<dyn ProjectWatcher>,
    ) -> Result<Box<dyn DevelopInstance>> {
        let options = DevelopOptions::from_options(options);
        let handle = self.supervisor.start(project, &options).await?;
        Ok(Box::new(handle))
    }
}
