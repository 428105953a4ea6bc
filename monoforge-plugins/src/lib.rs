//! Built-in lifecycle plugins.

pub mod copy;
pub mod script;

use std::sync::Arc;

pub use copy::CopyCompiler;
pub use script::ScriptPlugin;

use monoforge_core::plugin::{BuildPlugin, DeployPlugin, DevelopPlugin, PluginRegistry};
use monoforge_core::supervisor::ProcessSupervisor;

/// Registers the built-in plugins. Every script capability shares one
/// plugin instance and therefore one supervisor.
pub fn register_builtin(registry: &mut PluginRegistry, supervisor: ProcessSupervisor) {
    let script = Arc::new(ScriptPlugin::new(supervisor));

    let build = Arc::clone(&script);
    registry.register_build(script::NAME, move || Arc::clone(&build) as Arc<dyn BuildPlugin>);
    let deploy = Arc::clone(&script);
    registry.register_deploy(script::NAME, move || Arc::clone(&deploy) as Arc<dyn DeployPlugin>);
    let develop = Arc::clone(&script);
    registry.register_develop(script::NAME, move || {
        Arc::clone(&develop) as Arc<dyn DevelopPlugin>
    });

    registry.register_compiler(copy::NAME, || Arc::new(CopyCompiler) as Arc<dyn BuildPlugin>);
}
