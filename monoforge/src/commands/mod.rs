//! Command implementations for the CLI.

mod develop;
mod info;
mod lifecycle;
mod publish;
mod update;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use monoforge_core::supervisor::{OutputMode, ProcessSupervisor};
use monoforge_core::{AppConfig, PluginRegistry, Scanner, Workspace};

pub use develop::cmd_develop;
pub use info::{cmd_graph, cmd_list};
pub use lifecycle::{cmd_build, cmd_clean, cmd_deploy};
pub use publish::cmd_publish;
pub use update::cmd_update;

/// Uses `--root` when given, otherwise searches upwards from the current
/// directory for `monoforge.toml`.
pub fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(root) => Ok(root),
        None => {
            let cwd = std::env::current_dir().context("Failed to read the current directory")?;
            Ok(AppConfig::discover_root(&cwd))
        }
    }
}

/// A loaded workspace plus the supervisor its plugins share.
pub(crate) struct Session {
    pub workspace: Workspace,
    pub supervisor: ProcessSupervisor,
}

pub(crate) fn open_session(root: &Path, output: OutputMode) -> Result<Session> {
    let config = AppConfig::load(root)?;
    let label_width = Scanner::new(root)
        .discover()?
        .iter()
        .map(|name| name.len())
        .max()
        .unwrap_or(0);

    let supervisor = ProcessSupervisor::builder(config.parse_script_launcher()?)
        .output(output)
        .label_width(label_width)
        .build();

    let mut registry = PluginRegistry::new();
    monoforge_plugins::register_builtin(&mut registry, supervisor.clone());

    Ok(Session {
        workspace: Workspace::new(root, config, registry),
        supervisor,
    })
}
