//! Sequential lifecycle operations over projects in build order.
//!
//! Every operation stops at the first failing project.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::plugin::{BuildContext, DevelopInstance, ProjectWatcher};
use crate::project::Project;

/// Builds each project in order. Returns the names of projects that had a
/// build capability.
pub async fn build(projects: &[&Project], ctx: &BuildContext) -> Result<Vec<String>> {
    build_with_progress(projects, ctx, |_, _| {}).await
}

/// Like [`build`], calling `on_built` after each project with whether it had
/// anything to build.
pub async fn build_with_progress<F>(
    projects: &[&Project],
    ctx: &BuildContext,
    mut on_built: F,
) -> Result<Vec<String>>
where
    F: FnMut(&Project, bool),
{
    let mut built = Vec::new();
    for project in projects {
        info!("Building {}", project.name);
        let had_build = project.build(ctx).await?;
        if had_build {
            built.push(project.name.clone());
        }
        on_built(project, had_build);
    }
    Ok(built)
}

/// Runs each project's clean capability.
///
/// With `remove_install_artifacts` the lock file and install directory of
/// every project are removed as well. The shared build directory under
/// `workspace_root` is removed in both cases.
pub async fn clean(
    workspace_root: &Path,
    projects: &[&Project],
    remove_install_artifacts: bool,
) -> Result<()> {
    for project in projects {
        info!("Cleaning {}", project.name);
        project.clean().await?;

        if remove_install_artifacts {
            remove_file_if_exists(&project.paths.lock_file).await?;
            remove_dir_if_exists(&project.paths.install_dir).await?;
        }
    }

    remove_dir_if_exists(&workspace_root.join(crate::project::BUILD_DIR)).await
}

/// Deploys a single project to `path`. Returns `false` when it has no
/// deploy capability.
pub async fn deploy(project: &Project, path: &str) -> Result<bool> {
    info!("Deploying {} to {}", project.name, path);
    project.deploy(path).await
}

/// Starts develop for each project, asking `watcher_for` for the toggle
/// handed to its plugin.
pub async fn develop<F>(
    projects: &[&Project],
    watcher_for: F,
) -> Result<Vec<(String, Box<dyn DevelopInstance>)>>
where
    F: Fn(&Project) -> Arc<dyn ProjectWatcher>,
{
    let mut instances = Vec::new();
    for project in projects {
        if let Some(instance) = project.develop(watcher_for(project)).await? {
            instances.push((project.name.clone(), instance));
        }
    }
    Ok(instances)
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
