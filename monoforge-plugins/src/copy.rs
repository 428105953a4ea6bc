//! A compiler that copies a project's sources into its build directory.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use monoforge_core::error::{Error, Result};
use monoforge_core::plugin::{BuildContext, BuildPlugin, PluginOptions};
use monoforge_core::project::{Project, INSTALL_DIR, TOOL_CACHE_DIR};
use tracing::debug;
use walkdir::WalkDir;

pub const NAME: &str = "copy";

pub struct CopyCompiler;

impl CopyCompiler {
    /// Directory names never copied, plus any listed under `exclude`.
    fn excluded(options: &PluginOptions) -> Vec<String> {
        let mut excluded = vec![INSTALL_DIR.to_string(), TOOL_CACHE_DIR.to_string()];
        if let Some(extra) = options.get("exclude").and_then(|v| v.as_array()) {
            excluded.extend(extra.iter().filter_map(|v| v.as_str()).map(str::to_string));
        }
        excluded
    }

    /// Copies `source` into `target`, skipping excluded directory names.
    /// Returns the number of files copied.
    pub fn copy_tree(source: &Path, target: &Path, excluded: &[String]) -> Result<usize> {
        let mut copied = 0;
        let walker = WalkDir::new(source).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !excluded
                    .iter()
                    .any(|name| entry.file_name().to_string_lossy() == name.as_str())
        });

        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            let destination = target.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination)?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &destination)?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

#[async_trait]
impl BuildPlugin for CopyCompiler {
    fn name(&self) -> &str {
        NAME
    }

    async fn build(&self, project: &Project, options: &PluginOptions, _ctx: &BuildContext) -> Result<()> {
        if !project.paths.is_compiled() {
            return Ok(());
        }

        let source: PathBuf = project.paths.root.clone();
        let target: PathBuf = project.paths.build_root.clone();
        let excluded = Self::excluded(options);
        let name = project.name.clone();

        let copied = tokio::task::spawn_blocking(move || Self::copy_tree(&source, &target, &excluded))
            .await
            .map_err(|e| Error::Plugin {
                project: name,
                message: format!("copy task failed: {}", e),
            })??;

        debug!(
            "Copied {} files of {} to {}",
            copied,
            project.name,
            project.paths.build_root.display()
        );
        Ok(())
    }

    /// Removes the build directory. Sources are never touched.
    async fn clean(&self, project: &Project, _options: &PluginOptions) -> Result<()> {
        if !project.paths.is_compiled() {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&project.paths.build_root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
