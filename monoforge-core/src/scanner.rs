//! Project directory discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::project::PROJECTS_DIR;

/// Lists the project directories of a workspace.
pub struct Scanner {
    projects_dir: PathBuf,
}

impl Scanner {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            projects_dir: workspace_root.as_ref().join(PROJECTS_DIR),
        }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Returns the names of every directory directly under `projects/`,
    /// sorted so discovery order is stable across platforms.
    ///
    /// A missing `projects/` directory is an empty workspace.
    pub fn discover(&self) -> Result<Vec<String>> {
        if !self.projects_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&self.projects_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
        {
            let entry = entry.map_err(|e| {
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"))
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }
}
