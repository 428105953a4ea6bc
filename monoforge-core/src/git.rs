//! Git access for the publish pipeline.
//!
//! Reads and tags go through `git2`. Checkout and push shell out to `git` so
//! the user's credential helpers and hooks apply.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{DiffOptions, ObjectType, Repository, StatusOptions};
use semver::Version;
use tracing::debug;

use crate::error::{Error, Result};
use crate::process;
use crate::publish::{version_tag, VersionControl};

const OWNER: &str = "git";

pub struct GitRepository {
    root: PathBuf,
}

impl GitRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Runs `task` against the repository on the blocking thread pool.
    async fn with_repo<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || task(&Repository::discover(&root)?))
            .await
            .map_err(|e| git2::Error::from_str(&format!("git task failed: {}", e)))?
    }

    /// Path of `path` relative to the repository's working directory.
    fn pathspec(repo: &Repository, path: &Path) -> Result<String> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| git2::Error::from_str("repository has no working directory"))?;
        let workdir = workdir.canonicalize()?;
        let path = path.canonicalize()?;
        let relative = path.strip_prefix(&workdir).map_err(|_| {
            git2::Error::from_str(&format!(
                "{} is outside of the repository",
                path.display()
            ))
        })?;
        Ok(relative.to_string_lossy().replace('\\', "/"))
    }

    fn parse_tag(name: &str) -> Option<Version> {
        Version::parse(name.strip_prefix('v')?).ok()
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    async fn is_initialized(&self) -> Result<bool> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Repository::discover(root).is_ok())
            .await
            .map_err(|e| Error::Git(git2::Error::from_str(&format!("git task failed: {}", e))))
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool> {
        let path = path.to_path_buf();
        self.with_repo(move |repo| {
            let spec = Self::pathspec(repo, &path)?;

            let mut options = StatusOptions::new();
            options
                .include_untracked(true)
                .recurse_untracked_dirs(true)
                .include_ignored(false);
            if !spec.is_empty() {
                options.pathspec(&spec);
            }

            let statuses = repo.statuses(Some(&mut options))?;
            Ok(!statuses.is_empty())
        })
        .await
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        self.with_repo(|repo| {
            let head = match repo.head() {
                Ok(head) => head,
                Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if !head.is_branch() {
                return Ok(None);
            }
            Ok(head.shorthand().map(|s| s.to_string()))
        })
        .await
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        process::exec(OWNER, "git", ["checkout", branch], &self.root)
            .await
            .map(|_| ())
            .map_err(|e| Error::BranchSwitch {
                branch: branch.to_string(),
                message: e.to_string(),
            })
    }

    async fn last_version_tag(&self) -> Result<Option<Version>> {
        self.with_repo(|repo| {
            let tags = repo.tag_names(Some("v*"))?;
            Ok(tags.iter().flatten().filter_map(Self::parse_tag).max())
        })
        .await
    }

    async fn changed_since(&self, version: &Version, path: &Path) -> Result<bool> {
        let tag = version_tag(version);
        let path = path.to_path_buf();
        self.with_repo(move |repo| {
            let since = repo
                .revparse_single(&format!("refs/tags/{}", tag))?
                .peel_to_tree()?;
            let head = repo.head()?.peel_to_tree()?;

            let spec = Self::pathspec(repo, &path)?;
            let mut options = DiffOptions::new();
            if !spec.is_empty() {
                options.pathspec(&spec);
            }

            let diff = repo.diff_tree_to_tree(Some(&since), Some(&head), Some(&mut options))?;
            let changed = diff.deltas().next().is_some();
            debug!("{} changed since {}: {}", spec, tag, changed);
            Ok(changed)
        })
        .await
    }

    async fn add_annotated_tag(&self, tag: &str, message: &str) -> Result<()> {
        let tag = tag.to_string();
        let message = message.to_string();
        self.with_repo(move |repo| {
            let signature = repo.signature()?;
            let target = repo.head()?.peel(ObjectType::Commit)?;
            repo.tag(&tag, &target, &signature, &message, false)?;
            debug!("Created tag {}", tag);
            Ok(())
        })
        .await
    }

    async fn push_with_tags(&self, remote: &str, tags: &[String]) -> Result<()> {
        let mut args = vec!["push".to_string(), remote.to_string(), "HEAD".to_string()];
        args.extend(tags.iter().map(|tag| format!("refs/tags/{}", tag)));
        process::exec(OWNER, "git", &args, &self.root).await?;
        Ok(())
    }
}
