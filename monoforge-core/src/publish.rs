//! The publish pipeline: version selection, change detection, build,
//! registry publish, tag and push.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use semver::Version;
use tracing::{debug, info, warn};

use crate::config::GitPublishConfig;
use crate::error::{Error, Result};
use crate::graph::ProjectGraph;
use crate::manifest::stamp_versions;
use crate::plugin::BuildContext;
use crate::project::Project;

/// Version used when no release tag exists yet.
pub const INITIAL_VERSION: Version = Version::new(0, 0, 0);

/// Source control operations the pipeline depends on.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn is_initialized(&self) -> Result<bool>;
    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool>;
    async fn current_branch(&self) -> Result<Option<String>>;
    async fn checkout(&self, branch: &str) -> Result<()>;
    /// Highest `v<semver>` tag, if any.
    async fn last_version_tag(&self) -> Result<Option<Version>>;
    /// Whether anything under `path` changed since the tag of `version`.
    async fn changed_since(&self, version: &Version, path: &Path) -> Result<bool>;
    async fn add_annotated_tag(&self, tag: &str, message: &str) -> Result<()>;
    async fn push_with_tags(&self, remote: &str, tags: &[String]) -> Result<()>;
}

/// Package registry operations the pipeline depends on.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Latest version of the project's package on the registry.
    async fn last_published_version(&self, project: &Project) -> Result<Option<String>>;
    /// Publishes the project's build output.
    async fn publish(&self, project: &Project) -> Result<()>;
}

/// Asks for the version of the next release.
#[async_trait]
pub trait VersionPrompt: Send + Sync {
    async fn next_version(&self, last: &Version) -> Result<Version>;
}

/// A prompt that always answers with the same version.
#[derive(Debug, Clone)]
pub struct FixedVersion(pub Version);

#[async_trait]
impl VersionPrompt for FixedVersion {
    async fn next_version(&self, _last: &Version) -> Result<Version> {
        Ok(self.0.clone())
    }
}

/// Steps of a publish run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Preconditions,
    VersionSelection,
    ChangeSet,
    Build,
    Publish,
    Tag,
    Push,
}

impl PublishStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStage::Preconditions => "preconditions",
            PublishStage::VersionSelection => "version selection",
            PublishStage::ChangeSet => "change set",
            PublishStage::Build => "build",
            PublishStage::Publish => "publish",
            PublishStage::Tag => "tag",
            PublishStage::Push => "push",
        }
    }
}

/// Trait for reporting publish progress.
///
/// Lets the pipeline report what it does without writing to stdout/stderr.
pub trait PublishReporter: Send + Sync {
    fn report_stage(&self, stage: PublishStage);

    /// Reports the version a project will carry in this release.
    fn report_version(&self, project: &str, version: &str, changed: bool, dry_run: bool);

    fn report_published(&self, project: &str, version: &str);
}

/// Reporter that discards everything.
pub struct SilentReporter;

impl PublishReporter for SilentReporter {
    fn report_stage(&self, _stage: PublishStage) {}
    fn report_version(&self, _project: &str, _version: &str, _changed: bool, _dry_run: bool) {}
    fn report_published(&self, _project: &str, _version: &str) {}
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Projects to consider; empty means all.
    pub requested: Vec<String>,
    /// Plan and report only.
    pub dry_run: bool,
    pub branch: String,
    pub remote: String,
}

impl PublishOptions {
    pub fn new(git: &GitPublishConfig) -> Self {
        Self {
            requested: Vec::new(),
            dry_run: false,
            branch: git.branch().to_string(),
            remote: git.remote().to_string(),
        }
    }

    pub fn requested(mut self, requested: Vec<String>) -> Self {
        self.requested = requested;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::new(&GitPublishConfig::default())
    }
}

/// What a release will contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    pub last_version: Version,
    pub next_version: Version,
    pub first_publish: bool,
    /// Projects to build and publish, in build order.
    pub changed: Vec<String>,
    /// Version of every project for this release, in build order.
    pub versions: IndexMap<String, String>,
}

impl PublishPlan {
    pub fn tag(&self) -> String {
        version_tag(&self.next_version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No project changed since the last release.
    NothingToPublish { last_version: Version },
    /// Dry run; nothing was built, published, tagged or pushed.
    Planned(PublishPlan),
    Published { plan: PublishPlan, tag: String },
}

/// Formats the tag name of a release.
pub fn version_tag(version: &Version) -> String {
    format!("v{}", version)
}

/// Drives a release across the workspace.
pub struct PublishPipeline {
    graph: Arc<ProjectGraph>,
    vcs: Arc<dyn VersionControl>,
    registry: Arc<dyn RegistryClient>,
    prompt: Arc<dyn VersionPrompt>,
    reporter: Arc<dyn PublishReporter>,
}

impl PublishPipeline {
    pub fn new(
        graph: Arc<ProjectGraph>,
        vcs: Arc<dyn VersionControl>,
        registry: Arc<dyn RegistryClient>,
        prompt: Arc<dyn VersionPrompt>,
    ) -> Self {
        Self {
            graph,
            vcs,
            registry,
            prompt,
            reporter: Arc::new(SilentReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PublishReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Runs every stage in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// `UninitializedRepository`, `UncommittedChanges` and `BranchSwitch` are
    /// raised before anything is built. `InvalidVersion` if the chosen
    /// version does not exceed the last release. Build, registry and git
    /// failures propagate unchanged.
    pub async fn run(&self, options: &PublishOptions) -> Result<PublishOutcome> {
        self.check_preconditions(options).await?;

        let plan = self.plan(options).await?;
        if plan.changed.is_empty() {
            info!(
                "No projects changed since {}, nothing to publish",
                version_tag(&plan.last_version)
            );
            return Ok(PublishOutcome::NothingToPublish {
                last_version: plan.last_version,
            });
        }

        if options.dry_run {
            return Ok(PublishOutcome::Planned(plan));
        }

        // Uncompiled projects publish their source manifest, which is
        // stamped in place and put back afterwards so the tagged tree stays
        // clean.
        let mut sources = StampedSources::default();
        let released = self.release(&plan, &mut sources).await;
        let restored = sources.restore();
        released?;
        restored?;

        let tag = plan.tag();
        self.reporter.report_stage(PublishStage::Tag);
        self.vcs.add_annotated_tag(&tag, &tag).await?;

        self.reporter.report_stage(PublishStage::Push);
        self.vcs
            .push_with_tags(&options.remote, std::slice::from_ref(&tag))
            .await?;

        info!("Published {} as {}", plan.changed.join(", "), tag);
        Ok(PublishOutcome::Published { plan, tag })
    }

    async fn check_preconditions(&self, options: &PublishOptions) -> Result<()> {
        self.reporter.report_stage(PublishStage::Preconditions);

        if !self.vcs.is_initialized().await? {
            return Err(Error::UninitializedRepository);
        }

        let mut dirty = Vec::new();
        for project in self.graph.iter() {
            if self.vcs.has_uncommitted_changes(&project.paths.root).await? {
                dirty.push(project.name.clone());
            }
        }
        if !dirty.is_empty() {
            return Err(Error::UncommittedChanges { projects: dirty });
        }

        let current = self.vcs.current_branch().await?;
        if current.as_deref() != Some(options.branch.as_str()) {
            debug!(
                "On branch {:?}, switching to {}",
                current, options.branch
            );
            self.vcs
                .checkout(&options.branch)
                .await
                .map_err(|e| match e {
                    Error::BranchSwitch { .. } => e,
                    other => Error::BranchSwitch {
                        branch: options.branch.clone(),
                        message: other.to_string(),
                    },
                })?;
        }

        Ok(())
    }

    /// Selects versions and the change set. Versions are only looked up when
    /// the change set is not empty.
    async fn plan(&self, options: &PublishOptions) -> Result<PublishPlan> {
        self.reporter.report_stage(PublishStage::VersionSelection);

        let last_tag = self.vcs.last_version_tag().await?;
        let first_publish = last_tag.is_none();
        let last_version = last_tag.unwrap_or(INITIAL_VERSION);
        debug!("Last version is {}", last_version);

        let next_version = self.prompt.next_version(&last_version).await?;
        if next_version <= last_version {
            return Err(Error::InvalidVersion(format!(
                "{} must be greater than the last released version {}",
                next_version, last_version
            )));
        }

        self.reporter.report_stage(PublishStage::ChangeSet);
        let candidates = self.graph.select(&options.requested)?;
        let changed: Vec<String> = if first_publish {
            self.graph.order().to_vec()
        } else {
            let mut changed = Vec::new();
            for project in candidates {
                if self
                    .vcs
                    .changed_since(&last_version, &project.paths.root)
                    .await?
                {
                    changed.push(project.name.clone());
                }
            }
            changed
        };

        if changed.is_empty() {
            return Ok(PublishPlan {
                last_version,
                next_version,
                first_publish,
                changed,
                versions: IndexMap::new(),
            });
        }

        let next = next_version.to_string();
        let mut versions = IndexMap::with_capacity(self.graph.len());
        for project in self.graph.iter() {
            let is_changed = changed.contains(&project.name);
            let version = if is_changed {
                next.clone()
            } else {
                self.last_published_version(project).await?
            };
            self.reporter
                .report_version(&project.name, &version, is_changed, options.dry_run);
            versions.insert(project.name.clone(), version);
        }

        Ok(PublishPlan {
            last_version,
            next_version,
            first_publish,
            changed,
            versions,
        })
    }

    async fn last_published_version(&self, project: &Project) -> Result<String> {
        let published = self.registry.last_published_version(project).await?;
        Ok(published
            .or_else(|| project.version.clone())
            .unwrap_or_else(|| INITIAL_VERSION.to_string()))
    }

    async fn release(&self, plan: &PublishPlan, sources: &mut StampedSources) -> Result<()> {
        self.build(plan, sources).await?;
        self.publish(plan).await
    }

    async fn build(&self, plan: &PublishPlan, sources: &mut StampedSources) -> Result<()> {
        self.reporter.report_stage(PublishStage::Build);

        let versions: HashMap<String, String> = plan
            .versions
            .iter()
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect();
        let package_versions: HashMap<String, String> = self
            .graph
            .iter()
            .filter_map(|p| {
                plan.versions
                    .get(&p.name)
                    .map(|v| (p.package_name.clone(), v.clone()))
            })
            .collect();
        let ctx = BuildContext::with_versions(versions);
        let next = plan.next_version.to_string();

        for name in &plan.changed {
            let project = self.graph.project(name)?;
            info!("Building {} for release {}", project.name, next);
            project.build(&ctx).await?;
            if !project.paths.is_compiled() {
                sources.save(&project.paths.build_manifest)?;
            }
            stamp_versions(&project.paths.build_manifest, &next, &package_versions)?;
        }
        Ok(())
    }

    async fn publish(&self, plan: &PublishPlan) -> Result<()> {
        self.reporter.report_stage(PublishStage::Publish);
        let next = plan.next_version.to_string();

        for name in &plan.changed {
            let project = self.graph.project(name)?;
            self.registry.publish(project).await?;
            self.reporter.report_published(&project.name, &next);
        }
        Ok(())
    }
}

/// Original bytes of source manifests rewritten for a release.
#[derive(Default)]
struct StampedSources {
    originals: Vec<(PathBuf, Vec<u8>)>,
}

impl StampedSources {
    fn save(&mut self, path: &Path) -> Result<()> {
        let original = fs::read(path).map_err(|e| Error::ManifestRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.originals.push((path.to_path_buf(), original));
        Ok(())
    }

    /// Writes every saved manifest back, reporting the first failure.
    fn restore(self) -> Result<()> {
        let mut first_error = None;
        for (path, original) in self.originals {
            debug!("Restoring {}", path.display());
            if let Err(e) = fs::write(&path, original) {
                warn!("Could not restore {}: {}", path.display(), e);
                first_error.get_or_insert(Error::Io(e));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
