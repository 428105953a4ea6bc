use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use monoforge_core::error::{Error, Result};
use monoforge_core::lifecycle;
use monoforge_core::plugin::{
    BuildContext, BuildPlugin, PluginBinding, PluginOptions, ProjectPlugins, ProjectWatcher,
};
use monoforge_core::project::Project;
use monoforge_core::WatchToggle;
use monoforge_core::{FileWatcher, WatcherConfig};
use tempfile::TempDir;

#[derive(Default)]
struct FlakyBuild {
    fail_on: Option<String>,
    log: Mutex<Vec<String>>,
}

#[async_trait]
impl BuildPlugin for FlakyBuild {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn build(&self, project: &Project, _options: &PluginOptions, _ctx: &BuildContext) -> Result<()> {
        self.log.lock().unwrap().push(format!("build {}", project.name));
        if self.fail_on.as_deref() == Some(project.name.as_str()) {
            return Err(Error::Plugin {
                project: project.name.clone(),
                message: "compilation failed".to_string(),
            });
        }
        Ok(())
    }

    async fn clean(&self, project: &Project, _options: &PluginOptions) -> Result<()> {
        self.log.lock().unwrap().push(format!("clean {}", project.name));
        Ok(())
    }
}

fn with_build(project: Project, plugin: &Arc<FlakyBuild>) -> Project {
    project.with_plugins(ProjectPlugins {
        build: Some(PluginBinding::new(
            Arc::clone(plugin) as Arc<dyn BuildPlugin>,
            PluginOptions::new(),
        )),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_build_stops_at_first_failure() {
    let temp_dir = TempDir::new().unwrap();
    let plugin = Arc::new(FlakyBuild {
        fail_on: Some("b".to_string()),
        ..Default::default()
    });
    let projects: Vec<Project> = ["a", "b", "c"]
        .iter()
        .map(|name| with_build(Project::new(*name, temp_dir.path()), &plugin))
        .collect();
    let refs: Vec<&Project> = projects.iter().collect();

    let err = lifecycle::build(&refs, &BuildContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Plugin { ref project, .. } if project == "b"));
    assert_eq!(*plugin.log.lock().unwrap(), vec!["build a", "build b"]);
}

#[tokio::test]
async fn test_build_reports_projects_without_build() {
    let temp_dir = TempDir::new().unwrap();
    let plugin = Arc::new(FlakyBuild::default());
    let a = with_build(Project::new("a", temp_dir.path()), &plugin);
    let b = Project::new("b", temp_dir.path());

    let mut progress = Vec::new();
    let built = lifecycle::build_with_progress(&[&a, &b], &BuildContext::default(), |p, had| {
        progress.push((p.name.clone(), had))
    })
    .await
    .unwrap();

    assert_eq!(built, vec!["a"]);
    assert_eq!(
        progress,
        vec![("a".to_string(), true), ("b".to_string(), false)]
    );
}

#[tokio::test]
async fn test_clean_removes_install_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let plugin = Arc::new(FlakyBuild::default());
    let project = with_build(Project::new("web", temp_dir.path()), &plugin);
    fs::create_dir_all(project.paths.install_dir.join("left-pad")).unwrap();
    fs::write(&project.paths.lock_file, "{}").unwrap();
    fs::create_dir_all(temp_dir.path().join("build").join("web")).unwrap();

    lifecycle::clean(temp_dir.path(), &[&project], true).await.unwrap();

    assert!(!project.paths.lock_file.exists());
    assert!(!project.paths.install_dir.exists());
    assert!(!temp_dir.path().join("build").exists());
    assert!(project.paths.root.exists());
    assert_eq!(*plugin.log.lock().unwrap(), vec!["clean web"]);
}

#[tokio::test]
async fn test_clean_keeps_install_artifacts_by_default() {
    let temp_dir = TempDir::new().unwrap();
    let project = Project::new("web", temp_dir.path());
    fs::create_dir_all(&project.paths.install_dir).unwrap();
    fs::write(&project.paths.lock_file, "{}").unwrap();

    // Nothing to remove under build/ is fine.
    lifecycle::clean(temp_dir.path(), &[&project], false).await.unwrap();

    assert!(project.paths.lock_file.exists());
    assert!(project.paths.install_dir.exists());
}

#[tokio::test]
async fn test_deploy_without_capability() {
    let temp_dir = TempDir::new().unwrap();
    let project = Project::new("web", temp_dir.path());

    assert!(!lifecycle::deploy(&project, "/srv/web").await.unwrap());
}

#[tokio::test]
async fn test_develop_skips_projects_without_capability() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("projects").join("web")).unwrap();
    let project = Project::new("web", temp_dir.path());
    let watcher = FileWatcher::new(WatcherConfig::new(temp_dir.path().join("projects"))).unwrap();

    let instances = lifecycle::develop(&[&project], |p| {
        Arc::new(watcher.toggle(&p.name)) as Arc<dyn ProjectWatcher>
    })
    .await
    .unwrap();

    assert!(instances.is_empty());
    let toggle: WatchToggle = watcher.toggle("web");
    assert!(!toggle.is_paused());
}
