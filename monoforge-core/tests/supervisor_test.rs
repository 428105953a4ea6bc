use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use monoforge_core::error::Error;
use monoforge_core::package_client::ScriptLauncher;
use monoforge_core::plugin::DevelopInstance;
use monoforge_core::project::Project;
use monoforge_core::supervisor::{
    DevelopOptions, LineSink, LogRecord, OutputLabel, OutputMode, ProcessSupervisor, StreamKind,
};
use tempfile::TempDir;

#[derive(Default)]
struct CaptureSink {
    records: Mutex<Vec<LogRecord>>,
}

impl LineSink for CaptureSink {
    fn write(&self, record: &LogRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

impl CaptureSink {
    async fn wait_for(&self, count: usize) -> Vec<LogRecord> {
        for _ in 0..200 {
            {
                let records = self.records.lock().unwrap();
                if records.len() >= count {
                    return records.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.records.lock().unwrap().clone()
    }
}

fn create_project(root: &Path, name: &str, scripts: &[(&str, &str)]) -> Project {
    let project = Project::new(name, root);
    fs::create_dir_all(&project.paths.root).unwrap();
    let scripts: serde_json::Map<String, serde_json::Value> = scripts
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    fs::write(
        &project.paths.manifest,
        serde_json::json!({ "name": name, "version": "1.0.0", "scripts": scripts }).to_string(),
    )
    .unwrap();
    project
}

fn shell_supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(ScriptLauncher::Shell)
}

#[cfg(target_os = "linux")]
fn is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(target_os = "linux")]
fn count_processes(cmdline: &str) -> usize {
    fs::read_dir("/proc")
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| fs::read(entry.path().join("cmdline")).ok())
        .filter(|raw| String::from_utf8_lossy(raw).replace('\0', " ").trim() == cmdline)
        .count()
}

#[cfg(target_os = "linux")]
async fn settle_process_count(cmdline: &str, expected: usize) -> usize {
    for _ in 0..200 {
        if count_processes(cmdline) == expected {
            return expected;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    count_processes(cmdline)
}

#[tokio::test]
async fn test_start_twice_leaves_one_process() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "sleep 30")]);
    let supervisor = shell_supervisor();
    let options = DevelopOptions::new("start");

    supervisor.start(&project, &options).await.unwrap();
    let first = supervisor.pid("web").await.unwrap();

    supervisor.start(&project, &options).await.unwrap();
    let second = supervisor.pid("web").await.unwrap();

    assert_ne!(first, second);
    assert_eq!(supervisor.running().await, vec!["web"]);
    #[cfg(target_os = "linux")]
    assert!(!is_alive(first));

    supervisor.kill("web").await.unwrap();
    assert!(supervisor.running().await.is_empty());
    #[cfg(target_os = "linux")]
    assert!(!is_alive(second));
}

// `sh -c` forks for a compound body, so the sleep is a grandchild of the
// supervisor rather than the tracked process itself.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_restart_stops_forked_children() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "sleep 4321; true")]);
    let supervisor = shell_supervisor();
    let options = DevelopOptions::new("start");

    supervisor.start(&project, &options).await.unwrap();
    assert_eq!(settle_process_count("sleep 4321", 1).await, 1);

    supervisor.start(&project, &options).await.unwrap();
    assert_eq!(settle_process_count("sleep 4321", 1).await, 1);

    supervisor.kill("web").await.unwrap();
    assert_eq!(settle_process_count("sleep 4321", 0).await, 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_shutdown_stops_forked_children() {
    let temp_dir = TempDir::new().unwrap();
    let api = create_project(temp_dir.path(), "api", &[("start", "sleep 4322; true")]);
    let web = create_project(temp_dir.path(), "web", &[("start", "sleep 4322; true")]);
    let supervisor = shell_supervisor();
    let options = DevelopOptions::new("start");

    supervisor.start(&api, &options).await.unwrap();
    supervisor.start(&web, &options).await.unwrap();
    assert_eq!(settle_process_count("sleep 4322", 2).await, 2);

    supervisor.shutdown().await.unwrap();
    assert_eq!(settle_process_count("sleep 4322", 0).await, 0);
}

#[tokio::test]
async fn test_concurrent_starts_leave_one_process() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "sleep 30")]);
    let supervisor = shell_supervisor();
    let options = DevelopOptions::new("start");

    let (a, b) = tokio::join!(
        supervisor.start(&project, &options),
        supervisor.start(&project, &options)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(supervisor.running().await, vec!["web"]);
    supervisor.shutdown().await.unwrap();
    assert!(supervisor.running().await.is_empty());
}

#[tokio::test]
async fn test_kill_without_process_succeeds() {
    let supervisor = shell_supervisor();

    supervisor.kill("never-started").await.unwrap();
    supervisor.kill("never-started").await.unwrap();
}

#[tokio::test]
async fn test_kill_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "api", &[("start", "sleep 30")]);
    let supervisor = shell_supervisor();

    supervisor
        .start(&project, &DevelopOptions::new("start"))
        .await
        .unwrap();
    supervisor.kill("api").await.unwrap();
    supervisor.kill("api").await.unwrap();
    assert!(supervisor.pid("api").await.is_none());
}

#[tokio::test]
async fn test_run_once_keeps_live_process() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "sleep 30")]);
    let supervisor = shell_supervisor();
    let options = DevelopOptions::new("start").run_once(true);

    supervisor.start(&project, &options).await.unwrap();
    let first = supervisor.pid("web").await.unwrap();
    supervisor.start(&project, &options).await.unwrap();

    assert_eq!(supervisor.pid("web").await, Some(first));
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_once_restarts_exited_process() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "job", &[("start", "true")]);
    let supervisor = shell_supervisor();
    let options = DevelopOptions::new("start").run_once(true);

    supervisor.start(&project, &options).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(supervisor.running().await.is_empty());

    // The exited entry is reaped and the script runs again.
    supervisor.start(&project, &options).await.unwrap();
}

#[tokio::test]
async fn test_missing_script_name() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "sleep 30")]);
    let supervisor = shell_supervisor();

    let err = supervisor
        .start(&project, &DevelopOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::MissingScriptName { ref project } if project == "web"));
    assert_eq!(
        err.to_string(),
        "No scriptName was provided for the develop configuration of web."
    );
}

#[tokio::test]
async fn test_unknown_script_spawns_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "sleep 30")]);
    let supervisor = shell_supervisor();

    let err = supervisor
        .start(&project, &DevelopOptions::new("serve"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Could not resolve script named \"serve\" on web");
    assert!(supervisor.running().await.is_empty());
}

#[tokio::test]
async fn test_early_failure_is_returned_to_caller() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "exit 4")]);
    let supervisor = ProcessSupervisor::builder(ScriptLauncher::Shell)
        .startup_grace(Duration::from_secs(5))
        .build();

    let err = supervisor
        .start(&project, &DevelopOptions::new("start"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::ChildProcess { .. }));
    assert!(supervisor.pid("web").await.is_none());
}

#[tokio::test]
async fn test_develop_handle_kills_its_process() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(temp_dir.path(), "web", &[("start", "sleep 30")]);
    let supervisor = shell_supervisor();

    let handle = supervisor
        .start(&project, &DevelopOptions::new("start"))
        .await
        .unwrap();
    assert_eq!(handle.project(), "web");

    let instance: Box<dyn DevelopInstance> = Box::new(handle);
    instance.kill().await.unwrap();
    assert!(supervisor.running().await.is_empty());
}

#[tokio::test]
async fn test_prefixed_output_is_labelled_per_line() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(
        temp_dir.path(),
        "web",
        &[("start", "printf '\\none\\ntwo\\n\\n'; echo oops >&2")],
    );
    let sink = Arc::new(CaptureSink::default());
    let supervisor = ProcessSupervisor::builder(ScriptLauncher::Shell)
        .output(OutputMode::Prefixed)
        .label_width(6)
        .sink(sink.clone())
        .build();

    supervisor
        .start(&project, &DevelopOptions::new("start"))
        .await
        .unwrap();
    let records = sink.wait_for(3).await;

    let stdout: Vec<&LogRecord> = records
        .iter()
        .filter(|r| r.stream == StreamKind::Stdout)
        .collect();
    assert_eq!(stdout.len(), 2);
    assert!(stdout[0].line.contains("web   |"));
    assert!(stdout[0].line.ends_with(" one"));
    assert!(stdout[1].line.ends_with(" two"));

    let stderr: Vec<&LogRecord> = records
        .iter()
        .filter(|r| r.stream == StreamKind::Stderr)
        .collect();
    assert_eq!(stderr.len(), 1);
    assert!(stderr[0].line.ends_with(" oops"));
    assert!(records.iter().all(|r| r.project == "web"));
}

#[tokio::test]
async fn test_carriage_return_redraws_are_flushed() {
    let temp_dir = TempDir::new().unwrap();
    let project = create_project(
        temp_dir.path(),
        "web",
        &[("start", "printf '10%%\\r50%%\\r'; sleep 30")],
    );
    let sink = Arc::new(CaptureSink::default());
    let supervisor = ProcessSupervisor::builder(ScriptLauncher::Shell)
        .output(OutputMode::Prefixed)
        .sink(sink.clone())
        .build();

    supervisor
        .start(&project, &DevelopOptions::new("start"))
        .await
        .unwrap();
    // The process is still running, so nothing here came from the EOF flush.
    let records = sink.wait_for(2).await;
    assert_eq!(records.len(), 2);
    assert!(records[0].line.ends_with(" 10%"));
    assert!(records[1].line.ends_with(" 50%"));

    supervisor.shutdown().await.unwrap();
}

#[test]
fn test_format_chunk_strips_blank_edges() {
    let label = OutputLabel::plain("api", 5);

    assert_eq!(
        label.format_chunk("\n\nhello\r\nworld\n\n"),
        vec!["api  | hello", "api  | world"]
    );
    assert_eq!(label.format_chunk("a\n\nb"), vec!["api  | a", "api  | ", "api  | b"]);
    assert!(label.format_chunk("\n\n").is_empty());
    assert_eq!(label.format_chunk("10%\r50%\r"), vec!["api  | 10%", "api  | 50%"]);
}

#[test]
fn test_colored_label_keeps_padding() {
    let label = OutputLabel::for_project("db", 4);
    assert!(label.prefix().contains("db  |"));
}

#[test]
fn test_develop_options_from_plugin_options() {
    let options: toml::Table = toml::from_str("scriptName = \"serve\"\nscriptRunOnce = true\n").unwrap();
    let parsed = DevelopOptions::from_options(&options);
    assert_eq!(parsed.script_name.as_deref(), Some("serve"));
    assert!(parsed.run_once);

    let options: toml::Table = toml::from_str("script_name = \"dev\"\n").unwrap();
    let parsed = DevelopOptions::from_options(&options);
    assert_eq!(parsed, DevelopOptions::new("dev"));
}
