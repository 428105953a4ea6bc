//! Supervision of long-running develop processes.
//!
//! Each project key owns at most one live child. Starting a project that is
//! already running stops the old child and waits for it to exit before the
//! new one is spawned. In prefixed mode the child's output is read by one
//! task per stream, rewritten into labelled lines and handed over a bounded
//! channel to a single consumer, so lines of concurrent processes never
//! interleave mid-line.
//!
//! On Unix every child leads its own process group. Stopping a child signals
//! the whole group, so processes forked by the launcher (`npm run`, `sh -c`)
//! go down with it.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use owo_colors::{AnsiColors, OwoColorize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::package_client::ScriptLauncher;
use crate::plugin::{DevelopInstance, PluginOptions};
use crate::process;
use crate::project::Project;

const LOG_CHANNEL_CAPACITY: usize = 1024;
const READ_BUFFER_SIZE: usize = 8192;
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

const PALETTE: [AnsiColors; 6] = [
    AnsiColors::Cyan,
    AnsiColors::Magenta,
    AnsiColors::Yellow,
    AnsiColors::Green,
    AnsiColors::Blue,
    AnsiColors::BrightRed,
];

/// Options of a develop run, read from the plugin options table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevelopOptions {
    /// Manifest script to run. Required.
    pub script_name: Option<String>,
    /// Keep an already running process instead of restarting it.
    pub run_once: bool,
}

impl DevelopOptions {
    pub fn new(script_name: impl Into<String>) -> Self {
        Self {
            script_name: Some(script_name.into()),
            run_once: false,
        }
    }

    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    /// Accepts both `script_name`/`run_once` and the camelCase spellings.
    pub fn from_options(options: &PluginOptions) -> Self {
        let script_name = ["script_name", "scriptName"]
            .iter()
            .find_map(|key| options.get(*key).and_then(|v| v.as_str()))
            .map(|s| s.to_string());
        let run_once = ["run_once", "script_run_once", "scriptRunOnce"]
            .iter()
            .find_map(|key| options.get(*key).and_then(|v| v.as_bool()))
            .unwrap_or(false);
        Self {
            script_name,
            run_once,
        }
    }
}

/// Where a supervised child writes its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// The child shares the caller's terminal.
    #[default]
    Inherit,
    /// Output is captured and every line is prefixed with the project label.
    Prefixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One labelled output line of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub project: String,
    pub stream: StreamKind,
    pub line: String,
}

/// Final consumer of labelled output.
pub trait LineSink: Send + Sync {
    fn write(&self, record: &LogRecord);
}

/// Writes records to the process's stdout/stderr.
pub struct TerminalSink;

impl LineSink for TerminalSink {
    fn write(&self, record: &LogRecord) {
        match record.stream {
            StreamKind::Stdout => println!("{}", record.line),
            StreamKind::Stderr => eprintln!("{}", record.line),
        }
    }
}

/// Fixed-width, colored `name|` prefix for a project's output.
#[derive(Debug, Clone)]
pub struct OutputLabel {
    prefix: String,
}

impl OutputLabel {
    pub fn new(title: &str, width: usize, color: AnsiColors) -> Self {
        let padded = format!("{:<width$}|", title, width = width);
        Self {
            prefix: padded.color(color).to_string(),
        }
    }

    /// Label without color codes.
    pub fn plain(title: &str, width: usize) -> Self {
        Self {
            prefix: format!("{:<width$}|", title, width = width),
        }
    }

    /// Picks a palette color from the project name so a project keeps its
    /// color across restarts.
    pub fn for_project(name: &str, width: usize) -> Self {
        let index = name.bytes().map(usize::from).sum::<usize>() % PALETTE.len();
        Self::new(name, width, PALETTE[index])
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Strips leading and trailing blank lines from a chunk and prefixes
    /// every remaining line.
    pub fn format_chunk(&self, chunk: &str) -> Vec<String> {
        let trimmed = chunk.trim_start_matches(['\n', '\r']).trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            return Vec::new();
        }
        trimmed
            .split('\n')
            .flat_map(|line| line.trim_end_matches('\r').split('\r'))
            .map(|line| format!("{} {}", self.prefix, line))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum ExitState {
    Exited(ExitStatus),
    Failed(String),
}

impl ExitState {
    fn is_failure(&self) -> bool {
        match self {
            ExitState::Exited(status) => !status.success(),
            ExitState::Failed(_) => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            ExitState::Exited(status) => status.to_string(),
            ExitState::Failed(message) => message.clone(),
        }
    }
}

struct TrackedChild {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ExitState>>,
    monitor: JoinHandle<()>,
}

impl TrackedChild {
    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }
}

type Slot = Arc<Mutex<Option<TrackedChild>>>;

struct Inner {
    launcher: ScriptLauncher,
    output: OutputMode,
    label_width: usize,
    startup_grace: Duration,
    slots: DashMap<String, Slot>,
    log_tx: mpsc::Sender<LogRecord>,
    log_rx: StdMutex<Option<mpsc::Receiver<LogRecord>>>,
    sink: Arc<dyn LineSink>,
}

/// Configures a [`ProcessSupervisor`].
pub struct SupervisorBuilder {
    launcher: ScriptLauncher,
    output: OutputMode,
    label_width: usize,
    startup_grace: Duration,
    sink: Arc<dyn LineSink>,
}

impl SupervisorBuilder {
    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Minimum width of the output label; longer names are not truncated.
    pub fn label_width(mut self, width: usize) -> Self {
        self.label_width = width;
        self
    }

    /// How long `start` waits for an early failing exit before returning.
    /// Zero yields to the scheduler once.
    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> ProcessSupervisor {
        let (log_tx, log_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        ProcessSupervisor {
            inner: Arc::new(Inner {
                launcher: self.launcher,
                output: self.output,
                label_width: self.label_width,
                startup_grace: self.startup_grace,
                slots: DashMap::new(),
                log_tx,
                log_rx: StdMutex::new(Some(log_rx)),
                sink: self.sink,
            }),
        }
    }
}

/// Tracks at most one develop process per project.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn builder(launcher: ScriptLauncher) -> SupervisorBuilder {
        SupervisorBuilder {
            launcher,
            output: OutputMode::default(),
            label_width: 0,
            startup_grace: Duration::ZERO,
            sink: Arc::new(TerminalSink),
        }
    }

    pub fn new(launcher: ScriptLauncher) -> Self {
        Self::builder(launcher).build()
    }

    #[inline]
    pub fn launcher(&self) -> ScriptLauncher {
        self.inner.launcher
    }

    fn slot(&self, project_name: &str) -> Slot {
        let entry = self
            .inner
            .slots
            .entry(project_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)));
        Arc::clone(entry.value())
    }

    fn existing_slot(&self, project_name: &str) -> Option<Slot> {
        self.inner
            .slots
            .get(project_name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Starts the develop script of `project`.
    ///
    /// With `run_once` an already running process is kept. Otherwise a running
    /// process is killed, and confirmed exited, before the new one starts.
    ///
    /// # Errors
    ///
    /// `MissingScriptName` without a script name, `UnknownScript` if the
    /// manifest lacks the script (nothing is spawned), `ChildProcess` if the
    /// spawn fails or the child exits unsuccessfully before `start` returns.
    pub async fn start(&self, project: &Project, options: &DevelopOptions) -> Result<DevelopHandle> {
        let script_name = options
            .script_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::MissingScriptName {
                project: project.name.clone(),
            })?;

        let slot = self.slot(&project.name);
        let mut tracked = slot.lock().await;

        if tracked.as_ref().map(|c| c.has_exited()).unwrap_or(false) {
            debug!("Previous process for {} already exited", project.name);
            tracked.take();
        }

        if options.run_once && tracked.is_some() {
            debug!(
                "Script \"{}\" already running for {}, keeping it",
                script_name, project.name
            );
            return Ok(self.handle(&project.name));
        }

        if let Some(existing) = tracked.take() {
            self.stop(&project.name, existing).await?;
        }

        let manifest = Manifest::read(&project.paths.manifest)?;
        let script_body = manifest
            .script(script_name)
            .ok_or_else(|| Error::UnknownScript {
                project: project.name.clone(),
                script: script_name.to_string(),
            })?;

        info!("Executing script \"{}\" for {}", script_name, project.name);
        let child = self.spawn(project, script_name, script_body)?;
        let mut exit_rx = child.exit_rx.clone();
        *tracked = Some(child);

        if let Some(state) = self.await_startup(&mut exit_rx).await {
            if state.is_failure() {
                tracked.take();
                debug!(
                    "Error executing script \"{}\" for {}",
                    script_name, project.name
                );
                return Err(Error::ChildProcess {
                    project: project.name.clone(),
                    message: format!("script \"{}\" exited: {}", script_name, state.describe()),
                });
            }
        }

        Ok(self.handle(&project.name))
    }

    async fn await_startup(
        &self,
        exit_rx: &mut watch::Receiver<Option<ExitState>>,
    ) -> Option<ExitState> {
        if self.inner.startup_grace.is_zero() {
            tokio::task::yield_now().await;
        } else {
            let _ = tokio::time::timeout(
                self.inner.startup_grace,
                exit_rx.wait_for(|state| state.is_some()),
            )
            .await;
        }
        let state = exit_rx.borrow().clone();
        state
    }

    fn handle(&self, project_name: &str) -> DevelopHandle {
        DevelopHandle {
            project: project_name.to_string(),
            supervisor: self.clone(),
        }
    }

    fn spawn(&self, project: &Project, script_name: &str, script_body: &str) -> Result<TrackedChild> {
        let mut command = self.inner.launcher.command(script_name, script_body);
        process::prepare(&mut command, &project.paths.root);
        #[cfg(unix)]
        command.process_group(0);

        // A background process group reading the terminal would be stopped
        // by SIGTTIN, so stdin is never shared.
        command.stdin(Stdio::null());
        let prefixed = self.inner.output == OutputMode::Prefixed;
        if prefixed {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        debug!(
            "spawn child process: {} ({})",
            self.inner.launcher.describe(script_name),
            project.paths.root.display()
        );
        let mut child = command.spawn().map_err(|e| Error::ChildProcess {
            project: project.name.clone(),
            message: format!("Failed to spawn script \"{}\": {}", script_name, e),
        })?;
        let pid = child.id();

        if prefixed {
            self.ensure_multiplexer();
            let width = self.inner.label_width.max(project.name.len());
            let label = Arc::new(OutputLabel::for_project(&project.name, width));
            if let Some(stdout) = child.stdout.take() {
                tokio::spawn(pump(
                    stdout,
                    StreamKind::Stdout,
                    project.name.clone(),
                    Arc::clone(&label),
                    self.inner.log_tx.clone(),
                ));
            }
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(pump(
                    stderr,
                    StreamKind::Stderr,
                    project.name.clone(),
                    Arc::clone(&label),
                    self.inner.log_tx.clone(),
                ));
            }
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let monitor = tokio::spawn(monitor(
            project.name.clone(),
            script_name.to_string(),
            child,
            kill_rx,
            exit_tx,
        ));

        Ok(TrackedChild {
            pid,
            kill_tx: Some(kill_tx),
            exit_rx,
            monitor,
        })
    }

    fn ensure_multiplexer(&self) {
        let receiver = self
            .inner
            .log_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut rx) = receiver {
            let sink = Arc::clone(&self.inner.sink);
            tokio::spawn(async move {
                while let Some(record) = rx.recv().await {
                    sink.write(&record);
                }
            });
        }
    }

    async fn stop(&self, project_name: &str, mut child: TrackedChild) -> Result<()> {
        if let Some(kill_tx) = child.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        child.monitor.await.map_err(|e| Error::ChildProcess {
            project: project_name.to_string(),
            message: format!("supervisor task failed: {}", e),
        })?;
        debug!("{} killed successfully", project_name);
        Ok(())
    }

    /// Stops the project's process and waits until it has exited.
    ///
    /// Killing a project without a process is not an error.
    pub async fn kill(&self, project_name: &str) -> Result<()> {
        let Some(slot) = self.existing_slot(project_name) else {
            debug!("No running child process for {} to kill", project_name);
            return Ok(());
        };

        let mut tracked = slot.lock().await;
        match tracked.take() {
            Some(child) => self.stop(project_name, child).await,
            None => {
                debug!("No running child process for {} to kill", project_name);
                Ok(())
            }
        }
    }

    /// Names of projects whose process is still alive.
    pub async fn running(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .inner
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut running = Vec::new();
        for (name, slot) in slots {
            let tracked = slot.lock().await;
            if tracked.as_ref().map(|c| !c.has_exited()).unwrap_or(false) {
                running.push(name);
            }
        }
        running.sort();
        running
    }

    /// OS process id of the project's live process.
    pub async fn pid(&self, project_name: &str) -> Option<u32> {
        let slot = self.existing_slot(project_name)?;
        let tracked = slot.lock().await;
        tracked
            .as_ref()
            .filter(|c| !c.has_exited())
            .and_then(|c| c.pid)
    }

    /// Kills every tracked process.
    pub async fn shutdown(&self) -> Result<()> {
        let names: Vec<String> = self
            .inner
            .slots
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in names {
            self.kill(&name).await?;
        }
        Ok(())
    }
}

/// Handle returned by [`ProcessSupervisor::start`].
#[derive(Clone)]
pub struct DevelopHandle {
    project: String,
    supervisor: ProcessSupervisor,
}

impl DevelopHandle {
    pub fn project(&self) -> &str {
        &self.project
    }
}

#[async_trait]
impl DevelopInstance for DevelopHandle {
    async fn kill(&self) -> Result<()> {
        self.supervisor.kill(&self.project).await
    }
}

async fn monitor(
    project: String,
    script_name: String,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitState>>,
) {
    let group = child.id();
    let (state, killed) = tokio::select! {
        status = child.wait() => (exit_state(status), false),
        _ = kill_rx => (terminate(&project, &mut child).await, true),
    };
    // Leftovers of the group die with their leader.
    #[cfg(unix)]
    if let Some(pid) = group {
        signal_group(&project, pid, Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = group;

    debug!(
        "Stopped script \"{}\" process for {} ({})",
        script_name,
        project,
        state.describe()
    );
    if !killed && state.is_failure() {
        warn!(
            "Script \"{}\" for {} exited unexpectedly: {}",
            script_name,
            project,
            state.describe()
        );
    }

    let _ = exit_tx.send(Some(state));
}

/// Asks the child's process group to stop, escalating to SIGKILL when it
/// outlives [`TERMINATE_TIMEOUT`].
async fn terminate(project: &str, child: &mut Child) -> ExitState {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(project, pid, Signal::SIGTERM);
        return match tokio::time::timeout(TERMINATE_TIMEOUT, child.wait()).await {
            Ok(status) => exit_state(status),
            Err(_) => {
                debug!("{} ignored SIGTERM, killing its process group", project);
                signal_group(project, pid, Signal::SIGKILL);
                exit_state(child.wait().await)
            }
        };
    }

    if let Err(e) = child.start_kill() {
        debug!("Could not signal {} process: {}", project, e);
    }
    exit_state(child.wait().await)
}

#[cfg(unix)]
fn signal_group(project: &str, pid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!("Could not send {:?} to {} process group: {}", signal, project, e),
    }
}

fn exit_state(status: std::io::Result<ExitStatus>) -> ExitState {
    match status {
        Ok(status) => ExitState::Exited(status),
        Err(e) => ExitState::Failed(e.to_string()),
    }
}

async fn pump<R>(
    mut reader: R,
    stream: StreamKind,
    project: String,
    label: Arc<OutputLabel>,
    tx: mpsc::Sender<LogRecord>,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buffer[..n]);
                // Complete lines and carriage-return redraws are emitted; a
                // partial line waits for the next chunk unless it outgrows
                // the read buffer.
                let end = match pending.iter().rposition(|b| matches!(b, b'\n' | b'\r')) {
                    Some(pos) => pos + 1,
                    None if pending.len() >= READ_BUFFER_SIZE => pending.len(),
                    None => 0,
                };
                if end > 0 {
                    let complete: Vec<u8> = pending.drain(..end).collect();
                    if !emit(&complete, stream, &project, &label, &tx).await {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!("Output stream of {} closed: {}", project, e);
                break;
            }
        }
    }

    if !pending.is_empty() {
        emit(&pending, stream, &project, &label, &tx).await;
    }
}

async fn emit(
    bytes: &[u8],
    stream: StreamKind,
    project: &str,
    label: &OutputLabel,
    tx: &mpsc::Sender<LogRecord>,
) -> bool {
    let chunk = String::from_utf8_lossy(bytes);
    for line in label.format_chunk(&chunk) {
        let record = LogRecord {
            project: project.to_string(),
            stream,
            line,
        };
        if tx.send(record).await.is_err() {
            return false;
        }
    }
    true
}
