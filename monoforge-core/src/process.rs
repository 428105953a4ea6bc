//! Running external tools to completion.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment toggle forcing colorized output from child tools.
pub const FORCE_COLOR_ENV: &str = "FORCE_COLOR";

/// Applies the shared child environment: parent env is inherited by default,
/// colors are forced on.
pub fn prepare(command: &mut Command, cwd: &Path) {
    command
        .current_dir(cwd)
        .env(FORCE_COLOR_ENV, "true")
        .kill_on_drop(true);
}

/// Runs a program with piped output and returns its trimmed stdout.
///
/// # Errors
///
/// Returns `ChildProcess` if the program cannot be spawned or exits with a
/// non-zero status; the message carries the captured stderr.
pub async fn exec<I, S>(owner: &str, program: &str, args: I, cwd: &Path) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    debug!(
        "exec child process: {} {} ({})",
        program,
        args.iter()
            .map(|a| AsRef::<OsStr>::as_ref(a).to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        cwd.display()
    );

    let mut command = Command::new(program);
    command.args(&args);
    prepare(&mut command, cwd);

    let output = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::ChildProcess {
            project: owner.to_string(),
            message: format!("Failed to execute {}: {}", program, e),
        })?;

    if !output.status.success() {
        return Err(Error::ChildProcess {
            project: owner.to_string(),
            message: format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs a prepared command attached to the caller's terminal and waits for it.
pub async fn run_inherited(owner: &str, mut command: Command, description: &str) -> Result<()> {
    debug!("spawn child process: {}", description);

    let status = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| Error::ChildProcess {
            project: owner.to_string(),
            message: format!("Failed to execute {}: {}", description, e),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::ChildProcess {
            project: owner.to_string(),
            message: format!("{} exited with {}", description, status),
        })
    }
}
