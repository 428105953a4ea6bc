//! Package-management client selection and the commands issued through it.

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

/// Supported package-management clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageClient {
    #[default]
    Npm,
    Yarn,
}

impl PackageClient {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageClient::Npm => "npm",
            PackageClient::Yarn => "yarn",
        }
    }

    /// Parses a client name as written in `monoforge.toml`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "npm" => Ok(PackageClient::Npm),
            "yarn" => Ok(PackageClient::Yarn),
            other => Err(Error::UnsupportedPackageClient(other.to_string())),
        }
    }

    /// Name of the lock file the client writes next to a manifest.
    pub fn lock_file(&self) -> &'static str {
        match self {
            PackageClient::Npm => "package-lock.json",
            PackageClient::Yarn => "yarn.lock",
        }
    }

    pub fn run_script_args(&self, script_name: &str) -> Vec<String> {
        vec!["run".to_string(), script_name.to_string()]
    }

    pub fn publish_args(&self) -> Vec<&'static str> {
        match self {
            PackageClient::Npm => vec!["publish"],
            PackageClient::Yarn => vec!["publish", "--non-interactive"],
        }
    }

    pub fn view_version_args(&self, package_name: &str) -> Vec<String> {
        match self {
            PackageClient::Npm => vec![
                "view".to_string(),
                package_name.to_string(),
                "version".to_string(),
            ],
            PackageClient::Yarn => vec![
                "info".to_string(),
                package_name.to_string(),
                "version".to_string(),
                "--silent".to_string(),
            ],
        }
    }

    /// Program and arguments of the interactive dependency upgrade.
    pub fn update_command(&self) -> (&'static str, Vec<&'static str>) {
        match self {
            PackageClient::Npm => ("npx", vec!["npm-check", "-u"]),
            PackageClient::Yarn => ("yarn", vec!["upgrade-interactive"]),
        }
    }

    /// Shell line telling the user how to install a missing plugin package.
    pub fn install_remedy(&self, package: &str) -> String {
        match self {
            PackageClient::Npm => format!("npm install {}", package),
            PackageClient::Yarn => format!("yarn add {}", package),
        }
    }
}

/// How a manifest script is turned into a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLauncher {
    /// `<client> run <script>`.
    PackageClient(PackageClient),
    /// `sh -c <script body>`, bypassing the package manager.
    Shell,
}

impl ScriptLauncher {
    pub fn parse(s: &str, client: PackageClient) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "package-client" | "client" => Ok(ScriptLauncher::PackageClient(client)),
            "shell" | "sh" => Ok(ScriptLauncher::Shell),
            other => Err(Error::Plugin {
                project: "workspace".to_string(),
                message: format!(
                    "Unknown script_launcher '{}'. Expected 'package-client' or 'shell'",
                    other
                ),
            }),
        }
    }

    /// Builds the command for a script. The body is only used by the shell
    /// launcher; the package client looks the script up itself.
    pub fn command(&self, script_name: &str, script_body: &str) -> Command {
        match self {
            ScriptLauncher::PackageClient(client) => {
                let mut command = Command::new(client.as_str());
                command.args(client.run_script_args(script_name));
                command
            }
            ScriptLauncher::Shell => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(script_body);
                command
            }
        }
    }

    pub fn describe(&self, script_name: &str) -> String {
        match self {
            ScriptLauncher::PackageClient(client) => {
                format!("{} run {}", client.as_str(), script_name)
            }
            ScriptLauncher::Shell => format!("sh -c <{}>", script_name),
        }
    }
}
