//! Registry access through the configured package client.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::package_client::PackageClient;
use crate::process;
use crate::project::Project;
use crate::publish::RegistryClient;

pub struct PackageClientRegistry {
    client: PackageClient,
}

impl PackageClientRegistry {
    pub fn new(client: PackageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegistryClient for PackageClientRegistry {
    /// A lookup failure (e.g. the package was never published) counts as
    /// no published version.
    async fn last_published_version(&self, project: &Project) -> Result<Option<String>> {
        let args = self.client.view_version_args(&project.package_name);
        match process::exec(
            &project.name,
            self.client.as_str(),
            &args,
            &project.paths.root,
        )
        .await
        {
            Ok(version) if !version.is_empty() => Ok(Some(version)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!(
                    "No published version of {} found: {}",
                    project.package_name, e
                );
                Ok(None)
            }
        }
    }

    async fn publish(&self, project: &Project) -> Result<()> {
        let mut command = tokio::process::Command::new(self.client.as_str());
        command.args(self.client.publish_args());
        process::prepare(&mut command, &project.paths.build_root);
        process::run_inherited(
            &project.name,
            command,
            &format!("{} publish", self.client.as_str()),
        )
        .await
    }
}
