//! Dependency upgrade command.

use std::path::PathBuf;

use anyhow::Result;
use monoforge_core::process;
use monoforge_core::supervisor::OutputMode;
use tokio::process::Command;

use crate::formatting::{print_section_header, print_success, SectionStyle};

use super::open_session;

/// Runs the package client's interactive upgrade in every project, in build
/// order.
pub async fn cmd_update(root: PathBuf) -> Result<()> {
    let session = open_session(&root, OutputMode::Inherit)?;
    let graph = session.workspace.projects()?;
    let client = session.workspace.package_client()?;
    let (program, args) = client.update_command();

    print_section_header("Update", SectionStyle::Primary);
    for project in graph.iter() {
        println!("  {}", project.name);
        let mut command = Command::new(program);
        command.args(&args);
        process::prepare(&mut command, &project.paths.root);
        process::run_inherited(
            &project.name,
            command,
            &format!("{} {}", program, args.join(" ")),
        )
        .await?;
    }

    println!();
    print_success("Dependencies updated");
    println!();
    Ok(())
}
