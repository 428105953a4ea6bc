//! Build, clean and deploy commands.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use monoforge_core::lifecycle;
use monoforge_core::plugin::BuildContext;
use monoforge_core::supervisor::OutputMode;

use crate::formatting::{
    create_progress_bar, format_duration, print_key_value, print_section_header, print_status_table,
    print_success, SectionStyle, Status,
};

use super::open_session;

pub async fn cmd_build(root: PathBuf, projects: Vec<String>) -> Result<()> {
    let session = open_session(&root, OutputMode::Inherit)?;
    let graph = session.workspace.projects()?;
    let selected = graph.select(&projects)?;

    print_section_header("Build", SectionStyle::Primary);
    let start = Instant::now();
    let pb = create_progress_bar(selected.len() as u64);
    pb.set_message("building");

    let mut rows = Vec::with_capacity(selected.len());
    let result = lifecycle::build_with_progress(&selected, &BuildContext::default(), |project, built| {
        pb.inc(1);
        pb.set_message(project.name.clone());
        let (status, detail) = if built {
            (Status::Success, "built")
        } else {
            (Status::Info, "no build plugin")
        };
        rows.push((status, project.name.clone(), detail.to_string()));
    })
    .await;
    pb.finish_and_clear();

    if let Err(e) = result {
        let failed = selected
            .get(rows.len())
            .map(|p| p.name.clone())
            .unwrap_or_default();
        rows.push((Status::Error, failed, e.to_string()));
        print_status_table(&rows);
        return Err(e.into());
    }

    print_status_table(&rows);
    println!();
    print_success(&format!(
        "Built {} projects in {}",
        rows.iter().filter(|(s, _, _)| matches!(s, Status::Success)).count(),
        format_duration(start.elapsed().as_secs_f64())
    ));
    println!();
    Ok(())
}

pub async fn cmd_clean(root: PathBuf, all: bool) -> Result<()> {
    let session = open_session(&root, OutputMode::Inherit)?;
    let graph = session.workspace.projects()?;
    let projects: Vec<_> = graph.iter().collect();

    print_section_header("Clean", SectionStyle::Primary);
    lifecycle::clean(session.workspace.root(), &projects, all).await?;

    print_key_value("Projects", &projects.len().to_string());
    print_key_value(
        "Build directory",
        &session.workspace.build_dir().display().to_string(),
    );
    if all {
        print_key_value("Removed", "build output, lock files, installed dependencies");
    } else {
        print_key_value("Removed", "build output");
    }
    println!();
    print_success("Clean complete");
    println!();
    Ok(())
}

pub async fn cmd_deploy(root: PathBuf, project: String, path: String) -> Result<()> {
    let session = open_session(&root, OutputMode::Inherit)?;
    let graph = session.workspace.projects()?;
    let project = graph.project(&project)?;

    print_section_header("Deploy", SectionStyle::Primary);
    if !lifecycle::deploy(project, &path).await? {
        bail!("{} has no deploy plugin configured", project.name);
    }

    print_success(&format!("Deployed {} to {}", project.name, path));
    println!();
    Ok(())
}
