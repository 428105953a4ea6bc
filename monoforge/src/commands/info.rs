//! Inspection commands.

use std::path::PathBuf;

use anyhow::Result;
use owo_colors::OwoColorize;
use monoforge_core::supervisor::OutputMode;

use crate::formatting::{print_project_table, print_section_header, print_warning, SectionStyle};

use super::open_session;

pub fn cmd_list(root: PathBuf, json: bool) -> Result<()> {
    let session = open_session(&root, OutputMode::Inherit)?;
    let graph = session.workspace.projects()?;

    if json {
        let projects: Vec<serde_json::Value> = graph
            .iter()
            .map(|project| {
                serde_json::json!({
                    "name": project.name,
                    "package": project.package_name,
                    "version": project.version,
                    "path": project.paths.root,
                    "dependencies": project.dependencies,
                    "bundledDependencies": project.bundled_dependencies,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }

    print_section_header("Projects", SectionStyle::Primary);
    if graph.is_empty() {
        print_warning("No projects found");
        println!();
        return Ok(());
    }

    let rows: Vec<Vec<String>> = graph
        .iter()
        .map(|project| {
            let plugins = &project.plugins;
            let capabilities: Vec<&str> = [
                plugins.build.as_ref().map(|_| "build"),
                plugins.develop.as_ref().map(|_| "develop"),
                plugins.deploy.as_ref().map(|_| "deploy"),
            ]
            .into_iter()
            .flatten()
            .collect();
            vec![
                project.name.clone(),
                project.version.clone().unwrap_or_else(|| "-".to_string()),
                project.all_dependencies().collect::<Vec<_>>().join(", "),
                capabilities.join(", "),
            ]
        })
        .collect();
    print_project_table(&["Project", "Version", "Depends on", "Capabilities"], rows);
    println!();

    Ok(())
}

pub fn cmd_graph(root: PathBuf, json: bool) -> Result<()> {
    let session = open_session(&root, OutputMode::Inherit)?;
    let graph = session.workspace.projects()?;

    if json {
        let edges: Vec<serde_json::Value> = graph
            .edges()
            .into_iter()
            .map(|(from, to)| serde_json::json!({ "dependency": from, "dependant": to }))
            .collect();
        let graph_data = serde_json::json!({
            "order": graph.order(),
            "edges": edges,
        });
        println!("{}", serde_json::to_string_pretty(&graph_data)?);
        return Ok(());
    }

    print_section_header("Dependency Graph", SectionStyle::Primary);
    if graph.is_empty() {
        print_warning("No projects found");
        println!();
        return Ok(());
    }

    println!(
        "  {} Build order ({} projects):",
        "OK".green(),
        graph.len().to_string().bold().cyan()
    );
    println!();
    for (idx, project) in graph.iter().enumerate() {
        let dependants = if project.all_dependants.is_empty() {
            String::new()
        } else {
            format!("→ {}", project.all_dependants.join(", "))
        };
        println!(
            "  {} {} {}",
            format!("{:2}", idx + 1).bright_black(),
            project.name.bold().white(),
            dependants.bright_black()
        );
    }
    println!();

    Ok(())
}
