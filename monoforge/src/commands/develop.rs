//! Develop mode command.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use monoforge_core::plugin::{DevelopInstance, ProjectWatcher};
use monoforge_core::supervisor::OutputMode;
use monoforge_core::{lifecycle, FileWatcher, Scanner, WatcherConfig};

use crate::formatting::{
    print_error, print_key_value, print_section_header, print_success, print_warning, SectionStyle,
};

use super::open_session;

pub async fn cmd_develop(root: PathBuf, projects: Vec<String>) -> Result<()> {
    let session = open_session(&root, OutputMode::Prefixed)?;
    let graph = session.workspace.projects()?;
    let selected = graph.select(&projects)?;
    let selected_names: HashSet<String> = selected.iter().map(|p| p.name.clone()).collect();

    let mut watcher = FileWatcher::new(WatcherConfig::new(Scanner::new(&root).projects_dir()))?;

    print_section_header("Develop Mode", SectionStyle::Primary);
    print_key_value("Projects", &graph.order().join(", "));
    println!("  Press Ctrl+C to stop");
    println!();

    let started = lifecycle::develop(&selected, |project| {
        Arc::new(watcher.toggle(&project.name)) as Arc<dyn ProjectWatcher>
    })
    .await;
    let mut instances: HashMap<String, Box<dyn DevelopInstance>> = match started {
        Ok(instances) => instances.into_iter().collect(),
        Err(e) => {
            session.supervisor.shutdown().await?;
            return Err(e.into());
        }
    };
    if instances.is_empty() {
        print_warning("None of the selected projects has a develop plugin");
    }

    loop {
        let changes = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            changes = watcher.next_changes() => Some(changes),
        };

        let changed = match changes {
            None => {
                println!();
                print_warning("Stopping develop mode...");
                break;
            }
            Some(Ok(Some(changed))) => changed,
            Some(Ok(None)) => break,
            Some(Err(e)) => {
                print_error(&e.to_string());
                break;
            }
        };

        let changed: Vec<String> = changed
            .into_iter()
            .filter(|name| graph.get(name).is_some())
            .collect();
        if changed.is_empty() {
            continue;
        }

        print_warning(&format!("Change detected in {}, restarting...", changed.join(", ")));
        for project in graph.affected(&changed)? {
            if !selected_names.contains(&project.name) {
                continue;
            }
            if let Some(instance) = instances.remove(&project.name) {
                instance.kill().await?;
            }

            let toggle = Arc::new(watcher.toggle(&project.name)) as Arc<dyn ProjectWatcher>;
            match project.develop(toggle).await {
                Ok(Some(instance)) => {
                    instances.insert(project.name.clone(), instance);
                }
                Ok(None) => {}
                // The next change retries a failed restart.
                Err(e) => print_error(&e.to_string()),
            }
        }
    }

    for (_, instance) in instances.drain() {
        instance.kill().await?;
    }
    session.supervisor.shutdown().await?;
    print_success("All develop processes stopped");
    Ok(())
}
