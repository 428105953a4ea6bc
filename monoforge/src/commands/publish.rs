//! Publish command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use comfy_table::{Cell, Color};
use inquire::Text;
use monoforge_core::error::Error;
use monoforge_core::publish::{FixedVersion, PublishReporter, PublishStage};
use monoforge_core::supervisor::OutputMode;
use monoforge_core::{
    GitRepository, PackageClientRegistry, PublishOptions, PublishOutcome, PublishPipeline,
    PublishPlan, VersionPrompt,
};
use owo_colors::OwoColorize;
use semver::Version;

use crate::formatting::{
    new_table, print_key_value, print_section_header, print_success, SectionStyle,
};

use super::open_session;

/// CLI implementation of PublishReporter.
pub struct CliPublishReporter;

impl PublishReporter for CliPublishReporter {
    fn report_stage(&self, stage: PublishStage) {
        println!("  {} {}", "→".cyan(), stage.as_str().bright_black());
    }

    fn report_version(&self, project: &str, version: &str, changed: bool, dry_run: bool) {
        if !changed {
            return;
        }
        if dry_run {
            println!("[DRY RUN] Would publish {} at {}", project, version);
        } else {
            println!("Publishing {} at {}", project, version);
        }
    }

    fn report_published(&self, project: &str, version: &str) {
        println!("  {} {}@{}", "✓".green(), project.bold(), version);
    }
}

/// Asks for the next version on the terminal, suggesting a minor bump.
struct InquirePrompt;

#[async_trait]
impl VersionPrompt for InquirePrompt {
    async fn next_version(&self, last: &Version) -> monoforge_core::Result<Version> {
        let last = last.clone();
        let suggested = Version::new(last.major, last.minor + 1, 0).to_string();

        let answer = tokio::task::spawn_blocking(move || {
            Text::new("Next version:")
                .with_default(&suggested)
                .with_help_message(&format!("last released version is {}", last))
                .prompt()
        })
        .await
        .map_err(|e| Error::InvalidVersion(format!("version prompt failed: {}", e)))?
        .map_err(|e| Error::InvalidVersion(e.to_string()))?;

        Version::parse(answer.trim().trim_start_matches('v'))
            .map_err(|e| Error::InvalidVersion(format!("{}: {}", answer, e)))
    }
}

pub async fn cmd_publish(
    root: PathBuf,
    projects: Vec<String>,
    version: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let session = open_session(&root, OutputMode::Inherit)?;
    let graph = session.workspace.projects()?;

    let prompt: Arc<dyn VersionPrompt> = match version {
        Some(version) => Arc::new(FixedVersion(
            Version::parse(version.trim_start_matches('v'))
                .with_context(|| format!("Invalid --version {}", version))?,
        )),
        None => Arc::new(InquirePrompt),
    };

    let pipeline = PublishPipeline::new(
        graph,
        Arc::new(GitRepository::new(&root)),
        Arc::new(PackageClientRegistry::new(session.workspace.package_client()?)),
        prompt,
    )
    .with_reporter(Arc::new(CliPublishReporter));

    let options = PublishOptions::new(&session.workspace.config().publishing.git)
        .requested(projects)
        .dry_run(dry_run);

    if dry_run {
        print_section_header("Publish Plan (Dry Run)", SectionStyle::Warning);
    } else {
        print_section_header("Publish", SectionStyle::Primary);
    }

    match pipeline.run(&options).await? {
        PublishOutcome::NothingToPublish { last_version } => {
            print_success(&format!(
                "No projects changed since v{}, nothing to publish",
                last_version
            ));
        }
        PublishOutcome::Planned(plan) => {
            print_plan(&plan);
        }
        PublishOutcome::Published { plan, tag } => {
            print_plan(&plan);
            println!();
            print_success(&format!("Published {} and pushed {}", plan.changed.join(", "), tag));
        }
    }
    println!();
    Ok(())
}

fn print_plan(plan: &PublishPlan) {
    println!();
    print_section_header("Release", SectionStyle::Secondary);
    print_key_value("Last version", &plan.last_version.to_string());
    print_key_value("Next version", &plan.next_version.to_string());
    println!();

    let mut table = new_table(&["Project", "Version", "Change"]);
    for (name, version) in &plan.versions {
        let changed = plan.changed.contains(name);
        table.add_row(vec![
            Cell::new(name).fg(Color::White),
            Cell::new(version).fg(Color::Cyan),
            if changed {
                Cell::new("publish").fg(Color::Green)
            } else {
                Cell::new("unchanged").fg(Color::DarkGrey)
            },
        ]);
    }
    println!("{}", table);
}
