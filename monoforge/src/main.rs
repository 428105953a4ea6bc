mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "monoforge")]
#[command(about = "Build, develop and publish the projects of a monorepo in dependency order")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root. Defaults to the nearest directory containing monoforge.toml.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, global = true, action)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists projects in build order.
    List {
        #[arg(long, action)]
        json: bool,
    },
    /// Shows the dependency graph.
    Graph {
        #[arg(long, action)]
        json: bool,
    },
    /// Builds projects in dependency order.
    Build { projects: Vec<String> },
    /// Removes build output.
    Clean {
        /// Also remove lock files and installed dependencies.
        #[arg(long, action)]
        all: bool,
    },
    /// Runs develop processes and restarts them on file changes.
    Develop { projects: Vec<String> },
    /// Deploys one project to a target path.
    Deploy { project: String, path: String },
    /// Versions, builds, publishes and tags changed projects.
    Publish {
        projects: Vec<String>,
        /// Version to release instead of prompting for one.
        #[arg(long)]
        version: Option<String>,
        #[arg(long, action)]
        dry_run: bool,
    },
    /// Upgrades dependencies through the package client.
    Update,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = commands::resolve_root(cli.root)?;

    match cli.command {
        Commands::List { json } => commands::cmd_list(root, json)?,
        Commands::Graph { json } => commands::cmd_graph(root, json)?,
        Commands::Build { projects } => commands::cmd_build(root, projects).await?,
        Commands::Clean { all } => commands::cmd_clean(root, all).await?,
        Commands::Develop { projects } => commands::cmd_develop(root, projects).await?,
        Commands::Deploy { project, path } => commands::cmd_deploy(root, project, path).await?,
        Commands::Publish {
            projects,
            version,
            dry_run,
        } => commands::cmd_publish(root, projects, version, dry_run).await?,
        Commands::Update => commands::cmd_update(root).await?,
    }

    Ok(())
}
