mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    action::ActionSubcommand, history::HistorySubcommand, incident::IncidentSubcommand,
    template::TemplateSubcommand, triggers::TriggersSubcommand,
};
use crisis_core::store::Principal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "crisis",
    about = "Crisis management: incidents, action checklists and status history",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .crisis/ or .git/)
    #[arg(long, global = true, env = "CRISIS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Authenticated user id attached to writes
    #[arg(long, global = true, env = "CRISIS_PRINCIPAL_ID")]
    principal_id: Option<String>,

    /// Display name of the authenticated user
    #[arg(long, global = true, env = "CRISIS_PRINCIPAL_NAME")]
    principal_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .crisis/ with a default config and an empty store
    Init,

    /// Manage action templates
    Template {
        #[command(subcommand)]
        subcommand: TemplateSubcommand,
    },

    /// Open and inspect incidents
    Incident {
        #[command(subcommand)]
        subcommand: IncidentSubcommand,
    },

    /// Work the action checklist of an incident
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Show the status history of actions
    History {
        #[command(subcommand)]
        subcommand: HistorySubcommand,
    },

    /// Inspect and drive the change feed
    Triggers {
        #[command(subcommand)]
        subcommand: TriggersSubcommand,
    },

    /// Drain the change feed continuously until interrupted
    Worker {
        /// Drain once and exit
        #[arg(long)]
        once: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Worker { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let principal = cli.principal_id.map(|id| Principal {
        name: cli.principal_name.unwrap_or_else(|| id.clone()),
        id,
    });

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Template { subcommand } => {
            cmd::template::run(&root, subcommand, principal, cli.json)
        }
        Commands::Incident { subcommand } => {
            cmd::incident::run(&root, subcommand, principal, cli.json)
        }
        Commands::Action { subcommand } => cmd::action::run(&root, subcommand, principal, cli.json),
        Commands::History { subcommand } => cmd::history::run(&root, subcommand, cli.json),
        Commands::Triggers { subcommand } => cmd::triggers::run(&root, subcommand, cli.json),
        Commands::Worker { once } => cmd::worker::run(&root, once, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
