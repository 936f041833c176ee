mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    add::AddArgs, config::ConfigSubcommand, feedback::FeedbackKindFlag, sync::SyncArgs,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "playbook",
    about = "Learned-pattern store with confidence feedback, archival, and document sync",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .playbook/ or .git/)
    #[arg(long, global = true, env = "PLAYBOOK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .playbook/ with a default config and an empty store
    Init,

    /// Record a new learned pattern
    Add(AddArgs),

    /// Apply helpful / not-helpful feedback to a pattern
    Feedback {
        /// Pattern id
        id: String,

        #[command(flatten)]
        kind: FeedbackKindFlag,

        /// Feedback came from a person rather than inference
        #[arg(long)]
        human: bool,
    },

    /// Mark patterns as used now
    Touch {
        /// Pattern ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List active patterns, strongest first
    List {
        /// List archived patterns instead
        #[arg(long)]
        archived: bool,
    },

    /// Run decay and archive weak or excess patterns
    Archive {
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Write active patterns into the target document
    Sync(SyncArgs),

    /// Summarize patterns and feedback
    Report,

    /// Verify the target document matches the store (for pre-commit / CI)
    Check,

    /// Inspect and validate .playbook/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    tracing::debug!(root = %root.display(), "resolved project root");

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Add(args) => cmd::add::run(&root, args, cli.json),
        Commands::Feedback { id, kind, human } => {
            cmd::feedback::run(&root, &id, kind.into(), human, cli.json)
        }
        Commands::Touch { ids } => cmd::touch::run(&root, &ids, cli.json),
        Commands::List { archived } => cmd::list::run(&root, archived, cli.json),
        Commands::Archive { dry_run } => cmd::archive::run(&root, dry_run, cli.json),
        Commands::Sync(args) => cmd::sync::run(&root, args, cli.json),
        Commands::Report => cmd::report::run(&root, cli.json),
        Commands::Check => cmd::check::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
