//! # stride-cli
//!
//! Command-line interface for Stride.
//!
//! - `stride draft create/show/publish` - open and publish planning drafts
//! - `stride proposal create/list/show/preview/apply/reject/undo` - the proposal lifecycle
//! - `stride batch` - safety-gated batch approval under an hours cap
//! - `stride policy get/set/list/refresh` - policy profiles and the runtime cache
//! - `stride audit list/verify/export` - the hash-chained audit trail
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stride_gateway::GatewayError;
use tracing_subscriber::EnvFilter;

use commands::Context;

/// Stride - coach-reviewed training plan changes.
#[derive(Parser)]
#[command(name = "stride", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Principal id to act as.
    #[arg(long, env = "STRIDE_ACTOR")]
    actor: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage planning drafts.
    Draft {
        #[command(subcommand)]
        command: commands::draft::DraftCommands,
    },
    /// Create, review and resolve proposals.
    Proposal {
        #[command(subcommand)]
        command: commands::proposal::ProposalCommands,
    },
    /// Approve or reject several proposals of one draft at once.
    Batch(commands::batch::BatchArgs),
    /// Manage policy profiles.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with JSON on stdout.
    // Targets match by prefix, so this covers every stride_* crate.
    let filter = EnvFilter::from_default_env().add_directive("stride=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let ctx = Context::open(&project_root, cli.actor)?;

    match &cli.command {
        Commands::Draft { command } => commands::draft::execute(command, &ctx),
        Commands::Proposal { command } => commands::proposal::execute(command, &ctx),
        Commands::Batch(args) => commands::batch::execute(args, &ctx),
        Commands::Policy { command } => commands::policy::execute(command, &ctx),
        Commands::Audit { command } => commands::audit::execute(command, &ctx),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_json) {
        eprintln!("error[validation-error]: bad log filter: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = run(cli) {
        let code = e
            .downcast_ref::<GatewayError>()
            .map(GatewayError::code)
            .unwrap_or("error");
        eprintln!("error[{}]: {:#}", code, e);
        std::process::exit(1);
    }
}
