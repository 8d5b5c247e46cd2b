// audit.rs - Audit subcommands: list, verify, export.

use std::path::PathBuf;

use clap::{ArgGroup, Subcommand};
use stride_audit::AuditError;
use stride_gateway::GatewayError;
use uuid::Uuid;

use super::Context;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show the audit records of a draft or a policy profile.
    #[command(group(ArgGroup::new("scope").required(true).args(["draft", "profile"])))]
    List {
        #[arg(long)]
        draft: Option<Uuid>,
        /// Policy profile id (admin only).
        #[arg(long)]
        profile: Option<String>,
    },
    /// Verify the audit hash chain (admin only).
    Verify,
    /// Write the whole audit log as JSONL (admin only).
    Export {
        /// Destination (defaults to .stride/audit.jsonl).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn execute(cmd: &AuditCommands, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.principal()?;
    let gw = &ctx.gateway;

    match cmd {
        AuditCommands::List { draft, profile } => {
            let records = match (draft, profile) {
                (Some(draft_id), _) => gw.draft_audit(&actor, *draft_id)?,
                (None, Some(profile_id)) => gw.policy_audit(&actor, profile_id)?,
                (None, None) => anyhow::bail!("pass --draft or --profile"),
            };
            if records.is_empty() {
                println!("No audit records.");
                return Ok(());
            }

            println!(
                "{:>5} {:<20} {:<20} {:<18} TARGET",
                "SEQ", "TIMESTAMP", "ACTOR", "ACTION"
            );
            println!("{}", "-".repeat(100));
            for record in records {
                println!(
                    "{:>5} {:<20} {:<20} {:<18} {}",
                    record.sequence,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    format!("{}:{}", record.actor_role, record.actor_id),
                    format!("{:?}", record.action),
                    record.target,
                );
            }
        }

        AuditCommands::Verify => match gw.verify_audit(&actor) {
            Ok(count) => {
                println!("Audit log verified: {} record(s), hash chain intact.", count);
            }
            Err(GatewayError::Audit(AuditError::IntegrityViolation {
                sequence,
                expected,
                actual,
            })) => {
                println!("INTEGRITY VIOLATION at sequence {}:", sequence);
                println!("  Expected: {}", expected);
                println!("  Actual:   {}", actual);
                println!();
                println!("The audit log may have been tampered with.");
                anyhow::bail!("Audit log integrity check failed");
            }
            Err(e) => return Err(e.into()),
        },

        AuditCommands::Export { out } => {
            let (path, count) = gw.export_audit(&actor, out.as_deref())?;
            println!("Exported {} record(s) to {}", count, path.display());
        }
    }

    Ok(())
}
