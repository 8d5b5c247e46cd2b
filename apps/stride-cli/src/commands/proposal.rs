// proposal.rs - Proposal subcommands: create, list, show, preview, apply, reject, undo.

use clap::Subcommand;
use uuid::Uuid;

use super::{parse_json, print_json, Context};

#[derive(Subcommand)]
pub enum ProposalCommands {
    /// Propose an edit to a draft's plan.
    Create {
        #[arg(long)]
        draft: Uuid,
        /// Edit set as JSON, or @path to a JSON file.
        #[arg(long)]
        content: String,
    },
    /// List the proposals of a draft.
    List {
        #[arg(long)]
        draft: Uuid,
    },
    /// Show a proposal.
    Show { proposal_id: Uuid },
    /// Show a proposal's projected impact and safety verdict. Changes nothing.
    Preview { proposal_id: Uuid },
    /// Apply a pending proposal.
    Apply { proposal_id: Uuid },
    /// Reject a pending proposal.
    Reject { proposal_id: Uuid },
    /// Request an undo of an applied proposal.
    Undo { proposal_id: Uuid },
}

pub fn execute(cmd: &ProposalCommands, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.principal()?;
    let gw = &ctx.gateway;

    match cmd {
        ProposalCommands::Create { draft, content } => {
            print_json(&gw.create_proposal(&actor, *draft, parse_json(content)?)?)
        }
        ProposalCommands::List { draft } => {
            let proposals = gw.list_proposals(&actor, *draft)?;
            if proposals.is_empty() {
                println!("No proposals.");
                return Ok(());
            }

            println!(
                "{:<38} {:<14} {:<10} {:>8}",
                "PROPOSAL", "STATE", "KIND", "HOURS"
            );
            println!("{}", "-".repeat(74));
            for p in proposals {
                println!(
                    "{:<38} {:<14} {:<10} {:>+8.2}",
                    p.proposal_id.to_string(),
                    p.state.to_string(),
                    p.kind.to_string(),
                    p.impact.hours_delta,
                );
            }
            Ok(())
        }
        ProposalCommands::Show { proposal_id } => print_json(&gw.get_proposal(&actor, *proposal_id)?),
        ProposalCommands::Preview { proposal_id } => {
            print_json(&gw.preview_proposal(&actor, *proposal_id)?)
        }
        ProposalCommands::Apply { proposal_id } => {
            print_json(&gw.apply_proposal(&actor, *proposal_id)?)
        }
        ProposalCommands::Reject { proposal_id } => {
            print_json(&gw.reject_proposal(&actor, *proposal_id)?)
        }
        ProposalCommands::Undo { proposal_id } => {
            print_json(&gw.undo_proposal(&actor, *proposal_id)?)
        }
    }
}
