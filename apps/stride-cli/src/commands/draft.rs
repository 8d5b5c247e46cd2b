// draft.rs - Draft subcommands: create, show, publish.

use clap::Subcommand;
use uuid::Uuid;

use super::{parse_json, print_json, Context};

#[derive(Subcommand)]
pub enum DraftCommands {
    /// Open a new draft for an athlete you coach.
    Create {
        /// Athlete the plan is for.
        #[arg(long)]
        athlete: String,
        /// Initial plan as JSON, or @path to a JSON file.
        #[arg(long, default_value = r#"{"sessions":{}}"#)]
        plan: String,
        /// Policy profile (defaults to the configured default profile).
        #[arg(long)]
        profile: Option<String>,
    },
    /// Show a draft and its current plan.
    Show { draft_id: Uuid },
    /// Publish a draft. Its plan then changes only through applied proposals.
    Publish { draft_id: Uuid },
}

pub fn execute(cmd: &DraftCommands, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.principal()?;
    let draft = match cmd {
        DraftCommands::Create {
            athlete,
            plan,
            profile,
        } => ctx
            .gateway
            .create_draft(&actor, athlete, parse_json(plan)?, profile.as_deref())?,
        DraftCommands::Show { draft_id } => ctx.gateway.get_draft(&actor, *draft_id)?,
        DraftCommands::Publish { draft_id } => ctx.gateway.publish_draft(&actor, *draft_id)?,
    };
    print_json(&draft)
}
