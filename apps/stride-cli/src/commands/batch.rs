// batch.rs - Batch approval over several proposals of one draft.

use clap::Args;
use stride_proposal::{BatchMode, BatchRequest};
use uuid::Uuid;

use super::{print_json, Context};

#[derive(Args)]
pub struct BatchArgs {
    #[arg(long)]
    draft: Uuid,

    /// Largest hours delta a proposal may have and still be applied.
    #[arg(long)]
    max_hours: f64,

    /// `approve` applies candidates within the cap; `reject` rejects them all.
    #[arg(long, default_value = "approve")]
    mode: BatchMode,

    /// Candidate proposal ids, processed in the order given.
    #[arg(required = true)]
    candidates: Vec<Uuid>,
}

pub fn execute(args: &BatchArgs, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.principal()?;
    let request = BatchRequest {
        draft_id: args.draft,
        candidates: args.candidates.clone(),
        max_hours: args.max_hours,
        mode: args.mode,
    };

    let report = ctx.gateway.batch_approve(&actor, &request)?;
    eprintln!(
        "{} applied, {} rejected, {} skipped, {} failed",
        report.applied(),
        report.rejected(),
        report.skipped(),
        report.failed()
    );
    print_json(&report)
}
