// policy.rs - Policy subcommands: get, set, list, refresh.

use clap::Subcommand;
use serde_json::json;
use stride_gateway::GatewayError;
use stride_policy::{OverrideBundle, PolicyError};

use super::{parse_json, print_json, Context};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Show the cached override bundle for a profile. Does not refresh.
    Get { profile_id: String },
    /// Create or replace a profile's override bundle (admin only).
    Set {
        profile_id: String,
        /// Override bundle as JSON, or @path to a JSON file.
        #[arg(long)]
        overrides: String,
    },
    /// Refresh the cache and list every stored profile (admin only).
    List,
    /// Reload the policy cache from the store.
    Refresh,
}

pub fn execute(cmd: &PolicyCommands, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.principal()?;
    let gw = &ctx.gateway;

    match cmd {
        PolicyCommands::Get { profile_id } => {
            let bundle = gw.get_policy_profile(&actor, profile_id)?;
            print_json(&json!({ "profile_id": profile_id, "overrides": bundle }))
        }
        PolicyCommands::Set {
            profile_id,
            overrides,
        } => {
            let bundle: OverrideBundle = serde_json::from_value(parse_json(overrides)?)
                .map_err(|e| {
                    GatewayError::Policy(PolicyError::Validation(format!(
                        "invalid override bundle: {}",
                        e
                    )))
                })?;
            print_json(&gw.upsert_policy_profile(&actor, profile_id, bundle)?)
        }
        PolicyCommands::List => print_json(&*gw.list_policy_profiles(&actor)?),
        PolicyCommands::Refresh => {
            let snapshot = gw.refresh_policy_cache(&actor)?;
            print_json(&json!({
                "generation": snapshot.generation,
                "fingerprint": snapshot.fingerprint,
                "profiles": snapshot.profiles.len(),
            }))
        }
    }
}
