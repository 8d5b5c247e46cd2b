// mod.rs - Shared plumbing for stride subcommands.

pub mod audit;
pub mod batch;
pub mod draft;
pub mod policy;
pub mod proposal;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use serde_json::Value;
use stride_audit::Principal;
use stride_gateway::{Gateway, GatewayError, StaticRoster, StrideConfig};

/// An opened project plus the caller named on the command line.
pub struct Context {
    pub gateway: Gateway,
    actor: Option<String>,
}

impl Context {
    pub fn open(project_root: &Path, actor: Option<String>) -> anyhow::Result<Self> {
        let config = StrideConfig::load_for_project(project_root)?;
        let roster = StaticRoster::from_config(&config);
        tracing::debug!(
            project_root = %project_root.display(),
            database = %config.database.display(),
            "opening project"
        );
        let gateway = Gateway::open(config, Arc::new(roster))?;
        Ok(Self { gateway, actor })
    }

    /// Authenticate the `--actor` / `STRIDE_ACTOR` caller.
    pub fn principal(&self) -> Result<Principal, GatewayError> {
        match &self.actor {
            Some(id) => self.gateway.authenticate(id),
            None => Err(GatewayError::Unauthorized(
                "no actor given; pass --actor or set STRIDE_ACTOR".to_string(),
            )),
        }
    }
}

/// Parse a JSON argument. `@path` reads the JSON from a file.
pub fn parse_json(arg: &str) -> anyhow::Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read JSON from {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| {
        GatewayError::Proposal(stride_proposal::ProposalError::Validation(format!(
            "invalid JSON argument: {}",
            e
        )))
        .into()
    })
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
