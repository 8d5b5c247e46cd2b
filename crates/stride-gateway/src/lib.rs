//! # stride-gateway
//!
//! The operation boundary for Stride.
//!
//! Loads [`StrideConfig`], resolves callers to principals through an
//! [`Authorizer`], and exposes every draft, proposal, batch, policy and
//! audit operation on [`Gateway`] with authorization in front of the
//! lifecycle engine.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;

pub use auth::{AuthError, Authorizer, StaticRoster};
pub use config::{CostConfig, StrideConfig};
pub use error::GatewayError;
pub use gateway::Gateway;
