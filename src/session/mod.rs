//! Per-session actor: lifecycle, recovery, and the brokerage client it owns.
//!
//! One [`SessionActor`] exists per established session. It runs a strict
//! initialization sequence, a tiered recovery state machine for reconnects,
//! and gates its full capability set behind an explicit readiness signal so
//! a racing connection layer never observes half-built state.

mod actor;
mod capabilities;
mod client;
mod config;
mod manager;

pub use actor::{ActorState, DEFAULT_READY_TIMEOUT, SessionActor};
pub use capabilities::{Capability, CapabilityRegistry};
pub use client::ApiClient;
pub use config::{ConfigResolver, EnvConfigResolver, SessionConfig};
pub use manager::{CredentialAccessors, TokenManager, TokenManagerFactory};
