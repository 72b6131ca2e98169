//! Swarm API models
//!
//! Serde models for the subset of the orchestrator's service, network and
//! container API the deployer talks to. Unknown fields of service specs are
//! kept in `extra` maps so an inspected spec can be re-submitted without loss.

pub mod models;

pub use models::*;
