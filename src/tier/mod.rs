//! Progressive-LOD tier orchestration

pub mod orchestrator;

pub use orchestrator::{TierOrchestrator, TierState};
