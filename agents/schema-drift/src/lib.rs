//! Schema Drift Agent
//!
//! Detects, classifies and triages structural changes in the schemas of
//! data-pipeline inputs and outputs.
//!
//! # Components
//! - `lineage`: append-only snapshot history per component
//! - `engine`: deterministic diff + ruleset-driven classification
//! - `orchestrator`: policy-driven decision state machine
//!
//! # Design Principles
//! - Immutable: a snapshot never changes shape once visible
//! - Deterministic: identical snapshot pairs yield byte-identical reports
//! - Fail-safe: uncertainty escalates toward `manual_review`, never `continue`

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod lineage;
pub mod orchestrator;
pub mod ports;
pub mod telemetry;

// Re-export contracts
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use contracts::*;
pub use error::{DriftError, Result};
