//! Execution span types for schema drift orchestration runs.
//!
//! Every drift detection request produces one trace: a run-level span with
//! one child span per state-machine stage that was entered.
//!
//! # Span Hierarchy
//!
//! ```text
//! Run (one per request id)
//!   ├─ identified
//!   ├─ crawled
//!   ├─ persisted
//!   ├─ detected
//!   ├─ healed | skipped_healing
//!   ├─ notified | skipped_notification
//!   └─ decided
//! ```
//!
//! # Usage
//!
//! 1. Create a `RunTraceBuilder` when the run starts.
//! 2. Open a stage span with `start_stage`, close it with `complete`,
//!    `skip` or `fail`, and hand it back with `record`.
//! 3. Call `finalize` once the terminal decision is known.

pub mod span;
pub mod tree;

pub use span::{SpanKind, SpanStatus, TraceSpan};
pub use tree::RunTraceBuilder;
