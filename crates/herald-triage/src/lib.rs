//! Triage engine for Herald.
//!
//! Normalizes inbound items, selects the actionable ones with per-author
//! deduplication and auto-blocking, and performs actions with act-then-mark
//! sequencing through pluggable executors.

pub mod error;
pub mod executor;
pub mod ingest;
pub mod orchestrator;
pub mod selection;
pub mod source;
pub mod state_machine;
pub mod types;

pub use error::{ExecutorError, SourceError, TriageError};
pub use executor::{ActionExecutor, DryRunExecutor, MockBehavior, MockExecutor};
pub use ingest::{extract_mentions, Normalizer};
pub use orchestrator::StateTransitionManager;
pub use selection::TriageEngine;
pub use source::{ContentSource, FeedFileSource, MemorySource};
pub use types::{
    ActionKind, ActionOutcome, ActionPayload, ExecutionReceipt, ExecutionRequest, IngestFailure,
    IngestReport, PublishOutcome, SelectionQuery,
};
