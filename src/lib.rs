#![allow(missing_docs)]

pub mod aggregate;
pub mod app_config;
pub mod artifacts;
pub mod cli;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod gate;
pub mod model;
pub mod priority;
pub mod profiling;
pub mod registry;

pub use aggregate::{resolve, resolve_with_report, Resolution, ResolutionIssue};
pub use engine::{AggregationEngine, ServersChanged};
pub use fingerprint::{fingerprint, FingerprintKey};
pub use gate::{BlockReason, GateDecision, LaunchCoordinator, LifecycleGate};
pub use model::{AggregatedEntry, Collection, EntryKey, ServerDefinition};
pub use priority::priority;
pub use registry::CollectionRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ConcordiaError {
    #[error("Malformed server definition '{server_id}': {reason}")]
    MalformedDefinition { server_id: String, reason: String },

    #[error(
        "Collections '{first}' and '{second}' both rank {rank} for server '{server_id}'; \
         falling back to collection id order"
    )]
    AmbiguousPriority { server_id: String, rank: u32, first: String, second: String },

    #[error("Collection '{collection_id}' lists server '{server_id}' more than once with different configurations")]
    DuplicateDefinition { collection_id: String, server_id: String },

    #[error("Collection '{0}' is already registered")]
    DuplicateCollection(String),

    #[error("Collection '{0}' is not registered")]
    UnknownCollection(String),

    #[error("Launcher failed for '{key}': {message}")]
    LauncherFailure { key: String, message: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
