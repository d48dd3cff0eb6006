//! Crate-wide error taxonomy.
//!
//! Each subsystem gets its own variant set: one `thiserror` enum per layer
//! with `#[from]` conversions at the boundaries. Nothing in this crate
//! panics on malformed external input;
//! input errors surface as [`IngestError`] and capability failures are
//! absorbed locally (see `capabilities::judge` and `capabilities::ocr`).

use thiserror::Error;

/// Errors surfaced by the event ingestion boundary.
///
/// These represent malformed caller input and never mutate persisted state.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(miette::Diagnostic))]
pub enum IngestError {
    #[error("child_id must not be empty")]
    MissingChildId,

    #[error("event kind must not be empty")]
    MissingKind,

    #[error("data_json is not valid JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("age {0} is out of range [3, 18]")]
    #[cfg_attr(feature = "diagnostics", diagnostic(help("children must be configured with an age between 3 and 18")))]
    AgeOutOfRange(i32),

    #[error("upgrade references unknown event id: {0}")]
    UnknownEvent(String),

    #[error("parent pin required for this operation")]
    MissingPin,

    #[error("parent pin does not match configured pin")]
    WrongPin,

    #[error("unknown action: {0}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(help("expected one of: allow, warn, blur, block, notify")))]
    InvalidAction(String),

    #[error("decision {0} not found")]
    UnknownDecision(String),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Errors from the resumable replicator.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(miette::Diagnostic))]
pub enum ReplicatorError {
    #[error(transparent)]
    Local(#[from] crate::store::StoreError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("postgres error: {0}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(help("check PG_DSN and that the secondary database is reachable")))]
    Postgres(#[from] sqlx::Error),
}

/// Errors from the guardian learning loop.
///
/// These never propagate past [`crate::guardian`]: a failure just leaves
/// overrides unprocessed for the next cycle. The type exists for
/// `tracing::warn!` call sites and for the opportunistic post-override
/// refresh to have something concrete to log.
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from configuration loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment variable {key}: {message}")]
    InvalidEnv { key: &'static str, message: String },

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
