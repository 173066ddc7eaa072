use thiserror::Error;

use crate::mutation::MutationKind;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable identifiers the presentation layer matches on (and uses as
// translation keys). Messages may be reworded; codes never change.

pub mod error_code {
    pub const LOAD_FAILED: &str = "LOAD_FAILED";
    pub const MUTATION_FAILED: &str = "MUTATION_FAILED";
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
    pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
    pub const VIEWER_CLOSED: &str = "VIEWER_CLOSED";
}

/// Errors surfaced by the viewer to the presentation layer.
///
/// Remote failures never leave the controller as raw [`StoreError`]s;
/// they are folded into `Load` or `Mutation` first.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewerError {
    /// Timeline fetch failed. Retryable via `retry_load`.
    #[error("could not load statuses: {0}")]
    Load(String),

    /// Reaction, comment or view call failed; local state was reverted.
    #[error("{kind} failed: {message}")]
    Mutation { kind: MutationKind, message: String },

    /// Rejected before any remote call; nothing changed.
    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid viewer config: {0}")]
    Config(String),

    /// The viewer loop is gone.
    #[error("status viewer is closed")]
    Closed,
}

impl ViewerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ViewerError::Load(_) => error_code::LOAD_FAILED,
            ViewerError::Mutation { .. } => error_code::MUTATION_FAILED,
            ViewerError::InvalidInput(_) => error_code::INVALID_INPUT,
            ViewerError::Config(_) => error_code::INVALID_CONFIG,
            ViewerError::Closed => error_code::VIEWER_CLOSED,
        }
    }
}

/// Failures reported by a [`StatusStore`](crate::store::StatusStore).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}
