use thiserror::Error;

use crate::target::ObjectId;

/// Build-time failures. Per-frame sensor and collision ticks never fail; a
/// malformed world is rejected here, before the first frame runs.
#[derive(Error, Debug)]
pub enum WorldError {
    #[error("Invalid target {id}: {reason}")]
    InvalidTarget { id: ObjectId, reason: String },

    #[error("Duplicate target id {0}")]
    DuplicateId(ObjectId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed JSON input: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorldError {
    pub(crate) fn invalid_target(id: ObjectId, reason: impl Into<String>) -> Self {
        WorldError::InvalidTarget {
            id,
            reason: reason.into(),
        }
    }
}
