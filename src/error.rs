// src/error.rs
//
// Error hierarchy for the fusion core. Configuration problems are caught
// once at startup; collaborator problems are split into the benign kind
// (timeout, downgraded to "no detection") and the fatal kind that must
// reach the caller as a chunk failure.

use std::fmt;
use thiserror::Error;

/// Invalid configuration, detected before any video is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("projection matrix is not invertible (det = {determinant:e})")]
    SingularHomography { determinant: f64 },

    #[error("projection matrix contains non-finite entries")]
    NonFiniteHomography,
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// The external perception components the core talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    ObjectTracker,
    LaneSegmenter,
    AudioClassifier,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectTracker => "object tracker",
            Self::LaneSegmenter => "lane segmenter",
            Self::AudioClassifier => "audio classifier",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// The call did not answer in time. Treated as "no detection this frame".
    #[error("{collaborator} timed out after {timeout_ms}ms")]
    Timeout {
        collaborator: Collaborator,
        timeout_ms: u64,
    },

    /// The collaborator crashed or returned garbage. Never swallowed.
    #[error("{collaborator} failed: {message}")]
    Failed {
        collaborator: Collaborator,
        message: String,
    },
}

impl CollaboratorError {
    pub fn failed(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self::Failed {
            collaborator,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("chunk {chunk_id} failed: {source}")]
    Collaborator {
        chunk_id: u64,
        #[source]
        source: CollaboratorError,
    },

    #[error("chunk {got} arrived out of order (last processed chunk was {last})")]
    OutOfOrder { last: u64, got: u64 },
}
