//! Pipeline error taxonomy.
//!
//! Every fallible operation in the crate returns `anyhow::Result`. Errors that
//! the loop controller has to tell apart are raised as `PipelineError` and
//! recovered with `downcast_ref`.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// Camera or file could not be opened.
    SourceUnavailable { source: String, reason: String },
    /// Normal termination of a finite source.
    EndOfStream,
    /// The model produced output that could not be decoded for one frame.
    Inference(String),
    /// Operation invoked in a state that forbids it.
    InvalidState(String),
}

impl PipelineError {
    pub fn source_unavailable(source: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source: source.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::EndOfStream => "END_OF_STREAM",
            Self::Inference(_) => "INFERENCE_ERROR",
            Self::InvalidState(_) => "INVALID_STATE",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnavailable { source, reason } => {
                write!(f, "{}: {} ({})", self.code(), source, reason)
            }
            Self::EndOfStream => write!(f, "{}: source exhausted", self.code()),
            Self::Inference(message) | Self::InvalidState(message) => {
                write!(f, "{}: {}", self.code(), message)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Classify an error chain, looking through any context layers.
pub fn pipeline_error(err: &anyhow::Error) -> Option<&PipelineError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
}

pub fn is_end_of_stream(err: &anyhow::Error) -> bool {
    matches!(pipeline_error(err), Some(PipelineError::EndOfStream))
}
