use super::source::Source;
use thiserror::Error;

/// Ordered steps of a source selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectStep {
    StopStreams,
    StartStream,
    Persist,
    Retarget,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Rejected before any side effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to stop {service}: {cause}")]
    StopFailed { service: String, cause: String },

    #[error("failed to start {stream} stream: {cause}")]
    StartFailed { stream: Source, cause: String },

    /// The running state is kept; only the next boot may lose the change.
    #[error("failed to persist setting: {cause}")]
    PersistFailed { cause: String },

    #[error("failed to restart {service}: {cause}")]
    RestartFailed { service: String, cause: String },
}

impl ControllerError {
    /// The selection step this error aborted, if it came from one.
    pub fn step(&self) -> Option<SelectStep> {
        match self {
            ControllerError::StopFailed { .. } => Some(SelectStep::StopStreams),
            ControllerError::StartFailed { .. } => Some(SelectStep::StartStream),
            ControllerError::PersistFailed { .. } => Some(SelectStep::Persist),
            ControllerError::InvalidArgument(_) | ControllerError::RestartFailed { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::InvalidArgument(_) => "invalid_argument",
            ControllerError::StopFailed { .. } => "stop_failed",
            ControllerError::StartFailed { .. } => "start_failed",
            ControllerError::PersistFailed { .. } => "persist_failed",
            ControllerError::RestartFailed { .. } => "restart_failed",
        }
    }
}
