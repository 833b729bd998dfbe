//! Error taxonomy for the fleet core.
//!
//! These cover state conflicts and not-found conditions. Out-of-range
//! parameters are clamped silently and never surface here; unsupported
//! request types travel inside the response envelope.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    #[error("clone not found: {0}")]
    CloneNotFound(String),

    #[error("no active clone available")]
    NoActiveClone,

    #[error("clone {0} is already training")]
    AlreadyTraining(String),

    #[error("no in-progress training session {session_id} on clone {clone_id}")]
    SessionNotFound {
        clone_id: String,
        session_id: String,
    },

    #[error("solution not found: {0}")]
    SolutionNotFound(String),
}
