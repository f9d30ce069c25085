use thiserror::Error;

/// Failures of the length optimizer. Both are fatal to a selection attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("not enough candidates: {available} available, {required} required")]
    InsufficientCandidates { available: usize, required: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
