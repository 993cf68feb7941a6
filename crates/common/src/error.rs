//! Error types shared by the DOM probe implementations

use thiserror::Error;

/// Failure to read rendered state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Page detached: {0}")]
    Detached(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Driver error: {0}")]
    Driver(String),
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
