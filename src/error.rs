use thiserror::Error;

/// Errors surfaced by configuration and setup calls.
///
/// Logging itself never fails from the caller's point of view; these only come back from
/// builders and initialization.
#[derive(Debug, Error)]
pub enum Error {
    #[error("a global logger is already installed: {0}")]
    SetLogger(#[from] log::SetLoggerError),

    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid header name: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, Error>;
