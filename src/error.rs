use std::io;

use thiserror::Error;

/// Errors raised while building features, training or (de)serializing models
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed template file, training file or model file
    #[error("format error: {0}")]
    Format(String),
    /// A feature template that cannot be applied
    #[error("invalid template: {0}")]
    Template(String),
    /// Invalid training parameter
    #[error("{0}")]
    Config(String),
    /// The quasi-Newton optimizer could not proceed
    #[error("optimizer failure: {0}")]
    Optimizer(String),
    /// Binary model written by an incompatible major version
    #[error("model version is different: {found} vs {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format<S: Into<String>>(msg: S) -> Self {
        Error::Format(msg.into())
    }

    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
