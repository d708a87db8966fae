/*!
    Error type shared by every crate in the ecosystem.
*/

use thiserror::Error;

/**
    Errors produced by sources, decoders, and filter graphs.
*/
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("filter error: {0}")]
    Filter(String),
}

impl Error {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat(message.into())
    }

    pub fn filter(message: impl Into<String>) -> Self {
        Self::Filter(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
