/// Shared error type used across all ytstenut overlay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("invalid channel state: {0}")]
    InvalidState(String),

    #[error("{0} is not online")]
    ContactOffline(String),

    #[error("not connected")]
    NotConnected,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("XML at byte {offset}: {message}")]
    Xml { offset: usize, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an [`Error::Xml`] at a known byte offset.
    pub fn xml(offset: usize, message: impl Into<String>) -> Self {
        Error::Xml {
            offset,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
