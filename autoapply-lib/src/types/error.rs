use std::path::PathBuf;

use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::session::SessionStatus;

/// Possible errors when interacting with `autoapply_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The given session ID is not known to the controller or the store
    #[error("session `{0}` not found")]
    SessionNotFound(Uuid),

    /// A lifecycle transition that the session state machine forbids,
    /// e.g. resuming a completed session
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the session is currently in
        from: SessionStatus,
        /// Status the caller asked for
        to: SessionStatus,
    },

    /// The destination URL has no host to rate-limit on
    #[error("URL is missing a host: {0}")]
    MissingHost(Url),

    /// The persistence store reported a failure
    #[error("store operation failed: {0}")]
    Store(String),

    /// The worker pool queue is closed; no further tasks can be submitted
    #[error("worker pool is shut down")]
    PoolClosed,

    /// Any form of I/O error while reading a configuration file
    #[error("failed to read `{path}`: {source}")]
    ConfigRead {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] Box<toml::de::Error>),
}

/// The crate-wide result type
pub type Result<T> = std::result::Result<T, ErrorKind>;
