//! Engine error types.
//!
//! The engine distinguishes a small set of error kinds because callers react
//! to them differently: [`Error::EndOfArray`] terminates iteration and is
//! expected in normal operation, transport failures surface to the caller
//! without caching or retry, and configuration failures are fatal at
//! startup. Application errors from processor functions are carried opaquely
//! as [`anyhow::Error`] payloads, mirroring how operations report failures
//! in the rest of the stack.
//!
//! Failed results are never cached, so a subsequent call on the same key
//! reattempts the computation or remote fetch.
use thiserror::Error;

/// Errors produced by the engine and by processor functions.
#[derive(Error, Debug)]
pub enum Error {
    /// The source backing this processor has no element at the requested
    /// key. This is the canonical termination signal: it propagates
    /// unchanged through dependent processors and closes
    /// [`map_all`](crate::runtime::Handle::map_all) streams.
    #[error("reached the end of the array")]
    EndOfArray,

    /// A dial, read, or write to a peer failed, or a call exceeded the
    /// configured deadline. Nothing is cached; the caller may retry.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// A remote node failed to produce the requested slice.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// An error returned by an application processor function.
    #[error(transparent)]
    Application(#[from] anyhow::Error),

    /// Invalid configuration or a startup failure (for example a peer that
    /// stayed unreachable past the retry limit). Fatal: callers should
    /// terminate the process.
    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an application error.
    pub fn app<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Application(err.into())
    }

    /// True if this error is the end-of-array condition.
    pub fn is_end_of_array(&self) -> bool {
        matches!(self, Self::EndOfArray)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
