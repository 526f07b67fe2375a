//! Error type shared by every backend and the file monitor.

/// Failure kinds surfaced by the file contract
///
/// Operations that are merely "not applicable" on a backend (changing a date,
/// querying free space, ...) do not use this type: they return a sentinel
/// (`false`, `-1`) instead.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// Generic operational failure. The native cause is not carried.
    #[error("I/O failure: {0}")]
    Io(String),
    /// Operation with no meaningful sentinel on this backend
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    /// No backend could produce an adapter for the address
    #[error("no backend can resolve {0}")]
    NotFound(String),
    #[error("invalid file address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    /// Read or write error on an already opened stream
    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),
    #[error("file monitoring requires a running Tokio runtime")]
    NoRuntime,
}

impl VfsError {
    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that mean "this backend cannot do that"
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;
