use std::collections::TryReserveError;

/// Errors reported by every fallible [`Context`](crate::Context) and [`Ring`](crate::Ring) operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An allocation failed, or the ring would not fit its `u32` point counter.
    #[error("out of memory")]
    OutOfMemory,

    /// Reading or writing a snapshot file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A name, weight, count, key or snapshot blob was rejected.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The targets were mutated while the context is frozen.
    #[error("targets are frozen")]
    AlreadyFrozen,

    /// The named target does not exist, or the ring holds no target at all.
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl From<indexmap::TryReserveError> for Error {
    fn from(_: indexmap::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl Error {
    /// Integer status of the error, as used by foreign-function adapters.
    ///
    /// Success is `0`; every error maps to a fixed negative code.
    pub fn status(&self) -> i32 {
        match self {
            Error::OutOfMemory => -1,
            Error::Io(_) => -2,
            Error::InvalidParameter(_) => -10,
            Error::AlreadyFrozen => -11,
            Error::NotFound(_) => -13,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
