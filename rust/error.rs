//! Error type shared by every fallible operation in the crate.

use std::ffi::NulError;
use std::path::PathBuf;

use thiserror::Error;

use crate::kind::Kind;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the binding or reported by the native engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Message taken from the engine's last-error channel after a native call.
    #[error("native engine error: {0}")]
    Native(String),

    /// The engine failed to free a handle. Host-side bookkeeping was still cleaned up.
    #[error("failed to release tensor {name:?}: {source}")]
    Release {
        /// Name of the wrapper being released.
        name: String,
        /// Underlying engine error.
        #[source]
        source: Box<Error>,
    },

    /// The handle is already owned by another live wrapper.
    #[error("native handle is already owned by {owner:?}")]
    AliasedHandle {
        /// Name of the wrapper that owns the handle.
        owner: String,
    },

    /// The wrapper no longer holds a native handle.
    #[error("tensor {0:?} has already been released")]
    Released(String),

    /// The engine returned a null handle without reporting an error.
    #[error("native engine returned a null handle")]
    NullHandle,

    /// Destination buffer is smaller than the number of elements requested.
    #[error("destination holds {len} elements but {numel} were requested")]
    BufferTooSmall {
        /// Destination length in elements.
        len: usize,
        /// Requested element count.
        numel: usize,
    },

    /// Host element type does not match the tensor's kind.
    #[error("kind mismatch: tensor is {expected:?}, destination is {got:?}")]
    KindMismatch {
        /// Kind of the tensor.
        expected: Kind,
        /// Kind of the host buffer.
        got: Kind,
    },

    /// Raw byte length does not match shape and element size.
    #[error("{len} bytes of data do not match the {expected} bytes required by the shape")]
    DataSizeMismatch {
        /// Bytes supplied.
        len: usize,
        /// Bytes required.
        expected: usize,
    },

    /// Element count does not match the product of the shape.
    #[error("{len} elements of data do not match the {expected} elements required by the shape")]
    ElementCountMismatch {
        /// Elements supplied.
        len: usize,
        /// Elements required.
        expected: usize,
    },

    /// The tensor does not have the rank an accessor expects.
    #[error("expected {expected} dims, got {got}")]
    DimMismatch {
        /// Expected rank.
        expected: usize,
        /// Actual rank.
        got: usize,
    },

    /// The engine reported a rank outside the supported range.
    #[error("invalid number of dims: {0}")]
    InvalidDim(usize),

    /// A shape holds a negative dimension.
    #[error("invalid dimension {0}")]
    InvalidDimension(i64),

    /// The element or byte count of a shape does not fit in memory.
    #[error("shape {0:?} is too large")]
    ShapeOverflow(Vec<i64>),

    /// An index does not fit the engine's index type.
    #[error("index {0} is out of range")]
    IndexOutOfRange(i64),

    /// The engine reported a scalar type code this crate does not know.
    #[error("unknown scalar type code {0}")]
    UnknownKind(i32),

    /// A string passed to the engine contains an interior nul byte.
    #[error(transparent)]
    Nul(#[from] NulError),

    /// A path could not be converted for the engine.
    #[error("path {0:?} is not valid UTF-8")]
    InvalidPath(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_error_keeps_source() {
        let err = Error::Release {
            name: "w".to_string(),
            source: Box::new(Error::Native("boom".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "failed to release tensor \"w\": native engine error: boom"
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("native engine error: boom"));
    }

    #[test]
    fn validation_error_display() {
        let err = Error::BufferTooSmall { len: 2, numel: 4 };
        assert_eq!(
            format!("{}", err),
            "destination holds 2 elements but 4 were requested"
        );

        let err = Error::DimMismatch {
            expected: 2,
            got: 3,
        };
        assert_eq!(format!("{}", err), "expected 2 dims, got 3");

        let err = Error::ShapeOverflow(vec![1 << 62, 4]);
        assert_eq!(format!("{}", err), "shape [4611686018427387904, 4] is too large");
    }
}
