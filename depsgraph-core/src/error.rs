//! Error Types
//!
//! Failures that abort a build or reject a request at the public boundary.
//!
//! Key-resolution misses inside a build are deliberately absent here: they are
//! reported as diagnostics in the [`BuildReport`](crate::builder::BuildReport)
//! and the graph is marked possibly incomplete instead.

use crate::host::{IdHandle, IdKind};

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, DepsgraphError>;

#[derive(thiserror::Error, Debug)]
pub enum DepsgraphError {
    /// The handle does not name any data-block of the main database.
    #[error("unknown data-block {0}")]
    UnknownDataBlock(IdHandle),

    /// The handle names a data-block of another kind.
    #[error("data-block {handle} is a {found:?}, expected {expected:?}")]
    UnexpectedDataBlock {
        handle: IdHandle,
        expected: IdKind,
        found: IdKind,
    },

    /// The scene the graph was created for is gone.
    #[error("scene {0} is not in the main database")]
    UnknownScene(IdHandle),

    /// The view layer the graph was created for is gone.
    #[error("view layer {0:?} does not exist in the scene")]
    UnknownViewLayer(String),

    /// A node or relation arena ran out of index space.
    #[error("{0} arena exhausted")]
    CapacityExceeded(&'static str),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl DepsgraphError {
    pub fn unknown_data_block(handle: IdHandle) -> Self {
        Self::UnknownDataBlock(handle)
    }

    pub fn unexpected_data_block(handle: IdHandle, expected: IdKind, found: IdKind) -> Self {
        Self::UnexpectedDataBlock {
            handle,
            expected,
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_data_block() {
        let err = DepsgraphError::unknown_data_block(IdHandle::from_raw(7));
        assert!(err.to_string().contains("#7"));

        let err = DepsgraphError::unexpected_data_block(
            IdHandle::from_raw(3),
            IdKind::Object,
            IdKind::Mesh,
        );
        let message = err.to_string();
        assert!(message.contains("Mesh"));
        assert!(message.contains("Object"));
    }

    #[test]
    fn config_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DepsgraphError = parse.into();
        assert!(err.to_string().starts_with("configuration error:"));
    }
}
