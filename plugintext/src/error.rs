//! The error type shared by every component of the codec.
//!
//! Every fatal condition in the decoder, the type registry, and both text
//! traversals funnels through [`PluginError`]. Conditions that the error
//! handling design calls "unknown but tolerable" (an unrecognised record
//! type, an unrecognised field tag, an out-of-range enum value) are not
//! errors at all - they are handled locally by falling back to an opaque
//! representation, so they never reach this type.

use std::io;

use thiserror::Error;

/// Upper bound on the size of a single field payload or byte array.
///
/// A field's on-disk length prefix is 16 bits, but the `XXXX` extension
/// mechanism allows a 32-bit length, so the real ceiling is `u32::MAX`.
pub const MAX_DATA: usize = u32::MAX as usize;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{description}")]
    DecodeFailed {
        description: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    #[error("{description} (max {max_size}, actual {actual_size})")]
    LimitExceeded {
        description: String,
        max_size: usize,
        actual_size: usize,
    },
    #[error("requirement failed: {0}")]
    RequirementFailed(String),
    #[error("{0}")]
    ParseFailed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Builds a [`PluginError::DecodeFailed`] with no underlying cause.
pub fn decode_failed<S: Into<String>>(description: S) -> PluginError {
    PluginError::DecodeFailed {
        description: description.into(),
        cause: None,
    }
}

/// Builds a [`PluginError::DecodeFailed`] wrapping an underlying cause.
pub fn decode_failed_because<S, E>(description: S, cause: E) -> PluginError
where
    S: Into<String>,
    E: std::error::Error + Send + Sync + 'static,
{
    PluginError::DecodeFailed {
        description: description.into(),
        cause: Some(Box::new(cause)),
    }
}

/// Fails if `data` is longer than `max_size`.
pub fn check_size<T, S: Into<String>>(
    data: &[T],
    max_size: usize,
    description: S,
) -> Result<(), PluginError> {
    let actual_size = data.len();
    if actual_size > max_size {
        Err(PluginError::LimitExceeded {
            description: description.into(),
            max_size,
            actual_size,
        })
    } else {
        Ok(())
    }
}
