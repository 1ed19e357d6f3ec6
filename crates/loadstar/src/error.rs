//! Error types raised while resolving modules.
//!
//! A single failed load is observed by every caller waiting on it, so
//! [`LoaderError`] is cheap to clone: underlying causes are kept behind an
//! [`Arc`].

use std::sync::Arc;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors produced by the loader engine
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// The platform fetched the module but it produced no exported value
    #[error("No exports found in module with id: {id}")]
    MissingExports {
        /// Module id
        id: String,
    },

    /// The resolution context was popped out of order.
    ///
    /// This is an internal consistency failure: two loads interleaved their
    /// context frames. It is never expected during serialized preloads.
    #[error("Invalid context detected: '{}', expecting: {}", .found.as_deref().unwrap_or("<empty>"), .expected)]
    ContextCorruption {
        /// Module the load expected on top of the stack
        expected: String,
        /// Module actually found on top of the stack
        found: Option<String>,
    },

    /// The platform failed to fetch the module
    #[error("Failed to fetch module '{id}' from '{path}': {cause}")]
    Fetch {
        /// Module id
        id: String,
        /// Resolved location handed to the platform
        path: String,
        /// Underlying platform error
        cause: Arc<anyhow::Error>,
    },

    /// The module's init hook, or one of its declared dependencies, failed
    #[error("Failed to initialize module '{id}': {cause}")]
    Init {
        /// Module id
        id: String,
        /// Underlying hook error
        cause: Arc<anyhow::Error>,
    },
}

impl LoaderError {
    /// Id of the module this error belongs to
    pub fn id(&self) -> &str {
        match self {
            Self::MissingExports { id } | Self::Fetch { id, .. } | Self::Init { id, .. } => id,
            Self::ContextCorruption { expected, .. } => expected,
        }
    }

    pub(crate) fn fetch(id: &str, path: &str, cause: anyhow::Error) -> Self {
        Self::Fetch {
            id: id.to_owned(),
            path: path.to_owned(),
            cause: Arc::new(cause),
        }
    }

    pub(crate) fn init(id: &str, cause: anyhow::Error) -> Self {
        Self::Init {
            id: id.to_owned(),
            cause: Arc::new(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let missing = LoaderError::MissingExports {
            id: "modules/invalid".to_owned(),
        };
        assert_eq!(
            missing.to_string(),
            "No exports found in module with id: modules/invalid"
        );

        let corrupted = LoaderError::ContextCorruption {
            expected: "a".to_owned(),
            found: Some("b".to_owned()),
        };
        assert_eq!(corrupted.to_string(), "Invalid context detected: 'b', expecting: a");

        let empty = LoaderError::ContextCorruption {
            expected: "a".to_owned(),
            found: None,
        };
        assert!(empty.to_string().contains("<empty>"));
    }

    #[test]
    fn test_clones_share_cause() {
        let error = LoaderError::fetch("x", "x.js", anyhow::anyhow!("boom"));
        let clone = error.clone();
        match (&error, &clone) {
            (LoaderError::Fetch { cause: a, .. }, LoaderError::Fetch { cause: b, .. }) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("Expected fetch errors"),
        }
        assert_eq!(clone.id(), "x");
    }
}
