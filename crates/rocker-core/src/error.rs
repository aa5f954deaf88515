//! Error types for rocker-core

use std::path::PathBuf;

/// Result type for rocker-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while composing, building or running an image
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An extension failed while its contributions were collected
    #[error("extension '{extension}' failed: {source}")]
    Composition {
        extension: String,
        #[source]
        source: rocker_extensions::Error,
    },

    /// Two extensions provide the same build-context file
    #[error("extensions '{first}' and '{second}' both provide build context file '{path}'")]
    FileCollision {
        path: String,
        first: String,
        second: String,
    },

    /// A build-context file path escapes the context directory
    #[error("invalid build context path '{0}'")]
    ContextPath(String),

    /// Resolving the requested extension set failed
    #[error(transparent)]
    Resolution(#[from] rocker_extensions::Error),

    /// The engine build returned non-zero
    #[error("image build failed{}:\n{log}", .status.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    Build { status: Option<i32>, log: String },

    /// The engine run could not be started or waited on
    #[error("failed to run container: {0}")]
    Run(String),

    /// The run was cancelled before the container exited
    #[error("container run was cancelled")]
    Cancelled,

    /// An operation was attempted from the wrong lifecycle state
    #[error("cannot {operation} while the image generator is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The engine refused to remove an image
    #[error("failed to remove image {image}: {reason}")]
    ImageRemoval { image: String, reason: String },

    /// A defaults file could not be read or parsed
    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was raised before any engine call.
    pub fn is_pre_engine(&self) -> bool {
        matches!(
            self,
            Self::Composition { .. }
                | Self::FileCollision { .. }
                | Self::ContextPath(_)
                | Self::Resolution(_)
                | Self::Config { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = Error::Build {
            status: Some(2),
            log: "step 3 failed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "image build failed with exit code 2:\nstep 3 failed"
        );
        assert!(!err.is_pre_engine());
    }

    #[test]
    fn test_composition_names_extension() {
        let err = Error::Composition {
            extension: "cpu_limits".to_string(),
            source: rocker_extensions::Error::UnknownExtension("x".to_string()),
        };
        assert!(err.to_string().starts_with("extension 'cpu_limits' failed"));
        assert!(err.is_pre_engine());
    }
}
