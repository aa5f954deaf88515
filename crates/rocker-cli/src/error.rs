//! Why a rocker invocation stopped, and the exit status it maps to.

use rocker_core::Error as CoreError;

pub type Result<T> = std::result::Result<T, CliError>;

/// Exit status for an invocation rejected before the engine was called,
/// matching clap's status for usage errors.
pub const EXIT_INVALID: i32 = 2;

/// Exit status when building or running the image failed.
pub const EXIT_FAILED: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("no base image given; pass one or set `image` in .rocker.toml")]
    MissingImage,

    /// Configuration, selection or composition was rejected.
    #[error(transparent)]
    Invalid(CoreError),

    /// The engine failed to build, run or remove the image.
    #[error(transparent)]
    Engine(CoreError),

    #[error("failed to write the effective configuration: {0}")]
    PrintConfig(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        if err.is_pre_engine() {
            Self::Invalid(err)
        } else {
            Self::Engine(err)
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingImage | Self::Invalid(_) => EXIT_INVALID,
            Self::Engine(_) | Self::PrintConfig(_) | Self::Io(_) => EXIT_FAILED,
        }
    }

    /// A follow-up suggestion printed under the error.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingImage => Some("run `rocker --help` for usage"),
            Self::Invalid(CoreError::Resolution(err)) if err.is_resolution() => {
                Some("run `rocker --list-extensions` to see the available extensions")
            }
            _ => None,
        }
    }
}
