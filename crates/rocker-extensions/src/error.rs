use crate::template::RenderError;

/// Errors that can occur in the extension system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An extension could not be constructed during discovery.
    #[error("failed to register extension '{name}': {reason}")]
    Registration { name: String, reason: String },

    /// A requested extension name is not in the registry.
    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    /// An extension requires a name that is not in the registry.
    #[error("extension '{required_by}' requires unknown extension '{name}'")]
    MissingDependency { name: String, required_by: String },

    /// The required-extension graph contains a cycle.
    #[error("dependency cycle between extensions: {}", .participants.join(", "))]
    DependencyCycle { participants: Vec<String> },

    /// A blacklisted extension is required by an active one.
    #[error("extension '{name}' is blacklisted but required by '{required_by}'")]
    Blacklisted { name: String, required_by: String },

    /// Template rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A configuration value was present but unusable.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// The invoking user's identity could not be determined.
    #[error("failed to determine host identity: {0}")]
    Identity(String),

    /// I/O error while inspecting the host.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from resolving the requested extension set.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::UnknownExtension(_)
                | Self::MissingDependency { .. }
                | Self::DependencyCycle { .. }
                | Self::Blacklisted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
