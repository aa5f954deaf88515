//! The capability contract every extension implements.

use crate::Result;
use crate::cliargs::{CliArgs, ConfigValue, normalize_key};
use std::collections::BTreeMap;

/// Build-time key/value parameters passed to the container engine.
pub type BuildArgs = BTreeMap<String, String>;

/// Auxiliary build-context files (relative path to content).
pub type ContextFiles = BTreeMap<String, String>;

/// Derive the command-line flag for an extension or option name.
///
/// Hyphens and underscores are interchangeable in the input; the flag
/// always uses hyphens.
///
/// ```
/// use rocker_extensions::name_to_argument;
///
/// assert_eq!(name_to_argument("as_df"), "--as-df");
/// assert_eq!(name_to_argument("as-df"), "--as-df");
/// ```
pub fn name_to_argument(name: &str) -> String {
    format!("--{}", name.replace('_', "-"))
}

/// How an option consumes values on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    /// Boolean switch.
    Flag,
    /// A single value.
    Value,
    /// A single value restricted to the given choices.
    Choice(Vec<&'static str>),
    /// Zero or more values in one occurrence.
    Values,
    /// Repeatable option taking one value per occurrence.
    Append,
    /// Repeatable option taking one or more values per occurrence.
    AppendValues,
}

/// Declaration of one configuration key read by an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSpec {
    /// Configuration key (underscore form).
    pub key: String,
    /// Flag spelling, `--` prefixed.
    pub flag: String,
    pub help: String,
    pub kind: ArgKind,
    pub default: Option<ConfigValue>,
}

impl ArgumentSpec {
    pub fn new(key: &str, kind: ArgKind, help: impl Into<String>) -> Self {
        let key = normalize_key(key);
        Self {
            flag: name_to_argument(&key),
            key,
            help: help.into(),
            kind,
            default: None,
        }
    }

    pub fn flag(key: &str, help: impl Into<String>) -> Self {
        Self::new(key, ArgKind::Flag, help)
    }

    pub fn value(key: &str, help: impl Into<String>) -> Self {
        Self::new(key, ArgKind::Value, help)
    }

    /// Use the default recorded in `defaults` for this key, if any.
    pub fn with_default_from(mut self, defaults: &CliArgs) -> Self {
        self.default = defaults.get(&self.key).cloned();
        self
    }
}

/// A named, stateless unit contributing build and run fragments.
///
/// Every query is a pure function of the [`CliArgs`] plus whatever the
/// extension captured when it was constructed. Extensions never see each
/// other.
pub trait Extension: Send + Sync {
    /// Stable identifier, underscore form.
    fn name(&self) -> &'static str;

    /// The command-line flag derived from the name.
    fn flag_name(&self) -> String {
        name_to_argument(self.name())
    }

    /// Configuration keys this extension reads.
    fn register_arguments(&self, defaults: &CliArgs) -> Vec<ArgumentSpec>;

    /// Extensions that must be applied before this one.
    fn required_extensions(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Whether the configuration selects this extension.
    fn is_active(&self, cliargs: &CliArgs) -> bool {
        cliargs.flag(self.name())
    }

    /// Content placed ahead of every snippet.
    fn preamble(&self, _cliargs: &CliArgs) -> Result<String> {
        Ok(String::new())
    }

    /// Main build-body contribution.
    fn snippet(&self, _cliargs: &CliArgs) -> Result<String> {
        Ok(String::new())
    }

    fn build_args(&self, _cliargs: &CliArgs) -> Result<BuildArgs> {
        Ok(BuildArgs::new())
    }

    /// Run-phase fragment, each token group prefixed by a space.
    fn docker_args(&self, _cliargs: &CliArgs) -> Result<String> {
        Ok(String::new())
    }

    fn files(&self, _cliargs: &CliArgs) -> Result<ContextFiles> {
        Ok(ContextFiles::new())
    }
}

impl std::fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name())
            .finish()
    }
}
