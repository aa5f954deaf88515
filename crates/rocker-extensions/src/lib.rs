//! Extension system for rocker.
//!
//! This crate defines the [`Extension`] contract, the [`CliArgs`]
//! configuration map every extension reads, the registry that resolves a
//! requested set of extensions into application order, the snippet
//! template renderer, and all built-in extensions including the
//! identity-remapping [`UserExtension`].

pub mod builtins;
pub mod cliargs;
pub mod dependency;
pub mod error;
pub mod extension;
pub mod registry;
pub mod template;
pub mod user;

pub use cliargs::{CliArgs, ConfigValue, normalize_key};
pub use dependency::DependencyGraph;
pub use error::{Error, Result};
pub use extension::{ArgKind, ArgumentSpec, BuildArgs, ContextFiles, Extension, name_to_argument};
pub use registry::{
    DisabledRequirement, ExtensionEntry, ExtensionRegistry, activate_requirements,
};
pub use template::{RenderError, Renderer};
pub use user::{CollisionOutcome, HostIdentity, IdentityRecord, UserExtension};
