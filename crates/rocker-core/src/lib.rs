//! Composition and orchestration layer for rocker
//!
//! This crate turns an ordered set of extensions into a build script and
//! argument sequences, and drives the container engine through the image
//! lifecycle:
//!
//! - **Composition**: [`compose`] merges preambles, snippets, build args,
//!   run args and context files
//! - **Engine**: [`ContainerEngine`] abstracts build/run/remove; [`DockerCli`]
//!   implements it with the `docker` client
//! - **Orchestration**: [`ImageGenerator`] enforces
//!   `Created -> Built -> Ran -> Cleaned`
//! - **Defaults**: [`ConfigResolver`] merges TOML defaults files
//!
//! # Architecture
//!
//! ```text
//!            rocker-cli
//!                |
//!           rocker-core
//!                |
//!         rocker-extensions
//! ```

pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;

pub use compose::{ArgumentGroup, ArgumentSequence, Block, BuildScript, Composition, compose};
pub use config::{ConfigResolver, PROJECT_CONFIG_FILE, RockerConfig};
pub use engine::{BuildRequest, ContainerEngine, DockerCli, RunRequest};
pub use error::{Error, Result};
pub use generator::{BuildOptions, GeneratorState, ImageGenerator, RunOptions};

use rocker_extensions::{CliArgs, ExtensionRegistry, activate_requirements};

/// Resolve the extensions `cliargs` selects and compose them.
///
/// Requirements of selected extensions are activated in a copy of
/// `cliargs` before composing; the copy is returned with the composition.
pub fn compose_active(
    registry: &ExtensionRegistry,
    base_image: &str,
    cliargs: &CliArgs,
) -> Result<(Composition, CliArgs)> {
    let requested = registry.active_names(cliargs);
    let resolved = registry.resolve(&requested)?;
    let mut effective = cliargs.clone();
    activate_requirements(&resolved, &mut effective);
    let composition = compose(base_image, &resolved, &effective)?;
    Ok((composition, effective))
}
