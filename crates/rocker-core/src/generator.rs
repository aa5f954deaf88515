//! Image lifecycle: build the composed script, run it, clean up.
//!
//! ```text
//! Created --build--> Built --run--> Ran --clear_image--> Cleaned
//!    ^                 |  ^          |                      |
//!    |                 |  +---run----+                      |
//!    +-----------------+--------(rebuild)-------------------+
//! ```

use std::fmt;
use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{debug, info};

use crate::compose::{ArgumentSequence, Composition};
use crate::engine::{BuildRequest, ContainerEngine, RunRequest};
use crate::error::{Error, Result};

/// Lifecycle state of an [`ImageGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Created,
    Built,
    Ran,
    Cleaned,
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Built => "built",
            Self::Ran => "ran",
            Self::Cleaned => "cleaned",
        };
        f.write_str(s)
    }
}

/// Options for [`ImageGenerator::build`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Tag applied to the built image.
    pub tag: Option<String>,
    pub nocache: bool,
    pub pull: bool,
}

/// Options for [`ImageGenerator::run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Command run in the container; empty uses the image default.
    pub command: Vec<String>,
    pub tty: bool,
    /// Remove the container when it exits.
    pub remove: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            tty: false,
            remove: true,
            cancel: None,
        }
    }
}

/// Drives one composition through build and run against an engine.
#[derive(Debug)]
pub struct ImageGenerator<E> {
    engine: E,
    composition: Composition,
    state: GeneratorState,
    image_id: Option<String>,
}

impl<E: ContainerEngine> ImageGenerator<E> {
    pub fn new(engine: E, composition: Composition) -> Self {
        Self {
            engine,
            composition,
            state: GeneratorState::Created,
            image_id: None,
        }
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Id of the built image, if any.
    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The build-script text.
    pub fn dockerfile(&self) -> String {
        self.composition.dockerfile()
    }

    /// The composed run-phase arguments.
    pub fn run_args(&self) -> &ArgumentSequence {
        &self.composition.run_args
    }

    /// Build the image and record its id.
    ///
    /// The build context is a fresh temporary directory holding the script
    /// and every auxiliary file. On failure the state is unchanged and the
    /// engine log is carried in the error.
    pub fn build(&mut self, options: &BuildOptions) -> Result<&str> {
        if !matches!(self.state, GeneratorState::Created | GeneratorState::Cleaned) {
            return Err(self.invalid("build"));
        }

        let context = tempfile::Builder::new().prefix("rocker-").tempdir()?;
        let dockerfile = context.path().join("Dockerfile");
        fs::write(&dockerfile, self.dockerfile())?;
        for (path, content) in &self.composition.files {
            let target = context_path(context.path(), path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
        }
        debug!(
            "Wrote build context with {} files to {}",
            self.composition.files.len() + 1,
            context.path().display()
        );

        let image_id = self.engine.build(&BuildRequest {
            context: context.path(),
            dockerfile: &dockerfile,
            build_args: &self.composition.build_args,
            tag: options.tag.as_deref(),
            nocache: options.nocache,
            pull: options.pull,
        })?;

        info!("Image {} built", image_id);
        self.state = GeneratorState::Built;
        Ok(self.image_id.insert(image_id).as_str())
    }

    /// Run the built image and return the container's exit code.
    ///
    /// A non-zero exit code is returned as a value. A cancelled run leaves
    /// the state untouched.
    pub fn run(&mut self, options: &RunOptions) -> Result<i32> {
        let image = match (&self.state, &self.image_id) {
            (GeneratorState::Built | GeneratorState::Ran, Some(id)) => id.clone(),
            _ => return Err(self.invalid("run")),
        };

        let args = self.composition.run_args.tokens();
        let code = self.engine.run(&RunRequest {
            image: &image,
            args: &args,
            command: &options.command,
            tty: options.tty,
            remove: options.remove,
            cancel: options.cancel.as_deref(),
        })?;

        info!("Container exited with code {}", code);
        self.state = GeneratorState::Ran;
        Ok(code)
    }

    /// Remove the built image. Calling it again, or before a build, is a
    /// no-op.
    pub fn clear_image(&mut self) -> Result<()> {
        let Some(image) = self.image_id.as_deref() else {
            debug!("No image to remove");
            return Ok(());
        };
        self.engine.remove_image(image)?;
        self.image_id = None;
        self.state = GeneratorState::Cleaned;
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }
}

/// Resolve a context-relative file path, refusing anything that would land
/// outside the context or replace the script.
fn context_path(root: &Path, relative: &str) -> Result<std::path::PathBuf> {
    let path = Path::new(relative);
    let plain = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || !plain || path == Path::new("Dockerfile") {
        return Err(Error::ContextPath(relative.to_string()));
    }
    Ok(root.join(path))
}
