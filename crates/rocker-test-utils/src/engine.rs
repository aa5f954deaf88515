//! An in-memory container engine that records every call.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;

use rocker_core::{BuildRequest, ContainerEngine, Error, Result, RunRequest};
use rocker_extensions::BuildArgs;

/// One call made against a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Build {
        /// Script text found in the build context.
        dockerfile: String,
        /// Context-relative paths of every other context file, sorted.
        context_files: Vec<String>,
        build_args: BuildArgs,
        tag: Option<String>,
        nocache: bool,
        pull: bool,
    },
    Run {
        image: String,
        args: Vec<String>,
        command: Vec<String>,
        tty: bool,
        remove: bool,
    },
    RemoveImage(String),
}

/// Engine double: builds always yield `sha256:fake<n>` unless told to fail,
/// runs exit with a configured code.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    calls: RefCell<Vec<EngineCall>>,
    builds: Cell<u32>,
    build_failure: Option<(Option<i32>, String)>,
    exit_code: i32,
    cancelled_run: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every build with the given status and log.
    pub fn failing_build(status: Option<i32>, log: &str) -> Self {
        Self {
            build_failure: Some((status, log.to_string())),
            ..Self::default()
        }
    }

    /// Make runs exit with `code`.
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Make runs report cancellation when their cancel flag is set.
    pub fn honoring_cancel(mut self) -> Self {
        self.cancelled_run = true;
        self
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

fn list_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            list_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

impl ContainerEngine for RecordingEngine {
    fn build(&self, request: &BuildRequest<'_>) -> Result<String> {
        let dockerfile = fs::read_to_string(request.dockerfile)?;
        let mut context_files = Vec::new();
        list_files(request.context, request.context, &mut context_files)?;
        context_files.retain(|f| f != "Dockerfile");
        context_files.sort();

        self.calls.borrow_mut().push(EngineCall::Build {
            dockerfile,
            context_files,
            build_args: request.build_args.clone(),
            tag: request.tag.map(String::from),
            nocache: request.nocache,
            pull: request.pull,
        });

        if let Some((status, log)) = &self.build_failure {
            return Err(Error::Build {
                status: *status,
                log: log.clone(),
            });
        }
        let n = self.builds.get() + 1;
        self.builds.set(n);
        Ok(format!("sha256:fake{n}"))
    }

    fn run(&self, request: &RunRequest<'_>) -> Result<i32> {
        self.calls.borrow_mut().push(EngineCall::Run {
            image: request.image.to_string(),
            args: request.args.to_vec(),
            command: request.command.to_vec(),
            tty: request.tty,
            remove: request.remove,
        });
        let cancelled = request
            .cancel
            .is_some_and(|flag| flag.load(Ordering::SeqCst));
        if self.cancelled_run && cancelled {
            return Err(Error::Cancelled);
        }
        Ok(self.exit_code)
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(EngineCall::RemoveImage(image.to_string()));
        Ok(())
    }
}
