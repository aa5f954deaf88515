//! The container engine seam and its `docker` CLI implementation.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rocker_extensions::BuildArgs;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Build args the engine takes as options rather than `--build-arg`.
const ENGINE_BUILD_OPTIONS: &[(&str, &str)] = &[("shm_size", "--shm-size")];

/// One image build.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Build context directory.
    pub context: &'a Path,
    pub dockerfile: &'a Path,
    pub build_args: &'a BuildArgs,
    pub tag: Option<&'a str>,
    pub nocache: bool,
    pub pull: bool,
}

/// One container run.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub image: &'a str,
    pub args: &'a [String],
    pub command: &'a [String],
    pub tty: bool,
    pub remove: bool,
    /// Polled while the container runs; setting it stops the run.
    pub cancel: Option<&'a AtomicBool>,
}

/// Blocking build/run/remove operations of a container engine.
pub trait ContainerEngine {
    /// Build an image and return its id.
    fn build(&self, request: &BuildRequest<'_>) -> Result<String>;

    /// Run a container to completion and return its exit code.
    ///
    /// A non-zero exit code is a normal result. Failing to start the engine
    /// is `Error::Run`; a cancelled run is `Error::Cancelled`.
    fn run(&self, request: &RunRequest<'_>) -> Result<i32>;

    /// Remove an image. Removing an image that does not exist succeeds.
    fn remove_image(&self, image: &str) -> Result<()>;
}

/// Drives the `docker` command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    poll_interval: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("docker"),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different client binary, e.g. `podman`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Arguments for `docker build`, excluding the program itself.
    pub fn build_command_args(request: &BuildRequest<'_>, iidfile: &Path) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            request.dockerfile.display().to_string(),
            "--iidfile".to_string(),
            iidfile.display().to_string(),
        ];
        if request.nocache {
            args.push("--no-cache".to_string());
        }
        if request.pull {
            args.push("--pull".to_string());
        }
        if let Some(tag) = request.tag {
            args.push("-t".to_string());
            args.push(tag.to_string());
        }
        for (key, value) in request.build_args {
            match ENGINE_BUILD_OPTIONS.iter().find(|(k, _)| *k == key.as_str()) {
                Some((_, option)) => {
                    args.push(option.to_string());
                    args.push(value.clone());
                }
                None => {
                    args.push("--build-arg".to_string());
                    args.push(format!("{key}={value}"));
                }
            }
        }
        args.push(request.context.display().to_string());
        args
    }

    /// Arguments for `docker run`, excluding the program itself.
    pub fn run_command_args(request: &RunRequest<'_>) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if request.remove {
            args.push("--rm".to_string());
        }
        if request.tty {
            args.push("-it".to_string());
        }
        args.extend(request.args.iter().cloned());
        args.push(request.image.to_string());
        args.extend(request.command.iter().cloned());
        args
    }
}

impl ContainerEngine for DockerCli {
    fn build(&self, request: &BuildRequest<'_>) -> Result<String> {
        let iidfile = tempfile::NamedTempFile::new()?;
        let args = Self::build_command_args(request, iidfile.path());
        debug!("Running {} {}", self.program.display(), shell_words::join(&args));

        let output = Command::new(&self.program).args(&args).output()?;
        let log = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        for line in log.lines() {
            debug!("build: {}", line);
        }

        if !output.status.success() {
            return Err(Error::Build {
                status: output.status.code(),
                log,
            });
        }

        let image_id = std::fs::read_to_string(iidfile.path())?.trim().to_string();
        if image_id.is_empty() {
            return Err(Error::Build {
                status: output.status.code(),
                log: format!("{log}engine reported no image id"),
            });
        }
        info!("Built image {}", image_id);
        Ok(image_id)
    }

    fn run(&self, request: &RunRequest<'_>) -> Result<i32> {
        let args = Self::run_command_args(request);
        info!("Executing: {} {}", self.program.display(), shell_words::join(&args));

        let mut child = Command::new(&self.program)
            .args(&args)
            .spawn()
            .map_err(|e| Error::Run(format!("failed to start {}: {}", self.program.display(), e)))?;

        let status = match request.cancel {
            None => child.wait().map_err(|e| Error::Run(e.to_string()))?,
            Some(cancel) => loop {
                if let Some(status) = child.try_wait().map_err(|e| Error::Run(e.to_string()))? {
                    break status;
                }
                if cancel.load(Ordering::SeqCst) {
                    warn!("Run cancelled, stopping {}", self.program.display());
                    if let Err(e) = child.kill() {
                        warn!("Failed to stop run: {}", e);
                    }
                    let _ = child.wait();
                    return Err(Error::Cancelled);
                }
                std::thread::sleep(self.poll_interval);
            },
        };

        Ok(status.code().unwrap_or(-1))
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .args(["image", "rm", image])
            .output()?;
        if output.status.success() {
            info!("Removed image {}", image);
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("No such image") {
            debug!("Image {} already removed", image);
            return Ok(());
        }
        Err(Error::ImageRemoval {
            image: image.to_string(),
            reason: stderr.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_command_args() {
        let mut build_args = BuildArgs::new();
        build_args.insert("shm_size".to_string(), "2g".to_string());
        build_args.insert("ROS_DISTRO".to_string(), "humble".to_string());
        let request = BuildRequest {
            context: Path::new("/tmp/ctx"),
            dockerfile: Path::new("/tmp/ctx/Dockerfile"),
            build_args: &build_args,
            tag: Some("rocker:dev"),
            nocache: true,
            pull: false,
        };

        let args = DockerCli::build_command_args(&request, Path::new("/tmp/iid"));
        assert_eq!(
            args,
            vec![
                "build",
                "-f",
                "/tmp/ctx/Dockerfile",
                "--iidfile",
                "/tmp/iid",
                "--no-cache",
                "-t",
                "rocker:dev",
                "--build-arg",
                "ROS_DISTRO=humble",
                "--shm-size",
                "2g",
                "/tmp/ctx",
            ]
        );
    }

    #[test]
    fn test_run_command_args() {
        let args = vec!["--network".to_string(), "host".to_string()];
        let command = vec!["bash".to_string(), "-c".to_string(), "true".to_string()];
        let request = RunRequest {
            image: "sha256:abc",
            args: &args,
            command: &command,
            tty: true,
            remove: true,
            cancel: None,
        };
        assert_eq!(
            DockerCli::run_command_args(&request),
            vec!["run", "--rm", "-it", "--network", "host", "sha256:abc", "bash", "-c", "true"]
        );
    }

    #[test]
    fn test_missing_program_is_run_error() {
        let engine = DockerCli::new().with_program("/nonexistent/rocker-test-docker");
        let request = RunRequest {
            image: "img",
            args: &[],
            command: &[],
            tty: false,
            remove: true,
            cancel: None,
        };
        assert!(matches!(engine.run(&request), Err(Error::Run(_))));
    }

    /// A stand-in client: `sh` running `body` with the engine's arguments.
    #[cfg(unix)]
    fn fake_client(dir: &Path, body: &str) -> DockerCli {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        DockerCli::new()
            .with_program(path)
            .with_poll_interval(Duration::from_millis(10))
    }

    #[cfg(unix)]
    fn build_with(engine: &DockerCli, dir: &Path) -> Result<String> {
        let build_args = BuildArgs::new();
        engine.build(&BuildRequest {
            context: dir,
            dockerfile: &dir.join("Dockerfile"),
            build_args: &build_args,
            tag: None,
            nocache: false,
            pull: false,
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_build_reads_image_id_from_iidfile() {
        let dir = tempfile::tempdir().unwrap();
        // build -f DOCKERFILE --iidfile PATH ...
        let engine = fake_client(dir.path(), "printf 'sha256:feed\\n' > \"$5\"");
        assert_eq!(build_with(&engine, dir.path()).unwrap(), "sha256:feed");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_build_keeps_status_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_client(dir.path(), "echo 'Step 2/3 : RUN false'\necho 'returned a non-zero code: 1' >&2\nexit 1");
        match build_with(&engine, dir.path()) {
            Err(Error::Build { status, log }) => {
                assert_eq!(status, Some(1));
                assert!(log.contains("Step 2/3 : RUN false"));
                assert!(log.contains("returned a non-zero code: 1"));
            }
            other => panic!("expected a build error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_build_without_image_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_client(dir.path(), "exit 0");
        match build_with(&engine, dir.path()) {
            Err(Error::Build { status, log }) => {
                assert_eq!(status, Some(0));
                assert!(log.contains("no image id"));
            }
            other => panic!("expected a build error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_returns_container_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_client(dir.path(), "exit 3");
        let request = RunRequest {
            image: "img",
            args: &[],
            command: &[],
            tty: false,
            remove: true,
            cancel: None,
        };
        assert_eq!(engine.run(&request).unwrap(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_cancelled_run_stops_client() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_client(dir.path(), "exec sleep 30");
        let cancel = AtomicBool::new(false);
        let request = RunRequest {
            image: "img",
            args: &[],
            command: &[],
            tty: false,
            remove: true,
            cancel: Some(&cancel),
        };

        let started = std::time::Instant::now();
        let result = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(100));
                cancel.store(true, Ordering::SeqCst);
            });
            engine.run(&request)
        });
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_image() {
        let dir = tempfile::tempdir().unwrap();
        let gone = fake_client(dir.path(), "echo 'Error: No such image: img' >&2\nexit 1");
        assert!(gone.remove_image("img").is_ok());

        let refused = fake_client(dir.path(), "echo 'image is being used by running container' >&2\nexit 1");
        match refused.remove_image("img") {
            Err(Error::ImageRemoval { image, reason }) => {
                assert_eq!(image, "img");
                assert_eq!(reason, "image is being used by running container");
            }
            other => panic!("expected a removal error, got {other:?}"),
        }
    }
}
