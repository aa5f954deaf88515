//! Run-phase extensions whose values need checking or rewriting before
//! they reach the engine.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::repeat_flag;
use crate::cliargs::CliArgs;
use crate::error::{Error, Result};
use crate::extension::{ArgKind, ArgumentSpec, Extension};

/// `-e` and `--env-file`.
#[derive(Debug, Clone, Copy)]
pub struct Env;

impl Extension for Env {
    fn name(&self) -> &'static str {
        "env"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::new(
                "env",
                ArgKind::AppendValues,
                "set environment variables in the container as NAME=VALUE",
            ),
            ArgumentSpec::new(
                "env_file",
                ArgKind::AppendValues,
                "read environment variables for the container from a file",
            ),
        ]
    }

    fn is_active(&self, cliargs: &CliArgs) -> bool {
        cliargs.flag("env") || cliargs.flag("env_file")
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        let mut args = repeat_flag("-e", &cliargs.list("env"));
        args.push_str(&repeat_flag("--env-file", &cliargs.list("env_file")));
        Ok(args)
    }
}

/// `--device` for each requested device present on the host.
#[derive(Debug, Clone, Copy)]
pub struct Devices;

impl Extension for Devices {
    fn name(&self) -> &'static str {
        "devices"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::new(
            "devices",
            ArgKind::Values,
            "host devices to pass through, as HOST[:CONTAINER[:PERMISSIONS]]",
        )]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        let present: Vec<String> = cliargs
            .list("devices")
            .into_iter()
            .filter(|device| {
                let host = device.split(':').next().unwrap_or_default();
                let exists = Path::new(host).exists();
                if !exists {
                    warn!("Requested device {} does not exist, skipping", host);
                }
                exists
            })
            .collect();
        Ok(repeat_flag("--device", &present))
    }
}

/// `-v HOST:CONTAINER[:OPTIONS]` with the host side made absolute.
#[derive(Debug, Clone)]
pub struct Volume {
    home: Option<PathBuf>,
    cwd: PathBuf,
}

impl Volume {
    /// Capture the home and working directories used to resolve host paths.
    pub fn new() -> Result<Self> {
        Ok(Self::with_dirs(dirs::home_dir(), std::env::current_dir()?))
    }

    pub fn with_dirs(home: Option<PathBuf>, cwd: PathBuf) -> Self {
        Self { home, cwd }
    }

    fn host_path(&self, host: &str) -> Result<PathBuf> {
        let expanded = match (host.strip_prefix('~'), &self.home) {
            (Some(""), Some(home)) => home.clone(),
            (Some(rest), Some(home)) if rest.starts_with('/') => home.join(rest.trim_start_matches('/')),
            (Some(_), None) => {
                return Err(Error::invalid(
                    "volume",
                    format!("cannot expand '{host}' without a home directory"),
                ));
            }
            _ => PathBuf::from(host),
        };
        if expanded.is_absolute() {
            Ok(expanded)
        } else {
            Ok(self.cwd.join(expanded))
        }
    }

    fn mount(&self, spec: &str) -> Result<String> {
        let (host, rest) = spec.split_once(':').ok_or_else(|| {
            Error::invalid("volume", format!("'{spec}' is not of the form HOST:CONTAINER[:OPTIONS]"))
        })?;
        if host.is_empty() || rest.is_empty() {
            return Err(Error::invalid(
                "volume",
                format!("'{spec}' is missing a host or container path"),
            ));
        }
        Ok(format!("{}:{}", self.host_path(host)?.display(), rest))
    }
}

impl Extension for Volume {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::new(
            "volume",
            ArgKind::AppendValues,
            "bind-mount a host path as HOST:CONTAINER[:OPTIONS]",
        )]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        let mounts = cliargs
            .list("volume")
            .iter()
            .map(|spec| self.mount(spec))
            .collect::<Result<Vec<_>>>()?;
        Ok(repeat_flag("-v", &mounts))
    }
}

static ULIMIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>[a-z]+)=(?P<soft>-1|\d+)(:(?P<hard>-1|\d+))?$").expect("Invalid ulimit regex")
});

const ULIMIT_KINDS: &[&str] = &[
    "core",
    "cpu",
    "data",
    "fsize",
    "locks",
    "memlock",
    "msgqueue",
    "nice",
    "nofile",
    "nproc",
    "rss",
    "rtprio",
    "rttime",
    "sigpending",
    "stack",
];

/// `--ulimit TYPE=SOFT[:HARD]`.
#[derive(Debug, Clone, Copy)]
pub struct Ulimit;

impl Ulimit {
    fn check(limit: &str) -> Result<()> {
        let caps = ULIMIT_REGEX
            .captures(limit)
            .ok_or_else(|| Error::invalid("ulimit", format!("'{limit}' is not of the form TYPE=SOFT[:HARD]")))?;
        let kind = &caps["kind"];
        if !ULIMIT_KINDS.contains(&kind) {
            return Err(Error::invalid("ulimit", format!("unknown limit type '{kind}'")));
        }
        if let (Ok(soft), Some(Ok(hard))) = (
            caps["soft"].parse::<i64>(),
            caps.name("hard").map(|m| m.as_str().parse::<i64>()),
        ) {
            if soft != -1 && hard != -1 && soft > hard {
                return Err(Error::invalid(
                    "ulimit",
                    format!("soft limit exceeds hard limit in '{limit}'"),
                ));
            }
        }
        Ok(())
    }
}

impl Extension for Ulimit {
    fn name(&self) -> &'static str {
        "ulimit"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::new(
            "ulimit",
            ArgKind::AppendValues,
            "set a resource limit in the container as TYPE=SOFT[:HARD]",
        )]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        let limits = cliargs.list("ulimit");
        for limit in &limits {
            Self::check(limit)?;
        }
        Ok(repeat_flag("--ulimit", &limits))
    }
}
