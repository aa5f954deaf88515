//! Graphics passthrough: the host X server and NVIDIA GPUs.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::flag_value;
use crate::cliargs::CliArgs;
use crate::error::{Error, Result};
use crate::extension::{ArgumentSpec, Extension};
use crate::template::{Renderer, substitutions};

const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// Where the host X authority file appears inside the container.
pub const CONTAINER_XAUTHORITY: &str = "/tmp/.docker.xauth";

/// Lets X clients in the container reach the host display.
#[derive(Debug, Clone)]
pub struct X11 {
    display: Option<String>,
    xauthority: Option<PathBuf>,
}

impl X11 {
    /// Capture `DISPLAY` and the X authority file of the current session.
    pub fn new() -> Self {
        let xauthority = std::env::var_os("XAUTHORITY")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".Xauthority")));
        Self::with_session(std::env::var("DISPLAY").ok(), xauthority)
    }

    pub fn with_session(display: Option<String>, xauthority: Option<PathBuf>) -> Self {
        Self {
            display: display.filter(|d| !d.is_empty()),
            xauthority: xauthority.filter(|p| p.is_file()),
        }
    }
}

impl Extension for X11 {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::flag("x11", "forward the host X11 display")]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let display = self.display.as_deref().ok_or_else(|| {
            Error::invalid("x11", "DISPLAY is not set, there is no X server to forward")
        })?;

        let mut args = flag_value("-e", &format!("DISPLAY={display}"));
        args.push_str(&flag_value("-e", "QT_X11_NO_MITSHM=1"));
        args.push_str(&flag_value("-v", &format!("{X11_SOCKET_DIR}:{X11_SOCKET_DIR}")));
        match &self.xauthority {
            Some(host) => {
                args.push_str(&flag_value("-e", &format!("XAUTHORITY={CONTAINER_XAUTHORITY}")));
                args.push_str(&flag_value(
                    "-v",
                    &format!("{}:{CONTAINER_XAUTHORITY}:ro", host.display()),
                ));
            }
            None => warn!("No X authority file found, X clients may be refused by the server"),
        }
        Ok(args)
    }
}

static GPU_LIST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(all|[A-Za-z0-9-]+(,[A-Za-z0-9-]+)*)$").expect("Invalid GPU list regex"));

/// Exposes NVIDIA GPUs through the NVIDIA container toolkit.
#[derive(Debug, Clone, Copy)]
pub struct Nvidia;

impl Nvidia {
    fn devices(cliargs: &CliArgs) -> Result<&str> {
        let devices = cliargs.non_empty("nvidia_devices").unwrap_or("all");
        if GPU_LIST_REGEX.is_match(devices) {
            Ok(devices)
        } else {
            Err(Error::invalid(
                "nvidia_devices",
                format!("'{devices}' is not 'all' or a comma separated list of GPU indices or UUIDs"),
            ))
        }
    }
}

impl Extension for Nvidia {
    fn name(&self) -> &'static str {
        "nvidia"
    }

    fn register_arguments(&self, defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::flag("nvidia", "expose NVIDIA GPUs to the container"),
            ArgumentSpec::value("nvidia_devices", "GPUs to expose: all, or a list such as 0,1")
                .with_default_from(defaults),
            ArgumentSpec::flag(
                "nvidia_runtime",
                "select the legacy nvidia runtime instead of --gpus",
            ),
        ]
    }

    fn snippet(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let subs = substitutions([("devices", Self::devices(cliargs)?.to_string())]);
        Ok(Renderer::builtin().render("nvidia_snippet", &subs)?)
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let devices = Self::devices(cliargs)?;
        if cliargs.flag("nvidia_runtime") {
            let mut args = flag_value("--runtime", "nvidia");
            args.push_str(&flag_value("-e", &format!("NVIDIA_VISIBLE_DEVICES={devices}")));
            return Ok(args);
        }
        let request = match devices {
            "all" => "all".to_string(),
            list => format!("\"device={list}\""),
        };
        Ok(flag_value("--gpus", &request))
    }
}
