//! Extensions that expose parts of the host to the container.
//!
//! Host facts (home directory, uid, agent socket) are captured when the
//! extension is constructed so every query stays a function of the
//! configuration alone.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::cliargs::CliArgs;
use crate::error::{Error, Result};
use crate::extension::{ArgumentSpec, Extension};
use crate::template::{Renderer, Substitutions, substitutions};

use super::flag_value;

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| Error::Identity("home directory not found".to_string()))
}

/// Bind-mounts the invoking user's home at the same path.
#[derive(Debug, Clone)]
pub struct Home {
    home: PathBuf,
}

impl Home {
    pub fn new() -> Result<Self> {
        Ok(Self::with_home(home_dir()?))
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl Extension for Home {
    fn name(&self) -> &'static str {
        "home"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::flag("home", "mount the user's home directory")]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let home = self.home.display();
        Ok(flag_value("-v", &format!("{home}:{home}")))
    }
}

/// Installs a few interactive tools in the image.
#[derive(Debug, Clone, Copy)]
pub struct DevHelpers;

impl Extension for DevHelpers {
    fn name(&self) -> &'static str {
        "dev_helpers"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::flag("dev_helpers", "add development helpers to the image")]
    }

    fn snippet(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        Ok(Renderer::builtin().render("dev_helpers_snippet", &Substitutions::new())?)
    }
}

/// Points the in-image PulseAudio client at the host server socket.
#[derive(Debug, Clone, Copy)]
pub struct Pulse {
    uid: u32,
}

impl Pulse {
    pub fn new() -> Self {
        Self::with_uid(nix::unistd::getuid().as_raw())
    }

    pub fn with_uid(uid: u32) -> Self {
        Self { uid }
    }

    fn pulse_dir(&self) -> String {
        format!("/run/user/{}/pulse", self.uid)
    }
}

impl Extension for Pulse {
    fn name(&self) -> &'static str {
        "pulse"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::flag("pulse", "mount the host pulseaudio socket")]
    }

    fn required_extensions(&self) -> Vec<&'static str> {
        vec!["user"]
    }

    fn snippet(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let subs = substitutions([("pulse_dir", self.pulse_dir())]);
        Ok(Renderer::builtin().render("pulse_snippet", &subs)?)
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let dir = self.pulse_dir();
        Ok(format!(
            " -v {dir}:{dir} --device /dev/snd -e PULSE_SERVER=unix:{dir}/native -v {dir}/native:{dir}/native --group-add audio"
        ))
    }
}

/// Mounts the host git configuration read-only into the user's home.
#[derive(Debug, Clone)]
pub struct GitConfig {
    home: PathBuf,
    system_config: PathBuf,
}

impl GitConfig {
    pub fn new() -> Result<Self> {
        Ok(Self::with_paths(home_dir()?, "/etc/gitconfig"))
    }

    pub fn with_paths(home: impl Into<PathBuf>, system_config: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            system_config: system_config.into(),
        }
    }

    /// Home of the account the `user` extension creates.
    fn target_home(&self, cliargs: &CliArgs) -> PathBuf {
        match cliargs.non_empty("user_override_name") {
            Some(name) => Path::new("/home").join(name),
            None => self.home.clone(),
        }
    }
}

impl Extension for GitConfig {
    fn name(&self) -> &'static str {
        "git"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::flag("git", "use the host git configuration in the container")]
    }

    fn required_extensions(&self) -> Vec<&'static str> {
        vec!["user"]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let mut args = String::new();
        let user_config = self.home.join(".gitconfig");
        if user_config.exists() {
            let mount = format!(
                "{}:{}:ro",
                user_config.display(),
                self.target_home(cliargs).join(".gitconfig").display()
            );
            args.push_str(&flag_value("-v", &mount));
        }
        if self.system_config.exists() {
            let path = self.system_config.display();
            args.push_str(&flag_value("-v", &format!("{path}:/etc/gitconfig:ro")));
        }
        Ok(args)
    }
}

/// Forwards the host SSH agent socket.
#[derive(Debug, Clone)]
pub struct SshAgent {
    auth_sock: Option<String>,
}

impl SshAgent {
    pub fn new() -> Self {
        Self::with_socket(std::env::var("SSH_AUTH_SOCK").ok().filter(|s| !s.is_empty()))
    }

    pub fn with_socket(auth_sock: Option<String>) -> Self {
        Self { auth_sock }
    }
}

impl Extension for SshAgent {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::flag("ssh", "forward the host SSH agent into the container")]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        match &self.auth_sock {
            Some(sock) => Ok(format!(
                "{}{}",
                flag_value("-e", &format!("SSH_AUTH_SOCK={sock}")),
                flag_value("-v", &format!("{sock}:{sock}"))
            )),
            None => {
                warn!("SSH_AUTH_SOCK is not set, not forwarding the SSH agent");
                Ok(String::new())
            }
        }
    }
}
