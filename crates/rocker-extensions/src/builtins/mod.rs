//! Built-in extension registrations.
//!
//! Every extension shipped with rocker is listed in [`builtin_entries`];
//! listing, lookup and `--help` generation all derive from it.

mod display;
mod host;
mod limits;
mod options;
mod run;

pub use display::{CONTAINER_XAUTHORITY, Nvidia, X11};
pub use host::{DevHelpers, GitConfig, Home, Pulse, SshAgent};
pub use limits::{CpuLimits, MemoryLimits, ShmSize};
pub use options::{RunOption, Switch};
pub use run::{Devices, Env, Ulimit, Volume};

use crate::error::Result;
use crate::extension::Extension;
use crate::registry::ExtensionEntry;
use crate::user::UserExtension;

fn boxed(ext: impl Extension + 'static) -> Result<Box<dyn Extension>> {
    Ok(Box::new(ext))
}

/// Returns all built-in extension registrations, sorted by name.
pub fn builtin_entries() -> Vec<ExtensionEntry> {
    vec![
        ExtensionEntry {
            name: "cpu_limits",
            description: "Limit the CPUs available to the container",
            factory: || boxed(CpuLimits),
        },
        ExtensionEntry {
            name: "detach",
            description: "Run the container in the background",
            factory: || boxed(Switch::detach()),
        },
        ExtensionEntry {
            name: "dev_helpers",
            description: "Install development helpers in the image",
            factory: || boxed(DevHelpers),
        },
        ExtensionEntry {
            name: "devices",
            description: "Pass host devices through to the container",
            factory: || boxed(Devices),
        },
        ExtensionEntry {
            name: "env",
            description: "Set environment variables in the container",
            factory: || boxed(Env),
        },
        ExtensionEntry {
            name: "expose",
            description: "Expose container ports",
            factory: || boxed(RunOption::expose()),
        },
        ExtensionEntry {
            name: "git",
            description: "Mount the host git configuration into the user's home",
            factory: || boxed(GitConfig::new()?),
        },
        ExtensionEntry {
            name: "group_add",
            description: "Add the container process to extra groups",
            factory: || boxed(RunOption::group_add()),
        },
        ExtensionEntry {
            name: "home",
            description: "Mount the user's home directory",
            factory: || boxed(Home::new()?),
        },
        ExtensionEntry {
            name: "hostname",
            description: "Set the container hostname",
            factory: || boxed(RunOption::hostname()),
        },
        ExtensionEntry {
            name: "ipc",
            description: "Set the IPC namespace mode",
            factory: || boxed(RunOption::ipc()),
        },
        ExtensionEntry {
            name: "memory_limits",
            description: "Limit the memory available to the container",
            factory: || boxed(MemoryLimits),
        },
        ExtensionEntry {
            name: "name",
            description: "Name the container",
            factory: || boxed(RunOption::container_name()),
        },
        ExtensionEntry {
            name: "network",
            description: "Select the container network",
            factory: || boxed(RunOption::network()),
        },
        ExtensionEntry {
            name: "nvidia",
            description: "Expose NVIDIA GPUs to the container",
            factory: || boxed(Nvidia),
        },
        ExtensionEntry {
            name: "port",
            description: "Publish container ports on the host",
            factory: || boxed(RunOption::port()),
        },
        ExtensionEntry {
            name: "privileged",
            description: "Give the container extended privileges",
            factory: || boxed(Switch::privileged()),
        },
        ExtensionEntry {
            name: "pulse",
            description: "Forward the host PulseAudio server",
            factory: || boxed(Pulse::new()),
        },
        ExtensionEntry {
            name: "shm_size",
            description: "Size /dev/shm for the build and the container",
            factory: || boxed(ShmSize),
        },
        ExtensionEntry {
            name: "ssh",
            description: "Forward the host SSH agent",
            factory: || boxed(SshAgent::new()),
        },
        ExtensionEntry {
            name: "ulimit",
            description: "Set resource limits in the container",
            factory: || boxed(Ulimit),
        },
        ExtensionEntry {
            name: "user",
            description: "Run as the invoking user inside the container",
            factory: || boxed(UserExtension::new()?),
        },
        ExtensionEntry {
            name: "volume",
            description: "Bind-mount host paths into the container",
            factory: || boxed(Volume::new()?),
        },
        ExtensionEntry {
            name: "x11",
            description: "Forward the host X11 display",
            factory: || boxed(X11::new()),
        },
    ]
}

/// Render ` <flag> <value>` with the value shell-quoted, so it survives
/// tokenization as a single argument.
pub(crate) fn flag_value(flag: &str, value: &str) -> String {
    format!(" {} {}", flag, shell_words::quote(value))
}

/// Render ` <flag> <value>` for every value, in order.
pub(crate) fn repeat_flag<S: AsRef<str>>(flag: &str, values: &[S]) -> String {
    values
        .iter()
        .map(|v| flag_value(flag, v.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphics_extensions_are_listed() {
        let names: Vec<_> = builtin_entries().iter().map(|e| e.name).collect();
        assert_eq!(names.len(), 24);
        assert!(names.contains(&"nvidia"));
        assert!(names.contains(&"x11"));
    }

    #[test]
    fn test_entries_sorted_and_unique() {
        let names: Vec<_> = builtin_entries().iter().map(|e| e.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_repeat_flag() {
        assert_eq!(repeat_flag("-p", &["80:80", "81:81"]), " -p 80:80 -p 81:81");
        assert_eq!(repeat_flag::<&str>("-p", &[]), "");
    }

    #[test]
    fn test_values_stay_single_tokens() {
        let rendered = repeat_flag("-e", &["GREETING=hello world", "NAME=O'Brien", "PLAIN"]);
        assert_eq!(
            shell_words::split(&rendered).unwrap(),
            vec!["-e", "GREETING=hello world", "-e", "NAME=O'Brien", "-e", "PLAIN"]
        );
    }
}
