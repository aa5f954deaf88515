//! Extensions that forward a configuration key straight to `docker run`.

use super::repeat_flag;
use crate::cliargs::CliArgs;
use crate::error::Result;
use crate::extension::{ArgKind, ArgumentSpec, Extension};

/// A boolean key that adds a fixed flag to the run invocation.
#[derive(Debug, Clone)]
pub struct Switch {
    name: &'static str,
    docker_flag: &'static str,
    help: &'static str,
}

impl Switch {
    pub fn detach() -> Self {
        Self {
            name: "detach",
            docker_flag: "--detach",
            help: "run the container in the background",
        }
    }

    pub fn privileged() -> Self {
        Self {
            name: "privileged",
            docker_flag: "--privileged",
            help: "give extended privileges to the container",
        }
    }
}

impl Extension for Switch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn register_arguments(&self, _defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::flag(self.name, self.help)]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        Ok(format!(" {}", self.docker_flag))
    }
}

/// A valued key forwarded as `<flag> <value>`, once per value.
#[derive(Debug, Clone)]
pub struct RunOption {
    name: &'static str,
    docker_flag: &'static str,
    help: &'static str,
    repeatable: bool,
}

impl RunOption {
    fn single(name: &'static str, docker_flag: &'static str, help: &'static str) -> Self {
        Self {
            name,
            docker_flag,
            help,
            repeatable: false,
        }
    }

    fn repeated(name: &'static str, docker_flag: &'static str, help: &'static str) -> Self {
        Self {
            repeatable: true,
            ..Self::single(name, docker_flag, help)
        }
    }

    pub fn network() -> Self {
        Self::single(
            "network",
            "--network",
            "the network to attach the container to (bridge, host, none or a user-defined network)",
        )
    }

    pub fn ipc() -> Self {
        Self::single("ipc", "--ipc", "the IPC namespace mode for the container")
    }

    pub fn hostname() -> Self {
        Self::single("hostname", "--hostname", "the hostname inside the container")
    }

    pub fn container_name() -> Self {
        Self::single("name", "--name", "the name of the container")
    }

    pub fn expose() -> Self {
        Self::repeated("expose", "--expose", "expose a port of the container")
    }

    pub fn port() -> Self {
        Self::repeated("port", "-p", "publish a container port as HOST:CONTAINER")
    }

    pub fn group_add() -> Self {
        Self::repeated("group_add", "--group-add", "add an additional group to the container process")
    }
}

impl Extension for RunOption {
    fn name(&self) -> &'static str {
        self.name
    }

    fn register_arguments(&self, defaults: &CliArgs) -> Vec<ArgumentSpec> {
        let kind = if self.repeatable {
            ArgKind::Append
        } else {
            ArgKind::Value
        };
        vec![ArgumentSpec::new(self.name, kind, self.help).with_default_from(defaults)]
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        Ok(repeat_flag(self.docker_flag, &cliargs.list(self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Switch::detach(), "--detach")]
    #[case(Switch::privileged(), "--privileged")]
    fn test_switch(#[case] ext: Switch, #[case] flag: &str) {
        let on = CliArgs::new().with(ext.name(), true);
        assert_eq!(ext.docker_args(&on).unwrap(), format!(" {flag}"));

        let off = CliArgs::new().with(ext.name(), false);
        assert_eq!(ext.docker_args(&off).unwrap(), "");
        assert_eq!(ext.docker_args(&CliArgs::new()).unwrap(), "");
        assert_eq!(ext.snippet(&on).unwrap(), "");
        assert_eq!(ext.preamble(&on).unwrap(), "");
    }

    #[rstest]
    #[case(RunOption::network(), "none", " --network none")]
    #[case(RunOption::network(), "host", " --network host")]
    #[case(RunOption::ipc(), "host", " --ipc host")]
    #[case(RunOption::hostname(), "docker-hostname", " --hostname docker-hostname")]
    #[case(RunOption::container_name(), "docker_name", " --name docker_name")]
    fn test_single_value(#[case] ext: RunOption, #[case] value: &str, #[case] expected: &str) {
        let args = CliArgs::new().with(ext.name(), value);
        assert_eq!(ext.docker_args(&args).unwrap(), expected);
        assert_eq!(ext.snippet(&args).unwrap(), "");
        assert_eq!(ext.preamble(&args).unwrap(), "");
        assert_eq!(ext.docker_args(&CliArgs::new()).unwrap(), "");
    }

    #[test]
    fn test_repeated_values() {
        let args = CliArgs::new()
            .with("expose", vec!["80", "8080"])
            .with("port", vec!["80:8080", "81:8081"])
            .with("group_add", vec!["sudo", "docker"]);

        assert_eq!(
            RunOption::expose().docker_args(&args).unwrap(),
            " --expose 80 --expose 8080"
        );
        assert_eq!(
            RunOption::port().docker_args(&args).unwrap(),
            " -p 80:8080 -p 81:8081"
        );
        let groups = RunOption::group_add().docker_args(&args).unwrap();
        assert!(groups.contains("--group-add sudo"));
        assert!(groups.contains("--group-add docker"));
        assert!(!groups.contains("--group_add"));
    }

    #[test]
    fn test_network_absent_adds_nothing() {
        let args = RunOption::network().docker_args(&CliArgs::new()).unwrap();
        assert!(!args.contains("--network"));
    }

    #[test]
    fn test_argument_kinds() {
        let specs = RunOption::port().register_arguments(&CliArgs::new());
        assert_eq!(specs[0].flag, "--port");
        assert_eq!(specs[0].kind, ArgKind::Append);

        let specs = RunOption::network().register_arguments(&CliArgs::new().with("network", "host"));
        assert_eq!(specs[0].kind, ArgKind::Value);
        assert!(specs[0].default.is_some());
    }
}
