//! CLI argument parsing using clap derive, extended at runtime with the
//! options every registered extension declares.

use std::collections::BTreeSet;

use clap::builder::PossibleValuesParser;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command, CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use rocker_extensions::{ArgKind, ArgumentSpec, CliArgs, ExtensionRegistry};

/// Rocker - build and run a container image customized by extensions
#[derive(Parser, Debug)]
#[command(name = "rocker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base image to build on
    ///
    /// Falls back to `image` from the defaults files.
    pub image: Option<String>,

    /// Command to run in the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the build script and run command without executing them
    #[arg(long)]
    pub noexecute: bool,

    /// Build without the engine's layer cache
    #[arg(long)]
    pub nocache: bool,

    /// Always pull the base image
    #[arg(long)]
    pub pull: bool,

    /// Tag applied to the built image
    #[arg(long, value_name = "TAG")]
    pub image_name: Option<String>,

    /// Extensions never to apply
    #[arg(long, value_name = "NAME", num_args = 1..)]
    pub extension_blacklist: Vec<String>,

    /// Attach a terminal or not; detected from stdin when omitted
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Remove the image after the container exits
    #[arg(long)]
    pub clear_image: bool,

    /// List the available extensions and exit
    #[arg(long)]
    pub list_extensions: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

/// Terminal handling for the run.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    NonInteractive,
}

/// Every extension option, first declaration of a key wins.
fn extension_specs(registry: &ExtensionRegistry, defaults: &CliArgs) -> Vec<ArgumentSpec> {
    let mut seen = BTreeSet::new();
    registry
        .iter()
        .flat_map(|ext| ext.register_arguments(defaults))
        .filter(|spec| seen.insert(spec.key.clone()))
        .collect()
}

fn extension_arg(spec: &ArgumentSpec) -> Arg {
    let mut help = spec.help.clone();
    if let Some(default) = spec.default.as_ref().filter(|d| d.is_truthy()) {
        let shown = default.to_list().join(" ");
        if !shown.is_empty() {
            help.push_str(&format!(" [configured: {shown}]"));
        }
    }

    let arg = Arg::new(spec.key.clone())
        .long(spec.flag.trim_start_matches('-').to_string())
        .help(help);
    match &spec.kind {
        ArgKind::Flag => arg.action(ArgAction::SetTrue),
        ArgKind::Value => arg.action(ArgAction::Set).num_args(1),
        ArgKind::Choice(choices) => arg
            .action(ArgAction::Set)
            .value_parser(PossibleValuesParser::new(choices.iter().copied())),
        ArgKind::Values => arg.action(ArgAction::Set).num_args(0..),
        ArgKind::Append => arg.action(ArgAction::Append).num_args(1),
        ArgKind::AppendValues => arg.action(ArgAction::Append).num_args(1..),
    }
}

/// The full command: fixed options plus one option per extension key.
pub fn command(registry: &ExtensionRegistry, defaults: &CliArgs) -> Command {
    extension_specs(registry, defaults)
        .iter()
        .fold(Cli::command().next_help_heading("Extensions"), |cmd, spec| {
            cmd.arg(extension_arg(spec))
        })
}

/// Extension options given on the command line.
///
/// Options left out are absent from the result, so values from the
/// defaults files survive a merge.
pub fn extension_values(
    registry: &ExtensionRegistry,
    defaults: &CliArgs,
    matches: &ArgMatches,
) -> CliArgs {
    let mut values = CliArgs::new();
    for spec in extension_specs(registry, defaults) {
        let key = spec.key.as_str();
        if matches.value_source(key) != Some(ValueSource::CommandLine) {
            continue;
        }
        match spec.kind {
            ArgKind::Flag => values.insert(key, true),
            ArgKind::Value | ArgKind::Choice(_) => {
                if let Some(value) = matches.get_one::<String>(key) {
                    values.insert(key, value.clone());
                }
            }
            ArgKind::Values | ArgKind::Append => {
                let list: Vec<String> = matches
                    .get_many::<String>(key)
                    .map(|v| v.cloned().collect())
                    .unwrap_or_default();
                values.insert(key, list);
            }
            ArgKind::AppendValues => {
                let nested: Vec<Vec<String>> = matches
                    .get_occurrences::<String>(key)
                    .map(|occurrences| occurrences.map(|o| o.cloned().collect()).collect())
                    .unwrap_or_default();
                values.insert(key, nested);
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::FromArgMatches;
    use pretty_assertions::assert_eq;
    use rocker_extensions::ConfigValue;
    use rocker_test_utils::test_registry;

    fn parse(args: &[&str]) -> (Cli, CliArgs) {
        let registry = test_registry();
        let defaults = CliArgs::new();
        let matches = command(&registry, &defaults).try_get_matches_from(args).unwrap();
        let cli = Cli::from_arg_matches(&matches).unwrap();
        (cli, extension_values(&registry, &defaults, &matches))
    }

    #[test]
    fn test_command_is_consistent() {
        command(&test_registry(), &CliArgs::new()).debug_assert();
    }

    #[test]
    fn test_image_and_trailing_command() {
        let (cli, values) = parse(&["rocker", "--network", "host", "ubuntu:22.04", "bash", "-c", "echo hi"]);
        assert_eq!(cli.image.as_deref(), Some("ubuntu:22.04"));
        assert_eq!(cli.command, vec!["bash", "-c", "echo hi"]);
        assert_eq!(values.string("network"), Some("host"));
    }

    #[test]
    fn test_absent_options_are_not_recorded() {
        let (_, values) = parse(&["rocker", "--user", "ubuntu"]);
        assert!(values.flag("user"));
        assert!(!values.contains("home"));
        assert!(!values.contains("network"));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_repeated_multi_value_option() {
        let (_, values) = parse(&[
            "rocker", "--env", "A=1", "B=2", "--env", "C=3", "--network", "host", "ubuntu",
        ]);
        assert_eq!(
            values.get("env"),
            Some(&ConfigValue::Nested(vec![
                vec!["A=1".to_string(), "B=2".to_string()],
                vec!["C=3".to_string()],
            ]))
        );
        assert_eq!(values.list("env"), vec!["A=1", "B=2", "C=3"]);
    }

    #[test]
    fn test_optional_list_without_values() {
        let (_, values) = parse(&["rocker", "--user", "--user-preserve-groups", "--home", "ubuntu"]);
        assert_eq!(values.get("user_preserve_groups"), Some(&ConfigValue::List(Vec::new())));
        assert!(values.flag("home"));
    }

    #[test]
    fn test_hyphenated_flags_use_underscore_keys() {
        let (_, values) = parse(&["rocker", "--shm-size", "2g", "--user-override-name", "bob", "ubuntu"]);
        assert_eq!(values.string("shm_size"), Some("2g"));
        assert_eq!(values.string("user_override_name"), Some("bob"));
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let registry = test_registry();
        let result = command(&registry, &CliArgs::new()).try_get_matches_from(["rocker", "--bogus", "ubuntu"]);
        assert!(result.is_err());
    }
}
