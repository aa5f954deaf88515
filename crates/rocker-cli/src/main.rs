//! Rocker CLI
//!
//! Builds an image from a base image plus the selected extensions, then runs
//! it. The process exits with the container's exit code.

mod cli;
mod error;
mod logging;

use std::io::IsTerminal;

use clap::FromArgMatches;
use colored::Colorize;
use rocker_core::{
    BuildOptions, Composition, ConfigResolver, DockerCli, ImageGenerator, RunOptions,
    RunRequest, compose_active,
};
use rocker_extensions::ExtensionRegistry;
use tracing::{info, warn};

use cli::{Cli, Mode};
use error::{CliError, Result};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{}: {}", "hint".cyan().bold(), hint);
            }
            std::process::exit(e.exit_code());
        }
    }
}

fn run() -> Result<i32> {
    let cwd = std::env::current_dir()?;
    let defaults = ConfigResolver::new(&cwd).resolve()?;
    let registry = ExtensionRegistry::with_builtins();

    let mut command = cli::command(&registry, &defaults.args);
    let matches = command.get_matches_mut();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: failed to initialize logging: {}", "warning".yellow().bold(), e);
    }
    for failure in registry.failures() {
        warn!("Extension unavailable: {}", failure);
    }

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut command, "rocker", &mut std::io::stdout());
        return Ok(0);
    }

    if cli.list_extensions {
        for name in registry.names() {
            let description = registry.description(name).unwrap_or_default();
            println!("{} {}", format!("{name:<16}").cyan(), description);
        }
        return Ok(0);
    }

    let mut cliargs = defaults.args.clone();
    cliargs.merge(&cli::extension_values(&registry, &defaults.args, &matches));

    let image = cli
        .image
        .clone()
        .or_else(|| defaults.image.clone())
        .ok_or(CliError::MissingImage)?;

    let mut blacklist = cli.extension_blacklist.clone();
    blacklist.extend(cliargs.list("extension_blacklist"));
    let registry = registry.with_blacklist(blacklist);

    let (composition, effective) = compose_active(&registry, &image, &cliargs)?;
    info!("Active extensions: {}", composition.extensions.join(", "));

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(0);
    }

    let tag = cli
        .image_name
        .clone()
        .or_else(|| effective.non_empty("name").map(|n| format!("rocker:{n}")));
    let tty = match cli.mode {
        Some(Mode::Interactive) => true,
        Some(Mode::NonInteractive) => false,
        None => std::io::stdin().is_terminal(),
    };

    if cli.noexecute {
        print_dry_run(&composition, tag.as_deref(), &cli.command, tty);
        return Ok(0);
    }

    let mut generator = ImageGenerator::new(DockerCli::new(), composition);
    generator.build(&BuildOptions {
        tag,
        nocache: cli.nocache,
        pull: cli.pull,
    })?;
    let code = generator.run(&RunOptions {
        command: cli.command.clone(),
        tty,
        ..RunOptions::default()
    })?;
    if cli.clear_image {
        generator.clear_image()?;
    }
    Ok(code)
}

fn print_dry_run(
    composition: &Composition,
    tag: Option<&str>,
    command: &[String],
    tty: bool,
) {
    println!("{}", composition.dockerfile());
    for (key, value) in &composition.build_args {
        println!("# build arg {key}={value}");
    }
    let args = composition.run_args.tokens();
    let request = RunRequest {
        image: tag.unwrap_or("IMAGE_ID"),
        args: &args,
        command,
        tty,
        remove: true,
        cancel: None,
    };
    println!("docker {}", shell_words::join(DockerCli::run_command_args(&request)));
}
