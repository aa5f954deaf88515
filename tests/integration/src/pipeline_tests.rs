//! End-to-end tests for the composition pipeline
//!
//! These exercise the complete flow: defaults file -> registry selection ->
//! resolution -> composition -> build and run against a recording engine.

use std::fs;

use pretty_assertions::assert_eq;
use rocker_core::{
    BuildOptions, ConfigResolver, Error, GeneratorState, ImageGenerator, RunOptions,
    compose_active,
};
use rocker_extensions::CliArgs;
use rocker_test_utils::{EngineCall, RecordingEngine, test_host, test_registry};
use rstest::rstest;
use tempfile::TempDir;

fn run_args(cliargs: &CliArgs) -> Vec<String> {
    let (composition, _) = compose_active(&test_registry(), "ubuntu:22.04", cliargs).unwrap();
    composition.run_args.tokens()
}

#[test]
fn test_network_scenario() {
    let args = run_args(&CliArgs::new().with("network", "host"));
    assert_eq!(args, vec!["--network", "host"]);
}

#[test]
fn test_env_scenario() {
    let args = run_args(&CliArgs::new().with("env", vec![vec!["A=1", "B=2"], vec!["C=3"]]));
    assert_eq!(args, vec!["-e", "A=1", "-e", "B=2", "-e", "C=3"]);
}

#[test]
fn test_env_values_keep_spaces_and_quotes() {
    let args = run_args(&CliArgs::new().with(
        "env",
        vec![vec!["GREETING=hello world"], vec!["NAME=O'Brien"]],
    ));
    assert_eq!(args, vec!["-e", "GREETING=hello world", "-e", "NAME=O'Brien"]);
}

#[test]
fn test_graphics_scenario() {
    let cliargs = CliArgs::new().with("x11", true).with("nvidia", true);
    let (composition, _) = compose_active(&test_registry(), "ubuntu:22.04", &cliargs).unwrap();
    assert!(composition.dockerfile().contains("ENV NVIDIA_VISIBLE_DEVICES=all"));

    let args = &composition.run_args;
    assert!(args.contains_pair("--gpus", "all"));
    assert!(args.contains_pair("-e", "DISPLAY=:0"));
    assert!(args.contains_pair("-v", "/tmp/.X11-unix:/tmp/.X11-unix"));
}

#[test]
fn test_nothing_selected_gives_bare_script() {
    let (composition, effective) =
        compose_active(&test_registry(), "ubuntu:22.04", &CliArgs::new()).unwrap();
    assert_eq!(composition.dockerfile(), "FROM ubuntu:22.04\n");
    assert!(composition.run_args.is_empty());
    assert!(composition.extensions.is_empty());
    assert!(effective.is_empty());
}

#[test]
fn test_required_extension_is_activated_and_ordered_first() {
    let cliargs = CliArgs::new().with("pulse", true).with("git", true);
    let (composition, effective) =
        compose_active(&test_registry(), "ubuntu:22.04", &cliargs).unwrap();

    assert_eq!(composition.extensions, vec!["user", "git", "pulse"]);
    assert!(effective.flag("user"));

    let script = composition.dockerfile();
    let user_at = script.find("# Snippet from extension [user]").unwrap();
    let pulse_at = script.find("# Snippet from extension [pulse]").unwrap();
    assert!(user_at < pulse_at);
    assert!(script.contains("USER alice"));
    assert!(composition.run_args.contains_pair("--group-add", "audio"));
}

#[rstest]
#[case(vec!["network", "ipc", "user"])]
#[case(vec!["user", "network", "ipc"])]
#[case(vec!["ipc", "user", "network"])]
fn test_selection_order_does_not_matter(#[case] keys: Vec<&str>) {
    let mut cliargs = CliArgs::new();
    for key in keys {
        match key {
            "user" => cliargs.insert(key, true),
            _ => cliargs.insert(key, "host"),
        }
    }
    let (composition, _) = compose_active(&test_registry(), "ubuntu:22.04", &cliargs).unwrap();
    assert_eq!(composition.extensions, vec!["ipc", "network", "user"]);
}

#[test]
fn test_disabled_requirement_contributes_nothing() {
    let cliargs = CliArgs::new().with("pulse", true).with("user", false);
    let (composition, effective) =
        compose_active(&test_registry(), "ubuntu:22.04", &cliargs).unwrap();
    assert_eq!(composition.extensions, vec!["user", "pulse"]);
    assert!(!composition.dockerfile().contains("USER alice"));
    assert!(!effective.flag("user"));
}

#[test]
fn test_blacklisted_requirement_is_error() {
    let registry = test_registry().with_blacklist(["user"]);
    let cliargs = CliArgs::new().with("pulse", true);
    let err = compose_active(&registry, "ubuntu:22.04", &cliargs).unwrap_err();
    assert!(matches!(err, Error::Resolution(_)));
    assert!(err.is_pre_engine());
}

#[test]
fn test_invalid_value_fails_before_engine() {
    let cliargs = CliArgs::new().with("memory", "lots");
    let err = compose_active(&test_registry(), "ubuntu:22.04", &cliargs).unwrap_err();
    assert!(matches!(err, Error::Composition { ref extension, .. } if extension == "memory_limits"));
    assert!(err.is_pre_engine());
}

#[test]
fn test_defaults_file_feeds_composition() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(".rocker.toml"),
        "image = \"debian:bookworm\"\n\n[args]\nshm-size-build = \"1g\"\nvolume = [[\"/data:/data:ro\"]]\n",
    )
    .unwrap();

    let defaults = ConfigResolver::with_global_config_dir(temp.path(), temp.path().join("global"))
        .resolve()
        .unwrap();
    let image = defaults.image.clone().unwrap();
    let (composition, _) = compose_active(&test_registry(), &image, &defaults.args).unwrap();

    assert!(composition.dockerfile().starts_with("FROM debian:bookworm\n"));
    assert_eq!(composition.build_args.get("shm_size").map(String::as_str), Some("1g"));
    assert!(composition.run_args.contains_pair("-v", "/data:/data:ro"));
}

#[test]
fn test_full_lifecycle() {
    let cliargs = CliArgs::new()
        .with("user", true)
        .with("home", true)
        .with("network", "host");
    let (composition, _) = compose_active(&test_registry(), "ubuntu:22.04", &cliargs).unwrap();

    let mut generator = ImageGenerator::new(RecordingEngine::new().with_exit_code(3), composition);
    let options = BuildOptions {
        tag: Some("rocker:test".to_string()),
        ..BuildOptions::default()
    };
    generator.build(&options).unwrap();
    let code = generator
        .run(&RunOptions {
            command: vec!["id".to_string()],
            ..RunOptions::default()
        })
        .unwrap();
    generator.clear_image().unwrap();

    assert_eq!(code, 3);
    assert_eq!(generator.state(), GeneratorState::Cleaned);

    let calls = generator.engine().calls();
    assert_eq!(calls.len(), 3);
    match &calls[0] {
        EngineCall::Build { dockerfile, tag, .. } => {
            assert!(dockerfile.contains(&format!("--uid \"{}\"", test_host().uid)));
            assert_eq!(tag.as_deref(), Some("rocker:test"));
        }
        other => panic!("expected build, got {other:?}"),
    }
    match &calls[1] {
        EngineCall::Run { image, args, command, .. } => {
            assert_eq!(image, "sha256:fake1");
            assert_eq!(
                args,
                &vec!["-v", "/home/alice:/home/alice", "--network", "host"]
            );
            assert_eq!(command, &vec!["id".to_string()]);
        }
        other => panic!("expected run, got {other:?}"),
    }
    assert_eq!(calls[2], EngineCall::RemoveImage("sha256:fake1".to_string()));
}
