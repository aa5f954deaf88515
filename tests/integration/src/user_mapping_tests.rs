//! Account remapping scenarios for the `user` extension, composed through
//! the full pipeline.

use pretty_assertions::assert_eq;
use rocker_core::compose_active;
use rocker_extensions::CliArgs;
use rocker_extensions::user::PERMISSIVE_MARKER;
use rocker_test_utils::test_registry;
use rstest::rstest;

fn script(cliargs: &CliArgs) -> String {
    compose_active(&test_registry(), "ubuntu:22.04", cliargs)
        .unwrap()
        .0
        .dockerfile()
}

#[rstest]
#[case(false, true)]
#[case(true, false)]
fn test_userdel_recursive_iff_home_not_preserved(#[case] preserve_home: bool, #[case] expect_recursive: bool) {
    let mut cliargs = CliArgs::new().with("user", true);
    if preserve_home {
        cliargs.insert("user_preserve_home", true);
    }
    assert_eq!(script(&cliargs).contains("userdel -r"), expect_recursive);
}

#[test]
fn test_permissive_groups_with_empty_list() {
    let cliargs = CliArgs::new()
        .with("user", true)
        .with("user_preserve_groups", Vec::<String>::new())
        .with("user_preserve_groups_permissive", true);
    let text = script(&cliargs);
    assert!(text.contains(PERMISSIVE_MARKER));
    assert!(text.contains("usermod -aG"));
    assert!(text.contains("audio video"));
}

#[test]
fn test_no_groups_without_key() {
    let text = script(&CliArgs::new().with("user", true));
    assert!(!text.contains("usermod -aG"));
    assert!(!text.contains(PERMISSIVE_MARKER));
}

#[test]
fn test_name_override_moves_home() {
    let text = script(&CliArgs::new().with("user", true).with("user_override_name", "bob"));
    assert!(text.contains("USER bob"));
    assert!(text.contains("WORKDIR /home/bob"));
}

#[test]
fn test_empty_shell_override_drops_shell_flag() {
    let text = script(&CliArgs::new().with("user", true).with("user_override_shell", ""));
    assert!(!text.contains(" -s "));

    let default = script(&CliArgs::new().with("user", true));
    assert!(default.contains(" -s /bin/bash"));
}

#[test]
fn test_script_is_reproducible() {
    let cliargs = CliArgs::new()
        .with("user", true)
        .with("user_preserve_groups", vec!["audio"])
        .with("home", true);
    assert_eq!(script(&cliargs), script(&cliargs));
}
