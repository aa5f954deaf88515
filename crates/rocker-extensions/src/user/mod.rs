//! The `user` extension: remap an in-image account onto the invoking user.
//!
//! The snippet is generated from an [`IdentityRecord`]. All collision
//! handling happens in the emitted shell at build time, against the image's
//! real account table:
//!
//! | found at target uid   | emitted action                                     |
//! |-----------------------|----------------------------------------------------|
//! | nothing               | `useradd` with the target uid/gid/name/shell/home  |
//! | the target name       | `usermod` adjusting gid, home and shell only       |
//! | a different name      | `userdel -r` + `useradd`, or with preserve-home a   |
//! |                       | `usermod -l` rename that keeps the home contents   |
//!
//! Every branch re-creates the target group after its deletions and before
//! the account is added or modified.

mod identity;

pub use identity::{CollisionOutcome, HostIdentity, IdentityRecord};

use crate::cliargs::CliArgs;
use crate::error::Result;
use crate::extension::{ArgKind, ArgumentSpec, Extension};
use crate::template::{Renderer, substitutions};

/// Marker emitted in the snippet when missing groups are tolerated.
pub const PERMISSIVE_MARKER: &str = "user-preserve-group-permissive Enabled";

const CONTINUATION: &str = " \\\n";

/// Maps the invoking user into the image.
#[derive(Debug, Clone)]
pub struct UserExtension {
    host: HostIdentity,
}

impl UserExtension {
    pub const NAME: &'static str = "user";

    /// Capture the current process's identity.
    pub fn new() -> Result<Self> {
        Ok(Self::with_identity(HostIdentity::current()?))
    }

    pub fn with_identity(host: HostIdentity) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    /// The identity record this extension would use for `cliargs`.
    pub fn identity(&self, cliargs: &CliArgs) -> Result<IdentityRecord> {
        IdentityRecord::resolve(&self.host, cliargs)
    }

    /// Render the account-mapping script for `record`.
    pub fn render_snippet(&self, record: &IdentityRecord) -> Result<String> {
        let renderer = Renderer::builtin();

        let mut subs = substitutions([
            ("uid", record.uid.to_string()),
            ("gid", record.gid.to_string()),
            ("name", record.name.clone()),
            ("group", record.group.clone()),
            ("home", record.home.clone()),
            ("home_block", home_block(record)),
        ]);
        for outcome in CollisionOutcome::ALL {
            subs.insert(
                outcome.template_key().to_string(),
                collision_branch(outcome, record),
            );
        }

        let groups_block = match &record.preserve_groups {
            None => String::new(),
            Some(groups) => renderer.render(
                "user_groups_snippet",
                &substitutions([
                    ("name", record.name.clone()),
                    ("groups", groups.join(" ")),
                    ("marker", permissive_marker(record)),
                    ("missing_group", missing_group_action(record)),
                ]),
            )?,
        };
        subs.insert("groups_block".to_string(), groups_block);

        Ok(renderer.render("user_snippet", &subs)?)
    }
}

impl Extension for UserExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn register_arguments(&self, defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::flag(
                "user",
                "mount the current user's id and run as that user",
            ),
            ArgumentSpec::flag(
                "user_preserve_home",
                "do not delete the home directory of an account being replaced",
            ),
            ArgumentSpec::value(
                "user_override_name",
                "override the current user's name",
            )
            .with_default_from(defaults),
            ArgumentSpec::new(
                "user_preserve_groups",
                ArgKind::Values,
                "add the user to these groups, or to all of the host user's groups when none are given",
            ),
            ArgumentSpec::flag(
                "user_preserve_groups_permissive",
                "skip preserved groups that do not exist in the image instead of failing",
            ),
            ArgumentSpec::value(
                "user_override_shell",
                "override the user's shell; an empty value leaves the shell unset",
            )
            .with_default_from(defaults),
        ]
    }

    fn snippet(&self, cliargs: &CliArgs) -> Result<String> {
        if !self.is_active(cliargs) {
            return Ok(String::new());
        }
        let record = self.identity(cliargs)?;
        self.render_snippet(&record)
    }
}

fn shell_flag(record: &IdentityRecord) -> String {
    match &record.shell {
        Some(shell) => format!(" -s {shell}"),
        None => String::new(),
    }
}

fn useradd(record: &IdentityRecord) -> String {
    format!(
        "useradd --no-log-init --no-create-home --uid \"{uid}\"{shell} -c \"{gecos}\" -g \"{gid}\" -d \"{home}\" \"{name}\"",
        uid = record.uid,
        shell = shell_flag(record),
        gecos = record.gecos,
        gid = record.gid,
        home = record.home,
        name = record.name,
    )
}

/// Delete account `name`, tolerating a failed home removal but not a
/// surviving account.
fn remove_account(name: &str) -> String {
    format!("{{ userdel -r \"{name}\" || true; }} && ! getent passwd \"{name}\" >/dev/null")
}

/// Remove another account that already uses the target name.
fn evict_name_holder(record: &IdentityRecord) -> String {
    let remove = if record.preserve_home {
        format!("userdel \"{}\"", record.name)
    } else {
        remove_account(&record.name)
    };
    format!(
        "if getent passwd \"{}\" >/dev/null; then {}; fi",
        record.name, remove
    )
}

/// Make sure a group holds the target gid. Runs after every `userdel`,
/// which may take a same-named primary group with it.
fn ensure_group(record: &IdentityRecord) -> String {
    format!(
        "{{ getent group \"{gid}\" >/dev/null || \
         if getent group \"{group}\" >/dev/null; then groupmod -g \"{gid}\" \"{group}\"; \
         else groupadd -g \"{gid}\" \"{group}\"; fi; }}",
        gid = record.gid,
        group = record.group,
    )
}

/// Shell commands for one collision case, as continuation lines.
fn collision_branch(outcome: CollisionOutcome, record: &IdentityRecord) -> String {
    let steps: Vec<String> = match outcome {
        CollisionOutcome::NoUserAtUid => vec![
            evict_name_holder(record),
            ensure_group(record),
            useradd(record),
        ],
        CollisionOutcome::SameNameAtUid => vec![
            ensure_group(record),
            format!(
                "usermod -g \"{gid}\" -d \"{home}\"{shell} \"{name}\"",
                gid = record.gid,
                home = record.home,
                shell = shell_flag(record),
                name = record.name,
            ),
        ],
        CollisionOutcome::DifferentNameAtUid if record.preserve_home => vec![
            evict_name_holder(record),
            ensure_group(record),
            format!(
                "if [ -e \"{home}\" ]; then move_home=\"\"; else move_home=\"-m\"; fi",
                home = record.home
            ),
            format!(
                "usermod -l \"{name}\" -g \"{gid}\" -d \"{home}\" ${{move_home}}{shell} \"${{existing_user_by_uid}}\"",
                name = record.name,
                gid = record.gid,
                home = record.home,
                shell = shell_flag(record),
            ),
            format!(
                "mkdir -p \"{home}\" && chown -R \"{uid}:{gid}\" \"{home}\"",
                home = record.home,
                uid = record.uid,
                gid = record.gid,
            ),
        ],
        CollisionOutcome::DifferentNameAtUid => vec![
            evict_name_holder(record),
            remove_account("${existing_user_by_uid}"),
            ensure_group(record),
            useradd(record),
        ],
    };

    let mut branch = String::new();
    let last = steps.len() - 1;
    for (i, step) in steps.iter().enumerate() {
        branch.push_str("      ");
        branch.push_str(step);
        branch.push_str(if i == last { ";" } else { " &&" });
        branch.push_str(CONTINUATION);
    }
    branch.truncate(branch.len() - 1);
    branch
}

fn home_block(record: &IdentityRecord) -> String {
    if record.home_mounted {
        return String::new();
    }
    format!(
        "\n# Making sure a home directory exists if we haven't mounted the user's home directory explicitly\n\
         RUN mkdir -p \"$(dirname \"{home}\")\" && mkhomedir_helper {name}\n",
        home = record.home,
        name = record.name,
    )
}

fn permissive_marker(record: &IdentityRecord) -> String {
    if record.permissive_groups {
        format!("# {PERMISSIVE_MARKER}: groups missing from the image are skipped\n")
    } else {
        String::new()
    }
}

fn missing_group_action(record: &IdentityRecord) -> String {
    let action = if record.permissive_groups {
        format!("        echo \"{PERMISSIVE_MARKER}: skipping missing group ${{grp}}\";{CONTINUATION}")
    } else {
        format!("        echo \"group ${{grp}} does not exist in the image\" >&2 && exit 1;{CONTINUATION}")
    };
    action.trim_end_matches('\n').to_string()
}
