//! Invoking-user identity and the record derived from it per invocation.

use crate::cliargs::CliArgs;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Account names, group names and shell paths are spliced into shell text
/// unquoted, so only this alphabet is accepted.
static SAFE_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._/+-]*$").expect("Invalid token regex"));

/// The identity of the process invoking rocker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub uid: u32,
    pub gid: u32,
    pub name: String,
    /// Primary group name.
    pub group: String,
    pub home: String,
    pub shell: String,
    pub gecos: String,
    /// Supplementary group names.
    pub groups: Vec<String>,
}

impl HostIdentity {
    /// Look up the current process's identity in the host account database.
    pub fn current() -> Result<Self> {
        use nix::unistd::{Group, User, getgid, getuid};

        let uid = getuid();
        let gid = getgid();
        let user = User::from_uid(uid)
            .map_err(|e| Error::Identity(e.to_string()))?
            .ok_or_else(|| Error::Identity(format!("no passwd entry for uid {uid}")))?;
        let group = Group::from_gid(gid)
            .map_err(|e| Error::Identity(e.to_string()))?
            .map(|g| g.name)
            .unwrap_or_else(|| user.name.clone());

        Ok(Self {
            uid: uid.as_raw(),
            gid: gid.as_raw(),
            group,
            home: user.dir.to_string_lossy().into_owned(),
            shell: user.shell.to_string_lossy().into_owned(),
            gecos: user.gecos.to_string_lossy().into_owned(),
            groups: supplementary_groups(),
            name: user.name,
        })
    }
}

#[cfg(target_os = "linux")]
fn supplementary_groups() -> Vec<String> {
    use nix::unistd::{Group, getgroups};

    let gids = match getgroups() {
        Ok(gids) => gids,
        Err(e) => {
            tracing::warn!("Failed to list supplementary groups: {}", e);
            return Vec::new();
        }
    };
    let mut names: Vec<String> = gids
        .into_iter()
        .filter_map(|gid| Group::from_gid(gid).ok().flatten())
        .map(|g| g.name)
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(not(target_os = "linux"))]
fn supplementary_groups() -> Vec<String> {
    Vec::new()
}

/// What the build finds at the target uid inside the image.
///
/// The generated script branches over all three at build time; the
/// extension never inspects the image itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionOutcome {
    /// No account holds the target uid.
    NoUserAtUid,
    /// The account at the target uid already has the target name.
    SameNameAtUid,
    /// Another account name occupies the target uid.
    DifferentNameAtUid,
}

impl CollisionOutcome {
    pub const ALL: [CollisionOutcome; 3] = [
        CollisionOutcome::NoUserAtUid,
        CollisionOutcome::SameNameAtUid,
        CollisionOutcome::DifferentNameAtUid,
    ];

    /// Template variable holding this outcome's shell branch.
    pub fn template_key(self) -> &'static str {
        match self {
            Self::NoUserAtUid => "no_user_branch",
            Self::SameNameAtUid => "same_name_branch",
            Self::DifferentNameAtUid => "different_name_branch",
        }
    }
}

/// Target account for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub uid: u32,
    pub gid: u32,
    pub name: String,
    pub group: String,
    pub home: String,
    /// `None` leaves the shell to `useradd`.
    pub shell: Option<String>,
    pub gecos: String,
    /// `None` when supplementary groups are left alone.
    pub preserve_groups: Option<Vec<String>>,
    pub preserve_home: bool,
    pub permissive_groups: bool,
    /// The host home is bind-mounted, so no home is created in the image.
    pub home_mounted: bool,
}

impl IdentityRecord {
    /// Combine the host identity with configuration overrides.
    pub fn resolve(host: &HostIdentity, cliargs: &CliArgs) -> Result<Self> {
        let override_name = cliargs.non_empty("user_override_name");
        let name = override_name.unwrap_or(&host.name).to_string();
        check_token("user_override_name", &name)?;

        let (group, home) = match override_name {
            Some(n) => (n.to_string(), format!("/home/{n}")),
            None => (host.group.clone(), host.home.clone()),
        };
        check_token("group", &group)?;
        check_path("home", &home)?;

        let shell = match cliargs.string("user_override_shell") {
            Some("") => None,
            Some(s) => Some(s.to_string()),
            None if host.shell.is_empty() => None,
            None => Some(host.shell.clone()),
        };
        if let Some(s) = &shell {
            if s.starts_with('/') {
                check_path("user_override_shell", s)?;
            } else {
                check_token("user_override_shell", s)?;
            }
        }

        let permissive_groups = cliargs.flag("user_preserve_groups_permissive");
        let preserve_groups = match cliargs.get("user_preserve_groups") {
            None if !permissive_groups => None,
            requested => {
                let explicit = requested.map(|v| v.to_list()).unwrap_or_default();
                let mut groups = if explicit.is_empty() {
                    host.groups.clone()
                } else {
                    explicit
                };
                dedup_in_order(&mut groups);
                for g in &groups {
                    check_token("user_preserve_groups", g)?;
                }
                Some(groups)
            }
        };

        Ok(Self {
            uid: host.uid,
            gid: host.gid,
            name,
            group,
            home,
            shell,
            gecos: sanitize_gecos(&host.gecos),
            preserve_groups,
            preserve_home: cliargs.flag("user_preserve_home"),
            permissive_groups,
            home_mounted: cliargs.flag("home"),
        })
    }
}

fn check_token(key: &str, value: &str) -> Result<()> {
    if SAFE_TOKEN_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(Error::invalid(key, format!("'{value}' contains unsupported characters")))
    }
}

fn check_path(key: &str, value: &str) -> Result<()> {
    if value.starts_with('/') && SAFE_TOKEN_REGEX.is_match(&value[1..]) {
        Ok(())
    } else {
        Err(Error::invalid(key, format!("'{value}' is not a plain absolute path")))
    }
}

fn sanitize_gecos(gecos: &str) -> String {
    gecos
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | '`' | '$' | ':' | '\n'))
        .collect()
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn host() -> HostIdentity {
        HostIdentity {
            uid: 1000,
            gid: 1000,
            name: "alice".to_string(),
            group: "alice".to_string(),
            home: "/home/alice".to_string(),
            shell: "/bin/bash".to_string(),
            gecos: "Alice \"A\" Liddell,,,".to_string(),
            groups: vec!["audio".to_string(), "docker".to_string()],
        }
    }

    #[test]
    fn test_defaults_follow_host() {
        let record = IdentityRecord::resolve(&host(), &CliArgs::new()).unwrap();
        assert_eq!(record.name, "alice");
        assert_eq!(record.home, "/home/alice");
        assert_eq!(record.shell.as_deref(), Some("/bin/bash"));
        assert_eq!(record.gecos, "Alice A Liddell,,,");
        assert_eq!(record.preserve_groups, None);
    }

    #[test]
    fn test_name_override_moves_home() {
        let args = CliArgs::new().with("user_override_name", "bob");
        let record = IdentityRecord::resolve(&host(), &args).unwrap();
        assert_eq!(record.name, "bob");
        assert_eq!(record.group, "bob");
        assert_eq!(record.home, "/home/bob");
    }

    #[test]
    fn test_empty_shell_override_omits_shell() {
        let args = CliArgs::new().with("user_override_shell", "");
        let record = IdentityRecord::resolve(&host(), &args).unwrap();
        assert_eq!(record.shell, None);
    }

    #[test]
    fn test_empty_preserve_groups_uses_host_groups() {
        let args = CliArgs::new().with("user_preserve_groups", Vec::<String>::new());
        let record = IdentityRecord::resolve(&host(), &args).unwrap();
        assert_eq!(
            record.preserve_groups,
            Some(vec!["audio".to_string(), "docker".to_string()])
        );
    }

    #[test]
    fn test_explicit_preserve_groups_replace_host_groups() {
        let args = CliArgs::new().with("user_preserve_groups", vec!["cdrom", "audio", "cdrom"]);
        let record = IdentityRecord::resolve(&host(), &args).unwrap();
        assert_eq!(
            record.preserve_groups,
            Some(vec!["cdrom".to_string(), "audio".to_string()])
        );
    }

    #[test]
    fn test_permissive_implies_preservation() {
        let args = CliArgs::new().with("user_preserve_groups_permissive", true);
        let record = IdentityRecord::resolve(&host(), &args).unwrap();
        assert!(record.permissive_groups);
        assert_eq!(record.preserve_groups.map(|g| g.len()), Some(2));
    }

    #[test]
    fn test_unsafe_override_name_rejected() {
        let args = CliArgs::new().with("user_override_name", "bob; rm -rf /");
        let err = IdentityRecord::resolve(&host(), &args).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_collision_outcomes_have_distinct_keys() {
        let keys: std::collections::HashSet<_> = CollisionOutcome::ALL
            .iter()
            .map(|o| o.template_key())
            .collect();
        assert_eq!(keys.len(), 3);
    }
}
