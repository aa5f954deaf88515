//! Fixed host identities and a registry built from them.

use std::path::PathBuf;

use rocker_extensions::builtins::{
    CpuLimits, DevHelpers, Devices, Env, GitConfig, Home, MemoryLimits, Nvidia, Pulse, RunOption,
    ShmSize, SshAgent, Switch, Ulimit, Volume, X11,
};
use rocker_extensions::{ExtensionRegistry, HostIdentity, UserExtension};

/// A host user `alice` with uid/gid 1000 and two supplementary groups.
pub fn test_host() -> HostIdentity {
    HostIdentity {
        uid: 1000,
        gid: 1000,
        name: "alice".to_string(),
        group: "alice".to_string(),
        home: "/home/alice".to_string(),
        shell: "/bin/bash".to_string(),
        gecos: "Alice".to_string(),
        groups: vec!["audio".to_string(), "video".to_string()],
    }
}

/// Every built-in extension, constructed against [`test_host`] instead of
/// the real host.
pub fn test_registry() -> ExtensionRegistry {
    let host = test_host();
    let home = PathBuf::from(&host.home);
    let mut registry = ExtensionRegistry::new();
    registry.register(Box::new(CpuLimits));
    registry.register(Box::new(Switch::detach()));
    registry.register(Box::new(DevHelpers));
    registry.register(Box::new(Devices));
    registry.register(Box::new(Env));
    registry.register(Box::new(RunOption::expose()));
    registry.register(Box::new(GitConfig::with_paths(&home, "/nonexistent/gitconfig")));
    registry.register(Box::new(RunOption::group_add()));
    registry.register(Box::new(Home::with_home(&home)));
    registry.register(Box::new(RunOption::hostname()));
    registry.register(Box::new(RunOption::ipc()));
    registry.register(Box::new(MemoryLimits));
    registry.register(Box::new(RunOption::container_name()));
    registry.register(Box::new(RunOption::network()));
    registry.register(Box::new(Nvidia));
    registry.register(Box::new(RunOption::port()));
    registry.register(Box::new(Switch::privileged()));
    registry.register(Box::new(Pulse::with_uid(host.uid)));
    registry.register(Box::new(ShmSize));
    registry.register(Box::new(SshAgent::with_socket(None)));
    registry.register(Box::new(Ulimit));
    registry.register(Box::new(Volume::with_dirs(Some(home.clone()), PathBuf::from("/work"))));
    registry.register(Box::new(X11::with_session(Some(":0".to_string()), None)));
    registry.register(Box::new(UserExtension::with_identity(host)));
    registry
}
