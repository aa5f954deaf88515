//! Registry of known extensions and resolution of requested sets.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::builtins;
use crate::cliargs::{CliArgs, normalize_key};
use crate::dependency::DependencyGraph;
use crate::error::{Error, Result};
use crate::extension::Extension;

/// Constructor for a built-in extension.
///
/// Constructors may inspect the host (identity, home directory) and can
/// therefore fail.
pub type ExtensionFactory = fn() -> Result<Box<dyn Extension>>;

/// A built-in extension registration.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionEntry {
    /// Extension name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    pub factory: ExtensionFactory,
}

/// Registry of instantiated extensions, keyed by name.
///
/// Extensions are instantiated once per registry, which is meant to live
/// for a single invocation.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: BTreeMap<String, Box<dyn Extension>>,
    descriptions: BTreeMap<String, String>,
    blacklist: BTreeSet<String>,
    failures: Vec<Error>,
}

impl ExtensionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry populated with every built-in extension.
    ///
    /// An extension whose constructor fails is logged and skipped; the
    /// rest of the registry is still usable.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for entry in builtins::builtin_entries() {
            registry.register_entry(entry);
        }
        registry
    }

    /// Instantiate and register an entry, recording a failure instead of
    /// returning it.
    pub fn register_entry(&mut self, entry: ExtensionEntry) {
        match (entry.factory)() {
            Ok(ext) => {
                self.descriptions
                    .insert(ext.name().to_string(), entry.description.to_string());
                self.register(ext);
            }
            Err(e) => {
                warn!("Skipping extension '{}': {}", entry.name, e);
                self.failures.push(Error::Registration {
                    name: entry.name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Register an extension instance, replacing one with the same name.
    pub fn register(&mut self, extension: Box<dyn Extension>) {
        self.entries
            .insert(extension.name().to_string(), extension);
    }

    /// Exclude names from resolution.
    pub fn with_blacklist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blacklist
            .extend(names.into_iter().map(|n| normalize_key(n.as_ref())));
        self
    }

    /// Look up an extension by name, in either hyphen or underscore form.
    pub fn get(&self, name: &str) -> Option<&dyn Extension> {
        self.entries.get(&normalize_key(name)).map(|e| e.as_ref())
    }

    /// Check if an extension is known.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_key(name))
    }

    /// List all registered extension names (sorted).
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate over all registered extensions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        self.entries.values().map(|e| e.as_ref())
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.descriptions.get(&normalize_key(name)).map(|s| s.as_str())
    }

    /// Registration failures collected while populating the registry.
    pub fn failures(&self) -> &[Error] {
        &self.failures
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the registered extensions the configuration selects.
    pub fn active_names(&self, cliargs: &CliArgs) -> Vec<&str> {
        self.iter()
            .filter(|ext| ext.is_active(cliargs))
            .map(|ext| ext.name())
            .collect()
    }

    /// Expand `requested` with every transitively required extension and
    /// return the set in application order.
    ///
    /// Duplicate requests collapse. Blacklisted names in `requested` are
    /// dropped; a blacklisted name reached as a requirement is an error.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownExtension` for a requested name not in the registry
    /// - `Error::MissingDependency` for a required name not in the registry
    /// - `Error::Blacklisted` for a required name on the blacklist
    /// - `Error::DependencyCycle` if requirements form a cycle
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<&dyn Extension>> {
        let mut stack: Vec<(String, Option<String>)> = Vec::new();
        for name in requested {
            let name = normalize_key(name.as_ref());
            if self.blacklist.contains(&name) {
                info!("Extension '{}' is blacklisted, not applying it", name);
                continue;
            }
            stack.push((name, None));
        }

        let mut selected: BTreeMap<String, &dyn Extension> = BTreeMap::new();
        while let Some((name, required_by)) = stack.pop() {
            if selected.contains_key(&name) {
                continue;
            }
            if let Some(parent) = &required_by {
                if self.blacklist.contains(&name) {
                    return Err(Error::Blacklisted {
                        name,
                        required_by: parent.clone(),
                    });
                }
            }
            let ext = match (self.get(&name), required_by) {
                (Some(ext), _) => ext,
                (None, None) => return Err(Error::UnknownExtension(name)),
                (None, Some(parent)) => {
                    return Err(Error::MissingDependency {
                        name,
                        required_by: parent,
                    });
                }
            };
            for dep in ext.required_extensions() {
                let dep = normalize_key(dep);
                if !selected.contains_key(&dep) {
                    debug!("Extension '{}' requires '{}'", name, dep);
                    stack.push((dep, Some(name.clone())));
                }
            }
            selected.insert(name, ext);
        }

        let order = DependencyGraph::from_extensions(selected.values().copied()).topological_sort()?;
        Ok(order
            .iter()
            .filter_map(|name| selected.get(name).copied())
            .collect())
    }
}

/// A requirement the configuration explicitly switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisabledRequirement {
    pub dependent: &'static str,
    pub requirement: &'static str,
}

/// Select every extension pulled in as a requirement of a resolved one.
///
/// A key the configuration already holds is left untouched, so an explicit
/// `false` still wins. Each requirement left off that way is warned about
/// and returned.
pub fn activate_requirements(
    resolved: &[&dyn Extension],
    cliargs: &mut CliArgs,
) -> Vec<DisabledRequirement> {
    let mut disabled = Vec::new();
    for ext in resolved {
        for dep in ext.required_extensions() {
            if !cliargs.contains(dep) {
                debug!("Activating '{}' required by '{}'", dep, ext.name());
                cliargs.insert(dep, true);
            } else if !cliargs.flag(dep) {
                warn!(
                    "'{}' requires '{}', which the configuration disables; '{}' contributes nothing",
                    ext.name(),
                    dep,
                    dep
                );
                disabled.push(DisabledRequirement {
                    dependent: ext.name(),
                    requirement: dep,
                });
            }
        }
    }
    disabled
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.names())
            .field("blacklist", &self.blacklist)
            .field("failures", &self.failures.len())
            .finish()
    }
}
