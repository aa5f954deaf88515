//! Merge the contributions of an ordered extension set.
//!
//! [`compose`] queries every extension once per contribution kind, in the
//! order given, and either returns a complete [`Composition`] or the first
//! failure. Nothing partial escapes.

use std::fmt;

use rocker_extensions::{BuildArgs, CliArgs, ContextFiles, Extension};
use tracing::debug;

use crate::error::{Error, Result};

/// One attributed block of build-script text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub extension: String,
    pub content: String,
}

/// Build script: the base image directive, then preambles, then snippets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildScript {
    pub base_image: String,
    pub preambles: Vec<Block>,
    pub snippets: Vec<Block>,
}

impl BuildScript {
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            preambles: Vec::new(),
            snippets: Vec::new(),
        }
    }

    /// Render the script text.
    ///
    /// Blocks are separated by exactly one blank line and each carries a
    /// comment naming the extension that emitted it.
    pub fn render(&self) -> String {
        let mut out = format!("FROM {}\n", self.base_image);
        let sections = [("Preamble", &self.preambles), ("Snippet", &self.snippets)];
        for (kind, blocks) in sections {
            for block in blocks {
                out.push('\n');
                out.push_str(&format!("# {} from extension [{}]\n", kind, block.extension));
                out.push_str(block.content.trim_end_matches('\n'));
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for BuildScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// The tokens one extension contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentGroup {
    pub extension: String,
    pub tokens: Vec<String>,
}

/// Ordered run-phase arguments, grouped by extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSequence {
    groups: Vec<ArgumentGroup>,
}

impl ArgumentSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group; an empty token list adds nothing.
    pub fn push(&mut self, extension: impl Into<String>, tokens: Vec<String>) {
        if tokens.is_empty() {
            return;
        }
        self.groups.push(ArgumentGroup {
            extension: extension.into(),
            tokens,
        });
    }

    pub fn groups(&self) -> &[ArgumentGroup] {
        &self.groups
    }

    /// All tokens in order.
    pub fn tokens(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|g| g.tokens.iter().cloned())
            .collect()
    }

    /// Whether `token` appears immediately followed by `value`.
    pub fn contains_pair(&self, token: &str, value: &str) -> bool {
        self.tokens()
            .windows(2)
            .any(|pair| pair[0] == token && pair[1] == value)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl fmt::Display for ArgumentSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(self.tokens()))
    }
}

/// Everything an ordered extension set contributes to one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub script: BuildScript,
    pub build_args: BuildArgs,
    pub run_args: ArgumentSequence,
    /// Auxiliary build-context files.
    pub files: ContextFiles,
    /// Extension names in application order.
    pub extensions: Vec<String>,
}

impl Composition {
    /// Build-script text.
    pub fn dockerfile(&self) -> String {
        self.script.render()
    }
}

fn failed(ext: &dyn Extension) -> impl FnOnce(rocker_extensions::Error) -> Error + '_ {
    move |source| Error::Composition {
        extension: ext.name().to_string(),
        source,
    }
}

/// Merge the contributions of `extensions`, which must already be in
/// application order.
///
/// Build args are merged last-writer-wins. Two extensions providing the
/// same context file is an error.
pub fn compose(
    base_image: &str,
    extensions: &[&dyn Extension],
    cliargs: &CliArgs,
) -> Result<Composition> {
    let mut script = BuildScript::new(base_image);
    let mut build_args = BuildArgs::new();
    let mut arg_owner: std::collections::BTreeMap<String, &str> = Default::default();
    let mut run_args = ArgumentSequence::new();
    let mut files = ContextFiles::new();
    let mut file_owner: std::collections::BTreeMap<String, &str> = Default::default();

    for &ext in extensions {
        let name = ext.name();

        let preamble = ext.preamble(cliargs).map_err(failed(ext))?;
        if !preamble.trim().is_empty() {
            script.preambles.push(Block {
                extension: name.to_string(),
                content: preamble,
            });
        }

        let snippet = ext.snippet(cliargs).map_err(failed(ext))?;
        if !snippet.trim().is_empty() {
            script.snippets.push(Block {
                extension: name.to_string(),
                content: snippet,
            });
        }

        for (key, value) in ext.build_args(cliargs).map_err(failed(ext))? {
            if let Some(previous) = arg_owner.insert(key.clone(), name) {
                debug!(
                    "Build arg '{}' from '{}' overrides the value from '{}'",
                    key, name, previous
                );
            }
            build_args.insert(key, value);
        }

        let fragment = ext.docker_args(cliargs).map_err(failed(ext))?;
        let tokens = shell_words::split(&fragment).map_err(|e| Error::Composition {
            extension: name.to_string(),
            source: rocker_extensions::Error::InvalidValue {
                key: "docker_args".to_string(),
                reason: e.to_string(),
            },
        })?;
        run_args.push(name, tokens);

        for (path, content) in ext.files(cliargs).map_err(failed(ext))? {
            if let Some(first) = file_owner.insert(path.clone(), name) {
                return Err(Error::FileCollision {
                    path,
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }
            files.insert(path, content);
        }
    }

    debug!(
        "Composed {} extensions: {} preambles, {} snippets, {} build args",
        extensions.len(),
        script.preambles.len(),
        script.snippets.len(),
        build_args.len()
    );

    Ok(Composition {
        script,
        build_args,
        run_args,
        files,
        extensions: extensions.iter().map(|e| e.name().to_string()).collect(),
    })
}
