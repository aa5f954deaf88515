//! Substitution-only template rendering for extension snippets.
//!
//! Templates reference variables as `@(name)`; `@@` renders a literal `@`.
//! Rendering fails on any variable missing from the substitution map. A
//! [`Renderer`] is an explicit value owning its template table, there is no
//! process-wide state.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Variable name to replacement text.
pub type Substitutions = BTreeMap<String, String>;

/// Errors raised while rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("template '{template}' references undefined variable '{variable}'")]
    Undefined { template: String, variable: String },

    #[error("unknown template: {0}")]
    UnknownTemplate(String),
}

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@@|@\(([A-Za-z_][A-Za-z0-9_]*)\)").expect("Invalid placeholder regex")
});

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "dev_helpers_snippet",
        include_str!("../templates/dev_helpers_snippet.Dockerfile"),
    ),
    ("nvidia_snippet", include_str!("../templates/nvidia_snippet.Dockerfile")),
    ("pulse_snippet", include_str!("../templates/pulse_snippet.Dockerfile")),
    ("user_snippet", include_str!("../templates/user_snippet.Dockerfile")),
    (
        "user_groups_snippet",
        include_str!("../templates/user_groups_snippet.Dockerfile"),
    ),
];

/// Render `text` against `subs`. `name` only labels errors.
pub fn render_str(name: &str, text: &str, subs: &Substitutions) -> Result<String, RenderError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in PLACEHOLDER_REGEX.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        match caps.get(1) {
            None => out.push('@'),
            Some(var) => {
                let value = subs.get(var.as_str()).ok_or_else(|| RenderError::Undefined {
                    template: name.to_string(),
                    variable: var.as_str().to_string(),
                })?;
                out.push_str(value);
            }
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// A table of named templates.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    templates: BTreeMap<String, String>,
}

impl Renderer {
    /// An empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer loaded with the templates shipped with the built-in extensions.
    pub fn builtin() -> Self {
        let mut renderer = Self::new();
        for (name, text) in BUILTIN_TEMPLATES {
            renderer.register(*name, *text);
        }
        renderer
    }

    pub fn register(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn render(&self, name: &str, subs: &Substitutions) -> Result<String, RenderError> {
        let text = self
            .templates
            .get(name)
            .ok_or_else(|| RenderError::UnknownTemplate(name.to_string()))?;
        render_str(name, text, subs)
    }
}

/// Build a [`Substitutions`] map from string pairs.
pub fn substitutions<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Substitutions {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_substitutes_variables() {
        let subs = substitutions([("name", "dev".to_string()), ("uid", "1000".to_string())]);
        let out = render_str("t", "USER @(name) # @(uid)", &subs).unwrap();
        assert_eq!(out, "USER dev # 1000");
    }

    #[test]
    fn test_double_at_is_literal() {
        let out = render_str("t", "mail me@@host", &Substitutions::new()).unwrap();
        assert_eq!(out, "mail me@host");
    }

    #[test]
    fn test_undefined_variable_fails() {
        let err = render_str("snippet", "USER @(name)", &Substitutions::new()).unwrap_err();
        assert_eq!(
            err,
            RenderError::Undefined {
                template: "snippet".to_string(),
                variable: "name".to_string(),
            }
        );
    }

    #[test]
    fn test_shell_syntax_passes_through() {
        let text = "RUN x=`id -u` && echo \"${x}\" $(whoami)";
        let out = render_str("t", text, &Substitutions::new()).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_builtin_templates_registered() {
        let renderer = Renderer::builtin();
        assert!(renderer.contains("user_snippet"));
        assert!(renderer.contains("pulse_snippet"));
        assert!(matches!(
            renderer.render("missing", &Substitutions::new()),
            Err(RenderError::UnknownTemplate(_))
        ));
    }
}
