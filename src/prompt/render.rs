//! Single-pass placeholder substitution.

use crate::error::ApiError;
use std::collections::BTreeMap;

/// Known prompt variables, each already resolved to its value or fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptVariables {
    values: BTreeMap<String, String>,
}

impl PromptVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable. Absent or blank values resolve to `fallback`.
    pub fn insert(&mut self, name: &str, value: Option<String>, fallback: &str) {
        let resolved = value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());
        self.values.insert(name.to_string(), resolved);
    }

    pub fn with(mut self, name: &str, value: Option<String>, fallback: &str) -> Self {
        self.insert(name, value, fallback);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A fully rendered prompt ready to send to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl RenderedPrompt {
    /// Audit form stored on the job as its source context.
    pub fn source_context(&self) -> String {
        format!("[system]\n{}\n\n[user]\n{}", self.system, self.user)
    }

    /// BLAKE3 digest of both messages, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.system.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.user.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }
}

/// Substitute every `{{name}}` in `text` with its value from `vars`.
///
/// Only identifier-shaped contents (`[A-Za-z_][A-Za-z0-9_]*`, surrounding
/// whitespace allowed) are placeholders; any other `{{` is copied through.
/// Substituted values are never re-scanned.
pub fn render(text: &str, vars: &PromptVariables) -> Result<String, ApiError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match parse_placeholder(after_open) {
            Some((name, consumed)) => {
                let value = vars
                    .get(name)
                    .ok_or_else(|| ApiError::UnknownTemplateVariable {
                        name: name.to_string(),
                    })?;
                out.push_str(value);
                rest = &after_open[consumed..];
            }
            None => {
                out.push_str("{{");
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        match parse_placeholder(after_open) {
            Some((name, consumed)) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
                rest = &after_open[consumed..];
            }
            None => rest = after_open,
        }
    }
    names
}

/// Returns the trimmed name and the byte length through the closing `}}`.
fn parse_placeholder(after_open: &str) -> Option<(&str, usize)> {
    let close = after_open.find("}}")?;
    let name = after_open[..close].trim();
    if is_identifier(name) {
        Some((name, close + 2))
    } else {
        None
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vars() -> PromptVariables {
        PromptVariables::new()
            .with("athleteName", Some("Ada".into()), "Unknown athlete")
            .with("goals", None, "None")
    }

    #[test]
    fn test_render_substitutes_values_and_fallbacks() {
        let out = render("Plan for {{athleteName}}. Goals: {{ goals }}.", &vars()).unwrap();
        assert_eq!(out, "Plan for Ada. Goals: None.");
    }

    #[test]
    fn test_blank_value_uses_fallback() {
        let vars = PromptVariables::new().with("notes", Some("   ".into()), "N/A");
        assert_eq!(vars.get("notes"), Some("N/A"));
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let err = render("Hello {{coachName}}", &vars()).unwrap_err();
        assert!(matches!(err, ApiError::UnknownTemplateVariable { name } if name == "coachName"));
    }

    #[test]
    fn test_non_identifier_braces_are_literal() {
        let out = render("JSON like {{\"a\": 1}} and {{ }} stays", &vars()).unwrap();
        assert_eq!(out, "JSON like {{\"a\": 1}} and {{ }} stays");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let vars = PromptVariables::new().with("x", Some("{{y}}".into()), "");
        assert_eq!(render("{{x}}", &vars).unwrap(), "{{y}}");
    }

    #[test]
    fn test_placeholders_are_distinct_and_ordered() {
        let names = placeholders("{{b}} {{a}} {{ b }} {{not valid}}");
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_digest_is_stable_and_sensitive() {
        let a = RenderedPrompt {
            system: "s".into(),
            user: "u".into(),
        };
        let b = RenderedPrompt {
            system: "su".into(),
            user: "".into(),
        };
        assert_eq!(a.digest(), a.clone().digest());
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    proptest! {
        #[test]
        fn prop_declared_variables_never_leave_placeholders(
            values in proptest::collection::vec(proptest::option::of("[a-z ]{0,12}"), 1..6),
            filler in "[a-z .,]{0,20}",
        ) {
            let mut vars = PromptVariables::new();
            let mut template = String::new();
            for (i, value) in values.iter().enumerate() {
                let name = format!("var{}", i);
                vars.insert(&name, value.clone(), "None");
                template.push_str(&filler);
                template.push_str(&format!("{{{{{}}}}}", name));
            }
            let out = render(&template, &vars).unwrap();
            prop_assert!(placeholders(&out).is_empty());
        }
    }
}
