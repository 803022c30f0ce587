//! YAML prompt templates and their lookup.

use crate::error::ApiError;
use crate::prompt::render::{placeholders, render, PromptVariables, RenderedPrompt};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "training_plan",
        include_str!("../../prompts/training_plan.yaml"),
    ),
    ("session_plan", include_str!("../../prompts/session_plan.yaml")),
    (
        "goal_evaluation",
        include_str!("../../prompts/goal_evaluation.yaml"),
    ),
    (
        "progress_analysis",
        include_str!("../../prompts/progress_analysis.yaml"),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: String,
    pub system: String,
    pub user: String,
}

#[derive(Deserialize)]
struct RawTemplate {
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

impl PromptTemplate {
    /// Parse a YAML document with `system` and `user` messages.
    pub fn parse(name: &str, yaml: &str) -> Result<Self, ApiError> {
        let raw: RawTemplate = serde_yaml::from_str(yaml)
            .map_err(|e| ApiError::InvalidTemplate(format!("{}: {}", name, e)))?;
        let system = required_section(name, raw.system, "system")?;
        let user = required_section(name, raw.user, "user")?;
        Ok(Self {
            name: name.to_string(),
            system,
            user,
        })
    }

    pub fn render(&self, vars: &PromptVariables) -> Result<RenderedPrompt, ApiError> {
        Ok(RenderedPrompt {
            system: render(&self.system, vars)?,
            user: render(&self.user, vars)?,
        })
    }

    /// Variable names used by either message.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = placeholders(&self.system);
        for name in placeholders(&self.user) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

fn required_section(
    template: &str,
    value: Option<String>,
    section: &'static str,
) -> Result<String, ApiError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ApiError::MissingTemplateSection {
            template: template.to_string(),
            section,
        }),
    }
}

/// Looks up templates by name in a directory, then among the built-ins.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
}

impl TemplateStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn builtin() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn load(&self, name: &str) -> Result<PromptTemplate, ApiError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(ApiError::TemplateNotFound(name.to_string()));
        }

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.yaml", name));
            if path.is_file() {
                debug!(template = name, path = %path.display(), "Loading prompt template");
                let yaml = std::fs::read_to_string(&path).map_err(|e| {
                    ApiError::InvalidTemplate(format!("{}: {}", path.display(), e))
                })?;
                return PromptTemplate::parse(name, &yaml);
            }
        }

        BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .ok_or_else(|| ApiError::TemplateNotFound(name.to_string()))
            .and_then(|(_, yaml)| PromptTemplate::parse(name, yaml))
    }

    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN_TEMPLATES.iter().map(|(name, _)| *name)
    }
}
