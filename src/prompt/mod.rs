//! Prompt templates and rendering.
//!
//! Templates are YAML documents with a `system` and a `user` message. Both
//! messages may contain `{{variableName}}` placeholders which are filled in a
//! single pass from a [`PromptVariables`] map.

pub mod render;
pub mod template;

pub use render::{placeholders, render, PromptVariables, RenderedPrompt};
pub use template::{PromptTemplate, TemplateStore};
