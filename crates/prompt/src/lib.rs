//! Prompt system for Care Companion.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions, built in and overridable per workspace
//! - Handlebars template rendering
//! - Assembly of the answer, judge, fixer and query-rewrite prompts

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, PromptSet};
pub use loader::{list_prompts, load_builtin, load_prompt, validate_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptOutputSpec};
