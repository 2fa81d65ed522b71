//! Prompt definitions and rendered prompts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One prompt, as written in a `.yml` file.
///
/// `template` and the optional `system` text are Handlebars templates over
/// the names listed in `variables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    pub id: String,
    pub title: String,

    /// `major.minor`
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    pub behavior: PromptBehavior,

    /// Every name here must be supplied at render time.
    #[serde(default)]
    pub variables: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    pub template: String,

    pub output: PromptOutputSpec,
}

/// Voice of the generated text. Informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    pub tone: String,
    pub style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// `text` or `markdown`
    pub format: String,

    /// Caps generation for this prompt, e.g. 1 for the judge's single letter.
    #[serde(rename = "maxTokens", default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A rendered prompt, ready to send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub system: Option<String>,
    pub user: String,
    pub metadata: BuiltPromptMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    #[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Values substituted into the template, by name.
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}

impl BuiltPrompt {
    pub fn new(
        system: Option<String>,
        user: String,
        source_prompt_id: String,
        max_tokens: Option<u32>,
        resolved_variables: HashMap<String, String>,
    ) -> Self {
        Self {
            system,
            user,
            metadata: BuiltPromptMetadata {
                source_prompt_id,
                max_tokens,
                resolved_variables,
            },
        }
    }
}
