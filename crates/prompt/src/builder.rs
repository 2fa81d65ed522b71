//! Prompt builder for rendering templates and assembling turn prompts.

use crate::defaults::{ANSWER_PROMPT_ID, FIXER_PROMPT_ID, JUDGE_PROMPT_ID, REWRITE_PROMPT_ID};
use crate::loader::{load_builtin, load_prompt};
use crate::types::{BuiltPrompt, PromptDefinition};
use care_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;
use std::path::Path;

/// Build a prompt from a definition and input variables.
///
/// Every variable the definition declares must be present in `variables`,
/// otherwise the build fails instead of rendering an empty placeholder.
///
/// # Example
/// ```no_run
/// use care_prompt::{build_prompt, PromptDefinition};
/// use std::collections::HashMap;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("query".to_string(), "How do I handle sundowning?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    check_variables(definition, &variables)?;

    let user = render_template(&definition.template, &variables)?;
    let system = match &definition.system {
        Some(template) => Some(render_template(template, &variables)?),
        None => None,
    };

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        definition.output.max_tokens,
        variables,
    ))
}

fn check_variables(
    definition: &PromptDefinition,
    variables: &HashMap<String, String>,
) -> AppResult<()> {
    let missing: Vec<&str> = definition
        .variables
        .iter()
        .filter(|name| !variables.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Prompt(format!(
            "Prompt {} is missing variables: {}",
            definition.id,
            missing.join(", ")
        )))
    }
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text prompts: no HTML escaping
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

/// The four prompts a conversation turn needs, loaded once per session.
#[derive(Debug, Clone)]
pub struct PromptSet {
    answer: PromptDefinition,
    judge: PromptDefinition,
    fixer: PromptDefinition,
    rewrite: PromptDefinition,
}

impl PromptSet {
    /// Load every turn prompt, honoring workspace overrides.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        Self::load_with(|id| load_prompt(workspace_path, id))
    }

    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        Self::load_with(load_builtin)
    }

    fn load_with(load: impl Fn(&str) -> AppResult<PromptDefinition>) -> AppResult<Self> {
        Ok(Self {
            answer: load(ANSWER_PROMPT_ID)?,
            judge: load(JUDGE_PROMPT_ID)?,
            fixer: load(FIXER_PROMPT_ID)?,
            rewrite: load(REWRITE_PROMPT_ID)?,
        })
    }

    /// Assemble the answer prompt. Empty sections render as empty blocks.
    pub fn assemble_answer(
        &self,
        history: &str,
        context: &str,
        tool_output: &str,
        query: &str,
    ) -> AppResult<BuiltPrompt> {
        build_prompt(
            &self.answer,
            vars(&[
                ("history", history),
                ("context", context),
                ("tool_output", tool_output),
                ("query", query),
            ]),
        )
    }

    /// Assemble the unsupported-claim check for `answer`.
    pub fn judge(&self, context: &str, tool_output: &str, answer: &str) -> AppResult<BuiltPrompt> {
        build_prompt(
            &self.judge,
            vars(&[
                ("context", context),
                ("tool_output", tool_output),
                ("answer", answer),
            ]),
        )
    }

    /// Assemble the regeneration prompt for a rejected `answer`.
    pub fn fixer(
        &self,
        history: &str,
        context: &str,
        tool_output: &str,
        answer: &str,
        query: &str,
    ) -> AppResult<BuiltPrompt> {
        build_prompt(
            &self.fixer,
            vars(&[
                ("history", history),
                ("context", context),
                ("tool_output", tool_output),
                ("answer", answer),
                ("query", query),
            ]),
        )
    }

    /// Assemble the standalone-query rewrite for a follow-up question.
    pub fn rewrite(&self, history: &str, query: &str) -> AppResult<BuiltPrompt> {
        build_prompt(&self.rewrite, vars(&[("history", history), ("query", query)]))
    }
}

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptBehavior, PromptOutputSpec};

    fn create_test_definition() -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test Prompt".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            behavior: PromptBehavior {
                tone: "warm".to_string(),
                style: "concise".to_string(),
            },
            variables: vec!["query".to_string()],
            system: None,
            template: "User asks: {{query}}".to_string(),
            output: PromptOutputSpec {
                format: "text".to_string(),
                max_tokens: None,
            },
        }
    }

    #[test]
    fn test_build_prompt_basic() {
        let def = create_test_definition();
        let built = build_prompt(&def, vars(&[("query", "What is sundowning?")])).unwrap();

        assert_eq!(built.user, "User asks: What is sundowning?");
        assert!(built.system.is_none());
        assert_eq!(built.metadata.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_build_prompt_missing_variable() {
        let def = create_test_definition();
        match build_prompt(&def, HashMap::new()) {
            Err(AppError::Prompt(msg)) => assert!(msg.contains("query")),
            other => panic!("Expected prompt error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_prompt_renders_system() {
        let mut def = create_test_definition();
        def.system = Some("Answer about {{query}}".to_string());
        let built = build_prompt(&def, vars(&[("query", "falls")])).unwrap();
        assert_eq!(built.system.as_deref(), Some("Answer about falls"));
    }

    #[test]
    fn test_render_does_not_escape() {
        let rendered =
            render_template("{{x}}", &vars(&[("x", "<b>Tom & Jerry's</b>")])).unwrap();
        assert_eq!(rendered, "<b>Tom & Jerry's</b>");
    }

    #[test]
    fn test_answer_prompt_carries_all_sections() {
        let prompts = PromptSet::builtin().unwrap();
        let built = prompts
            .assemble_answer(
                "Human: hi",
                "Wandering is common in Alzheimer's.",
                "Name: Area Agency | Phone: 555-0100",
                "My mother wanders at night",
            )
            .unwrap();

        assert!(built.user.contains("Human: hi"));
        assert!(built.user.contains("Wandering is common"));
        assert!(built.user.contains("555-0100"));
        assert!(built.user.contains("My mother wanders at night"));
    }

    #[test]
    fn test_answer_prompt_with_empty_sections() {
        let prompts = PromptSet::builtin().unwrap();
        let built = prompts.assemble_answer("", "", "", "hello").unwrap();
        assert!(built.user.contains("<context>\n\n</context>"));
        assert!(built.user.contains("<eldercare_api_output>\n\n</eldercare_api_output>"));
    }

    #[test]
    fn test_judge_prompt_is_single_token() {
        let prompts = PromptSet::builtin().unwrap();
        let built = prompts.judge("ctx", "", "An answer").unwrap();
        assert_eq!(built.metadata.max_tokens, Some(1));
        assert!(built.user.contains("An answer"));
    }

    #[test]
    fn test_fixer_and_rewrite_prompts() {
        let prompts = PromptSet::builtin().unwrap();
        let fixed = prompts
            .fixer("hist", "ctx", "tool", "draft text", "question")
            .unwrap();
        assert!(fixed.user.contains("draft text"));

        let rewrite = prompts.rewrite("Human: my dad has dementia", "what about him?").unwrap();
        assert!(rewrite.user.contains("my dad has dementia"));
        assert_eq!(rewrite.metadata.max_tokens, Some(64));
    }
}
