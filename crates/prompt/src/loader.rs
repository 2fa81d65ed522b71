//! Prompt loader for YAML prompt definitions.
//!
//! Built-in prompts can be overridden per workspace by dropping a file named
//! `<id>.yml` into `.care/prompts/`.

use crate::defaults;
use crate::types::PromptDefinition;
use care_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".care/prompts")
}

/// Load a prompt definition by ID.
///
/// A workspace file at `.care/prompts/<id>.yml` wins over the built-in
/// definition of the same ID.
///
/// # Example
/// ```no_run
/// use care_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "care.answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    let (contents, origin) = if prompt_file.exists() {
        tracing::debug!("Loading prompt from: {:?}", prompt_file);
        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;
        (contents, prompt_file.display().to_string())
    } else if let Some(builtin) = defaults::builtin(prompt_id) {
        (builtin.to_string(), "built-in".to_string())
    } else {
        return Err(AppError::Prompt(format!(
            "Prompt not found: {} (looked in {:?})",
            prompt_id, prompt_file
        )));
    };

    let definition = parse_definition(&contents, &origin, prompt_id)?;

    tracing::debug!("Loaded prompt: {} ({}) from {}", definition.id, definition.title, origin);

    Ok(definition)
}

/// Load a built-in prompt, ignoring any workspace override.
pub fn load_builtin(prompt_id: &str) -> AppResult<PromptDefinition> {
    let contents = defaults::builtin(prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("No built-in prompt: {}", prompt_id)))?;
    parse_definition(contents, "built-in", prompt_id)
}

fn parse_definition(contents: &str, origin: &str, prompt_id: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt {} declares id {}",
            origin, definition.id
        )));
    }

    Ok(definition)
}

/// List every available prompt ID: built-ins plus workspace files, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = defaults::builtin_ids().map(str::to_string).collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompt_ids.push(stem.to_string());
                }
            }
        }
    }

    prompt_ids.sort();
    prompt_ids.dedup();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
pub fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    // Every declared variable must actually be used, or it would be silently dropped.
    for variable in &def.variables {
        let placeholder = format!("{{{{{}}}}}", variable);
        let in_system = def
            .system
            .as_deref()
            .is_some_and(|system| system.contains(&placeholder));
        if !def.template.contains(&placeholder) && !in_system {
            return Err(AppError::Prompt(format!(
                "Prompt {} declares variable '{}' but never uses it",
                def.id, variable
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, file_id: &str, content: &str) -> PathBuf {
        let prompts_dir = dir.join(".care/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        let file_path = prompts_dir.join(format!("{}.yml", file_id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn valid_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Test Prompt"
apiVersion: "1.0"
createdBy: test
behavior:
  tone: warm
  style: concise
variables: [query]
template: "Override: {{{{query}}}}"
output:
  format: markdown
"#,
            id
        )
    }

    #[test]
    fn test_load_builtin_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = load_prompt(temp_dir.path(), "care.answer").unwrap();
        assert_eq!(prompt.id, "care.answer");
        assert!(prompt.template.contains("{{context}}"));
    }

    #[test]
    fn test_workspace_file_overrides_builtin() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "care.answer", &valid_yaml("care.answer"));

        let prompt = load_prompt(temp_dir.path(), "care.answer").unwrap();
        assert_eq!(prompt.title, "Test Prompt");
        assert!(prompt.template.starts_with("Override"));
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");
        assert!(load_prompt(temp_dir.path(), "invalid").is_err());
    }

    #[test]
    fn test_mismatched_id_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "care.judge", &valid_yaml("something.else"));
        assert!(load_prompt(temp_dir.path(), "care.judge").is_err());
    }

    #[test]
    fn test_unused_variable_rejected() {
        let mut def: PromptDefinition = serde_yaml::from_str(&valid_yaml("x.y")).unwrap();
        def.variables.push("history".to_string());
        match validate_prompt(&def) {
            Err(AppError::Prompt(msg)) => assert!(msg.contains("history")),
            other => panic!("Expected prompt error, got {:?}", other),
        }
    }

    #[test]
    fn test_list_prompts_merges_builtins_and_workspace() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "custom.one", &valid_yaml("custom.one"));
        write_prompt(temp_dir.path(), "care.answer", &valid_yaml("care.answer"));

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts.len(), 5);
        assert!(prompts.contains(&"custom.one".to_string()));
        assert_eq!(
            prompts.iter().filter(|id| id.as_str() == "care.answer").count(),
            1
        );
    }
}
