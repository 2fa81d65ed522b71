//! Built-in prompt definitions shipped with the binary.

/// Prompt used to generate the caregiver-facing answer.
pub const ANSWER_PROMPT_ID: &str = "care.answer";
/// Prompt used to check an answer for unsupported claims.
pub const JUDGE_PROMPT_ID: &str = "care.judge";
/// Prompt used to regenerate an answer after a failed check.
pub const FIXER_PROMPT_ID: &str = "care.fixer";
/// Prompt used to turn a follow-up into a standalone search query.
pub const REWRITE_PROMPT_ID: &str = "care.rewrite";

const BUILTINS: [(&str, &str); 4] = [
    (ANSWER_PROMPT_ID, include_str!("../prompts/care.answer.yml")),
    (JUDGE_PROMPT_ID, include_str!("../prompts/care.judge.yml")),
    (FIXER_PROMPT_ID, include_str!("../prompts/care.fixer.yml")),
    (REWRITE_PROMPT_ID, include_str!("../prompts/care.rewrite.yml")),
];

/// Raw YAML of a built-in prompt.
pub fn builtin(id: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(builtin_id, _)| *builtin_id == id)
        .map(|(_, yaml)| *yaml)
}

/// Identifiers of every built-in prompt.
pub fn builtin_ids() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptDefinition;

    #[test]
    fn test_every_builtin_parses_with_matching_id() {
        for id in builtin_ids() {
            let yaml = builtin(id).unwrap();
            let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
            assert_eq!(def.id, id);
            assert!(!def.variables.is_empty());
        }
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin("care.missing").is_none());
    }
}
