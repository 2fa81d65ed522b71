//! Generator construction from configuration.

use crate::client::LlmClient;
use crate::providers::{ClaudeClient, OllamaClient};
use crate::types::ProviderType;
use care_core::{config::AppConfig, AppError, AppResult};
use std::sync::Arc;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Create a generator client for `provider` ("claude", "anthropic" or "ollama").
///
/// Fails with `AppError::Config` for an unknown provider or a Claude client
/// without an API key.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let kind = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let client: Arc<dyn LlmClient> = match kind {
        ProviderType::Ollama => Arc::new(OllamaClient::with_base_url(
            endpoint.unwrap_or(DEFAULT_OLLAMA_URL),
        )),
        ProviderType::Claude => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("Claude provider requires an API key".to_string())
            })?;
            match endpoint {
                Some(endpoint) => Arc::new(ClaudeClient::with_base_url(endpoint, api_key)),
                None => Arc::new(ClaudeClient::new(api_key)),
            }
        }
    };

    tracing::debug!("Created {} client", kind.as_str());
    Ok(client)
}

/// Create the client for the configured active provider.
pub fn client_for(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    let endpoint = config.resolve_endpoint();
    let api_key = config.resolve_api_key(&config.provider);
    create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_needs_no_key() {
        let client = create_client("ollama", None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
        assert!(create_client("Ollama", Some("http://gpu-box:11434"), None).is_ok());
    }

    #[test]
    fn test_anthropic_alias() {
        let client = create_client("anthropic", None, Some("sk-test")).unwrap();
        assert_eq!(client.provider_name(), "claude");
    }

    #[test]
    fn test_claude_without_key_is_config_error() {
        assert!(matches!(
            create_client("claude", None, None),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("openai", None, None) {
            Err(AppError::Config(message)) => assert!(message.contains("openai")),
            _ => panic!("expected a config error"),
        }
    }
}
