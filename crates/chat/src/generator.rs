//! Streaming answer generation.

use crate::transport::{MessageHandle, OutputChannel};
use care_core::config::RagConfig;
use care_core::{AppError, AppResult};
use care_llm::{LlmClient, LlmRequest};
use care_prompt::BuiltPrompt;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// An answer that has been streamed into an open channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedAnswer {
    pub handle: MessageHandle,
    pub text: String,
    /// False when the stream broke off after the first fragment
    pub complete: bool,
}

/// Streams answers from the primary generator.
#[derive(Clone)]
pub struct AnswerGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    open_timeout: Duration,
    fragment_timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, rag: &RagConfig) -> Self {
        Self {
            llm,
            model: model.into(),
            temperature: rag.temperature,
            top_p: rag.top_p,
            max_tokens: rag.max_tokens,
            open_timeout: rag.generation_timeout(),
            fragment_timeout: rag.fragment_timeout(),
        }
    }

    fn request(&self, prompt: &BuiltPrompt) -> LlmRequest {
        let mut request = LlmRequest::new(prompt.user.clone(), self.model.clone())
            .with_streaming()
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_max_tokens(prompt.metadata.max_tokens.unwrap_or(self.max_tokens));

        if let Some(system) = &prompt.system {
            request = request.with_system(system.clone());
        }
        request
    }

    /// Stream `prompt` into a new channel message, forwarding every fragment as it arrives.
    ///
    /// Errors:
    /// - `AppError::Generation` when nothing was produced (open failure, timeout or
    ///   error before the first fragment, or an empty stream). No message is left open.
    /// - `AppError::Transport` when the channel rejects output.
    ///
    /// A failure after the first fragment is logged and the partial answer stands.
    pub async fn stream_answer(
        &self,
        prompt: &BuiltPrompt,
        channel: &dyn OutputChannel,
    ) -> AppResult<StreamedAnswer> {
        let request = self.request(prompt);
        tracing::info!("Streaming answer from {} ({})", self.llm.provider_name(), self.model);

        let mut stream = tokio::time::timeout(self.open_timeout, self.llm.stream(&request))
            .await
            .map_err(|_| AppError::Generation("Timed out opening answer stream".to_string()))?
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let mut handle: Option<MessageHandle> = None;
        let mut text = String::new();
        let mut complete = true;

        loop {
            let next = match tokio::time::timeout(self.fragment_timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(AppError::Generation(
                    "Timed out waiting for the next fragment".to_string(),
                ))),
            };

            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) if handle.is_none() => {
                    return Err(AppError::Generation(e.to_string()));
                }
                Some(Err(e)) => {
                    tracing::warn!("Answer stream broke off after {} bytes: {}", text.len(), e);
                    complete = false;
                    break;
                }
            };

            if !chunk.content.is_empty() {
                let current = match handle {
                    Some(current) => current,
                    None => {
                        let opened = channel.begin_message().await?;
                        handle = Some(opened);
                        opened
                    }
                };
                channel.push_fragment(current, &chunk.content).await?;
                text.push_str(&chunk.content);
            }

            if chunk.done {
                break;
            }
        }

        match handle {
            Some(handle) => {
                tracing::debug!("Streamed {} bytes", text.len());
                Ok(StreamedAnswer {
                    handle,
                    text,
                    complete,
                })
            }
            None => Err(AppError::Generation(
                "Generator returned an empty answer".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelEvent, RecordingChannel};
    use care_llm::ScriptedClient;
    use std::collections::HashMap;

    fn prompt() -> BuiltPrompt {
        BuiltPrompt::new(None, "prompt".to_string(), "test".to_string(), None, HashMap::new())
    }

    fn generator(llm: Arc<ScriptedClient>) -> AnswerGenerator {
        AnswerGenerator::new(llm, "answer-model", &RagConfig::default())
    }

    #[tokio::test]
    async fn test_fragments_forwarded_in_order() {
        let llm = Arc::new(ScriptedClient::new().push_stream(["Wander", "ing is ", "common."]));
        let channel = RecordingChannel::new();

        let answer = generator(llm.clone())
            .stream_answer(&prompt(), &channel)
            .await
            .unwrap();

        assert_eq!(answer.text, "Wandering is common.");
        assert!(answer.complete);

        let fragments: Vec<String> = channel
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ChannelEvent::Fragment(_, text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(fragments, vec!["Wander", "ing is ", "common."]);

        let request = &llm.requests()[0];
        assert!(request.stream);
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.top_p, Some(0.9));
    }

    #[tokio::test]
    async fn test_failure_before_first_fragment() {
        let llm = Arc::new(ScriptedClient::new().push_stream_error("overloaded"));
        let channel = RecordingChannel::new();

        let result = generator(llm).stream_answer(&prompt(), &channel).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
        assert!(channel.events().is_empty());
    }

    #[tokio::test]
    async fn test_broken_stream_before_first_fragment() {
        let llm = Arc::new(ScriptedClient::new().push_broken_stream(Vec::<String>::new(), "reset"));
        let channel = RecordingChannel::new();

        let result = generator(llm).stream_answer(&prompt(), &channel).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_answer() {
        let llm = Arc::new(ScriptedClient::new().push_broken_stream(["Partial "], "reset"));
        let channel = RecordingChannel::new();

        let answer = generator(llm).stream_answer(&prompt(), &channel).await.unwrap();
        assert_eq!(answer.text, "Partial ");
        assert!(!answer.complete);
        assert_eq!(channel.visible_messages(), vec!["Partial ".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_stream_is_generation_error() {
        let llm = Arc::new(ScriptedClient::new().push_stream(Vec::<String>::new()));
        let channel = RecordingChannel::new();

        let result = generator(llm).stream_answer(&prompt(), &channel).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let llm = Arc::new(ScriptedClient::new().push_stream(["a", "b"]));
        let channel = RecordingChannel::disconnect_after(1);

        let result = generator(llm).stream_answer(&prompt(), &channel).await;
        assert!(matches!(result, Err(AppError::Transport(_))));
    }

    fn impatient_generator(llm: Arc<ScriptedClient>) -> AnswerGenerator {
        let rag = RagConfig {
            generation_timeout_secs: 0,
            fragment_timeout_secs: 0,
            ..RagConfig::default()
        };
        AnswerGenerator::new(llm, "answer-model", &rag)
    }

    #[tokio::test]
    async fn test_open_timeout_is_generation_error() {
        let llm = Arc::new(
            ScriptedClient::new()
                .with_delay(Duration::from_millis(50))
                .push_stream(["too late"]),
        );
        let channel = RecordingChannel::new();

        let result = impatient_generator(llm).stream_answer(&prompt(), &channel).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
        assert!(channel.events().is_empty());
    }

    #[tokio::test]
    async fn test_fragment_timeout_before_first_fragment() {
        let llm = Arc::new(ScriptedClient::new().push_stalled_stream(Vec::<String>::new()));
        let channel = RecordingChannel::new();

        let result = impatient_generator(llm).stream_answer(&prompt(), &channel).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
        assert!(channel.events().is_empty());
    }

    #[tokio::test]
    async fn test_fragment_timeout_keeps_partial_answer() {
        let llm = Arc::new(ScriptedClient::new().push_stalled_stream(["Wandering often "]));
        let channel = RecordingChannel::new();

        let answer = impatient_generator(llm)
            .stream_answer(&prompt(), &channel)
            .await
            .unwrap();
        assert_eq!(answer.text, "Wandering often ");
        assert!(!answer.complete);
    }

    #[tokio::test]
    async fn test_prompt_max_tokens_override() {
        let llm = Arc::new(ScriptedClient::new().push_stream(["ok"]));
        let channel = RecordingChannel::new();
        let mut built = prompt();
        built.metadata.max_tokens = Some(64);

        generator(llm.clone()).stream_answer(&built, &channel).await.unwrap();
        assert_eq!(llm.requests()[0].max_tokens, Some(64));
    }
}
