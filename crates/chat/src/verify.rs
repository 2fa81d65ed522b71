//! Fact verification: judge a streamed answer against its evidence and
//! rewrite it while unsupported claims remain, within an attempt budget.

use crate::generator::{AnswerGenerator, StreamedAnswer};
use crate::transport::{MessageHandle, OutputChannel};
use care_core::{AppError, AppResult};
use care_llm::{LlmClient, LlmRequest};
use care_prompt::PromptSet;
use std::sync::Arc;
use std::time::Duration;

/// Shown once, when the first check fails.
pub const VERIFY_NOTICE: &str =
    "Let me double-check that answer against my sources and correct it.";

/// Final answer when no attempt passes the check.
pub const GIVE_UP_MESSAGE: &str = "I'm sorry, I wasn't able to find a reliable answer to that in \
my sources. Could you tell me a bit more, or rephrase your question? If this is urgent or a \
medical question, please reach out to a doctor or another professional.";

/// Judge output, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Supported,
    Unsupported,
}

impl Verdict {
    /// Any `y`/`Y` in the judge's reply means an unsupported claim was found.
    pub fn parse(raw: &str) -> Self {
        if raw.contains(['y', 'Y']) {
            Verdict::Unsupported
        } else {
            Verdict::Supported
        }
    }
}

/// Decides whether an answer is backed by its evidence.
#[async_trait::async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, context: &str, tool_output: &str, answer: &str) -> AppResult<Verdict>;
}

/// Judge backed by a generation call constrained to a single letter.
#[derive(Clone)]
pub struct LlmJudge {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptSet>,
    model: String,
    timeout: Duration,
}

impl LlmJudge {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptSet>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, context: &str, tool_output: &str, answer: &str) -> AppResult<Verdict> {
        let prompt = self.prompts.judge(context, tool_output, answer)?;
        let mut request = LlmRequest::new(prompt.user, self.model.clone()).with_temperature(0.0);
        if let Some(max_tokens) = prompt.metadata.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = tokio::time::timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| AppError::Llm("Judge call timed out".to_string()))??;

        tracing::debug!("Judge replied {:?}", response.content);
        Ok(Verdict::parse(&response.content))
    }
}

/// The material an answer is checked against and rewritten from.
#[derive(Debug, Clone, Copy)]
pub struct Grounding<'a> {
    pub history: &'a str,
    pub context: &'a str,
    pub tool_output: &'a str,
    pub query: &'a str,
}

/// How a verification loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// The answer in `handle` stands; the message is still open.
    Passed {
        answer: String,
        handle: MessageHandle,
        attempts: u32,
    },
    /// Every attempt failed the check; the last candidate was retracted.
    GaveUp { attempts: u32 },
}

impl VerificationOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            VerificationOutcome::Passed { attempts, .. } | VerificationOutcome::GaveUp { attempts } => {
                *attempts
            }
        }
    }
}

/// Checking and rewriting loop for one turn.
pub struct VerificationLoop<'a> {
    pub judge: &'a dyn Judge,
    pub generator: &'a AnswerGenerator,
    pub prompts: &'a PromptSet,
    pub channel: &'a dyn OutputChannel,
    pub max_attempts: u32,
}

impl VerificationLoop<'_> {
    /// Run from attempt 1 with the already streamed `first` answer.
    ///
    /// Only a transport failure is returned as an error.
    pub async fn run(
        &self,
        grounding: Grounding<'_>,
        first: StreamedAnswer,
    ) -> AppResult<VerificationOutcome> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts: u32 = 1;
        let mut current = first;

        loop {
            if !current.complete {
                tracing::warn!(
                    "Checking a partial answer ({} bytes) on attempt {}",
                    current.text.len(),
                    attempts
                );
            }

            let verdict = match self
                .judge
                .judge(grounding.context, grounding.tool_output, &current.text)
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    tracing::warn!("Judge call failed, letting the answer stand: {}", e);
                    Verdict::Supported
                }
            };

            tracing::info!("Attempt {}/{}: {:?}", attempts, max_attempts, verdict);

            if verdict == Verdict::Supported {
                return Ok(VerificationOutcome::Passed {
                    answer: current.text,
                    handle: current.handle,
                    attempts,
                });
            }

            if attempts >= max_attempts {
                self.channel.retract_message(current.handle).await?;
                tracing::warn!("Giving up after {} attempts", attempts);
                return Ok(VerificationOutcome::GaveUp { attempts });
            }

            if attempts == 1 {
                self.channel.send_notice(VERIFY_NOTICE).await?;
            }
            self.channel.retract_message(current.handle).await?;

            match self.rewrite(grounding, &current.text).await {
                Ok(next) => {
                    current = next;
                    attempts += 1;
                }
                Err(AppError::Transport(message)) => return Err(AppError::Transport(message)),
                Err(e) => {
                    tracing::warn!("Fixer failed before producing an answer: {}", e);
                    return Ok(VerificationOutcome::GaveUp { attempts });
                }
            }
        }
    }

    async fn rewrite(&self, grounding: Grounding<'_>, answer: &str) -> AppResult<StreamedAnswer> {
        let prompt = self.prompts.fixer(
            grounding.history,
            grounding.context,
            grounding.tool_output,
            answer,
            grounding.query,
        )?;
        self.generator.stream_answer(&prompt, self.channel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingChannel;
    use care_core::config::RagConfig;
    use care_llm::ScriptedClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays verdicts; once exhausted repeats the last one.
    struct ScriptedJudge {
        verdicts: Mutex<Vec<AppResult<Verdict>>>,
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedJudge {
        fn new(verdicts: Vec<AppResult<Verdict>>) -> Self {
            Self {
                verdicts: Mutex::new(verdicts),
                seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Judge for ScriptedJudge {
        async fn judge(&self, _c: &str, _t: &str, answer: &str) -> AppResult<Verdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(answer.to_string());
            let mut verdicts = self.verdicts.lock().unwrap();
            if verdicts.len() > 1 {
                verdicts.remove(0)
            } else {
                match verdicts.first() {
                    Some(Ok(v)) => Ok(*v),
                    Some(Err(_)) => Err(AppError::Llm("judge down".to_string())),
                    None => Ok(Verdict::Supported),
                }
            }
        }
    }

    const GROUNDING: Grounding<'static> = Grounding {
        history: "",
        context: "Wandering is common in the middle stage.",
        tool_output: "",
        query: "When does wandering start?",
    };

    async fn first_answer(channel: &RecordingChannel, text: &str) -> StreamedAnswer {
        let handle = channel.begin_message().await.unwrap();
        channel.push_fragment(handle, text).await.unwrap();
        StreamedAnswer {
            handle,
            text: text.to_string(),
            complete: true,
        }
    }

    #[test]
    fn test_verdict_parse() {
        assert_eq!(Verdict::parse("Y"), Verdict::Unsupported);
        assert_eq!(Verdict::parse(" yes"), Verdict::Unsupported);
        assert_eq!(Verdict::parse("N"), Verdict::Supported);
        assert_eq!(Verdict::parse(""), Verdict::Supported);
        assert_eq!(Verdict::parse("No"), Verdict::Supported);
    }

    #[tokio::test]
    async fn test_supported_first_time() {
        let judge = ScriptedJudge::new(vec![Ok(Verdict::Supported)]);
        let llm = Arc::new(ScriptedClient::new());
        let generator = AnswerGenerator::new(llm.clone(), "m", &RagConfig::default());
        let prompts = PromptSet::builtin().unwrap();
        let channel = RecordingChannel::new();

        let first = first_answer(&channel, "Middle stage.").await;
        let outcome = VerificationLoop {
            judge: &judge,
            generator: &generator,
            prompts: &prompts,
            channel: &channel,
            max_attempts: 3,
        }
        .run(GROUNDING, first.clone())
        .await
        .unwrap();

        assert_eq!(
            outcome,
            VerificationOutcome::Passed {
                answer: "Middle stage.".to_string(),
                handle: first.handle,
                attempts: 1
            }
        );
        assert_eq!(judge.calls(), 1);
        assert!(llm.requests().is_empty());
        assert!(channel.notices().is_empty());
    }

    #[tokio::test]
    async fn test_always_unsupported_gives_up() {
        let judge = ScriptedJudge::new(vec![Ok(Verdict::Unsupported)]);
        let llm = Arc::new(
            ScriptedClient::new()
                .push_stream(["Rewrite one."])
                .push_stream(["Rewrite two."]),
        );
        let generator = AnswerGenerator::new(llm.clone(), "m", &RagConfig::default());
        let prompts = PromptSet::builtin().unwrap();
        let channel = RecordingChannel::new();

        let first = first_answer(&channel, "Made-up claim.").await;
        let outcome = VerificationLoop {
            judge: &judge,
            generator: &generator,
            prompts: &prompts,
            channel: &channel,
            max_attempts: 3,
        }
        .run(GROUNDING, first)
        .await
        .unwrap();

        assert_eq!(outcome, VerificationOutcome::GaveUp { attempts: 3 });
        assert_eq!(judge.calls(), 3);
        assert_eq!(llm.requests().len(), 2);
        assert_eq!(channel.notices(), vec![VERIFY_NOTICE.to_string()]);
        assert!(channel.visible_messages().is_empty());
        assert_eq!(channel.retracted_messages().len(), 3);
    }

    #[tokio::test]
    async fn test_fixer_receives_latest_answer() {
        let judge = ScriptedJudge::new(vec![
            Ok(Verdict::Unsupported),
            Ok(Verdict::Unsupported),
            Ok(Verdict::Supported),
        ]);
        let llm = Arc::new(
            ScriptedClient::new()
                .push_stream(["Second draft."])
                .push_stream(["Third draft."]),
        );
        let generator = AnswerGenerator::new(llm.clone(), "m", &RagConfig::default());
        let prompts = PromptSet::builtin().unwrap();
        let channel = RecordingChannel::new();

        let first = first_answer(&channel, "First draft.").await;
        let outcome = VerificationLoop {
            judge: &judge,
            generator: &generator,
            prompts: &prompts,
            channel: &channel,
            max_attempts: 3,
        }
        .run(GROUNDING, first)
        .await
        .unwrap();

        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, VerificationOutcome::Passed { ref answer, .. } if answer == "Third draft."));

        let requests = llm.requests();
        assert!(requests[0].prompt.contains("First draft."));
        assert!(requests[1].prompt.contains("Second draft."));
        assert!(!requests[1].prompt.contains("First draft."));

        assert_eq!(channel.visible_messages(), vec!["Third draft.".to_string()]);
        assert_eq!(channel.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_judge_failure_counts_as_passed() {
        let judge = ScriptedJudge::new(vec![Err(AppError::Llm("down".to_string()))]);
        let llm = Arc::new(ScriptedClient::new());
        let generator = AnswerGenerator::new(llm, "m", &RagConfig::default());
        let prompts = PromptSet::builtin().unwrap();
        let channel = RecordingChannel::new();

        let first = first_answer(&channel, "Answer.").await;
        let outcome = VerificationLoop {
            judge: &judge,
            generator: &generator,
            prompts: &prompts,
            channel: &channel,
            max_attempts: 3,
        }
        .run(GROUNDING, first)
        .await
        .unwrap();

        assert!(matches!(outcome, VerificationOutcome::Passed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_fixer_failure_gives_up() {
        let judge = ScriptedJudge::new(vec![Ok(Verdict::Unsupported)]);
        let llm = Arc::new(ScriptedClient::new().push_stream_error("overloaded"));
        let generator = AnswerGenerator::new(llm, "m", &RagConfig::default());
        let prompts = PromptSet::builtin().unwrap();
        let channel = RecordingChannel::new();

        let first = first_answer(&channel, "Answer.").await;
        let outcome = VerificationLoop {
            judge: &judge,
            generator: &generator,
            prompts: &prompts,
            channel: &channel,
            max_attempts: 3,
        }
        .run(GROUNDING, first)
        .await
        .unwrap();

        assert_eq!(outcome, VerificationOutcome::GaveUp { attempts: 1 });
        assert_eq!(judge.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let judge = ScriptedJudge::new(vec![Ok(Verdict::Unsupported)]);
        let llm = Arc::new(ScriptedClient::new());
        let generator = AnswerGenerator::new(llm.clone(), "m", &RagConfig::default());
        let prompts = PromptSet::builtin().unwrap();
        let channel = RecordingChannel::new();

        let first = first_answer(&channel, "Answer.").await;
        let outcome = VerificationLoop {
            judge: &judge,
            generator: &generator,
            prompts: &prompts,
            channel: &channel,
            max_attempts: 1,
        }
        .run(GROUNDING, first)
        .await
        .unwrap();

        assert_eq!(outcome, VerificationOutcome::GaveUp { attempts: 1 });
        assert!(llm.requests().is_empty());
        assert!(channel.notices().is_empty());
    }

    #[tokio::test]
    async fn test_llm_judge_parses_reply() {
        let llm = Arc::new(ScriptedClient::new().push_completion("Y").push_completion("N"));
        let judge = LlmJudge::new(
            llm.clone(),
            Arc::new(PromptSet::builtin().unwrap()),
            "fast",
            Duration::from_secs(5),
        );

        assert_eq!(judge.judge("ctx", "", "a").await.unwrap(), Verdict::Unsupported);
        assert_eq!(judge.judge("ctx", "", "b").await.unwrap(), Verdict::Supported);

        let requests = llm.requests();
        assert_eq!(requests[0].max_tokens, Some(1));
        assert_eq!(requests[0].model, "fast");
    }

    #[tokio::test]
    async fn test_llm_judge_timeout_is_error() {
        let llm = Arc::new(
            ScriptedClient::new()
                .with_delay(Duration::from_millis(200))
                .push_completion("Y"),
        );
        let judge = LlmJudge::new(
            llm,
            Arc::new(PromptSet::builtin().unwrap()),
            "fast",
            Duration::from_millis(10),
        );

        assert!(matches!(
            judge.judge("ctx", "", "answer").await,
            Err(AppError::Llm(_))
        ));
    }
}
