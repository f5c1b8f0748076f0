//! Model backend: the seam between the pipeline and the multimodal AI.
//!
//! [`ModelBackend`] is the whole contract the orchestrator relies on: attach a
//! document unit, send one turn on top of a conversation history, release
//! the attachment. [`LlmBackend`] implements it over any `edgequake-llm`
//! provider; tests implement it with scripted replies.
//!
//! ## Retry Strategy
//!
//! Retries are off by default (`max_retries = 0`). When enabled, the wait is
//! `retry_backoff_ms * 2^attempt`, so 500 ms base and 3 retries wait
//! 500 ms → 1 s → 2 s. A per-call timeout, when configured, bounds each
//! attempt separately.

use crate::config::ExtractionConfig;
use crate::error::BackendError;
use crate::pipeline::conversation::{Conversation, Role, Turn};
use crate::pipeline::encode::image_data;
use crate::pipeline::units::DocumentUnit;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// A model reply with its token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Reply {
    /// A reply without token accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Handle to a unit held by the backend for the duration of its pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub label: String,
}

/// What the orchestrator needs from a multimodal model.
///
/// Calls for one unit are strictly sequential; calls for different units may
/// run concurrently, so implementations must be shareable across tasks.
pub trait ModelBackend: Send + Sync {
    /// Make a unit available to subsequent turns.
    fn upload(
        &self,
        unit: &DocumentUnit,
    ) -> impl Future<Output = Result<Attachment, BackendError>> + Send;

    /// Send `turn` with `history` as context and return the raw reply.
    fn send(
        &self,
        history: &Conversation,
        turn: &Turn,
    ) -> impl Future<Output = Result<Reply, BackendError>> + Send;

    /// Drop an uploaded unit.
    fn release(
        &self,
        attachment: &Attachment,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// [`ModelBackend`] over an `edgequake-llm` chat provider.
///
/// The providers are stateless chat endpoints, so "upload" keeps the encoded
/// image in a registry and every call replays the conversation with the
/// image inlined where the history references it.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    system_prompt: String,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: Option<u64>,
    attachments: Mutex<HashMap<String, ImageData>>,
    next_id: AtomicU64,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
            attachments: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of attachments currently held.
    pub fn held(&self) -> usize {
        self.attachments.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Provider-level messages for `history` followed by `turn`.
    fn build_messages(&self, history: &Conversation, turn: &Turn) -> Result<Vec<ChatMessage>, BackendError> {
        let held = self
            .attachments
            .lock()
            .map_err(|e| BackendError::Call {
                retries: 0,
                detail: format!("attachment registry poisoned: {e}"),
            })?;

        let mut messages = vec![ChatMessage::system(self.system_prompt.as_str())];
        for t in history.turns().iter().chain(std::iter::once(turn)) {
            let text = t.text();
            match t.role {
                Role::Assistant => messages.push(ChatMessage::assistant(text.as_str())),
                Role::User => {
                    let images = t
                        .attachments()
                        .map(|id| {
                            held.get(id)
                                .cloned()
                                .ok_or_else(|| BackendError::UnknownAttachment(id.to_string()))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    if images.is_empty() {
                        messages.push(ChatMessage::user(text.as_str()));
                    } else {
                        messages.push(ChatMessage::user_with_images(text.as_str(), images));
                    }
                }
            }
        }
        Ok(messages)
    }
}

impl ModelBackend for LlmBackend {
    async fn upload(&self, unit: &DocumentUnit) -> Result<Attachment, BackendError> {
        if unit.bytes.is_empty() {
            return Err(BackendError::Upload(format!("{} is empty", unit.label)));
        }
        let data = image_data(unit);
        let id = format!("unit-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.attachments
            .lock()
            .map_err(|e| BackendError::Upload(e.to_string()))?
            .insert(id.clone(), data);
        debug!("Attached {} as {}", unit.label, id);
        Ok(Attachment {
            id,
            label: unit.label.clone(),
        })
    }

    async fn send(&self, history: &Conversation, turn: &Turn) -> Result<Reply, BackendError> {
        let messages = self.build_messages(history, turn)?;
        let mut last_err: Option<BackendError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!("Retry {}/{} after {}ms", attempt, self.max_retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&self.options));
            let outcome = match self.api_timeout_secs {
                Some(secs) => match timeout(Duration::from_secs(secs), call).await {
                    Ok(r) => r.map_err(|e| e.to_string()),
                    Err(_) => {
                        warn!("Attempt {} timed out after {}s", attempt + 1, secs);
                        last_err = Some(BackendError::Timeout { secs });
                        continue;
                    }
                },
                None => call.await.map_err(|e| e.to_string()),
            };

            match outcome {
                Ok(response) => {
                    debug!(
                        "{} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(Reply {
                        text: response.content,
                        input_tokens: response.prompt_tokens as u64,
                        output_tokens: response.completion_tokens as u64,
                    });
                }
                Err(detail) => {
                    warn!("Attempt {} failed: {}", attempt + 1, detail);
                    last_err = Some(BackendError::Call {
                        retries: self.max_retries,
                        detail,
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| BackendError::Call {
            retries: self.max_retries,
            detail: "Unknown error".to_string(),
        }))
    }

    async fn release(&self, attachment: &Attachment) -> Result<(), BackendError> {
        let removed = self
            .attachments
            .lock()
            .map_err(|e| BackendError::Release(e.to_string()))?
            .remove(&attachment.id);
        match removed {
            Some(_) => {
                debug!("Released {}", attachment.id);
                Ok(())
            }
            None => Err(BackendError::Release(format!(
                "{} ({}) is not held",
                attachment.id, attachment.label
            ))),
        }
    }
}

/// Exponential backoff before retry `attempt` (1-based), saturating.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
