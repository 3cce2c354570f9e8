pub mod openai;
pub mod prompt;
pub mod types;

use crate::{config::Config, taxonomy::Taxonomy, window::Window};
use std::time::Duration;
use tracing::{debug, warn};

pub use types::{BoundaryVerdict, Message, PageVote, Role, VerdictStatus};

/// Judges one window: where documents start and what each page is.
pub trait Oracle {
    fn evaluate(&self, window: &Window, taxonomy: &Taxonomy) -> Result<BoundaryVerdict, OracleError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<OracleError> },
}

impl OracleError {
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Llm(e) => e.is_retryable(),
            OracleError::Malformed(_) => true,
            OracleError::Exhausted { .. } => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_) => true,
            LlmError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            LlmError::Parse(_) => true,
        }
    }
}

/// Sends a chat completion request and returns the assistant's text.
pub trait ChatClient {
    fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.llm.max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.llm.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.llm.max_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// An oracle backed by a chat-completion model.
pub struct LlmOracle<C: ChatClient> {
    client: C,
    retry: RetryPolicy,
    max_chars_per_page: usize,
    log_prompts: bool,
}

impl<C: ChatClient> LlmOracle<C> {
    pub fn new(cfg: &Config, client: C) -> Self {
        Self {
            client,
            retry: RetryPolicy::from_config(cfg),
            max_chars_per_page: cfg.llm.max_chars_per_page,
            log_prompts: cfg.debug.log_prompts,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn attempt(&self, window: &Window, taxonomy: &Taxonomy, messages: &[Message]) -> Result<BoundaryVerdict, OracleError> {
        let raw = self.client.complete(messages)?;
        if self.log_prompts {
            debug!("window {} raw response: {}", window.id, raw);
        }
        prompt::parse_verdict(window, taxonomy, &raw)
    }
}

impl<C: ChatClient> Oracle for LlmOracle<C> {
    fn evaluate(&self, window: &Window, taxonomy: &Taxonomy) -> Result<BoundaryVerdict, OracleError> {
        let messages = prompt::build_messages(window, taxonomy, self.max_chars_per_page);
        if self.log_prompts {
            debug!("window {} prompt: {:?}", window.id, messages);
        }

        let mut attempt = 1u32;
        loop {
            match self.attempt(window, taxonomy, &messages) {
                Ok(verdict) => return Ok(verdict),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "window {} attempt {}/{} failed: {}; retrying in {:?}",
                        window.id, attempt, self.retry.max_attempts, e, delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(OracleError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
            }
        }
    }
}
