//! Judgment provider implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::types::*;

/// Trait for judgment providers
///
/// The two non-deterministic operations of the system. Implementations may
/// fail or time out; callers normalize failures to abstentions.
#[async_trait]
pub trait JudgmentProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Check if the provider is available
    async fn is_available(&self) -> bool;

    /// Fetch the content behind a submission reference, for pinning
    async fn snapshot(&self, reference: &str) -> Result<Snapshot>;

    /// Run a generative judgment over a prompt, returning the raw output
    async fn judge(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// HTTP Provider (Ollama-style generate endpoint)
// ============================================================================

/// Configuration for the HTTP judgment provider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("WORKLOCK_PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("WORKLOCK_PROVIDER_MODEL")
                .unwrap_or_else(|_| "llama3.1:8b".to_string()),
        }
    }
}

/// Judgment provider backed by an HTTP content fetch and a local LLM
/// generate endpoint
pub struct HttpJudgmentProvider {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

impl HttpJudgmentProvider {
    pub fn new(config: HttpProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(HttpProviderConfig::default())
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl JudgmentProvider for HttpJudgmentProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        self.client.get(&url).send().await.is_ok()
    }

    async fn snapshot(&self, reference: &str) -> Result<Snapshot> {
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| ProviderError::FetchFailed {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::FetchFailed {
                reference: reference.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let content = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError {
                message: e.to_string(),
            })?;

        debug!(reference, bytes = content.len(), "Snapshot fetched");
        Ok(Snapshot::pin(reference, content))
    }

    async fn judge(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::RequestFailed {
                message: format!("HTTP {}", response.status()),
            });
        }

        let body: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    message: e.to_string(),
                })?;

        Ok(body.response)
    }
}

// ============================================================================
// Scripted Provider (deterministic, for tests and offline runs)
// ============================================================================

/// A scripted judgment outcome
#[derive(Debug, Clone)]
pub enum ScriptedJudgment {
    /// Respond with this raw output
    Respond(String),
    /// Fail with a provider error
    Fail(String),
    /// Never respond; the caller's per-execution timeout fires
    Stall,
}

impl ScriptedJudgment {
    /// A well-formed approval in the required response format
    pub fn approve() -> Self {
        Self::Respond(
            "VERDICT: APPROVED\nCONFIDENCE: HIGH\n\
             SUMMARY: The submission meets all stated requirements.\n\
             DETAILS: Scripted approval."
                .to_string(),
        )
    }

    /// A well-formed rejection in the required response format
    pub fn reject() -> Self {
        Self::Respond(
            "VERDICT: REJECTED\nCONFIDENCE: HIGH\n\
             SUMMARY: The submission misses stated requirements.\n\
             DETAILS: Scripted rejection."
                .to_string(),
        )
    }
}

/// Deterministic provider that replays a scripted sequence of judgments.
///
/// Judgments are consumed in call order; an exhausted script fails the call.
/// Snapshots serve registered content, or fail when none is registered.
/// Call counters let tests assert exactly how many provider invocations a
/// flow produced.
pub struct ScriptedProvider {
    judgments: Mutex<VecDeque<ScriptedJudgment>>,
    snapshots: Mutex<HashMap<String, String>>,
    judge_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            judgments: Mutex::new(VecDeque::new()),
            snapshots: Mutex::new(HashMap::new()),
            judge_calls: AtomicUsize::new(0),
            snapshot_calls: AtomicUsize::new(0),
        }
    }

    /// Register content served for a submission reference
    pub fn with_snapshot(self, reference: impl Into<String>, content: impl Into<String>) -> Self {
        self.snapshots
            .lock()
            .unwrap()
            .insert(reference.into(), content.into());
        self
    }

    /// Append judgments to the script
    pub fn script(&self, judgments: impl IntoIterator<Item = ScriptedJudgment>) {
        self.judgments.lock().unwrap().extend(judgments);
    }

    /// How many judge calls have been made
    pub fn judge_calls(&self) -> usize {
        self.judge_calls.load(Ordering::SeqCst)
    }

    /// How many snapshot calls have been made
    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JudgmentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn snapshot(&self, reference: &str) -> Result<Snapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let content = self.snapshots.lock().unwrap().get(reference).cloned();
        match content {
            Some(content) => Ok(Snapshot::pin(reference, content)),
            None => Err(ProviderError::FetchFailed {
                reference: reference.to_string(),
                message: "no scripted content".to_string(),
            }),
        }
    }

    async fn judge(&self, _prompt: &str) -> Result<String> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        // Popped before the first await point, so concurrent executions
        // consume the script in dispatch order.
        let next = self.judgments.lock().unwrap().pop_front();
        match next {
            Some(ScriptedJudgment::Respond(raw)) => Ok(raw),
            Some(ScriptedJudgment::Fail(message)) => {
                Err(ProviderError::RequestFailed { message })
            }
            Some(ScriptedJudgment::Stall) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(ProviderError::RequestFailed {
                message: "script exhausted".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_judgments_replay_in_order() {
        let provider = ScriptedProvider::new();
        provider.script([ScriptedJudgment::approve(), ScriptedJudgment::reject()]);

        let first = provider.judge("p").await.unwrap();
        assert!(first.contains("VERDICT: APPROVED"));
        let second = provider.judge("p").await.unwrap();
        assert!(second.contains("VERDICT: REJECTED"));
        assert_eq!(provider.judge_calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_fails() {
        let provider = ScriptedProvider::new();
        assert!(provider.judge("p").await.is_err());
    }

    #[tokio::test]
    async fn scripted_snapshot_serves_registered_content() {
        let provider = ScriptedProvider::new().with_snapshot("ref", "deliverable");
        let snap = provider.snapshot("ref").await.unwrap();
        assert_eq!(snap.content, "deliverable");
        assert!(snap.verify());

        assert!(provider.snapshot("other").await.is_err());
        assert_eq!(provider.snapshot_calls(), 2);
    }
}
