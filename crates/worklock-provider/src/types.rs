//! Common types for judgment provider interactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur at the judgment boundary.
///
/// Timeouts are not a provider concern; callers bound executions themselves
/// and treat an elapsed deadline as an abstention.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Fetch failed for {reference}: {message}")]
    FetchFailed { reference: String, message: String },

    #[error("Judgment request failed: {message}")]
    RequestFailed { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// A pinned, content-addressed snapshot of a submission.
///
/// Taken exactly once when a judgment task is dispatched and shared by every
/// execution in every round. If the underlying resource mutates afterwards,
/// consensus still compares against this content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The reference the content was fetched from
    pub source_ref: String,
    /// sha256 of the content, hex-encoded
    pub content_hash: String,
    /// The content itself
    pub content: String,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Pin content fetched from `source_ref`
    pub fn pin(source_ref: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self {
            source_ref: source_ref.into(),
            content_hash: hex::encode(hasher.finalize()),
            content,
            taken_at: Utc::now(),
        }
    }

    /// Verify the content still matches its hash
    pub fn verify(&self) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize()) == self.content_hash
    }
}
