//! Verdict types for consensus-gated evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized outcome of a single judgment execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The submission satisfies the requirements
    Approved,
    /// The submission does not satisfy the requirements
    Rejected,
    /// No verdict: the provider failed or timed out. Excluded from
    /// agreement counting.
    Abstain,
}

impl Verdict {
    /// Whether this is a real verdict (not an abstention)
    pub fn is_decisive(&self) -> bool {
        !matches!(self, Verdict::Abstain)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approved => write!(f, "approved"),
            Verdict::Rejected => write!(f, "rejected"),
            Verdict::Abstain => write!(f, "abstain"),
        }
    }
}

/// Terminal outcome of a job's evaluation, after consensus (or its failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalVerdict {
    /// Consensus finalized on approval; funds go to the freelancer
    Approved,
    /// Consensus finalized on rejection; funds return to the client
    Rejected,
    /// Appeal rounds exhausted without finality; safe default applies
    /// (funds return to the client)
    Unresolvable,
}

impl fmt::Display for FinalVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalVerdict::Approved => write!(f, "approved"),
            FinalVerdict::Rejected => write!(f, "rejected"),
            FinalVerdict::Unresolvable => write!(f, "unresolvable"),
        }
    }
}

/// The stored result of an evaluation, kept on the job for transparency
/// and replayed verbatim on repeated evaluation requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// The terminal verdict
    pub verdict: FinalVerdict,
    /// The leading raw output (or the fetch error) that decided the job
    pub evaluation: String,
    /// Number of consensus rounds it took
    pub rounds: u32,
    /// When the verdict became final
    pub decided_at: DateTime<Utc>,
}
