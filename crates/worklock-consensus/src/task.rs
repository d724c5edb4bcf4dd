//! Judgment tasks and the equivalence predicate

use serde::{Deserialize, Serialize};
use worklock_provider::Snapshot;
use worklock_types::{JobId, Verdict};

/// Rule for deciding whether two judgment outputs count as the same verdict.
///
/// Exact output equality would almost never agree for generative text; the
/// predicate is what makes majority agreement achievable while keeping each
/// judgment independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquivalencePredicate {
    /// Two outputs are equivalent iff they normalize to the same binary
    /// APPROVED/REJECTED verdict. Rationale, wording, and confidence are
    /// ignored. An output with no explicit verdict marker normalizes to
    /// Rejected, the safer default for the client.
    BinaryVerdict,
}

impl EquivalencePredicate {
    /// Normalize a raw judgment output to a verdict
    pub fn normalize(&self, raw_output: &str) -> Verdict {
        match self {
            EquivalencePredicate::BinaryVerdict => {
                let upper = raw_output.to_uppercase();
                if upper.contains("VERDICT: APPROVED") || upper.contains("VERDICT:APPROVED") {
                    Verdict::Approved
                } else {
                    Verdict::Rejected
                }
            }
        }
    }

    /// Whether two normalized verdicts count as the same judgment
    pub fn equivalent(&self, a: Verdict, b: Verdict) -> bool {
        a.is_decisive() && a == b
    }
}

/// An immutable judgment task.
///
/// Built once at dispatch time; every execution in every round of a job's
/// evaluation runs against this exact task. In particular the snapshot is
/// never re-fetched per validator, so a mutable submission resource cannot
/// diverge the comparison basis mid-consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentTask {
    /// The job under evaluation
    pub job_id: JobId,
    /// The full evaluation prompt, with requirements and content baked in
    pub prompt_context: String,
    /// The pinned, content-addressed submission snapshot
    pub snapshot: Snapshot,
    /// How executions are compared
    pub predicate: EquivalencePredicate,
}
