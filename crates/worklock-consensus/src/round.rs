//! Consensus rounds and quorum evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use worklock_types::{ValidatorId, Verdict};

use crate::task::{EquivalencePredicate, JudgmentTask};

/// Role of a participant within one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionRole {
    /// Executed first, proposed the round's verdict
    Leader,
    /// Independently corroborated or contested the proposal
    Validator,
}

/// One participant's judgment execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorExecution {
    pub validator_id: ValidatorId,
    pub role: ExecutionRole,
    /// Raw provider output; None when the provider failed or timed out
    pub raw_output: Option<String>,
    /// Normalized verdict (Abstain for provider failure/timeout)
    pub verdict: Verdict,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of one consensus round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Executions still running
    Pending,
    /// Quorum reached on the leader's verdict
    Finalized(Verdict),
    /// Quorum missed or unreachable; eligible for appeal
    Failed,
}

/// A single round of leader/validator executions over a pinned task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRound {
    /// 1-based round number within the job's appeal history
    pub round_number: u32,
    /// The pinned task every execution in this round ran against. Appeal
    /// rounds carry the same task; the snapshot hash proves it in the
    /// audit trail.
    pub task: JudgmentTask,
    /// Total participants including the leader
    pub validator_count: usize,
    /// Agreeing participants (leader included) required to finalize
    pub quorum_threshold: usize,
    /// All executions, leader first
    pub executions: Vec<ValidatorExecution>,
    pub outcome: RoundOutcome,
}

impl ConsensusRound {
    /// The leader's execution, if recorded
    pub fn leader_execution(&self) -> Option<&ValidatorExecution> {
        self.executions
            .iter()
            .find(|e| e.role == ExecutionRole::Leader)
    }
}

/// Evaluate the quorum rule over a leader verdict and validator verdicts.
///
/// Finalized iff `count(v == leader) + 1 >= threshold`, counting only
/// decisive validator verdicts. Abstentions are excluded from the agreement
/// numerator and from the participation count used to judge reachability:
/// when fewer than `threshold` participants produced a decisive verdict,
/// quorum is mathematically unreachable and the round fails no matter how
/// the decisive verdicts fell. A leader abstention fails the round outright,
/// since there is no proposed verdict to agree with.
///
/// The rule is a pure count over the verdict multiset, so it holds under any
/// permutation of the validator verdicts.
pub fn evaluate_quorum(
    predicate: EquivalencePredicate,
    leader_verdict: Verdict,
    validator_verdicts: &[Verdict],
    threshold: usize,
) -> RoundOutcome {
    if !leader_verdict.is_decisive() {
        return RoundOutcome::Failed;
    }

    let decisive = validator_verdicts.iter().filter(|v| v.is_decisive()).count() + 1;
    if decisive < threshold {
        return RoundOutcome::Failed;
    }

    let agreeing = validator_verdicts
        .iter()
        .filter(|v| predicate.equivalent(**v, leader_verdict))
        .count();
    if agreeing + 1 >= threshold {
        RoundOutcome::Finalized(leader_verdict)
    } else {
        RoundOutcome::Failed
    }
}

/// Majority threshold for a committee of `validator_count` participants
pub fn majority_threshold(validator_count: usize) -> usize {
    validator_count / 2 + 1
}
