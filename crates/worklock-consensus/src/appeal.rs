//! Appeal manager: escalates failed rounds with enlarged validator sets
//!
//! Every appeal re-runs the same pinned task with a strictly larger
//! committee and a fresh deterministic leader selection. The appeal budget
//! is bounded; exhausting it yields an Unresolvable outcome and the ledger's
//! safe default applies (refund to client).

use tracing::{info, warn};
use worklock_types::{FinalVerdict, Result, Verdict, WorklockError};

use crate::engine::ConsensusEngine;
use crate::round::{ConsensusRound, RoundOutcome};
use crate::task::JudgmentTask;

/// Terminal outcome of a full evaluation, with its audit trail
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub verdict: FinalVerdict,
    /// The finalizing leader's raw output, or a note on why no round
    /// finalized; stored on the job for transparency
    pub evaluation: String,
    /// Every round run for this evaluation, in order
    pub history: Vec<ConsensusRound>,
}

/// Escalates failed rounds until finality or budget exhaustion
pub struct AppealManager {
    engine: ConsensusEngine,
}

impl AppealManager {
    pub fn new(engine: ConsensusEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// Run rounds over the pinned task until one finalizes or the appeal
    /// budget is exhausted.
    ///
    /// Round `k+1` seats `2n-1` participants where round `k` seated `n`,
    /// clamped to the pool; a committee that can no longer grow strictly
    /// ends the escalation early. Validator counts across the returned
    /// history are therefore strictly increasing.
    pub async fn evaluate(&self, task: &JudgmentTask) -> Result<EvaluationOutcome> {
        let config = self.engine.config();
        if config.pool.len() < config.initial_validator_count {
            return Err(WorklockError::PoolExhausted {
                needed: config.initial_validator_count,
                available: config.pool.len(),
            });
        }

        let mut history: Vec<ConsensusRound> = Vec::new();
        let mut count = config.initial_validator_count;
        let mut previous_count = 0usize;

        for round_number in 1..=config.max_rounds {
            if count <= previous_count {
                warn!(
                    job_id = %task.job_id,
                    pool = config.pool.len(),
                    "Validator pool cannot grow the committee further, ending escalation"
                );
                break;
            }

            let round = self.engine.run_round(task, round_number, count).await?;
            let outcome = round.outcome.clone();
            history.push(round);

            match outcome {
                RoundOutcome::Finalized(verdict) => {
                    let evaluation = history
                        .last()
                        .and_then(|r| r.leader_execution())
                        .and_then(|e| e.raw_output.clone())
                        .unwrap_or_default();
                    let verdict = match verdict {
                        Verdict::Approved => FinalVerdict::Approved,
                        // Abstain cannot finalize; anything else is a rejection
                        _ => FinalVerdict::Rejected,
                    };
                    info!(
                        job_id = %task.job_id,
                        round_number,
                        verdict = %verdict,
                        "Evaluation finalized"
                    );
                    return Ok(EvaluationOutcome {
                        verdict,
                        evaluation,
                        history,
                    });
                }
                RoundOutcome::Failed => {
                    previous_count = count;
                    count = (count * 2 - 1).min(config.pool.len());
                }
                RoundOutcome::Pending => unreachable!("run_round never returns Pending"),
            }
        }

        warn!(
            job_id = %task.job_id,
            rounds = history.len(),
            "Appeal budget exhausted, evaluation unresolvable"
        );
        Ok(EvaluationOutcome {
            verdict: FinalVerdict::Unresolvable,
            evaluation: format!(
                "UNRESOLVABLE: no consensus after {} round(s)",
                history.len()
            ),
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::JudgmentDispatcher;
    use crate::engine::ConsensusConfig;
    use std::sync::Arc;
    use worklock_provider::{ScriptedJudgment, ScriptedProvider};
    use worklock_types::{AccountId, Amount, Job, ValidatorId};

    async fn pinned_task(provider: &ScriptedProvider) -> JudgmentTask {
        let mut job = Job::new(
            AccountId::new(),
            "Build a Landing Page".into(),
            "Hero, features grid, contact form".into(),
            Amount::new(1_000_000),
            72,
        )
        .unwrap();
        job.submission_ref = Some("ref".to_string());
        JudgmentDispatcher::dispatch(provider, &job).await.unwrap()
    }

    fn manager(provider: Arc<ScriptedProvider>, pool_size: usize) -> AppealManager {
        let pool = (0..pool_size).map(|_| ValidatorId::new()).collect();
        let config = ConsensusConfig::new(pool).with_seed(42);
        AppealManager::new(ConsensusEngine::new(provider, config))
    }

    /// One contested judgment round: leader approves, the committee rejects
    fn contested_round(participants: usize) -> Vec<ScriptedJudgment> {
        let mut script = vec![ScriptedJudgment::approve()];
        script.extend((1..participants).map(|_| ScriptedJudgment::reject()));
        script
    }

    #[tokio::test]
    async fn failed_round_escalates_to_nine_participants() {
        let provider = Arc::new(ScriptedProvider::new().with_snapshot("ref", "work"));
        let task = pinned_task(&provider).await;

        // Round 1 (5 seats): contested. Round 2 (9 seats): unanimous approve.
        provider.script(contested_round(5));
        provider.script((0..9).map(|_| ScriptedJudgment::approve()));

        let outcome = manager(provider.clone(), 17).evaluate(&task).await.unwrap();
        assert_eq!(outcome.verdict, FinalVerdict::Approved);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[0].validator_count, 5);
        assert_eq!(outcome.history[1].validator_count, 9);
        assert!(outcome.evaluation.contains("VERDICT: APPROVED"));

        // Both rounds ran against the same pinned snapshot, never re-fetched
        assert_eq!(
            outcome.history[0].task.snapshot.content_hash,
            outcome.history[1].task.snapshot.content_hash
        );
        assert_eq!(provider.snapshot_calls(), 1);
    }

    #[tokio::test]
    async fn validator_counts_strictly_increase_across_appeals() {
        let provider = Arc::new(ScriptedProvider::new().with_snapshot("ref", "work"));
        let task = pinned_task(&provider).await;

        provider.script(contested_round(5));
        provider.script(contested_round(9));
        provider.script(contested_round(17));

        let outcome = manager(provider, 17).evaluate(&task).await.unwrap();
        assert_eq!(outcome.verdict, FinalVerdict::Unresolvable);
        let counts: Vec<usize> = outcome.history.iter().map(|r| r.validator_count).collect();
        assert_eq!(counts, vec![5, 9, 17]);
        for pair in counts.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[tokio::test]
    async fn small_pool_ends_escalation_early() {
        let provider = Arc::new(ScriptedProvider::new().with_snapshot("ref", "work"));
        let task = pinned_task(&provider).await;

        // Pool of 9: rounds seat 5 then 9; a third round cannot grow
        provider.script(contested_round(5));
        provider.script(contested_round(9));

        let outcome = manager(provider.clone(), 9).evaluate(&task).await.unwrap();
        assert_eq!(outcome.verdict, FinalVerdict::Unresolvable);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(provider.judge_calls(), 14);
    }

    #[tokio::test]
    async fn pool_smaller_than_first_round_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new().with_snapshot("ref", "work"));
        let task = pinned_task(&provider).await;

        let err = manager(provider, 3).evaluate(&task).await.unwrap_err();
        assert!(matches!(err, WorklockError::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn rejection_consensus_finalizes_rejected() {
        let provider = Arc::new(ScriptedProvider::new().with_snapshot("ref", "work"));
        let task = pinned_task(&provider).await;

        provider.script((0..5).map(|_| ScriptedJudgment::reject()));

        let outcome = manager(provider, 5).evaluate(&task).await.unwrap();
        assert_eq!(outcome.verdict, FinalVerdict::Rejected);
        assert_eq!(outcome.history.len(), 1);
    }
}
