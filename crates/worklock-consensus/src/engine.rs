//! The consensus engine: executes one round of leader/validator judgments

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use worklock_provider::JudgmentProvider;
use worklock_types::{Result, ValidatorId, Verdict};

use crate::round::{
    evaluate_quorum, majority_threshold, ConsensusRound, ExecutionRole, RoundOutcome,
    ValidatorExecution,
};
use crate::selection::select_committee;
use crate::task::JudgmentTask;

/// Configuration for consensus rounds
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// The active validator pool committees are drawn from
    pub pool: Vec<ValidatorId>,
    /// Participants in the first round (leader included)
    pub initial_validator_count: usize,
    /// Appeal budget: total rounds before the outcome is Unresolvable
    pub max_rounds: u32,
    /// Seed for deterministic committee selection
    pub seed: u64,
    /// Per-execution timeout; an execution past this registers as Abstain
    pub execution_timeout: Duration,
}

impl ConsensusConfig {
    pub fn new(pool: Vec<ValidatorId>) -> Self {
        Self {
            pool,
            initial_validator_count: 5,
            max_rounds: 3,
            seed: 0,
            execution_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_initial_validator_count(mut self, count: usize) -> Self {
        self.initial_validator_count = count;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_execution_timeout(mut self, execution_timeout: Duration) -> Self {
        self.execution_timeout = execution_timeout;
        self
    }
}

/// Runs leader/validator executions of a pinned task and determines
/// round finality
pub struct ConsensusEngine {
    provider: Arc<dyn JudgmentProvider>,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(provider: Arc<dyn JudgmentProvider>, config: ConsensusConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Run one consensus round with `validator_count` participants.
    ///
    /// The leader executes first and proposes a verdict; the remaining
    /// participants execute concurrently against the same pinned task. The
    /// round blocks until every execution completes or its per-execution
    /// timeout elapses. In-flight executions are never cancelled.
    pub async fn run_round(
        &self,
        task: &JudgmentTask,
        round_number: u32,
        validator_count: usize,
    ) -> Result<ConsensusRound> {
        let committee = select_committee(
            &self.config.pool,
            task.job_id,
            round_number,
            self.config.seed,
            validator_count,
        )?;
        let quorum_threshold = majority_threshold(validator_count);

        info!(
            job_id = %task.job_id,
            round_number,
            validator_count,
            quorum_threshold,
            leader = %committee.leader,
            "Consensus round starting"
        );

        let leader_execution = self
            .execute(committee.leader, ExecutionRole::Leader, task)
            .await;
        let leader_verdict = leader_execution.verdict;

        if !leader_verdict.is_decisive() {
            // No proposal to corroborate; validators are not dispatched.
            warn!(job_id = %task.job_id, round_number, "Leader abstained, round failed");
            return Ok(ConsensusRound {
                round_number,
                task: task.clone(),
                validator_count,
                quorum_threshold,
                executions: vec![leader_execution],
                outcome: RoundOutcome::Failed,
            });
        }

        let validator_executions = join_all(
            committee
                .validators
                .iter()
                .map(|v| self.execute(*v, ExecutionRole::Validator, task)),
        )
        .await;

        let validator_verdicts: Vec<Verdict> =
            validator_executions.iter().map(|e| e.verdict).collect();
        let outcome = evaluate_quorum(
            task.predicate,
            leader_verdict,
            &validator_verdicts,
            quorum_threshold,
        );

        let agreeing = validator_verdicts
            .iter()
            .filter(|v| task.predicate.equivalent(**v, leader_verdict))
            .count()
            + 1;
        info!(
            job_id = %task.job_id,
            round_number,
            leader_verdict = %leader_verdict,
            agreeing,
            quorum_threshold,
            outcome = ?outcome,
            "Consensus round finished"
        );

        let mut executions = vec![leader_execution];
        executions.extend(validator_executions);
        Ok(ConsensusRound {
            round_number,
            task: task.clone(),
            validator_count,
            quorum_threshold,
            executions,
            outcome,
        })
    }

    async fn execute(
        &self,
        validator_id: ValidatorId,
        role: ExecutionRole,
        task: &JudgmentTask,
    ) -> ValidatorExecution {
        let judged = timeout(
            self.config.execution_timeout,
            self.provider.judge(&task.prompt_context),
        )
        .await;

        let (raw_output, verdict) = match judged {
            Ok(Ok(raw)) => {
                let verdict = task.predicate.normalize(&raw);
                (Some(raw), verdict)
            }
            Ok(Err(e)) => {
                warn!(%validator_id, error = %e, "Judgment failed, registering abstention");
                (None, Verdict::Abstain)
            }
            Err(_) => {
                warn!(
                    %validator_id,
                    timeout_secs = self.config.execution_timeout.as_secs(),
                    "Judgment timed out, registering abstention"
                );
                (None, Verdict::Abstain)
            }
        };

        ValidatorExecution {
            validator_id,
            role,
            raw_output,
            verdict,
            completed_at: Utc::now(),
        }
    }
}
