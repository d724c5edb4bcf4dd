//! Worklock Ledger - the escrow job state machine
//!
//! The ledger owns every fund-moving decision. Status transitions follow the
//! closed table in `worklock-types`; the two terminal transitions (Completed,
//! Refunded) are gated behind consensus finality and committed atomically
//! with their fund transfer:
//!
//! - the transfer executes under the job's writer lock, before the status
//!   write, so a transitioned-but-unpaid job cannot be observed
//! - a custody failure leaves the prior status intact and halts the job
//!   pending manual reconciliation
//! - replaying a terminal operation returns the stored result, never a
//!   second transfer
//!
//! Per-job operations are serialized single-writer; concurrent conflicting
//! calls resolve first-committer-wins and losers get a state error.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use worklock_consensus::{
    AppealManager, ConsensusConfig, ConsensusEngine, ConsensusRound, DispatchError,
    JudgmentDispatcher,
};
use worklock_custody::FundCustody;
use worklock_provider::JudgmentProvider;
use worklock_types::{
    AccountId, Amount, EvaluationRecord, FinalVerdict, Job, JobId, JobStatus, JobView, Result,
    WorklockError,
};

/// A job record with its append-only consensus audit trail
struct JobRecord {
    job: Job,
    /// Every consensus round ever run for this job, in order
    history: Vec<ConsensusRound>,
    /// Set on custody failure; all further operations fail until reconciled
    halted: Option<String>,
}

/// The escrow ledger
///
/// Holds every job, serializes per-job operations, invokes the dispatcher
/// and consensus engine on evaluation requests, and applies fund-moving
/// transitions only on finalized verdicts.
pub struct EscrowLedger {
    jobs: DashMap<JobId, Arc<Mutex<JobRecord>>>,
    custody: Arc<dyn FundCustody>,
    provider: Arc<dyn JudgmentProvider>,
    appeals: AppealManager,
    /// The account escrowed funds sit in between creation and settlement
    escrow_account: AccountId,
}

impl EscrowLedger {
    pub fn new(
        custody: Arc<dyn FundCustody>,
        provider: Arc<dyn JudgmentProvider>,
        consensus: ConsensusConfig,
    ) -> Self {
        let engine = ConsensusEngine::new(provider.clone(), consensus);
        Self {
            jobs: DashMap::new(),
            custody,
            provider,
            appeals: AppealManager::new(engine),
            escrow_account: AccountId::new(),
        }
    }

    /// The ledger's escrow account
    pub fn escrow_account(&self) -> AccountId {
        self.escrow_account
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create a job. Funds move client → escrow atomically with creation:
    /// no job exists unless its funds are locked.
    pub async fn create_job(
        &self,
        client: AccountId,
        title: impl Into<String>,
        requirements: impl Into<String>,
        deadline_hours: i64,
        payment_amount: Amount,
    ) -> Result<JobId> {
        let title = title.into();
        let requirements = requirements.into();
        if title.is_empty() {
            return Err(WorklockError::validation("Job title required"));
        }
        if requirements.is_empty() {
            return Err(WorklockError::validation("Requirements required"));
        }
        if deadline_hours <= 0 {
            return Err(WorklockError::validation("Deadline must be in the future"));
        }
        if payment_amount.is_zero() {
            return Err(WorklockError::validation("Must include payment"));
        }

        // Construct first: nothing fallible may sit between the escrow
        // debit and the record insert.
        let job = Job::new(client, title, requirements, payment_amount, deadline_hours)?;
        let job_id = job.id;

        self.custody
            .transfer(&client, &self.escrow_account, payment_amount)
            .await?;
        info!(%job_id, %client, amount = %payment_amount, "Job created, funds escrowed");

        self.jobs.insert(
            job_id,
            Arc::new(Mutex::new(JobRecord {
                job,
                history: Vec::new(),
                halted: None,
            })),
        );
        Ok(job_id)
    }

    /// Accept an open job. First committer wins; the client cannot accept
    /// their own job.
    pub async fn accept_job(&self, job_id: JobId, caller: AccountId) -> Result<()> {
        let record = self.record(job_id)?;
        let mut record = record.lock().await;
        Self::check_active(&record, job_id)?;

        if record.job.status != JobStatus::Open {
            return Err(Self::state_error(&record.job, "job not available"));
        }
        if caller == record.job.client {
            return Err(WorklockError::authorization("Client cannot accept own job"));
        }

        record.job.freelancer = Some(caller);
        record.job.status = JobStatus::InProgress;
        info!(%job_id, freelancer = %caller, "Job accepted");
        Ok(())
    }

    /// Submit the deliverable reference for an in-progress job
    pub async fn submit_work(
        &self,
        job_id: JobId,
        caller: AccountId,
        submission_ref: impl Into<String>,
    ) -> Result<()> {
        let submission_ref = submission_ref.into();
        if submission_ref.is_empty() {
            return Err(WorklockError::validation("Submission reference cannot be empty"));
        }

        let record = self.record(job_id)?;
        let mut record = record.lock().await;
        Self::check_active(&record, job_id)?;

        if record.job.status != JobStatus::InProgress {
            return Err(Self::state_error(&record.job, "job not in progress"));
        }
        if record.job.freelancer != Some(caller) {
            return Err(WorklockError::authorization(
                "Only assigned freelancer can submit",
            ));
        }

        record.job.submission_ref = Some(submission_ref);
        record.job.status = JobStatus::Submitted;
        info!(%job_id, "Work submitted");
        Ok(())
    }

    /// Evaluate a submitted job through consensus and apply the terminal
    /// transition on the finalized verdict.
    ///
    /// Idempotent once finalized: replays return the stored verdict without
    /// re-invoking the provider or starting a new round. Unresolvable
    /// evaluations refund the client (the safe default) and surface as an
    /// error, on the first call and on every replay.
    pub async fn request_evaluation(&self, job_id: JobId) -> Result<FinalVerdict> {
        let record = self.record(job_id)?;
        let mut record = record.lock().await;
        Self::check_active(&record, job_id)?;

        // Replay of a finalized evaluation
        if record.job.status.is_terminal() {
            if let Some(stored) = &record.job.evaluation {
                return match stored.verdict {
                    FinalVerdict::Unresolvable => Err(WorklockError::ConsensusUnresolvable {
                        job_id: job_id.to_string(),
                        rounds: stored.rounds,
                    }),
                    verdict => Ok(verdict),
                };
            }
            return Err(Self::state_error(&record.job, "no submission to evaluate"));
        }
        if record.job.status != JobStatus::Submitted {
            return Err(Self::state_error(&record.job, "no submission to evaluate"));
        }

        // Pin the task: one snapshot, shared by every round
        let task = match JudgmentDispatcher::dispatch(self.provider.as_ref(), &record.job).await {
            Ok(task) => task,
            Err(DispatchError::NoSubmission) => {
                return Err(Self::state_error(&record.job, "no submission to evaluate"));
            }
            Err(err @ DispatchError::SnapshotFailed { .. }) => {
                // The pinned fetch failed for everyone alike: the work is
                // unverifiable, which resolves against the freelancer.
                warn!(%job_id, error = %err, "Submission unreachable, rejecting");
                let evaluation = EvaluationRecord {
                    verdict: FinalVerdict::Rejected,
                    evaluation: format!("REJECTED: {err}"),
                    rounds: 0,
                    decided_at: Utc::now(),
                };
                self.commit_terminal(&mut record, JobStatus::Refunded, Some(evaluation))
                    .await?;
                return Ok(FinalVerdict::Rejected);
            }
        };

        let outcome = self.appeals.evaluate(&task).await?;
        let rounds = outcome.history.len() as u32;
        record.history.extend(outcome.history);

        let evaluation = EvaluationRecord {
            verdict: outcome.verdict,
            evaluation: outcome.evaluation,
            rounds,
            decided_at: Utc::now(),
        };

        match outcome.verdict {
            FinalVerdict::Approved => {
                self.commit_terminal(&mut record, JobStatus::Completed, Some(evaluation))
                    .await?;
                Ok(FinalVerdict::Approved)
            }
            FinalVerdict::Rejected => {
                self.commit_terminal(&mut record, JobStatus::Refunded, Some(evaluation))
                    .await?;
                Ok(FinalVerdict::Rejected)
            }
            FinalVerdict::Unresolvable => {
                // Absence of proven completion favors returning custody
                self.commit_terminal(&mut record, JobStatus::Refunded, Some(evaluation))
                    .await?;
                Err(WorklockError::ConsensusUnresolvable {
                    job_id: job_id.to_string(),
                    rounds,
                })
            }
        }
    }

    /// Client cancels an open job for a full refund
    pub async fn cancel_job(&self, job_id: JobId, caller: AccountId) -> Result<()> {
        let record = self.record(job_id)?;
        let mut record = record.lock().await;
        Self::check_active(&record, job_id)?;

        if record.job.status != JobStatus::Open {
            return Err(Self::state_error(&record.job, "can only cancel open jobs"));
        }
        if caller != record.job.client {
            return Err(WorklockError::authorization("Only client can cancel"));
        }

        self.commit_terminal(&mut record, JobStatus::Refunded, None)
            .await?;
        info!(%job_id, "Job cancelled, client refunded");
        Ok(())
    }

    /// Client claims a refund after the deadline passed without a submission
    pub async fn claim_deadline_refund(&self, job_id: JobId, caller: AccountId) -> Result<()> {
        let record = self.record(job_id)?;
        let mut record = record.lock().await;
        Self::check_active(&record, job_id)?;

        if !matches!(
            record.job.status,
            JobStatus::Open | JobStatus::InProgress
        ) {
            return Err(Self::state_error(
                &record.job,
                "invalid status for deadline refund",
            ));
        }
        if caller != record.job.client {
            return Err(WorklockError::authorization(
                "Only client can claim deadline refund",
            ));
        }
        if !record.job.is_deadline_passed(Utc::now()) {
            return Err(WorklockError::Deadline {
                job_id: job_id.to_string(),
                message: "deadline not yet passed".to_string(),
            });
        }

        self.commit_terminal(&mut record, JobStatus::Refunded, None)
            .await?;
        info!(%job_id, "Deadline refund claimed");
        Ok(())
    }

    /// Freelancer withdraws before submitting; the job reopens
    pub async fn withdraw_freelancer(&self, job_id: JobId, caller: AccountId) -> Result<()> {
        let record = self.record(job_id)?;
        let mut record = record.lock().await;
        Self::check_active(&record, job_id)?;

        if record.job.status != JobStatus::InProgress {
            return Err(Self::state_error(
                &record.job,
                "can only withdraw from in-progress jobs",
            ));
        }
        if record.job.freelancer != Some(caller) {
            return Err(WorklockError::authorization(
                "Only assigned freelancer can withdraw",
            ));
        }

        record.job.freelancer = None;
        record.job.status = JobStatus::Open;
        info!(%job_id, "Freelancer withdrew, job reopened");
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Full job details
    pub async fn job_details(&self, job_id: JobId) -> Result<JobView> {
        let record = self.record(job_id)?;
        let record = record.lock().await;
        Ok(JobView::from(&record.job))
    }

    /// Quick status check
    pub async fn status(&self, job_id: JobId) -> Result<JobStatus> {
        let record = self.record(job_id)?;
        let record = record.lock().await;
        Ok(record.job.status)
    }

    /// Stored evaluation record, if the job has been evaluated
    pub async fn evaluation(&self, job_id: JobId) -> Result<Option<EvaluationRecord>> {
        let record = self.record(job_id)?;
        let record = record.lock().await;
        Ok(record.job.evaluation.clone())
    }

    /// The job's full append-only consensus history, for audit
    pub async fn appeal_history(&self, job_id: JobId) -> Result<Vec<ConsensusRound>> {
        let record = self.record(job_id)?;
        let record = record.lock().await;
        Ok(record.history.clone())
    }

    /// Whether the submission deadline has passed
    pub async fn is_deadline_passed(&self, job_id: JobId) -> Result<bool> {
        let record = self.record(job_id)?;
        let record = record.lock().await;
        Ok(record.job.is_deadline_passed(Utc::now()))
    }

    /// Seconds until the deadline (0 once passed)
    pub async fn time_remaining(&self, job_id: JobId) -> Result<u64> {
        let record = self.record(job_id)?;
        let record = record.lock().await;
        Ok(record.job.time_remaining(Utc::now()))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn record(&self, job_id: JobId) -> Result<Arc<Mutex<JobRecord>>> {
        self.jobs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| WorklockError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    fn check_active(record: &JobRecord, job_id: JobId) -> Result<()> {
        match &record.halted {
            Some(message) => Err(WorklockError::Custody {
                job_id: job_id.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn state_error(job: &Job, message: &str) -> WorklockError {
        WorklockError::State {
            job_id: job.id.to_string(),
            status: job.status.to_string(),
            message: message.to_string(),
        }
    }

    /// Commit a terminal transition: transfer first, status write after.
    ///
    /// Runs under the job's writer lock. A transfer failure leaves the prior
    /// status intact and halts the job, so a transitioned-but-unpaid state
    /// can never be observed and a transfer is never retried outside a
    /// fresh reconciliation.
    async fn commit_terminal(
        &self,
        record: &mut JobRecord,
        new_status: JobStatus,
        evaluation: Option<EvaluationRecord>,
    ) -> Result<()> {
        let job_id = record.job.id;
        if !record.job.status.can_transition_to(new_status) {
            return Err(Self::state_error(&record.job, "transition not allowed"));
        }
        if record.job.transfer_receipt.is_some() {
            return Err(Self::state_error(&record.job, "funds already settled"));
        }

        let recipient = match new_status {
            JobStatus::Completed => record.job.freelancer.ok_or_else(|| {
                Self::state_error(&record.job, "no freelancer to pay")
            })?,
            JobStatus::Refunded => record.job.client,
            _ => return Err(Self::state_error(&record.job, "not a terminal status")),
        };

        let transfer = self
            .custody
            .transfer(&self.escrow_account, &recipient, record.job.payment_amount)
            .await;

        match transfer {
            Ok(receipt) => {
                record.job.status = new_status;
                record.job.transfer_receipt = Some(receipt.id);
                if evaluation.is_some() {
                    record.job.evaluation = evaluation;
                }
                info!(
                    %job_id,
                    status = %new_status,
                    to = %recipient,
                    amount = %record.job.payment_amount,
                    "Terminal transition committed"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!(%job_id, error = %message, "Custody failure, job halted");
                record.halted = Some(message.clone());
                Err(WorklockError::Custody {
                    job_id: job_id.to_string(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use worklock_custody::InMemoryCustody;
    use worklock_provider::{ScriptedJudgment, ScriptedProvider};
    use worklock_types::ValidatorId;

    const PAYMENT: Amount = Amount(1_000_000);

    struct Harness {
        ledger: Arc<EscrowLedger>,
        custody: Arc<InMemoryCustody>,
        provider: Arc<ScriptedProvider>,
        client: AccountId,
        freelancer: AccountId,
    }

    async fn harness(pool_size: usize) -> Harness {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("warn")
            .try_init();

        let custody = Arc::new(InMemoryCustody::new());
        let provider = Arc::new(
            ScriptedProvider::new().with_snapshot("https://example.com/work", "the deliverable"),
        );
        let pool = (0..pool_size).map(|_| ValidatorId::new()).collect();
        let config = ConsensusConfig::new(pool)
            .with_seed(42)
            .with_execution_timeout(StdDuration::from_secs(5));
        let ledger = Arc::new(EscrowLedger::new(
            custody.clone(),
            provider.clone(),
            config,
        ));

        let client = AccountId::new();
        let freelancer = AccountId::new();
        custody.set_balance(client, Amount::new(10_000_000)).await;

        Harness {
            ledger,
            custody,
            provider,
            client,
            freelancer,
        }
    }

    async fn submitted_job(h: &Harness) -> JobId {
        let job_id = h
            .ledger
            .create_job(
                h.client,
                "Build a Landing Page",
                "Responsive landing page with hero section, features grid, and contact form",
                72,
                PAYMENT,
            )
            .await
            .unwrap();
        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();
        h.ledger
            .submit_work(job_id, h.freelancer, "https://example.com/work")
            .await
            .unwrap();
        job_id
    }

    fn contested_round(participants: usize) -> Vec<ScriptedJudgment> {
        let mut script = vec![ScriptedJudgment::approve()];
        script.extend((1..participants).map(|_| ScriptedJudgment::reject()));
        script
    }

    // ========================================================================
    // Creation & bookkeeping
    // ========================================================================

    #[tokio::test]
    async fn create_job_escrows_funds_atomically() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Requirements", 72, PAYMENT)
            .await
            .unwrap();

        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Open);
        assert_eq!(h.custody.balance_of(&h.client).await, Amount::new(9_000_000));
        assert_eq!(
            h.custody.balance_of(&h.ledger.escrow_account()).await,
            PAYMENT
        );
    }

    #[tokio::test]
    async fn create_job_validates_inputs_before_any_transfer() {
        let h = harness(5).await;
        for result in [
            h.ledger.create_job(h.client, "", "Reqs", 72, PAYMENT).await,
            h.ledger.create_job(h.client, "Job", "", 72, PAYMENT).await,
            h.ledger.create_job(h.client, "Job", "Reqs", 0, PAYMENT).await,
            h.ledger
                .create_job(h.client, "Job", "Reqs", 72, Amount::zero())
                .await,
        ] {
            assert!(matches!(result, Err(WorklockError::Validation { .. })));
        }
        assert_eq!(h.custody.transfer_count().await, 0);
    }

    #[tokio::test]
    async fn overflowing_deadline_is_rejected_without_escrow_debit() {
        let h = harness(5).await;
        let err = h
            .ledger
            .create_job(h.client, "Job", "Reqs", i64::MAX, PAYMENT)
            .await
            .unwrap_err();
        assert!(matches!(err, WorklockError::Validation { .. }));

        // The client keeps their funds and no job record exists
        assert_eq!(h.custody.transfer_count().await, 0);
        assert_eq!(h.custody.balance_of(&h.client).await, Amount::new(10_000_000));
        assert_eq!(
            h.custody.balance_of(&h.ledger.escrow_account()).await,
            Amount::zero()
        );
    }

    #[tokio::test]
    async fn unfunded_client_cannot_create_a_job() {
        let h = harness(5).await;
        let broke = AccountId::new();
        let err = h
            .ledger
            .create_job(broke, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap_err();
        assert!(matches!(err, WorklockError::InsufficientFunds { .. }));
    }

    // ========================================================================
    // Accept / submit / withdraw
    // ========================================================================

    #[tokio::test]
    async fn client_cannot_accept_own_job() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        let err = h.ledger.accept_job(job_id, h.client).await.unwrap_err();
        assert!(matches!(err, WorklockError::Authorization { .. }));
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Open);
    }

    #[tokio::test]
    async fn second_accept_is_rejected() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();
        let other = AccountId::new();
        let err = h.ledger.accept_job(job_id, other).await.unwrap_err();
        assert!(matches!(err, WorklockError::State { .. }));

        let view = h.ledger.job_details(job_id).await.unwrap();
        assert_eq!(view.freelancer, Some(h.freelancer));
    }

    #[tokio::test]
    async fn concurrent_accepts_resolve_first_committer_wins() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        let a = AccountId::new();
        let b = AccountId::new();
        let (ra, rb) = tokio::join!(
            h.ledger.accept_job(job_id, a),
            h.ledger.accept_job(job_id, b),
        );

        // Exactly one succeeds; the loser gets a state conflict
        assert_ne!(ra.is_ok(), rb.is_ok());
        let loser = if ra.is_ok() { rb } else { ra };
        assert!(matches!(loser, Err(WorklockError::State { .. })));

        let view = h.ledger.job_details(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::InProgress);
        assert!(view.freelancer == Some(a) || view.freelancer == Some(b));
    }

    #[tokio::test]
    async fn only_assigned_freelancer_can_submit() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();
        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();

        let err = h
            .ledger
            .submit_work(job_id, AccountId::new(), "https://example.com/work")
            .await
            .unwrap_err();
        assert!(matches!(err, WorklockError::Authorization { .. }));
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::InProgress);
    }

    #[tokio::test]
    async fn empty_submission_ref_is_rejected_before_state_checks() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();
        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();

        let err = h
            .ledger
            .submit_work(job_id, h.freelancer, "")
            .await
            .unwrap_err();
        assert!(matches!(err, WorklockError::Validation { .. }));
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::InProgress);
    }

    #[tokio::test]
    async fn withdraw_reopens_the_job() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();
        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();
        h.ledger
            .withdraw_freelancer(job_id, h.freelancer)
            .await
            .unwrap();

        let view = h.ledger.job_details(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Open);
        assert_eq!(view.freelancer, None);

        // Another freelancer can now accept
        let other = AccountId::new();
        h.ledger.accept_job(job_id, other).await.unwrap();

        // No funds moved throughout
        assert_eq!(h.custody.transfer_count().await, 1); // creation escrow only
    }

    // ========================================================================
    // Evaluation scenarios
    // ========================================================================

    #[tokio::test]
    async fn approved_consensus_pays_freelancer_exactly_once() {
        // Scenario: 5 participants, leader approves, 3 of 4 validators agree
        let h = harness(5).await;
        let job_id = submitted_job(&h).await;
        h.provider.script([
            ScriptedJudgment::approve(), // leader
            ScriptedJudgment::approve(),
            ScriptedJudgment::approve(),
            ScriptedJudgment::approve(),
            ScriptedJudgment::reject(),
        ]);

        let verdict = h.ledger.request_evaluation(job_id).await.unwrap();
        assert_eq!(verdict, FinalVerdict::Approved);
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Completed);
        assert_eq!(h.custody.balance_of(&h.freelancer).await, PAYMENT);
        assert_eq!(
            h.custody.balance_of(&h.ledger.escrow_account()).await,
            Amount::zero()
        );
        // Escrow-in plus the single payout
        assert_eq!(h.custody.transfer_count().await, 2);

        let history = h.ledger.appeal_history(job_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].validator_count, 5);
    }

    #[tokio::test]
    async fn contested_round_escalates_then_refunds_on_rejection() {
        // Scenario: leader approves, 3 of 4 validators reject; next round
        // runs with 9 participants and rejects
        let h = harness(9).await;
        let job_id = submitted_job(&h).await;
        h.provider.script(contested_round(5));
        h.provider
            .script((0..9).map(|_| ScriptedJudgment::reject()));

        let verdict = h.ledger.request_evaluation(job_id).await.unwrap();
        assert_eq!(verdict, FinalVerdict::Rejected);
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Refunded);
        assert_eq!(h.custody.balance_of(&h.client).await, Amount::new(10_000_000));
        assert_eq!(h.custody.balance_of(&h.freelancer).await, Amount::zero());

        let history = h.ledger.appeal_history(job_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].validator_count, 5);
        assert_eq!(history[1].validator_count, 9);
    }

    #[tokio::test]
    async fn evaluation_is_idempotent_after_finality() {
        let h = harness(5).await;
        let job_id = submitted_job(&h).await;
        h.provider
            .script((0..5).map(|_| ScriptedJudgment::approve()));

        let first = h.ledger.request_evaluation(job_id).await.unwrap();
        let calls_after_first = h.provider.judge_calls();
        let second = h.ledger.request_evaluation(job_id).await.unwrap();

        assert_eq!(first, second);
        // One set of provider calls total, one snapshot, one payout
        assert_eq!(h.provider.judge_calls(), calls_after_first);
        assert_eq!(h.provider.snapshot_calls(), 1);
        assert_eq!(h.custody.transfer_count().await, 2);
    }

    #[tokio::test]
    async fn exhausted_appeals_refund_client_and_surface_error() {
        let h = harness(17).await;
        let job_id = submitted_job(&h).await;
        h.provider.script(contested_round(5));
        h.provider.script(contested_round(9));
        h.provider.script(contested_round(17));

        let err = h.ledger.request_evaluation(job_id).await.unwrap_err();
        assert!(matches!(err, WorklockError::ConsensusUnresolvable { .. }));
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Refunded);
        assert_eq!(h.custody.balance_of(&h.client).await, Amount::new(10_000_000));

        // Replay surfaces the same stored outcome without new rounds
        let calls = h.provider.judge_calls();
        let replay = h.ledger.request_evaluation(job_id).await.unwrap_err();
        assert!(matches!(replay, WorklockError::ConsensusUnresolvable { .. }));
        assert_eq!(h.provider.judge_calls(), calls);
        assert_eq!(h.custody.transfer_count().await, 2);
    }

    #[tokio::test]
    async fn unreachable_submission_rejects_without_consensus() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();
        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();
        h.ledger
            .submit_work(job_id, h.freelancer, "https://example.com/missing")
            .await
            .unwrap();

        let verdict = h.ledger.request_evaluation(job_id).await.unwrap();
        assert_eq!(verdict, FinalVerdict::Rejected);
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Refunded);
        assert_eq!(h.provider.judge_calls(), 0);

        let record = h.ledger.evaluation(job_id).await.unwrap().unwrap();
        assert!(record.evaluation.starts_with("REJECTED:"));
        assert_eq!(record.rounds, 0);
    }

    #[tokio::test]
    async fn evaluation_requires_a_submission() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        let err = h.ledger.request_evaluation(job_id).await.unwrap_err();
        assert!(matches!(err, WorklockError::State { .. }));
    }

    // ========================================================================
    // Cancellation & deadline refunds
    // ========================================================================

    #[tokio::test]
    async fn client_cancels_open_job_for_full_refund() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        h.ledger.cancel_job(job_id, h.client).await.unwrap();
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Refunded);
        assert_eq!(h.custody.balance_of(&h.client).await, Amount::new(10_000_000));

        // Cancel is only for open jobs; the refund cannot repeat
        let err = h.ledger.cancel_job(job_id, h.client).await.unwrap_err();
        assert!(matches!(err, WorklockError::State { .. }));
        assert_eq!(h.custody.transfer_count().await, 2);
    }

    #[tokio::test]
    async fn only_client_can_cancel() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        let err = h
            .ledger
            .cancel_job(job_id, h.freelancer)
            .await
            .unwrap_err();
        assert!(matches!(err, WorklockError::Authorization { .. }));
    }

    #[tokio::test]
    async fn deadline_refund_requires_passed_deadline() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        let err = h
            .ledger
            .claim_deadline_refund(job_id, h.client)
            .await
            .unwrap_err();
        assert!(matches!(err, WorklockError::Deadline { .. }));
        assert!(!h.ledger.is_deadline_passed(job_id).await.unwrap());
        assert!(h.ledger.time_remaining(job_id).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn deadline_refund_pays_once_and_replay_is_a_state_error() {
        // Scenario: deadline passed while Open; client refunds; a second
        // call is a state error with no second transfer
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        // Force the deadline into the past
        {
            let record = h.ledger.record(job_id).unwrap();
            let mut record = record.lock().await;
            record.job.deadline = Utc::now() - chrono::Duration::hours(1);
        }
        assert!(h.ledger.is_deadline_passed(job_id).await.unwrap());
        assert_eq!(h.ledger.time_remaining(job_id).await.unwrap(), 0);

        h.ledger.claim_deadline_refund(job_id, h.client).await.unwrap();
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Refunded);
        assert_eq!(h.custody.balance_of(&h.client).await, Amount::new(10_000_000));

        let err = h
            .ledger
            .claim_deadline_refund(job_id, h.client)
            .await
            .unwrap_err();
        assert!(matches!(err, WorklockError::State { .. }));
        assert_eq!(h.custody.transfer_count().await, 2);
    }

    #[tokio::test]
    async fn deadline_refund_also_covers_in_progress_jobs() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Job", "Reqs", 72, PAYMENT)
            .await
            .unwrap();
        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();

        {
            let record = h.ledger.record(job_id).unwrap();
            let mut record = record.lock().await;
            record.job.deadline = Utc::now() - chrono::Duration::hours(1);
        }

        h.ledger.claim_deadline_refund(job_id, h.client).await.unwrap();
        assert_eq!(h.ledger.status(job_id).await.unwrap(), JobStatus::Refunded);
    }

    // ========================================================================
    // Custody failure discipline
    // ========================================================================

    #[tokio::test]
    async fn custody_failure_halts_job_without_status_transition() {
        let h = harness(5).await;
        let job_id = submitted_job(&h).await;
        h.provider
            .script((0..5).map(|_| ScriptedJudgment::approve()));

        // Drain the escrow account behind the ledger's back so the payout
        // transfer fails
        let drain = AccountId::new();
        h.custody
            .transfer(&h.ledger.escrow_account(), &drain, PAYMENT)
            .await
            .unwrap();

        let err = h.ledger.request_evaluation(job_id).await.unwrap_err();
        assert!(matches!(err, WorklockError::Custody { .. }));

        // No status transition co-occurred with the failed transfer
        assert!(matches!(
            h.ledger.record(job_id).unwrap().lock().await.job.status,
            JobStatus::Submitted
        ));

        // The job is halted pending manual reconciliation
        let err = h.ledger.request_evaluation(job_id).await.unwrap_err();
        assert!(matches!(err, WorklockError::Custody { .. }));
    }

    // ========================================================================
    // Views
    // ========================================================================

    #[tokio::test]
    async fn job_details_track_the_lifecycle() {
        let h = harness(5).await;
        let job_id = h
            .ledger
            .create_job(h.client, "Build a Landing Page", "Reqs", 72, PAYMENT)
            .await
            .unwrap();

        let view = h.ledger.job_details(job_id).await.unwrap();
        assert_eq!(view.title, "Build a Landing Page");
        assert_eq!(view.status, JobStatus::Open);
        assert_eq!(view.payment_amount, PAYMENT);
        assert_eq!(view.submission_ref, None);
        assert!(view.evaluation.is_none());

        h.ledger.accept_job(job_id, h.freelancer).await.unwrap();
        h.ledger
            .submit_work(job_id, h.freelancer, "https://example.com/work")
            .await
            .unwrap();

        let view = h.ledger.job_details(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Submitted);
        assert_eq!(
            view.submission_ref.as_deref(),
            Some("https://example.com/work")
        );
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let h = harness(5).await;
        let err = h.ledger.status(JobId::new()).await.unwrap_err();
        assert!(matches!(err, WorklockError::JobNotFound { .. }));
    }
}
