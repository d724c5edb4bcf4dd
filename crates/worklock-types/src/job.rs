//! Job record and the closed status transition table
//!
//! A job owns its escrowed funds for its whole lifetime. Status moves only
//! along the explicit directed graph below; any other transition is rejected.
//!
//! ```text
//! Open ──────────► InProgress ──────► Submitted ──► Completed
//!   │ ▲                │ │                │
//!   │ └────────────────┘ │                └────────► Refunded
//!   └────────────────────┴─────────────────────────► Refunded
//! ```

use crate::{AccountId, Amount, EvaluationRecord, JobId, ReceiptId, Result, WorklockError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an escrowed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Posted, funds escrowed, no freelancer yet
    Open,
    /// Accepted by a freelancer, work underway
    InProgress,
    /// Deliverable submitted, awaiting evaluation
    Submitted,
    /// Evaluation approved; freelancer paid. Terminal.
    Completed,
    /// Funds returned to the client. Terminal.
    Refunded,
}

impl JobStatus {
    /// Whether this status freezes the job
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Refunded)
    }

    /// The explicit transition table. Everything not listed here is invalid.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)          // accept
                | (Open, Refunded)      // cancel, deadline refund
                | (InProgress, Submitted)   // submit work
                | (InProgress, Open)        // freelancer withdraw
                | (InProgress, Refunded)    // deadline refund
                | (Submitted, Completed)    // finalized approved
                | (Submitted, Refunded)     // finalized rejected / unresolvable
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Open => write!(f, "open"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// An escrowed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job ID
    pub id: JobId,
    /// Who posted the job and escrowed the funds
    pub client: AccountId,
    /// Who accepted it (None until accepted)
    pub freelancer: Option<AccountId>,
    /// Human-readable title
    pub title: String,
    /// Requirements the submission is judged against
    pub requirements: String,
    /// Escrowed funds
    pub payment_amount: Amount,
    /// The freelancer's deliverable reference (None until submitted)
    pub submission_ref: Option<String>,
    /// Current status
    pub status: JobStatus,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// Submission deadline
    pub deadline: DateTime<Utc>,
    /// Stored evaluation outcome, once finalized
    pub evaluation: Option<EvaluationRecord>,
    /// Receipt of the single terminal fund transfer, once committed
    pub transfer_receipt: Option<ReceiptId>,
}

impl Job {
    /// Create a new open job. Fails when `deadline_hours` puts the deadline
    /// outside the representable time range.
    pub fn new(
        client: AccountId,
        title: String,
        requirements: String,
        payment_amount: Amount,
        deadline_hours: i64,
    ) -> Result<Self> {
        let now = Utc::now();
        let deadline = Duration::try_hours(deadline_hours)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| WorklockError::validation("Deadline out of range"))?;
        Ok(Self {
            id: JobId::new(),
            client,
            freelancer: None,
            title,
            requirements,
            payment_amount,
            submission_ref: None,
            status: JobStatus::Open,
            created_at: now,
            deadline,
            evaluation: None,
            transfer_receipt: None,
        })
    }

    /// Whether the submission deadline has passed
    pub fn is_deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    /// Seconds until the deadline (0 once passed)
    pub fn time_remaining(&self, now: DateTime<Utc>) -> u64 {
        if now >= self.deadline {
            0
        } else {
            (self.deadline - now).num_seconds() as u64
        }
    }
}

/// Read-only snapshot of a job, returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub title: String,
    pub requirements: String,
    pub payment_amount: Amount,
    pub client: AccountId,
    pub freelancer: Option<AccountId>,
    pub status: JobStatus,
    pub submission_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub evaluation: Option<EvaluationRecord>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            title: job.title.clone(),
            requirements: job.requirements.clone(),
            payment_amount: job.payment_amount,
            client: job.client,
            freelancer: job.freelancer,
            status: job.status,
            submission_ref: job.submission_ref.clone(),
            created_at: job.created_at,
            deadline: job.deadline,
            evaluation: job.evaluation.clone(),
        }
    }
}
