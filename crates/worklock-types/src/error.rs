//! Error types for Worklock
//!
//! All errors are explicit. A rejected precondition never mutates state, and
//! custody failures are fatal for the affected job until reconciled.

use thiserror::Error;

/// Result type for Worklock operations
pub type Result<T> = std::result::Result<T, WorklockError>;

/// Worklock error types
#[derive(Debug, Clone, Error)]
pub enum WorklockError {
    // ========================================================================
    // Amount Errors
    // ========================================================================

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Amount underflow during arithmetic
    #[error("Amount underflow during arithmetic operation")]
    AmountUnderflow,

    // ========================================================================
    // Input Validation
    // ========================================================================

    /// Malformed input, rejected before any state change
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Caller does not hold the required role for this operation
    #[error("Not authorized: {message}")]
    Authorization { message: String },

    // ========================================================================
    // State Machine
    // ========================================================================

    /// Job not found
    #[error("Job {job_id} not found")]
    JobNotFound { job_id: String },

    /// Operation invalid for the job's current status (includes replays of
    /// terminal operations and lost first-committer-wins races)
    #[error("Job {job_id} is {status}: {message}")]
    State {
        job_id: String,
        status: String,
        message: String,
    },

    /// Deadline condition not met
    #[error("Deadline condition not met for job {job_id}: {message}")]
    Deadline { job_id: String, message: String },

    // ========================================================================
    // Consensus
    // ========================================================================

    /// Judgment provider failure; absorbed as Abstain inside a round and
    /// only surfaced once appeal rounds are exhausted
    #[error("Judgment provider failed: {message}")]
    Provider { message: String },

    /// Appeal budget exhausted without a finalized round
    #[error("Consensus unresolvable for job {job_id} after {rounds} rounds")]
    ConsensusUnresolvable { job_id: String, rounds: u32 },

    /// Validator pool cannot populate the requested round
    #[error("Validator pool exhausted: need {needed}, have {available}")]
    PoolExhausted { needed: usize, available: usize },

    // ========================================================================
    // Custody
    // ========================================================================

    /// Insufficient funds in an account
    #[error("Insufficient funds in account {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: String,
        requested: u128,
        available: u128,
    },

    /// Fund transfer failure; fatal for the job pending manual reconciliation
    #[error("Custody failure on job {job_id}: {message}")]
    Custody { job_id: String, message: String },
}

impl WorklockError {
    /// Build a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build an authorization error
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }
}
