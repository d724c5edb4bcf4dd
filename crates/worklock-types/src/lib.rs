//! Worklock Types - Canonical domain types for consensus-gated escrow
//!
//! This crate contains all foundational types for Worklock with zero
//! dependencies on other worklock crates:
//!
//! - Identity types (JobId, ValidatorId, AccountId, ReceiptId)
//! - Amount type with checked arithmetic
//! - Job record and the closed status transition table
//! - Verdict and evaluation types
//! - The error taxonomy
//!
//! # Architectural Invariants
//!
//! 1. A job's funds are transferred at most once over its lifetime
//! 2. Status transitions follow the explicit directed graph, nothing else
//! 3. Terminal statuses (Completed, Refunded) freeze the job
//! 4. Failure is explicit — every rejected precondition is a typed error

pub mod amount;
pub mod error;
pub mod identity;
pub mod job;
pub mod verdict;

pub use amount::*;
pub use error::*;
pub use identity::*;
pub use job::*;
pub use verdict::*;
