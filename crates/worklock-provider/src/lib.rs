//! Worklock Provider - External judgment boundary
//!
//! Everything non-deterministic lives behind this crate's narrow
//! `JudgmentProvider` trait: content fetches and generative verdicts.
//! The consensus engine's control logic stays deterministic and is
//! unit-tested against the `ScriptedProvider`.
//!
//! ## Key Design Principles
//!
//! 1. Providers may **judge**, NEVER move money
//! 2. A submission is fetched once, content-addressed, and pinned; no
//!    per-validator refetch
//! 3. Provider failures are absorbed by the caller as abstentions
//! 4. A scripted provider exists so consensus paths are testable offline

pub mod providers;
pub mod types;

pub use providers::*;
pub use types::*;
