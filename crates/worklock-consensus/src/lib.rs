//! Worklock Consensus - Byzantine-tolerant agreement over generative judgments
//!
//! Generative verdicts are non-reproducible: two honest validators judging
//! the same submission produce different prose. Raw-output equality would
//! never reach agreement, so rounds compare *normalized* verdicts under an
//! equivalence predicate, and quorum is counted over those.
//!
//! Per round:
//!
//! 1. A leader is selected by a deterministic, recomputable function of
//!    `(job_id, round_number, seed)` over the validator pool
//! 2. The leader judges the pinned task and proposes a verdict
//! 3. The remaining validators judge concurrently against the same pinned
//!    snapshot; provider failures and timeouts register as abstentions
//! 4. The round finalizes iff agreeing validators plus the leader reach the
//!    quorum threshold; otherwise it fails and is appealed with a strictly
//!    larger validator set, up to a bounded number of rounds

pub mod appeal;
pub mod dispatcher;
pub mod engine;
pub mod round;
pub mod selection;
pub mod task;

pub use appeal::*;
pub use dispatcher::*;
pub use engine::*;
pub use round::*;
pub use selection::*;
pub use task::*;
