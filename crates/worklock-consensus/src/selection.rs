//! Deterministic leader and committee selection
//!
//! Leader choice needs unpredictability before the round and verifiability
//! after it: any party must be able to recompute the selection from public
//! inputs. Selection therefore scores each pool member with
//! `sha256(job_id || round_number || seed || validator_id)` and takes the
//! lowest scores. No true randomness is involved.

use sha2::{Digest, Sha256};
use worklock_types::{JobId, Result, ValidatorId, WorklockError};

/// The committee for one consensus round: a leader plus validators
#[derive(Debug, Clone)]
pub struct Committee {
    /// Executes first and proposes the verdict
    pub leader: ValidatorId,
    /// Corroborate or contest the leader's verdict
    pub validators: Vec<ValidatorId>,
}

impl Committee {
    /// Total participants including the leader
    pub fn size(&self) -> usize {
        self.validators.len() + 1
    }
}

/// Select the committee for a round.
///
/// Deterministic in `(pool, job_id, round_number, seed)`; the member with the
/// lowest score leads. Fails if the pool cannot seat `count` participants.
pub fn select_committee(
    pool: &[ValidatorId],
    job_id: JobId,
    round_number: u32,
    seed: u64,
    count: usize,
) -> Result<Committee> {
    if count == 0 || pool.len() < count {
        return Err(WorklockError::PoolExhausted {
            needed: count,
            available: pool.len(),
        });
    }

    let mut scored: Vec<([u8; 32], ValidatorId)> = pool
        .iter()
        .map(|v| (selection_score(job_id, round_number, seed, *v), *v))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0));

    let mut members = scored.into_iter().map(|(_, v)| v).take(count);
    let leader = members.next().ok_or(WorklockError::PoolExhausted {
        needed: count,
        available: pool.len(),
    })?;
    Ok(Committee {
        leader,
        validators: members.collect(),
    })
}

fn selection_score(job_id: JobId, round_number: u32, seed: u64, validator: ValidatorId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(job_id.as_uuid().as_bytes());
    hasher.update(round_number.to_be_bytes());
    hasher.update(seed.to_be_bytes());
    hasher.update(validator.as_uuid().as_bytes());
    hasher.finalize().into()
}
