//! Judgment dispatcher
//!
//! Builds a deterministic judgment task from job state and a single pinned
//! content snapshot. All inputs are fixed here, before any execution runs.

use thiserror::Error;
use tracing::info;
use worklock_provider::JudgmentProvider;
use worklock_types::Job;

use crate::task::{EquivalencePredicate, JudgmentTask};

/// Maximum characters of submission content embedded in the prompt
const CONTENT_PREVIEW_CHARS: usize = 4000;

/// Dispatch-time failures, distinct from per-validator judgment failures
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The job has no submission reference to evaluate
    #[error("Job has no submission to evaluate")]
    NoSubmission,

    /// The single pinned fetch of the submission failed. The submission is
    /// unreachable for every validator alike, so this resolves as a
    /// rejection of the work rather than an abstention.
    #[error("Could not access submission {reference}: {message}")]
    SnapshotFailed { reference: String, message: String },
}

/// Builds pinned judgment tasks
pub struct JudgmentDispatcher;

impl JudgmentDispatcher {
    /// Build a judgment task for a submitted job.
    ///
    /// The submission content is fetched exactly once and pinned; every
    /// execution in every appeal round shares the returned task.
    pub async fn dispatch(
        provider: &dyn JudgmentProvider,
        job: &Job,
    ) -> Result<JudgmentTask, DispatchError> {
        let reference = job
            .submission_ref
            .as_deref()
            .ok_or(DispatchError::NoSubmission)?;

        let snapshot = provider.snapshot(reference).await.map_err(|e| {
            DispatchError::SnapshotFailed {
                reference: reference.to_string(),
                message: e.to_string(),
            }
        })?;

        info!(
            job_id = %job.id,
            content_hash = %snapshot.content_hash,
            "Judgment task dispatched with pinned snapshot"
        );

        let prompt_context = build_prompt(job, reference, &snapshot.content);
        Ok(JudgmentTask {
            job_id: job.id,
            prompt_context,
            snapshot,
            predicate: EquivalencePredicate::BinaryVerdict,
        })
    }
}

fn build_prompt(job: &Job, reference: &str, content: &str) -> String {
    let preview: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
    format!(
        "You are an impartial evaluator for a freelance job submission.\n\
         \n\
         ## JOB DETAILS\n\
         \n\
         **Title:** {title}\n\
         \n\
         **Requirements:**\n\
         {requirements}\n\
         \n\
         ## SUBMISSION\n\
         \n\
         **Reference:** {reference}\n\
         \n\
         **Content Preview:**\n\
         {preview}\n\
         \n\
         ## YOUR TASK\n\
         \n\
         Evaluate whether this submission meets the stated requirements.\n\
         \n\
         Consider:\n\
         1. Does it address ALL stated requirements?\n\
         2. Is the implementation functional and reasonable?\n\
         3. Are there critical missing pieces that would make it unusable?\n\
         \n\
         Be fair but strict. The freelancer was paid to deliver what was asked.\n\
         \n\
         ## REQUIRED RESPONSE FORMAT\n\
         \n\
         You MUST respond in exactly this format:\n\
         \n\
         VERDICT: [APPROVED or REJECTED]\n\
         CONFIDENCE: [HIGH, MEDIUM, or LOW]\n\
         SUMMARY: [One sentence summary of your decision]\n\
         DETAILS: [2-3 sentences explaining your reasoning]\n",
        title = job.title,
        requirements = job.requirements,
        reference = reference,
        preview = preview,
    )
}
