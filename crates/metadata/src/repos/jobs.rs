//! Poll job repository.

use crate::error::MetadataResult;
use crate::models::PollJobRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for the durable poll queue.
///
/// A poll job outlives the process: the worker re-arms it by bumping
/// `next_poll_at`, and after a restart the same rows come due again.
#[async_trait]
pub trait PollJobRepo: Send + Sync {
    /// Create a poll job.
    async fn create_poll_job(&self, job: &PollJobRow) -> MetadataResult<()>;

    /// Jobs in a non-terminal state with `next_poll_at <= now`, oldest
    /// schedule first.
    async fn due_poll_jobs(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<PollJobRow>>;

    /// The non-terminal job for a model and kind, if any. Used to keep
    /// one live poll chain per platform job.
    async fn active_poll_job(
        &self,
        model_id: Uuid,
        kind: &str,
    ) -> MetadataResult<Option<PollJobRow>>;

    /// Rewrite a job's mutable fields after a poll.
    async fn update_poll_job(
        &self,
        job_id: Uuid,
        state: &str,
        attempts: i32,
        next_poll_at: OffsetDateTime,
        last_error: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
