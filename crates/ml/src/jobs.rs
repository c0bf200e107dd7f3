//! Job lifecycle tracking for training and deployment.
//!
//! Every submitted platform job gets a row in `poll_jobs`; a single
//! worker task drains due rows, asks the platform for status, and
//! either re-arms the row or finishes it and updates the model. The
//! queue is durable: after a restart the worker simply finds the same
//! rows due and carries on.

use crate::error::{MlError, MlResult};
use crate::platform::{PlatformJobStatus, ResourceNames, TrainingPlatform};
use shutter_core::config::PollerConfig;
use shutter_metadata::models::{
    DatasetStatus, ModelStatus, PollJobKind, PollJobRow, PollJobState,
};
use shutter_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How often the worker scans for due jobs. Individual jobs are spaced
/// by the configured poll interval; this only bounds scheduling slack.
const SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// How many due jobs one scan processes.
const SCAN_BATCH: u32 = 16;

/// Tracks managed platform jobs through their lifecycle.
pub struct JobTracker {
    store: Arc<dyn MetadataStore>,
    platform: Arc<dyn TrainingPlatform>,
    config: PollerConfig,
}

impl JobTracker {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        platform: Arc<dyn TrainingPlatform>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            platform,
            config,
        }
    }

    /// Enqueue status polling for a training job. Idempotent: a second
    /// submit while a chain is live is a no-op.
    pub async fn submit_training(&self, model_id: Uuid, job_name: &str) -> MlResult<()> {
        self.submit(model_id, PollJobKind::Training, job_name).await
    }

    /// Enqueue status polling for an endpoint deployment.
    pub async fn submit_deployment(&self, model_id: Uuid, endpoint_name: &str) -> MlResult<()> {
        self.submit(model_id, PollJobKind::Deployment, endpoint_name)
            .await
    }

    async fn submit(&self, model_id: Uuid, kind: PollJobKind, handle: &str) -> MlResult<()> {
        if let Some(existing) = self
            .store
            .active_poll_job(model_id, kind.as_str())
            .await?
        {
            info!(
                model_id = %model_id,
                job_id = %existing.job_id,
                kind = kind.as_str(),
                "poll chain already live, not submitting another"
            );
            return Ok(());
        }

        let now = OffsetDateTime::now_utc();
        let job = PollJobRow {
            job_id: Uuid::new_v4(),
            model_id,
            kind: kind.as_str().to_string(),
            handle: handle.to_string(),
            state: PollJobState::Pending.as_str().to_string(),
            attempts: 0,
            next_poll_at: now + time::Duration::seconds(self.config.interval_secs as i64),
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_poll_job(&job).await?;
        info!(model_id = %model_id, job_id = %job.job_id, kind = kind.as_str(), handle = handle, "poll job enqueued");
        Ok(())
    }

    /// Run the worker until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.config.interval_secs,
            max_attempts = self.config.max_attempts,
            "job tracker worker started"
        );
        loop {
            if let Err(e) = self.poll_due().await {
                error!(error = %e, "poll scan failed");
            }
            tokio::time::sleep(SCAN_INTERVAL).await;
        }
    }

    /// Process every currently-due job once. Returns how many were
    /// processed. Per-job failures are recorded on the row, not
    /// propagated, so one broken job cannot stall the queue.
    pub async fn poll_due(&self) -> MlResult<usize> {
        let now = OffsetDateTime::now_utc();
        let due = self.store.due_poll_jobs(now, SCAN_BATCH).await?;
        let count = due.len();
        for job in due {
            if let Err(e) = self.poll_job(&job).await {
                error!(job_id = %job.job_id, error = %e, "poll attempt failed");
                self.record_poll_error(&job, &e).await;
            }
        }
        Ok(count)
    }

    async fn poll_job(&self, job: &PollJobRow) -> MlResult<()> {
        let kind = PollJobKind::parse(&job.kind)?;
        let status = match kind {
            PollJobKind::Training => self.platform.training_status(&job.handle).await?,
            PollJobKind::Deployment => self.platform.endpoint_status(&job.handle).await?,
        };

        match status {
            PlatformJobStatus::InProgress => self.rearm_or_cap(job, kind).await,
            PlatformJobStatus::Completed { artifact_uri } => {
                self.finish(job, kind, Ok(artifact_uri)).await
            }
            PlatformJobStatus::Failed { reason } => self.finish(job, kind, Err(reason)).await,
        }
    }

    /// One more attempt spent on a still-running job: re-arm, or give
    /// up once the attempt cap is reached.
    async fn rearm_or_cap(&self, job: &PollJobRow, kind: PollJobKind) -> MlResult<()> {
        let now = OffsetDateTime::now_utc();
        let attempts = job.attempts + 1;

        if attempts >= self.config.max_attempts as i32 {
            warn!(
                job_id = %job.job_id,
                attempts = attempts,
                "poll attempts exhausted, failing job"
            );
            self.store
                .update_poll_job(
                    job.job_id,
                    PollJobState::Failed.as_str(),
                    attempts,
                    now,
                    Some("poll attempts exhausted"),
                    now,
                )
                .await?;
            if kind == PollJobKind::Training {
                if let Err(e) = self.platform.stop_training(&job.handle).await {
                    warn!(handle = %job.handle, error = %e, "stop request for capped training job failed");
                }
            }
            self.fail_model(job, kind, "timed out waiting for the platform")
                .await?;
            return Ok(());
        }

        self.store
            .update_poll_job(
                job.job_id,
                PollJobState::InProgress.as_str(),
                attempts,
                now + time::Duration::seconds(self.config.interval_secs as i64),
                None,
                now,
            )
            .await?;
        Ok(())
    }

    /// Terminal platform status observed: finish the job and update
    /// the model.
    async fn finish(
        &self,
        job: &PollJobRow,
        kind: PollJobKind,
        outcome: Result<Option<String>, Option<String>>,
    ) -> MlResult<()> {
        let now = OffsetDateTime::now_utc();
        let (state, last_error) = match &outcome {
            Ok(_) => (PollJobState::Completed, None),
            Err(reason) => (PollJobState::Failed, reason.as_deref()),
        };
        self.store
            .update_poll_job(
                job.job_id,
                state.as_str(),
                job.attempts + 1,
                now,
                last_error,
                now,
            )
            .await?;

        match (kind, outcome) {
            (PollJobKind::Training, Ok(artifact_uri)) => {
                let artifact = artifact_uri
                    .unwrap_or_else(|| shutter_core::keys::model_prefix(job.model_id));
                self.store
                    .set_model_artifact(job.model_id, &artifact, now)
                    .await?;
                self.store
                    .update_model_status(job.model_id, ModelStatus::Ready.as_str(), None, now)
                    .await?;
                self.release_dataset(job.model_id).await;
                info!(model_id = %job.model_id, "training completed");
            }
            (PollJobKind::Training, Err(reason)) => {
                let reason = reason.unwrap_or_else(|| "training failed".to_string());
                self.fail_model(job, kind, &reason).await?;
            }
            (PollJobKind::Deployment, Ok(_)) => {
                self.store
                    .update_model_status(job.model_id, ModelStatus::Deployed.as_str(), None, now)
                    .await?;
                self.store
                    .set_endpoint_status(job.model_id, Some("InService"), now)
                    .await?;
                info!(model_id = %job.model_id, "deployment completed");
            }
            (PollJobKind::Deployment, Err(reason)) => {
                let reason = reason.unwrap_or_else(|| "deployment failed".to_string());
                self.fail_model(job, kind, &reason).await?;
            }
        }
        Ok(())
    }

    /// Mark the model failed and run kind-specific cleanup: a failed
    /// deployment tears its platform resources down, a failed training
    /// releases the dataset.
    async fn fail_model(&self, job: &PollJobRow, kind: PollJobKind, reason: &str) -> MlResult<()> {
        let now = OffsetDateTime::now_utc();
        self.store
            .update_model_status(job.model_id, ModelStatus::Error.as_str(), Some(reason), now)
            .await?;
        match kind {
            PollJobKind::Training => self.release_dataset(job.model_id).await,
            PollJobKind::Deployment => {
                self.store
                    .set_endpoint_status(job.model_id, Some("Failed"), now)
                    .await?;
                let names = ResourceNames::for_model(job.model_id);
                self.teardown_endpoint(&names).await;
            }
        }
        Ok(())
    }

    /// Move the model's dataset out of `training` once no job holds it.
    async fn release_dataset(&self, model_id: Uuid) {
        let result: MlResult<()> = async {
            let now = OffsetDateTime::now_utc();
            if let Some(model) = self.store.get_model_by_id(model_id).await? {
                self.store
                    .update_dataset_status(model.dataset_id, DatasetStatus::Ready.as_str(), now)
                    .await?;
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(model_id = %model_id, error = %e, "failed to release dataset");
        }
    }

    /// Compensating teardown of platform resources. Every deletion is
    /// attempted regardless of earlier failures; the aggregate failure
    /// count is logged and returned.
    pub async fn teardown_endpoint(&self, names: &ResourceNames) -> u32 {
        let mut failures = 0u32;
        for (what, result) in [
            ("endpoint", self.platform.delete_endpoint(&names.endpoint).await),
            (
                "endpoint config",
                self.platform
                    .delete_endpoint_config(&names.endpoint_config)
                    .await,
            ),
            ("platform model", self.platform.delete_model(&names.model).await),
        ] {
            if let Err(e) = result {
                warn!(resource = what, error = %e, "teardown deletion failed");
                failures += 1;
            }
        }
        if failures > 0 {
            error!(failures = failures, endpoint = %names.endpoint, "endpoint teardown incomplete");
        }
        failures
    }

    /// Record a failed poll attempt and re-arm. Platform flakiness
    /// spends attempts so a permanently broken handle still hits the cap.
    async fn record_poll_error(&self, job: &PollJobRow, err: &MlError) {
        let now = OffsetDateTime::now_utc();
        let attempts = job.attempts + 1;
        let capped = attempts >= self.config.max_attempts as i32;
        let state = if capped {
            PollJobState::Failed
        } else {
            PollJobState::InProgress
        };
        let next = now + time::Duration::seconds(self.config.interval_secs as i64);
        if let Err(e) = self
            .store
            .update_poll_job(
                job.job_id,
                state.as_str(),
                attempts,
                next,
                Some(&err.to_string()),
                now,
            )
            .await
        {
            error!(job_id = %job.job_id, error = %e, "failed to record poll error");
            return;
        }
        if capped {
            if let Ok(kind) = PollJobKind::parse(&job.kind) {
                let _ = self
                    .fail_model(job, kind, "poll attempts exhausted")
                    .await
                    .map_err(|e| error!(job_id = %job.job_id, error = %e, "failed to fail model"));
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DeploymentSpec, TrainingJobSpec};
    use async_trait::async_trait;
    use shutter_metadata::models::{DatasetRow, ModelRow, UserRow};
    use shutter_metadata::SqliteStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted platform: pops one status per poll, records deletions.
    #[derive(Default)]
    struct ScriptedPlatform {
        training: Mutex<VecDeque<PlatformJobStatus>>,
        endpoint: Mutex<VecDeque<PlatformJobStatus>>,
        deleted: Mutex<Vec<String>>,
        stopped: Mutex<Vec<String>>,
    }

    impl ScriptedPlatform {
        fn script_training(&self, statuses: impl IntoIterator<Item = PlatformJobStatus>) {
            self.training.lock().unwrap().extend(statuses);
        }

        fn script_endpoint(&self, statuses: impl IntoIterator<Item = PlatformJobStatus>) {
            self.endpoint.lock().unwrap().extend(statuses);
        }
    }

    #[async_trait]
    impl TrainingPlatform for ScriptedPlatform {
        async fn start_training(&self, _spec: &TrainingJobSpec) -> MlResult<()> {
            Ok(())
        }

        async fn training_status(&self, _job_name: &str) -> MlResult<PlatformJobStatus> {
            self.training
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| MlError::Platform("unscripted training poll".to_string()))
        }

        async fn stop_training(&self, job_name: &str) -> MlResult<()> {
            self.stopped.lock().unwrap().push(job_name.to_string());
            Ok(())
        }

        async fn start_deployment(&self, _spec: &DeploymentSpec) -> MlResult<()> {
            Ok(())
        }

        async fn endpoint_status(&self, _endpoint_name: &str) -> MlResult<PlatformJobStatus> {
            self.endpoint
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| MlError::Platform("unscripted endpoint poll".to_string()))
        }

        async fn delete_endpoint(&self, endpoint_name: &str) -> MlResult<()> {
            self.deleted.lock().unwrap().push(endpoint_name.to_string());
            Ok(())
        }

        async fn delete_endpoint_config(&self, name: &str) -> MlResult<()> {
            self.deleted.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn delete_model(&self, model_name: &str) -> MlResult<()> {
            self.deleted.lock().unwrap().push(model_name.to_string());
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<dyn MetadataStore>,
        platform: Arc<ScriptedPlatform>,
        tracker: JobTracker,
        model_id: Uuid,
        dataset_id: Uuid,
    }

    async fn fixture(max_attempts: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(dir.path().join("metadata.db")).await.unwrap(),
        );
        let platform = Arc::new(ScriptedPlatform::default());
        // Zero interval so submitted jobs come due immediately.
        let config = PollerConfig {
            interval_secs: 0,
            max_attempts,
        };
        let tracker = JobTracker::new(store.clone(), platform.clone(), config);

        let now = OffsetDateTime::now_utc();
        let user = UserRow {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            password_hash: "$2b$04$x".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_user(&user).await.unwrap();
        let dataset = DatasetRow {
            dataset_id: Uuid::new_v4(),
            user_id: user.user_id,
            name: "cats".to_string(),
            object_key: "datasets/x.zip".to_string(),
            size_bytes: 1,
            status: "training".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_dataset(&dataset).await.unwrap();
        let model = ModelRow {
            model_id: Uuid::new_v4(),
            user_id: user.user_id,
            dataset_id: dataset.dataset_id,
            name: "cat-clf".to_string(),
            status: "training".to_string(),
            artifact_prefix: None,
            endpoint_name: None,
            endpoint_status: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        };
        store.create_model(&model).await.unwrap();

        Fixture {
            _dir: dir,
            store,
            platform,
            tracker,
            model_id: model.model_id,
            dataset_id: dataset.dataset_id,
        }
    }

    #[tokio::test]
    async fn test_submit_is_idempotent_per_kind() {
        let f = fixture(60).await;
        f.tracker.submit_training(f.model_id, "job-1").await.unwrap();
        f.tracker.submit_training(f.model_id, "job-1").await.unwrap();

        let due = f
            .store
            .due_poll_jobs(OffsetDateTime::now_utc(), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn test_in_progress_rearms_and_counts_attempts() {
        let f = fixture(60).await;
        f.platform
            .script_training([PlatformJobStatus::InProgress, PlatformJobStatus::InProgress]);
        f.tracker.submit_training(f.model_id, "job-1").await.unwrap();

        assert_eq!(f.tracker.poll_due().await.unwrap(), 1);
        assert_eq!(f.tracker.poll_due().await.unwrap(), 1);

        let jobs = f
            .store
            .due_poll_jobs(OffsetDateTime::now_utc(), 10)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, "in_progress");
        assert_eq!(jobs[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_training_completion_updates_model_and_dataset() {
        let f = fixture(60).await;
        f.platform.script_training([PlatformJobStatus::Completed {
            artifact_uri: Some("s3://bucket/models/m/model.tar.gz".to_string()),
        }]);
        f.tracker.submit_training(f.model_id, "job-1").await.unwrap();
        f.tracker.poll_due().await.unwrap();

        let model = f.store.get_model_by_id(f.model_id).await.unwrap().unwrap();
        assert_eq!(model.status, "ready");
        assert_eq!(
            model.artifact_prefix.as_deref(),
            Some("s3://bucket/models/m/model.tar.gz")
        );

        let dataset = f
            .store
            .get_dataset(model.user_id, f.dataset_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dataset.status, "ready");

        // Chain is finished: nothing further comes due.
        assert_eq!(f.tracker.poll_due().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_training_failure_records_reason() {
        let f = fixture(60).await;
        f.platform.script_training([PlatformJobStatus::Failed {
            reason: Some("bad dataset".to_string()),
        }]);
        f.tracker.submit_training(f.model_id, "job-1").await.unwrap();
        f.tracker.poll_due().await.unwrap();

        let model = f.store.get_model_by_id(f.model_id).await.unwrap().unwrap();
        assert_eq!(model.status, "error");
        assert_eq!(model.error_detail.as_deref(), Some("bad dataset"));
    }

    #[tokio::test]
    async fn test_attempt_cap_fails_job_and_stops_training() {
        let f = fixture(2).await;
        f.platform
            .script_training([PlatformJobStatus::InProgress, PlatformJobStatus::InProgress]);
        f.tracker.submit_training(f.model_id, "job-1").await.unwrap();

        f.tracker.poll_due().await.unwrap();
        f.tracker.poll_due().await.unwrap();

        let model = f.store.get_model_by_id(f.model_id).await.unwrap().unwrap();
        assert_eq!(model.status, "error");
        assert_eq!(f.platform.stopped.lock().unwrap().as_slice(), ["job-1"]);
        assert_eq!(f.tracker.poll_due().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deployment_completion_marks_deployed() {
        let f = fixture(60).await;
        f.platform.script_endpoint([
            PlatformJobStatus::InProgress,
            PlatformJobStatus::Completed { artifact_uri: None },
        ]);
        f.tracker
            .submit_deployment(f.model_id, "clip-endpoint-x")
            .await
            .unwrap();

        f.tracker.poll_due().await.unwrap();
        f.tracker.poll_due().await.unwrap();

        let model = f.store.get_model_by_id(f.model_id).await.unwrap().unwrap();
        assert_eq!(model.status, "deployed");
        assert_eq!(model.endpoint_status.as_deref(), Some("InService"));
    }

    #[tokio::test]
    async fn test_deployment_failure_tears_down_resources() {
        let f = fixture(60).await;
        f.platform.script_endpoint([PlatformJobStatus::Failed {
            reason: Some("no capacity".to_string()),
        }]);
        f.tracker
            .submit_deployment(f.model_id, "clip-endpoint-x")
            .await
            .unwrap();
        f.tracker.poll_due().await.unwrap();

        let model = f.store.get_model_by_id(f.model_id).await.unwrap().unwrap();
        assert_eq!(model.status, "error");
        assert_eq!(model.endpoint_status.as_deref(), Some("Failed"));

        let names = ResourceNames::for_model(f.model_id);
        let deleted = f.platform.deleted.lock().unwrap();
        assert!(deleted.contains(&names.endpoint));
        assert!(deleted.contains(&names.endpoint_config));
        assert!(deleted.contains(&names.model));
    }

    #[tokio::test]
    async fn test_platform_error_spends_an_attempt() {
        let f = fixture(2).await;
        // No scripted statuses: every poll errors.
        f.tracker.submit_training(f.model_id, "job-1").await.unwrap();

        f.tracker.poll_due().await.unwrap();
        let job = f
            .store
            .active_poll_job(f.model_id, "training")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_some());

        f.tracker.poll_due().await.unwrap();
        let model = f.store.get_model_by_id(f.model_id).await.unwrap().unwrap();
        assert_eq!(model.status, "error");
    }
}
