//! Scripted platform and search doubles.

use async_trait::async_trait;
use shutter_ml::{
    DeploymentSpec, MlError, MlResult, PlatformJobStatus, SearchMatch, SemanticSearch,
    TrainingJobSpec, TrainingPlatform,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted training platform.
///
/// Submissions are recorded; status polls pop scripted responses and
/// default to in-progress when nothing is scripted.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockPlatform {
    pub training_jobs: Mutex<Vec<TrainingJobSpec>>,
    pub deployments: Mutex<Vec<DeploymentSpec>>,
    pub deleted: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
    pub training_statuses: Mutex<VecDeque<PlatformJobStatus>>,
    pub endpoint_statuses: Mutex<VecDeque<PlatformJobStatus>>,
    /// When set, the next submission fails with this message.
    pub fail_submission: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl MockPlatform {
    pub fn fail_next_submission(&self, message: &str) {
        *self.fail_submission.lock().unwrap() = Some(message.to_string());
    }

    pub fn script_training_status(&self, statuses: impl IntoIterator<Item = PlatformJobStatus>) {
        self.training_statuses.lock().unwrap().extend(statuses);
    }

    pub fn script_endpoint_status(&self, statuses: impl IntoIterator<Item = PlatformJobStatus>) {
        self.endpoint_statuses.lock().unwrap().extend(statuses);
    }

    fn take_failure(&self) -> Option<MlError> {
        self.fail_submission
            .lock()
            .unwrap()
            .take()
            .map(MlError::Platform)
    }
}

#[async_trait]
impl TrainingPlatform for MockPlatform {
    async fn start_training(&self, spec: &TrainingJobSpec) -> MlResult<()> {
        if let Some(e) = self.take_failure() {
            return Err(e);
        }
        self.training_jobs.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn training_status(&self, _job_name: &str) -> MlResult<PlatformJobStatus> {
        Ok(self
            .training_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PlatformJobStatus::InProgress))
    }

    async fn stop_training(&self, job_name: &str) -> MlResult<()> {
        self.stopped.lock().unwrap().push(job_name.to_string());
        Ok(())
    }

    async fn start_deployment(&self, spec: &DeploymentSpec) -> MlResult<()> {
        if let Some(e) = self.take_failure() {
            return Err(e);
        }
        self.deployments.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn endpoint_status(&self, _endpoint_name: &str) -> MlResult<PlatformJobStatus> {
        Ok(self
            .endpoint_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PlatformJobStatus::InProgress))
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

/// Scripted search client. Returns the scripted matches filtered down
/// to the candidates that were actually offered.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockSearch {
    pub matches: Mutex<Vec<SearchMatch>>,
    pub queries: Mutex<Vec<(String, Vec<String>)>>,
    pub fail_with_timeout: Mutex<bool>,
}

#[allow(dead_code)]
impl MockSearch {
    pub fn script_matches(&self, matches: impl IntoIterator<Item = SearchMatch>) {
        self.matches.lock().unwrap().extend(matches);
    }

    pub fn fail_with_timeout(&self) {
        *self.fail_with_timeout.lock().unwrap() = true;
    }
}

#[async_trait]
impl SemanticSearch for MockSearch {
    async fn search(
        &self,
        query: &str,
        candidates: &[String],
        min_score: f64,
    ) -> MlResult<Vec<SearchMatch>> {
        if *self.fail_with_timeout.lock().unwrap() {
            return Err(MlError::SearchTimeout);
        }
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), candidates.to_vec()));
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .filter(|m| candidates.contains(&m.object_key) && m.score >= min_score)
            .cloned()
            .collect())
    }
}
