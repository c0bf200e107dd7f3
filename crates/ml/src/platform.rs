//! Training platform abstraction.

use crate::error::MlResult;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// Default hyperparameters applied when the caller supplies none.
pub fn default_hyperparameters() -> HashMap<String, String> {
    HashMap::from([
        ("epochs".to_string(), "2".to_string()),
        ("batch_size".to_string(), "16".to_string()),
        ("learning_rate".to_string(), "0.0001".to_string()),
    ])
}

/// Platform-side resource names derived from a model id.
///
/// Names share one truncated id so every resource of a model is
/// recognizable in the platform console; the platform caps names at
/// 63 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub training_job: String,
    pub model: String,
    pub endpoint_config: String,
    pub endpoint: String,
}

impl ResourceNames {
    pub fn for_model(model_id: Uuid) -> Self {
        let simple = model_id.simple().to_string();
        let short = &simple[..30.min(simple.len())];
        Self {
            training_job: format!("clip-training-{short}"),
            model: format!("clip-model-{short}"),
            endpoint_config: format!("clip-endpoint-config-{short}"),
            endpoint: format!("clip-endpoint-{short}"),
        }
    }
}

/// What to train.
#[derive(Debug, Clone)]
pub struct TrainingJobSpec {
    pub job_name: String,
    /// Location of the dataset archive (e.g., `s3://bucket/datasets/x.zip`).
    pub dataset_uri: String,
    /// Location of the generated training entrypoint.
    pub script_uri: String,
    /// Where the platform writes artifacts.
    pub output_uri: String,
    pub hyperparameters: HashMap<String, String>,
}

/// What to deploy.
#[derive(Debug, Clone)]
pub struct DeploymentSpec {
    pub model_name: String,
    pub endpoint_config_name: String,
    pub endpoint_name: String,
    /// Artifact location produced by training.
    pub artifact_uri: String,
}

/// Observed status of a platform job or endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformJobStatus {
    InProgress,
    Completed {
        /// Artifact location, when the platform reports one.
        artifact_uri: Option<String>,
    },
    Failed {
        reason: Option<String>,
    },
}

/// Managed training and hosting platform.
///
/// The SageMaker implementation is the production one; tests swap in a
/// scripted mock.
#[async_trait]
pub trait TrainingPlatform: Send + Sync {
    /// Start a training job.
    async fn start_training(&self, spec: &TrainingJobSpec) -> MlResult<()>;

    /// Observe a training job's status.
    async fn training_status(&self, job_name: &str) -> MlResult<PlatformJobStatus>;

    /// Request a training job stop. Best effort.
    async fn stop_training(&self, job_name: &str) -> MlResult<()>;

    /// Create the model, endpoint config, and endpoint, in that order.
    /// Partial failures are compensated before returning the error.
    async fn start_deployment(&self, spec: &DeploymentSpec) -> MlResult<()>;

    /// Observe an endpoint's status.
    async fn endpoint_status(&self, endpoint_name: &str) -> MlResult<PlatformJobStatus>;

    /// Delete a hosted endpoint.
    async fn delete_endpoint(&self, endpoint_name: &str) -> MlResult<()>;

    /// Delete an endpoint configuration.
    async fn delete_endpoint_config(&self, endpoint_config_name: &str) -> MlResult<()>;

    /// Delete a platform model definition.
    async fn delete_model(&self, model_name: &str) -> MlResult<()>;
}
