//! Machine-learning side of Shutter: training platform integration,
//! the durable job poll queue, and CLIP semantic search.

pub mod error;
pub mod jobs;
pub mod platform;
pub mod sagemaker;
pub mod search;

pub use error::{MlError, MlResult};
pub use jobs::JobTracker;
pub use platform::{
    default_hyperparameters, DeploymentSpec, PlatformJobStatus, ResourceNames, TrainingJobSpec,
    TrainingPlatform,
};
pub use sagemaker::SageMakerPlatform;
pub use search::{ClipSearchClient, SearchMatch, SemanticSearch};

use shutter_core::config::PlatformConfig;
use std::sync::Arc;

/// Construct the production training platform from configuration.
pub async fn platform_from_config(config: &PlatformConfig) -> MlResult<Arc<dyn TrainingPlatform>> {
    let platform = SageMakerPlatform::new(config.clone()).await?;
    Ok(Arc::new(platform))
}
