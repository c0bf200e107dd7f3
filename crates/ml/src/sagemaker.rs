//! SageMaker implementation of the training platform.

use crate::error::{MlError, MlResult};
use crate::platform::{DeploymentSpec, PlatformJobStatus, TrainingJobSpec, TrainingPlatform};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sagemaker::types::{
    AlgorithmSpecification, Channel, ContainerDefinition, DataSource, EndpointStatus,
    OutputDataConfig, ProductionVariant, ResourceConfig, S3DataSource, S3DataType,
    StoppingCondition, TrainingInputMode, TrainingInstanceType, TrainingJobStatus,
};
use aws_sdk_sagemaker::Client;
use shutter_core::config::PlatformConfig;
use tracing::{error, info, instrument, warn};

fn platform_err<E: std::fmt::Display>(e: E) -> MlError {
    MlError::Platform(e.to_string())
}

/// SageMaker-backed training platform.
pub struct SageMakerPlatform {
    client: Client,
    config: PlatformConfig,
}

impl SageMakerPlatform {
    /// Create a platform client from configuration.
    pub async fn new(config: PlatformConfig) -> MlResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let aws_config = loader.load().await;
        let client = Client::new(&aws_config);
        info!(region = ?config.region, "SageMaker platform initialized");
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TrainingPlatform for SageMakerPlatform {
    #[instrument(skip(self, spec), fields(job_name = %spec.job_name))]
    async fn start_training(&self, spec: &TrainingJobSpec) -> MlResult<()> {
        let algorithm = AlgorithmSpecification::builder()
            .training_image(&self.config.training_image)
            .training_input_mode(TrainingInputMode::File)
            .build();

        let dataset_source = S3DataSource::builder()
            .s3_data_type(S3DataType::S3Prefix)
            .s3_uri(&spec.dataset_uri)
            .build();
        let training_channel = Channel::builder()
            .channel_name("training")
            .data_source(DataSource::builder().s3_data_source(dataset_source).build())
            .build();

        let output = OutputDataConfig::builder()
            .s3_output_path(&spec.output_uri)
            .build();

        let resources = ResourceConfig::builder()
            .instance_type(TrainingInstanceType::from(
                self.config.training_instance_type.as_str(),
            ))
            .instance_count(1)
            .volume_size_in_gb(30)
            .build();

        let stopping = StoppingCondition::builder()
            .max_runtime_in_seconds(self.config.max_runtime_secs as i32)
            .build();

        let mut request = self
            .client
            .create_training_job()
            .training_job_name(&spec.job_name)
            .algorithm_specification(algorithm)
            .role_arn(&self.config.execution_role)
            .input_data_config(training_channel)
            .output_data_config(output)
            .resource_config(resources)
            .stopping_condition(stopping)
            // The script-mode container pulls its entrypoint from these.
            .hyper_parameters("sagemaker_program", "train.py")
            .hyper_parameters("sagemaker_submit_directory", &spec.script_uri);
        for (key, value) in &spec.hyperparameters {
            request = request.hyper_parameters(key, value);
        }

        request.send().await.map_err(platform_err)?;
        info!(job_name = %spec.job_name, "training job submitted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn training_status(&self, job_name: &str) -> MlResult<PlatformJobStatus> {
        let output = self
            .client
            .describe_training_job()
            .training_job_name(job_name)
            .send()
            .await
            .map_err(platform_err)?;

        let status = match output.training_job_status() {
            Some(status) => status.clone(),
            None => return Err(MlError::Platform("missing training job status".to_string())),
        };

        Ok(match status {
            TrainingJobStatus::Completed => PlatformJobStatus::Completed {
                artifact_uri: output
                    .model_artifacts()
                    .and_then(|a| a.s3_model_artifacts().map(String::from)),
            },
            TrainingJobStatus::Failed | TrainingJobStatus::Stopped => PlatformJobStatus::Failed {
                reason: output.failure_reason().map(String::from),
            },
            _ => PlatformJobStatus::InProgress,
        })
    }

    #[instrument(skip(self))]
    async fn stop_training(&self, job_name: &str) -> MlResult<()> {
        self.client
            .stop_training_job()
            .training_job_name(job_name)
            .send()
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    /// CreateModel, CreateEndpointConfig, CreateEndpoint in order. A
    /// failure part-way deletes what was already created so a retry
    /// starts from a clean slate.
    #[instrument(skip(self, spec), fields(endpoint = %spec.endpoint_name))]
    async fn start_deployment(&self, spec: &DeploymentSpec) -> MlResult<()> {
        let container = ContainerDefinition::builder()
            .image(&self.config.inference_image)
            .model_data_url(&spec.artifact_uri)
            .build();

        self.client
            .create_model()
            .model_name(&spec.model_name)
            .primary_container(container)
            .execution_role_arn(&self.config.execution_role)
            .send()
            .await
            .map_err(platform_err)?;

        let variant = ProductionVariant::builder()
            .variant_name("AllTraffic")
            .model_name(&spec.model_name)
            .initial_instance_count(1)
            .instance_type(aws_sdk_sagemaker::types::ProductionVariantInstanceType::from(
                self.config.inference_instance_type.as_str(),
            ))
            .build();

        if let Err(e) = self
            .client
            .create_endpoint_config()
            .endpoint_config_name(&spec.endpoint_config_name)
            .production_variants(variant)
            .send()
            .await
        {
            warn!(model = %spec.model_name, "endpoint config creation failed, removing model");
            if let Err(cleanup) = self.delete_model(&spec.model_name).await {
                error!(error = %cleanup, "compensating model delete failed");
            }
            return Err(platform_err(e));
        }

        if let Err(e) = self
            .client
            .create_endpoint()
            .endpoint_name(&spec.endpoint_name)
            .endpoint_config_name(&spec.endpoint_config_name)
            .send()
            .await
        {
            warn!(endpoint = %spec.endpoint_name, "endpoint creation failed, removing config and model");
            if let Err(cleanup) = self.delete_endpoint_config(&spec.endpoint_config_name).await {
                error!(error = %cleanup, "compensating endpoint config delete failed");
            }
            if let Err(cleanup) = self.delete_model(&spec.model_name).await {
                error!(error = %cleanup, "compensating model delete failed");
            }
            return Err(platform_err(e));
        }

        info!(endpoint = %spec.endpoint_name, "deployment submitted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn endpoint_status(&self, endpoint_name: &str) -> MlResult<PlatformJobStatus> {
        let output = self
            .client
            .describe_endpoint()
            .endpoint_name(endpoint_name)
            .send()
            .await
            .map_err(platform_err)?;

        let status = match output.endpoint_status() {
            Some(status) => status.clone(),
            None => return Err(MlError::Platform("missing endpoint status".to_string())),
        };

        Ok(match status {
            EndpointStatus::InService => PlatformJobStatus::Completed { artifact_uri: None },
            EndpointStatus::Creating | EndpointStatus::Updating | EndpointStatus::SystemUpdating => {
                PlatformJobStatus::InProgress
            }
            _ => PlatformJobStatus::Failed {
                reason: output.failure_reason().map(String::from),
            },
        })
    }

    #[instrument(skip(self))]
    async fn delete_endpoint(&self, endpoint_name: &str) -> MlResult<()> {
        self.client
            .delete_endpoint()
            .endpoint_name(endpoint_name)
            .send()
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_endpoint_config(&self, endpoint_config_name: &str) -> MlResult<()> {
        self.client
            .delete_endpoint_config()
            .endpoint_config_name(endpoint_config_name)
            .send()
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_model(&self, model_name: &str) -> MlResult<()> {
        self.client
            .delete_model()
            .model_name(model_name)
            .send()
            .await
            .map_err(platform_err)?;
        Ok(())
    }
}
