//! Dataset and model endpoints.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use shutter_core::config::StorageConfig;
use shutter_core::keys;
use shutter_metadata::models::{DatasetRow, DatasetStatus, ModelRow, ModelStatus};
use shutter_metadata::MetadataError;
use shutter_ml::{
    default_hyperparameters, DeploymentSpec, JobTracker, MlError, ResourceNames, TrainingJobSpec,
    TrainingPlatform,
};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Entrypoint handed to the training container. The script-mode image
/// unpacks it from the submit directory and runs it with the channel
/// and hyperparameters wired through the environment.
const TRAINING_SCRIPT: &str = r#"import argparse
import os
import zipfile

import clip_finetune


def main():
    parser = argparse.ArgumentParser()
    parser.add_argument("--epochs", type=int, default=2)
    parser.add_argument("--batch_size", type=int, default=16)
    parser.add_argument("--learning_rate", type=float, default=0.0001)
    args = parser.parse_args()

    data_dir = os.environ["SM_CHANNEL_TRAINING"]
    model_dir = os.environ["SM_MODEL_DIR"]

    for entry in os.listdir(data_dir):
        if entry.endswith(".zip"):
            with zipfile.ZipFile(os.path.join(data_dir, entry)) as archive:
                archive.extractall(data_dir)

    clip_finetune.train(
        data_dir=data_dir,
        output_dir=model_dir,
        epochs=args.epochs,
        batch_size=args.batch_size,
        learning_rate=args.learning_rate,
    )


if __name__ == "__main__":
    main()
"#;

// =============================================================================
// Datasets
// =============================================================================

/// Dataset representation in API responses.
#[derive(Debug, Serialize)]
pub struct DatasetResponse {
    pub dataset_id: Uuid,
    pub name: String,
    pub size_bytes: i64,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<DatasetRow> for DatasetResponse {
    fn from(row: DatasetRow) -> Self {
        Self {
            dataset_id: row.dataset_id,
            name: row.name,
            size_bytes: row.size_bytes,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

async fn require_dataset(
    state: &AppState,
    user_id: Uuid,
    dataset_id: Uuid,
) -> ApiResult<DatasetRow> {
    state
        .metadata
        .get_dataset(user_id, dataset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dataset {dataset_id}")))
}

/// POST /api/training/upload-dataset - Upload a dataset archive (multipart).
///
/// Fields: one `file` part (a zip archive), one `name` text part.
pub async fn upload_dataset(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<DatasetResponse>)> {
    let max_size = state.config.server.max_dataset_size;
    let mut name: Option<String> = None;
    let mut data: Option<bytes::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("name") => {
                name = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("invalid name field: {e}"))
                })?);
            }
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file part: {e}")))?;
                if bytes.len() as u64 > max_size {
                    return Err(ApiError::PayloadTooLarge { limit: max_size });
                }
                if bytes.is_empty() {
                    return Err(ApiError::BadRequest("empty dataset archive".into()));
                }
                data = Some(bytes);
            }
            _ => {}
        }
    }

    let name = name
        .filter(|n| !n.is_empty() && n.len() <= 255)
        .ok_or_else(|| ApiError::BadRequest("dataset needs a name of 1 to 255 characters".into()))?;
    let data = data.ok_or_else(|| ApiError::BadRequest("no file in upload".into()))?;

    let dataset_id = Uuid::new_v4();
    let object_key = keys::dataset_key(dataset_id);
    let size_bytes = data.len() as i64;
    state.storage.put(&object_key, data).await?;

    let now = OffsetDateTime::now_utc();
    let dataset = DatasetRow {
        dataset_id,
        user_id: user.user_id,
        name,
        object_key: object_key.clone(),
        size_bytes,
        status: DatasetStatus::Ready.as_str().to_string(),
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = state.metadata.create_dataset(&dataset).await {
        if let Err(cleanup) = state.storage.delete(&object_key).await {
            tracing::warn!(key = %object_key, error = %cleanup, "rollback blob delete failed");
        }
        return Err(e.into());
    }

    tracing::info!(dataset_id = %dataset_id, size_bytes, "dataset uploaded");
    Ok((StatusCode::CREATED, Json(dataset.into())))
}

/// GET /api/training/datasets - List the user's datasets.
pub async fn list_datasets(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<DatasetResponse>>> {
    let rows = state.metadata.list_datasets(user.user_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /api/training/datasets/{dataset_id} - One dataset.
pub async fn get_dataset(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dataset_id): Path<Uuid>,
) -> ApiResult<Json<DatasetResponse>> {
    let dataset = require_dataset(&state, user.user_id, dataset_id).await?;
    Ok(Json(dataset.into()))
}

/// DELETE /api/training/datasets/{dataset_id} - Delete a dataset.
///
/// Refused while a model still references the archive.
pub async fn delete_dataset(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dataset_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let dataset = require_dataset(&state, user.user_id, dataset_id).await?;

    state
        .metadata
        .delete_dataset(user.user_id, dataset_id)
        .await
        .map_err(|e| match e {
            MetadataError::Constraint(_) => {
                ApiError::Conflict("dataset is referenced by a model".into())
            }
            other => other.into(),
        })?;

    if let Err(e) = state.storage.delete(&dataset.object_key).await {
        tracing::warn!(key = %dataset.object_key, error = %e, "blob delete failed after dataset delete");
    }
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Models
// =============================================================================

/// Model representation in API responses.
#[derive(Debug, Serialize)]
pub struct ModelResponse {
    pub model_id: Uuid,
    pub dataset_id: Uuid,
    pub name: String,
    pub status: String,
    pub endpoint_name: Option<String>,
    pub endpoint_status: Option<String>,
    pub error_detail: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<ModelRow> for ModelResponse {
    fn from(row: ModelRow) -> Self {
        Self {
            model_id: row.model_id,
            dataset_id: row.dataset_id,
            name: row.name,
            status: row.status,
            endpoint_name: row.endpoint_name,
            endpoint_status: row.endpoint_status,
            error_detail: row.error_detail,
            created_at: row.created_at,
        }
    }
}

fn require_platform(
    state: &AppState,
) -> ApiResult<(&Arc<dyn TrainingPlatform>, &Arc<JobTracker>)> {
    match (&state.platform, &state.tracker) {
        (Some(platform), Some(tracker)) => Ok((platform, tracker)),
        _ => Err(MlError::PlatformUnavailable.into()),
    }
}

async fn require_model(state: &AppState, user_id: Uuid, model_id: Uuid) -> ApiResult<ModelRow> {
    let model = state
        .metadata
        .get_model(user_id, model_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("model {model_id}")))?;
    if model.status == ModelStatus::Deleted.as_str() {
        return Err(ApiError::NotFound(format!("model {model_id}")));
    }
    Ok(model)
}

/// URI of a blob as the training platform sees it.
fn blob_uri(config: &StorageConfig, key: &str) -> String {
    match config {
        StorageConfig::S3 { bucket, prefix, .. } => match prefix {
            Some(prefix) => format!("s3://{bucket}/{}/{key}", prefix.trim_matches('/')),
            None => format!("s3://{bucket}/{key}"),
        },
        StorageConfig::Filesystem { path } => {
            format!("file://{}/{key}", path.display())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrainModelRequest {
    pub name: String,
    pub dataset_id: Uuid,
    /// Overrides merged over the defaults.
    #[serde(default)]
    pub hyperparameters: HashMap<String, String>,
}

/// POST /api/training/start - Start training a model from a dataset.
///
/// The model record and platform job are created together; a platform
/// failure rolls the records back to a failed state and releases the
/// dataset.
pub async fn train_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<TrainModelRequest>,
) -> ApiResult<(StatusCode, Json<ModelResponse>)> {
    let (platform, tracker) = require_platform(&state)?;
    if body.name.is_empty() || body.name.len() > 255 {
        return Err(ApiError::BadRequest(
            "model name must be 1 to 255 characters".into(),
        ));
    }

    let dataset = require_dataset(&state, user.user_id, body.dataset_id).await?;
    if dataset.status != DatasetStatus::Ready.as_str() {
        return Err(ApiError::BadRequest(format!(
            "dataset is {}, must be ready",
            dataset.status
        )));
    }

    let model_id = Uuid::new_v4();
    let names = ResourceNames::for_model(model_id);
    let script_key = keys::training_script_key(model_id);
    let now = OffsetDateTime::now_utc();

    state
        .storage
        .put(&script_key, bytes::Bytes::from_static(TRAINING_SCRIPT.as_bytes()))
        .await?;

    let model = ModelRow {
        model_id,
        user_id: user.user_id,
        dataset_id: dataset.dataset_id,
        name: body.name,
        status: ModelStatus::Training.as_str().to_string(),
        artifact_prefix: None,
        endpoint_name: None,
        endpoint_status: None,
        error_detail: None,
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_model(&model).await?;
    state
        .metadata
        .update_dataset_status(dataset.dataset_id, DatasetStatus::Training.as_str(), now)
        .await?;

    let mut hyperparameters = default_hyperparameters();
    hyperparameters.extend(body.hyperparameters);

    let spec = TrainingJobSpec {
        job_name: names.training_job.clone(),
        dataset_uri: blob_uri(&state.config.storage, &dataset.object_key),
        script_uri: blob_uri(&state.config.storage, &script_key),
        output_uri: blob_uri(&state.config.storage, &keys::model_prefix(model_id)),
        hyperparameters,
    };

    if let Err(e) = platform.start_training(&spec).await {
        tracing::error!(model_id = %model_id, error = %e, "training submission failed, rolling back");
        let rollback_at = OffsetDateTime::now_utc();
        if let Err(r) = state
            .metadata
            .update_model_status(
                model_id,
                ModelStatus::Error.as_str(),
                Some(&e.to_string()),
                rollback_at,
            )
            .await
        {
            tracing::error!(model_id = %model_id, error = %r, "rollback of model status failed");
        }
        if let Err(r) = state
            .metadata
            .update_dataset_status(dataset.dataset_id, DatasetStatus::Ready.as_str(), rollback_at)
            .await
        {
            tracing::error!(dataset_id = %dataset.dataset_id, error = %r, "rollback of dataset status failed");
        }
        if let Err(r) = state.storage.delete(&script_key).await {
            tracing::warn!(key = %script_key, error = %r, "rollback of training script failed");
        }
        return Err(e.into());
    }

    tracker.submit_training(model_id, &names.training_job).await?;
    tracing::info!(model_id = %model_id, job = %names.training_job, "training started");

    Ok((StatusCode::CREATED, Json(model.into())))
}

/// GET /api/training/models - List the user's models.
pub async fn list_models(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<ModelResponse>>> {
    let rows = state.metadata.list_models(user.user_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /api/training/models/{model_id} - One model.
pub async fn get_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(model_id): Path<Uuid>,
) -> ApiResult<Json<ModelResponse>> {
    let model = require_model(&state, user.user_id, model_id).await?;
    Ok(Json(model.into()))
}

/// Body of the deploy and undeploy actions.
#[derive(Debug, Deserialize)]
pub struct ModelActionRequest {
    pub model_id: Uuid,
}

/// One entry in the deployed-models listing.
#[derive(Debug, Serialize)]
pub struct DeployedModelEntry {
    /// Absent for the stock CLIP entry.
    pub model_id: Option<Uuid>,
    pub name: String,
    pub endpoint_name: Option<String>,
    pub is_default: bool,
}

/// GET /api/models/deployed - Models currently serving inference.
///
/// The stock CLIP model backing semantic search is always listed first.
pub async fn list_deployed_models(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<DeployedModelEntry>>> {
    let mut entries = vec![DeployedModelEntry {
        model_id: None,
        name: "clip-base".to_string(),
        endpoint_name: None,
        is_default: true,
    }];
    for row in state.metadata.list_models(user.user_id).await? {
        if row.status == ModelStatus::Deployed.as_str() {
            entries.push(DeployedModelEntry {
                model_id: Some(row.model_id),
                name: row.name,
                endpoint_name: row.endpoint_name,
                is_default: false,
            });
        }
    }
    Ok(Json(entries))
}

/// POST /api/training/deploy - Deploy a trained model.
pub async fn deploy_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<ModelActionRequest>,
) -> ApiResult<Json<ModelResponse>> {
    let model_id = body.model_id;
    let (platform, tracker) = require_platform(&state)?;
    let model = require_model(&state, user.user_id, model_id).await?;

    if model.status != ModelStatus::Ready.as_str() {
        return Err(ApiError::BadRequest(format!(
            "model is {}, must be ready",
            model.status
        )));
    }
    let artifact = model
        .artifact_prefix
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("model has no training artifact".into()))?;

    // Training normally stores the platform's own artifact URI; a bare
    // key means the fallback path was taken.
    let artifact_uri = if artifact.contains("://") {
        artifact.to_string()
    } else {
        blob_uri(&state.config.storage, artifact)
    };

    let names = ResourceNames::for_model(model_id);
    let now = OffsetDateTime::now_utc();
    state
        .metadata
        .update_model_status(model_id, ModelStatus::Deploying.as_str(), None, now)
        .await?;
    state
        .metadata
        .set_model_endpoint(model_id, Some(&names.endpoint), now)
        .await?;
    state
        .metadata
        .set_endpoint_status(model_id, Some("Creating"), now)
        .await?;

    let spec = DeploymentSpec {
        model_name: names.model.clone(),
        endpoint_config_name: names.endpoint_config.clone(),
        endpoint_name: names.endpoint.clone(),
        artifact_uri,
    };

    if let Err(e) = platform.start_deployment(&spec).await {
        // The platform compensates its own partial resources; only the
        // record needs rolling back here.
        tracing::error!(model_id = %model_id, error = %e, "deployment submission failed");
        if let Err(r) = state
            .metadata
            .update_model_status(
                model_id,
                ModelStatus::Error.as_str(),
                Some(&e.to_string()),
                OffsetDateTime::now_utc(),
            )
            .await
        {
            tracing::error!(model_id = %model_id, error = %r, "rollback of model status failed");
        }
        return Err(e.into());
    }

    tracker.submit_deployment(model_id, &names.endpoint).await?;
    tracing::info!(model_id = %model_id, endpoint = %names.endpoint, "deployment started");

    let model = require_model(&state, user.user_id, model_id).await?;
    Ok(Json(model.into()))
}

/// POST /api/training/undeploy - Tear down a model's endpoint.
///
/// The model returns to `ready` and can be deployed again later.
pub async fn undeploy_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<ModelActionRequest>,
) -> ApiResult<Json<ModelResponse>> {
    let model_id = body.model_id;
    let (_, tracker) = require_platform(&state)?;
    let model = require_model(&state, user.user_id, model_id).await?;

    if model.status != ModelStatus::Deployed.as_str() {
        return Err(ApiError::BadRequest(format!(
            "model is {}, must be deployed",
            model.status
        )));
    }

    let names = ResourceNames::for_model(model_id);
    let failures = tracker.teardown_endpoint(&names).await;
    if failures > 0 {
        return Err(MlError::Platform(format!(
            "failed to remove {failures} platform resources"
        ))
        .into());
    }

    let now = OffsetDateTime::now_utc();
    state
        .metadata
        .update_model_status(model_id, ModelStatus::Ready.as_str(), None, now)
        .await?;
    state.metadata.set_model_endpoint(model_id, None, now).await?;
    state.metadata.set_endpoint_status(model_id, None, now).await?;
    tracing::info!(model_id = %model_id, endpoint = %names.endpoint, "model undeployed");

    let model = require_model(&state, user.user_id, model_id).await?;
    Ok(Json(model.into()))
}

/// DELETE /api/training/models/{model_id} - Delete a model.
///
/// Artifacts and the training script are removed; the record is
/// soft-deleted and kept for audit. A deployed model must be
/// undeployed first.
pub async fn delete_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(model_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let model = require_model(&state, user.user_id, model_id).await?;

    if model.status == ModelStatus::Training.as_str()
        || model.status == ModelStatus::Deploying.as_str()
    {
        return Err(ApiError::BadRequest(format!(
            "model is {}, wait for the job to finish",
            model.status
        )));
    }
    if model.status == ModelStatus::Deployed.as_str() {
        return Err(ApiError::BadRequest(
            "model is deployed, undeploy it first".into(),
        ));
    }

    let artifact_prefix = keys::model_prefix(model_id);
    if let Err(e) = state.storage.delete_prefix(&artifact_prefix).await {
        tracing::warn!(prefix = %artifact_prefix, error = %e, "artifact delete failed");
    }
    let script_key = keys::training_script_key(model_id);
    if let Err(e) = state.storage.delete(&script_key).await {
        tracing::warn!(key = %script_key, error = %e, "training script delete failed");
    }

    state
        .metadata
        .update_model_status(
            model_id,
            ModelStatus::Deleted.as_str(),
            None,
            OffsetDateTime::now_utc(),
        )
        .await?;

    tracing::info!(model_id = %model_id, "model deleted");
    Ok(StatusCode::NO_CONTENT)
}
