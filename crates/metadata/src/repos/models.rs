//! Model repository.

use crate::error::MetadataResult;
use crate::models::ModelRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for trained models.
#[async_trait]
pub trait ModelRepo: Send + Sync {
    /// Create a model record.
    async fn create_model(&self, model: &ModelRow) -> MetadataResult<()>;

    /// Get a model by ID, scoped to its owner.
    async fn get_model(&self, user_id: Uuid, model_id: Uuid) -> MetadataResult<Option<ModelRow>>;

    /// Get a model by ID without an owner scope. Used by the job
    /// poller, which acts on behalf of the system.
    async fn get_model_by_id(&self, model_id: Uuid) -> MetadataResult<Option<ModelRow>>;

    /// List a user's models, newest first. Soft-deleted models are
    /// excluded.
    async fn list_models(&self, user_id: Uuid) -> MetadataResult<Vec<ModelRow>>;

    /// Update model status and optional error detail.
    async fn update_model_status(
        &self,
        model_id: Uuid,
        status: &str,
        error_detail: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Record the artifact prefix produced by training.
    async fn set_model_artifact(
        &self,
        model_id: Uuid,
        artifact_prefix: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Record the endpoint name once deployment starts, or clear it
    /// after an undeploy.
    async fn set_model_endpoint(
        &self,
        model_id: Uuid,
        endpoint_name: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Record the platform-reported endpoint state, or clear it when
    /// the endpoint goes away.
    async fn set_endpoint_status(
        &self,
        model_id: Uuid,
        endpoint_status: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
