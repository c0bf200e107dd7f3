//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MetadataError;

// =============================================================================
// Users
// =============================================================================

/// User account record.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Folders
// =============================================================================

/// Folder record. `parent_id` is NULL for root-level folders; sibling
/// names are unique per user (including at the root).
#[derive(Debug, Clone, FromRow)]
pub struct FolderRow {
    pub folder_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Images
// =============================================================================

/// Image record. `folder_id` is NULL for images at the root;
/// `object_key` is the blob-store key and is unique.
#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub image_id: Uuid,
    pub user_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub object_key: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// Public URL recorded at upload time when the backend exposes
    /// one. Used when presigning is unavailable.
    pub permanent_url: Option<String>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Datasets
// =============================================================================

/// Dataset archive record.
#[derive(Debug, Clone, FromRow)]
pub struct DatasetRow {
    pub dataset_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Dataset lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStatus {
    Uploading,
    Ready,
    Training,
    Error,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Ready => "ready",
            Self::Training => "training",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MetadataError> {
        match s {
            "uploading" => Ok(Self::Uploading),
            "ready" => Ok(Self::Ready),
            "training" => Ok(Self::Training),
            "error" => Ok(Self::Error),
            _ => Err(MetadataError::Internal(format!(
                "unknown dataset status: {s}"
            ))),
        }
    }
}

// =============================================================================
// Models
// =============================================================================

/// Trained model record. Models are soft-deleted: `status` becomes
/// `deleted` and the row stays for audit, filtered from listings.
#[derive(Debug, Clone, FromRow)]
pub struct ModelRow {
    pub model_id: Uuid,
    pub user_id: Uuid,
    pub dataset_id: Uuid,
    pub name: String,
    pub status: String,
    /// Blob-store prefix of training artifacts once training completes.
    pub artifact_prefix: Option<String>,
    /// Hosted endpoint name once deployment starts.
    pub endpoint_name: Option<String>,
    /// Last endpoint state reported by the platform (for example
    /// `Creating` or `InService`). Cleared when the endpoint is torn
    /// down.
    pub endpoint_status: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Model lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Training,
    Ready,
    Deploying,
    Deployed,
    Error,
    Deleted,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Ready => "ready",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Error => "error",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MetadataError> {
        match s {
            "training" => Ok(Self::Training),
            "ready" => Ok(Self::Ready),
            "deploying" => Ok(Self::Deploying),
            "deployed" => Ok(Self::Deployed),
            "error" => Ok(Self::Error),
            "deleted" => Ok(Self::Deleted),
            _ => Err(MetadataError::Internal(format!(
                "unknown model status: {s}"
            ))),
        }
    }
}

// =============================================================================
// Poll jobs
// =============================================================================

/// A scheduled status poll against the training platform. Jobs are the
/// durable form of the poll chain: one row per managed platform job,
/// re-armed by bumping `next_poll_at` until a terminal state.
#[derive(Debug, Clone, FromRow)]
pub struct PollJobRow {
    pub job_id: Uuid,
    pub model_id: Uuid,
    /// "training" or "deployment".
    pub kind: String,
    /// Platform-side identifier (training job name or endpoint name).
    pub handle: String,
    pub state: String,
    pub attempts: i32,
    pub next_poll_at: OffsetDateTime,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// What a poll job is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollJobKind {
    Training,
    Deployment,
}

impl PollJobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Deployment => "deployment",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MetadataError> {
        match s {
            "training" => Ok(Self::Training),
            "deployment" => Ok(Self::Deployment),
            _ => Err(MetadataError::Internal(format!(
                "unknown poll job kind: {s}"
            ))),
        }
    }
}

/// Poll job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollJobState {
    /// Submitted, not yet observed in progress by a poll.
    Pending,
    /// At least one poll saw the platform job running.
    InProgress,
    Completed,
    Failed,
}

impl PollJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MetadataError> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(MetadataError::Internal(format!(
                "unknown poll job state: {s}"
            ))),
        }
    }

    /// Terminal states never re-arm.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
