//! Image catalog endpoints.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use shutter_core::keys;
use shutter_core::PRESIGNED_URL_TTL_SECS;
use shutter_metadata::models::ImageRow;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Image representation in API responses. Every entry carries a
/// resolved read URL so clients never need a second round trip.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub image_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Resolve a read URL for an image. Preference order: presigned URL,
/// then the permanent URL recorded at upload, then this server's own
/// content route. The second element is the TTL of an expiring URL.
pub(crate) async fn resolve_url(state: &AppState, image: &ImageRow) -> (String, Option<u64>) {
    let ttl = Duration::from_secs(PRESIGNED_URL_TTL_SECS);
    match state.storage.presign_get(&image.object_key, ttl).await {
        Ok(url) => return (url, Some(PRESIGNED_URL_TTL_SECS)),
        Err(shutter_storage::StorageError::PresignUnsupported) => {}
        Err(e) => {
            tracing::warn!(key = %image.object_key, error = %e, "presign failed, falling back");
        }
    }
    if let Some(url) = &image.permanent_url {
        return (url.clone(), None);
    }
    (format!("/api/images/{}/content", image.image_id), None)
}

pub(crate) async fn image_response(state: &AppState, row: ImageRow) -> ImageResponse {
    let (url, _) = resolve_url(state, &row).await;
    ImageResponse {
        image_id: row.image_id,
        folder_id: row.folder_id,
        original_name: row.original_name,
        content_type: row.content_type,
        size_bytes: row.size_bytes,
        url,
        created_at: row.created_at,
    }
}

pub(crate) async fn image_responses(
    state: &AppState,
    rows: Vec<ImageRow>,
) -> Vec<ImageResponse> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(image_response(state, row).await);
    }
    out
}

async fn require_image(state: &AppState, user_id: Uuid, image_id: Uuid) -> ApiResult<ImageRow> {
    state
        .metadata
        .get_image(user_id, image_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("image {image_id}")))
}

async fn require_folder_exists(state: &AppState, user_id: Uuid, folder_id: Uuid) -> ApiResult<()> {
    state
        .metadata
        .get_folder(user_id, folder_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("folder {folder_id}")))?;
    Ok(())
}

struct PendingUpload {
    original_name: String,
    content_type: String,
    data: bytes::Bytes,
}

/// POST /api/images/upload - Upload one or more images (multipart).
///
/// Fields: repeated `files` file parts, optional `folder_id` text part.
/// Blobs are written first, then the records land in one transaction;
/// if that transaction fails every written blob is removed again.
pub async fn upload_images(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<ImageResponse>>)> {
    let max_size = state.config.server.max_image_size;
    let mut folder_id: Option<Uuid> = None;
    let mut pending: Vec<PendingUpload> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("folder_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid folder_id field: {e}")))?;
                let id = text
                    .parse()
                    .map_err(|_| ApiError::BadRequest("folder_id is not a UUID".into()))?;
                folder_id = Some(id);
            }
            Some("files") => {
                let original_name = field
                    .file_name()
                    .map(String::from)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| ApiError::BadRequest("file part needs a filename".into()))?;
                let content_type = field
                    .content_type()
                    .map(String::from)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                if !content_type.starts_with("image/") {
                    return Err(ApiError::BadRequest(format!(
                        "unsupported content type: {content_type}"
                    )));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file part: {e}")))?;
                if data.len() as u64 > max_size {
                    return Err(ApiError::PayloadTooLarge { limit: max_size });
                }
                if data.is_empty() {
                    return Err(ApiError::BadRequest("empty file part".into()));
                }
                pending.push(PendingUpload {
                    original_name,
                    content_type,
                    data,
                });
            }
            _ => {}
        }
    }

    if pending.is_empty() {
        return Err(ApiError::BadRequest("no files in upload".into()));
    }
    if let Some(folder_id) = folder_id {
        require_folder_exists(&state, user.user_id, folder_id).await?;
    }

    let now = OffsetDateTime::now_utc();
    let mut rows = Vec::with_capacity(pending.len());
    let mut written: Vec<String> = Vec::with_capacity(pending.len());

    for upload in pending {
        let object_key = keys::image_key(user.user_id, &upload.original_name);
        let size_bytes = upload.data.len() as i64;
        if let Err(e) = state.storage.put(&object_key, upload.data).await {
            rollback_blobs(&state, &written).await;
            return Err(e.into());
        }
        written.push(object_key.clone());
        let permanent_url = state.storage.permanent_url(&object_key);
        rows.push(ImageRow {
            image_id: Uuid::new_v4(),
            user_id: user.user_id,
            folder_id,
            object_key,
            original_name: upload.original_name,
            content_type: upload.content_type,
            size_bytes,
            permanent_url,
            created_at: now,
        });
    }

    if let Err(e) = state.metadata.insert_images(&rows).await {
        rollback_blobs(&state, &written).await;
        return Err(e.into());
    }

    tracing::info!(count = rows.len(), folder_id = ?folder_id, "images uploaded");
    let responses = image_responses(&state, rows).await;
    Ok((StatusCode::CREATED, Json(responses)))
}

async fn rollback_blobs(state: &AppState, keys: &[String]) {
    for key in keys {
        if let Err(e) = state.storage.delete(key).await {
            tracing::warn!(key = %key, error = %e, "rollback blob delete failed");
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListImagesQuery {
    pub folder_id: Option<Uuid>,
    /// List across every folder instead of one.
    #[serde(default)]
    pub all: bool,
}

/// GET /api/images - List images in a folder (default: the root).
pub async fn list_images(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListImagesQuery>,
) -> ApiResult<Json<Vec<ImageResponse>>> {
    let rows = if query.all {
        state.metadata.list_all_images(user.user_id).await?
    } else {
        if let Some(folder_id) = query.folder_id {
            require_folder_exists(&state, user.user_id, folder_id).await?;
        }
        state
            .metadata
            .list_images(user.user_id, query.folder_id)
            .await?
    };
    Ok(Json(image_responses(&state, rows).await))
}

/// GET /api/images/{image_id} - One image record.
pub async fn get_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Json<ImageResponse>> {
    let image = require_image(&state, user.user_id, image_id).await?;
    Ok(Json(image_response(&state, image).await))
}

/// Download URL response.
#[derive(Debug, Serialize)]
pub struct ImageUrlResponse {
    pub url: String,
    /// Seconds until the URL expires; None for non-expiring URLs.
    pub expires_in_secs: Option<u64>,
}

/// GET /api/images/{image_id}/url - A read URL for the blob.
///
/// Preference order: presigned URL, then the backend's permanent URL,
/// then this server's own content route.
pub async fn get_image_url(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Json<ImageUrlResponse>> {
    let image = require_image(&state, user.user_id, image_id).await?;
    let (url, expires_in_secs) = resolve_url(&state, &image).await;
    Ok(Json(ImageUrlResponse {
        url,
        expires_in_secs,
    }))
}

/// GET /api/images/{image_id}/content - Serve the blob directly.
pub async fn get_image_content(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Response> {
    let image = require_image(&state, user.user_id, image_id).await?;
    let bytes = state.storage.get(&image.object_key).await?;
    Ok((
        [(header::CONTENT_TYPE, image.content_type)],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct MoveImageRequest {
    /// Destination folder; None moves the image to the root.
    pub folder_id: Option<Uuid>,
}

/// PUT /api/images/{image_id} - Move an image to another folder.
pub async fn move_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(image_id): Path<Uuid>,
    Json(body): Json<MoveImageRequest>,
) -> ApiResult<Json<ImageResponse>> {
    let image = require_image(&state, user.user_id, image_id).await?;
    if let Some(folder_id) = body.folder_id {
        require_folder_exists(&state, user.user_id, folder_id).await?;
    }

    // Same rule as folders: no duplicate display name at the destination.
    let siblings = state.metadata.list_images(user.user_id, body.folder_id).await?;
    if siblings
        .iter()
        .any(|s| s.image_id != image_id && s.original_name == image.original_name)
    {
        return Err(ApiError::Conflict(format!(
            "an image named {:?} already exists there",
            image.original_name
        )));
    }

    state
        .metadata
        .move_image(
            user.user_id,
            image_id,
            body.folder_id,
            OffsetDateTime::now_utc(),
        )
        .await?;

    let image = require_image(&state, user.user_id, image_id).await?;
    Ok(Json(image_response(&state, image).await))
}

/// DELETE /api/images/{image_id} - Delete an image.
///
/// The record goes first; the blob delete is best effort.
pub async fn delete_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(image_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let image = require_image(&state, user.user_id, image_id).await?;
    state.metadata.delete_image(user.user_id, image_id).await?;

    if let Err(e) = state.storage.delete(&image.object_key).await {
        tracing::warn!(key = %image.object_key, error = %e, "blob delete failed after image delete");
    }

    Ok(StatusCode::NO_CONTENT)
}
