//! Folder tree endpoints.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::images::{image_responses, ImageResponse};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};
use shutter_metadata::models::FolderRow;
use shutter_metadata::MetadataError;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Folder representation in API responses.
#[derive(Debug, Serialize)]
pub struct FolderResponse {
    pub folder_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<FolderRow> for FolderResponse {
    fn from(row: FolderRow) -> Self {
        Self {
            folder_id: row.folder_id,
            parent_id: row.parent_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// A folder with its children, for the tree view.
#[derive(Debug, Serialize)]
pub struct FolderNode {
    #[serde(flatten)]
    pub folder: FolderResponse,
    pub children: Vec<FolderNode>,
}

fn validate_folder_name(name: &str) -> ApiResult<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(ApiError::BadRequest(
            "folder name must be 1 to 255 characters".into(),
        ));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(ApiError::BadRequest(
            "folder name may not contain '/' or NUL".into(),
        ));
    }
    Ok(())
}

async fn require_folder(state: &AppState, user_id: Uuid, folder_id: Uuid) -> ApiResult<FolderRow> {
    state
        .metadata
        .get_folder(user_id, folder_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("folder {folder_id}")))
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

/// POST /api/folders - Create a folder.
pub async fn create_folder(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateFolderRequest>,
) -> ApiResult<(StatusCode, Json<FolderResponse>)> {
    validate_folder_name(&body.name)?;
    if let Some(parent_id) = body.parent_id {
        require_folder(&state, user.user_id, parent_id).await?;
    }

    let now = OffsetDateTime::now_utc();
    let folder = FolderRow {
        folder_id: Uuid::new_v4(),
        user_id: user.user_id,
        parent_id: body.parent_id,
        name: body.name,
        created_at: now,
        updated_at: now,
    };

    state
        .metadata
        .create_folder(&folder)
        .await
        .map_err(sibling_clash)?;

    Ok((StatusCode::CREATED, Json(folder.into())))
}

fn sibling_clash(e: MetadataError) -> ApiError {
    match e {
        MetadataError::Constraint(_) => {
            ApiError::Conflict("a folder with this name already exists here".into())
        }
        other => other.into(),
    }
}

/// GET /api/folders - The full folder tree for the user.
pub async fn list_folders(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<FolderNode>>> {
    let folders = state.metadata.list_folders(user.user_id).await?;
    Ok(Json(build_tree(folders)))
}

/// Assemble rows into a tree rooted at the parentless folders.
fn build_tree(folders: Vec<FolderRow>) -> Vec<FolderNode> {
    let mut children_of: HashMap<Option<Uuid>, Vec<FolderRow>> = HashMap::new();
    for folder in folders {
        children_of.entry(folder.parent_id).or_default().push(folder);
    }
    attach(None, &mut children_of)
}

fn attach(
    parent: Option<Uuid>,
    children_of: &mut HashMap<Option<Uuid>, Vec<FolderRow>>,
) -> Vec<FolderNode> {
    let mut rows = children_of.remove(&parent).unwrap_or_default();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows.into_iter()
        .map(|row| {
            let children = attach(Some(row.folder_id), children_of);
            FolderNode {
                folder: row.into(),
                children,
            }
        })
        .collect()
}

/// GET /api/folders/{folder_id} - One folder.
pub async fn get_folder(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(folder_id): Path<Uuid>,
) -> ApiResult<Json<FolderResponse>> {
    let folder = require_folder(&state, user.user_id, folder_id).await?;
    Ok(Json(folder.into()))
}

/// Update request. `parent_id` distinguishes "absent" (leave in place)
/// from "null" (move to the root).
#[derive(Debug, Deserialize)]
pub struct UpdateFolderRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

/// PUT /api/folders/{folder_id} - Rename and/or move a folder.
pub async fn update_folder(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(folder_id): Path<Uuid>,
    Json(body): Json<UpdateFolderRequest>,
) -> ApiResult<Json<FolderResponse>> {
    require_folder(&state, user.user_id, folder_id).await?;
    let now = OffsetDateTime::now_utc();

    if let Some(new_parent) = body.parent_id {
        if let Some(parent_id) = new_parent {
            require_folder(&state, user.user_id, parent_id).await?;
            check_no_cycle(&state, user.user_id, folder_id, parent_id).await?;
        }
        state
            .metadata
            .move_folder(user.user_id, folder_id, new_parent, now)
            .await
            .map_err(sibling_clash)?;
    }

    if let Some(name) = &body.name {
        validate_folder_name(name)?;
        state
            .metadata
            .rename_folder(user.user_id, folder_id, name, now)
            .await
            .map_err(sibling_clash)?;
    }

    let folder = require_folder(&state, user.user_id, folder_id).await?;
    Ok(Json(folder.into()))
}

/// Walk the ancestry of the destination; the folder being moved must
/// not appear there, and the destination cannot be the folder itself.
async fn check_no_cycle(
    state: &AppState,
    user_id: Uuid,
    folder_id: Uuid,
    new_parent: Uuid,
) -> ApiResult<()> {
    let cycle = || {
        ApiError::BadRequest("cannot move a folder into itself or its own subtree".into())
    };
    if new_parent == folder_id {
        return Err(cycle());
    }
    let mut cursor = new_parent;
    loop {
        let folder = require_folder(state, user_id, cursor).await?;
        match folder.parent_id {
            Some(parent) if parent == folder_id => return Err(cycle()),
            Some(parent) => cursor = parent,
            None => return Ok(()),
        }
    }
}

/// DELETE /api/folders/{folder_id} - Delete a folder subtree.
///
/// Rows cascade in one transaction; blob deletes follow and are best
/// effort, an orphaned blob is preferable to a dangling record.
pub async fn delete_folder(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(folder_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_folder(&state, user.user_id, folder_id).await?;

    let subtree = collect_subtree(&state, user.user_id, folder_id).await?;
    let images = state
        .metadata
        .list_images_in_folders(user.user_id, &subtree)
        .await?;

    state.metadata.delete_folder(user.user_id, folder_id).await?;

    for image in &images {
        if let Err(e) = state.storage.delete(&image.object_key).await {
            tracing::warn!(key = %image.object_key, error = %e, "blob delete failed after folder delete");
        }
    }
    tracing::info!(
        folder_id = %folder_id,
        folders = subtree.len(),
        images = images.len(),
        "folder subtree deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// The ids of a folder and every descendant.
async fn collect_subtree(
    state: &AppState,
    user_id: Uuid,
    folder_id: Uuid,
) -> ApiResult<Vec<Uuid>> {
    let all = state.metadata.list_folders(user_id).await?;
    let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for folder in &all {
        if let Some(parent) = folder.parent_id {
            children_of.entry(parent).or_default().push(folder.folder_id);
        }
    }

    let mut subtree = Vec::new();
    let mut stack = vec![folder_id];
    while let Some(id) = stack.pop() {
        subtree.push(id);
        if let Some(children) = children_of.get(&id) {
            stack.extend(children);
        }
    }
    Ok(subtree)
}

#[derive(Debug, Deserialize)]
pub struct FolderImagesRequest {
    pub folder_ids: Vec<Uuid>,
}

/// POST /api/folders/images - Images across a set of folders.
///
/// Lets the client hydrate a multi-folder selection in one call instead
/// of one request per folder.
pub async fn list_folder_images(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<FolderImagesRequest>,
) -> ApiResult<Json<Vec<ImageResponse>>> {
    if body.folder_ids.is_empty() {
        return Ok(Json(Vec::new()));
    }
    for folder_id in &body.folder_ids {
        require_folder(&state, user.user_id, *folder_id).await?;
    }
    let images = state
        .metadata
        .list_images_in_folders(user.user_id, &body.folder_ids)
        .await?;
    Ok(Json(image_responses(&state, images).await))
}
