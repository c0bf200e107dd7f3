//! Semantic search endpoint.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::images::{image_response, ImageResponse};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Restrict the search to one folder; None searches everything.
    pub folder_id: Option<Uuid>,
    /// Override the configured score floor.
    pub min_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub image: ImageResponse,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// POST /api/images/search - Score the user's images against a text query.
pub async fn search_images(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query cannot be empty".into()));
    }

    let images = match body.folder_id {
        Some(folder_id) => {
            state
                .metadata
                .get_folder(user.user_id, folder_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("folder {folder_id}")))?;
            state
                .metadata
                .list_images(user.user_id, Some(folder_id))
                .await?
        }
        None => state.metadata.list_all_images(user.user_id).await?,
    };

    if images.is_empty() {
        return Ok(Json(SearchResponse { results: Vec::new() }));
    }

    let candidates: Vec<String> = images.iter().map(|i| i.object_key.clone()).collect();
    let min_score = body.min_score.unwrap_or(state.config.search.min_score);
    let matches = state.search.search(query, &candidates, min_score).await?;

    let mut by_key: HashMap<String, _> = images
        .into_iter()
        .map(|image| (image.object_key.clone(), image))
        .collect();

    let mut results = Vec::with_capacity(matches.len());
    for m in matches {
        if let Some(image) = by_key.remove(&m.object_key) {
            results.push(SearchResult {
                image: image_response(&state, image).await,
                score: m.score,
            });
        }
    }

    Ok(Json(SearchResponse { results }))
}
