//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Slack on top of the configured payload caps for multipart framing.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let image_body_limit =
        (state.config.server.max_image_size * 16 + MULTIPART_OVERHEAD) as usize;
    let dataset_body_limit = (state.config.server.max_dataset_size + MULTIPART_OVERHEAD) as usize;

    let upload_routes = Router::new()
        .route(
            "/api/images/upload",
            post(handlers::upload_images).layer(DefaultBodyLimit::max(image_body_limit)),
        )
        .route(
            "/api/training/upload-dataset",
            post(handlers::upload_dataset).layer(DefaultBodyLimit::max(dataset_body_limit)),
        );

    let api_routes = Router::new()
        // Health check (intentionally unauthenticated)
        .route("/api/health", get(handlers::health_check))
        // Accounts and sessions
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/whoami", get(handlers::whoami))
        // Folder tree
        .route(
            "/api/folders",
            post(handlers::create_folder).get(handlers::list_folders),
        )
        .route(
            "/api/folders/{folder_id}",
            get(handlers::get_folder)
                .put(handlers::update_folder)
                .delete(handlers::delete_folder),
        )
        .route("/api/folders/images", post(handlers::list_folder_images))
        // Image catalog
        .route("/api/images", get(handlers::list_images))
        .route(
            "/api/images/{image_id}",
            get(handlers::get_image)
                .put(handlers::move_image)
                .delete(handlers::delete_image),
        )
        .route("/api/images/{image_id}/url", get(handlers::get_image_url))
        .route(
            "/api/images/{image_id}/content",
            get(handlers::get_image_content),
        )
        // Semantic search
        .route("/api/images/search", post(handlers::search_images))
        // Training: datasets and models
        .route("/api/training/datasets", get(handlers::list_datasets))
        .route(
            "/api/training/datasets/{dataset_id}",
            get(handlers::get_dataset).delete(handlers::delete_dataset),
        )
        .route("/api/training/start", post(handlers::train_model))
        .route("/api/training/models", get(handlers::list_models))
        .route(
            "/api/training/models/{model_id}",
            get(handlers::get_model).delete(handlers::delete_model),
        )
        .route("/api/training/deploy", post(handlers::deploy_model))
        .route("/api/training/undeploy", post(handlers::undeploy_model))
        .route("/api/models/deployed", get(handlers::list_deployed_models));

    Router::new()
        .merge(api_routes)
        .merge(upload_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
