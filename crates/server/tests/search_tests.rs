//! Integration tests for semantic search.

mod common;

use axum::http::StatusCode;
use common::TestServer;
use serde_json::json;
use shutter_ml::SearchMatch;

#[tokio::test]
async fn test_search_maps_matches_to_image_records() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;
    let cat = server.upload_image(&token, "cat.png", None).await;
    let dog = server.upload_image(&token, "dog.png", None).await;

    let user_id = server.state.tokens.verify(&token).unwrap().sub;
    let images = server.metadata().list_all_images(user_id).await.unwrap();
    let cat_key = images
        .iter()
        .find(|i| i.image_id.to_string() == cat)
        .unwrap()
        .object_key
        .clone();

    server.search.script_matches([SearchMatch {
        object_key: cat_key,
        score: 0.83,
    }]);

    let (status, body) = server
        .json_request(
            "POST",
            "/api/images/search",
            Some(json!({ "query": "a cat on a sofa" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["image"]["image_id"].as_str(), Some(cat.as_str()));
    assert!((results[0]["score"].as_f64().unwrap() - 0.83).abs() < 1e-9);

    // Both images were offered as candidates.
    let queries = server.search.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].1.len(), 2);
    drop(queries);
    let _ = dog;
}

#[tokio::test]
async fn test_search_scoped_to_folder() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let (_, folder) = server
        .json_request(
            "POST",
            "/api/folders",
            Some(json!({ "name": "cats" })),
            Some(&token),
        )
        .await;
    let folder_id = folder["folder_id"].as_str().unwrap().to_string();

    server.upload_image(&token, "inside.png", Some(&folder_id)).await;
    server.upload_image(&token, "outside.png", None).await;

    let (status, _) = server
        .json_request(
            "POST",
            "/api/images/search",
            Some(json!({ "query": "anything", "folder_id": folder_id })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let queries = server.search.queries.lock().unwrap();
    assert_eq!(queries[0].1.len(), 1, "only the folder's image is a candidate");
}

#[tokio::test]
async fn test_search_min_score_override() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;
    let cat = server.upload_image(&token, "cat.png", None).await;

    let user_id = server.state.tokens.verify(&token).unwrap().sub;
    let key = server.metadata().list_all_images(user_id).await.unwrap()[0]
        .object_key
        .clone();
    server.search.script_matches([SearchMatch {
        object_key: key,
        score: 0.3,
    }]);

    // Above the default floor but below the requested one.
    let (status, body) = server
        .json_request(
            "POST",
            "/api/images/search",
            Some(json!({ "query": "a cat", "min_score": 0.5 })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["results"].as_array().unwrap().is_empty());
    let _ = cat;
}

#[tokio::test]
async fn test_search_empty_query_rejected() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let (status, _) = server
        .json_request(
            "POST",
            "/api/images/search",
            Some(json!({ "query": "   " })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_with_no_images_short_circuits() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let (status, body) = server
        .json_request(
            "POST",
            "/api/images/search",
            Some(json!({ "query": "a cat" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["results"].as_array().unwrap().is_empty());
    // The search service was never called.
    assert!(server.search.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_search_timeout_maps_to_gateway_timeout() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;
    server.upload_image(&token, "cat.png", None).await;
    server.search.fail_with_timeout();

    let (status, body) = server
        .json_request(
            "POST",
            "/api/images/search",
            Some(json!({ "query": "a cat" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"].as_str().unwrap().contains("timed out"), "{body}");
}
