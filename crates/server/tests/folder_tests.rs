//! Integration tests for the folder tree.

mod common;

use axum::http::StatusCode;
use common::TestServer;
use serde_json::json;

async fn create_folder(
    server: &TestServer,
    token: &str,
    name: &str,
    parent_id: Option<&str>,
) -> String {
    let (status, body) = server
        .json_request(
            "POST",
            "/api/folders",
            Some(json!({ "name": name, "parent_id": parent_id })),
            Some(token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create folder failed: {body}");
    body["folder_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_and_get_folder() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let id = create_folder(&server, &token, "holiday", None).await;
    let (status, body) = server
        .json_request("GET", &format!("/api/folders/{id}"), None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"].as_str(), Some("holiday"));
    assert!(body["parent_id"].is_null());
}

#[tokio::test]
async fn test_sibling_name_clash_conflicts() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    create_folder(&server, &token, "holiday", None).await;
    let (status, _) = server
        .json_request(
            "POST",
            "/api/folders",
            Some(json!({ "name": "holiday" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The same name under a different parent is fine.
    let parent = create_folder(&server, &token, "2026", None).await;
    create_folder(&server, &token, "holiday", Some(&parent)).await;
}

#[tokio::test]
async fn test_folder_name_validation() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    for name in ["", "a/b"] {
        let (status, _) = server
            .json_request(
                "POST",
                "/api/folders",
                Some(json!({ "name": name })),
                Some(&token),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted name {name:?}");
    }
}

#[tokio::test]
async fn test_missing_parent_is_not_found() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let (status, _) = server
        .json_request(
            "POST",
            "/api/folders",
            Some(json!({
                "name": "orphan",
                "parent_id": uuid::Uuid::new_v4(),
            })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tree_listing_nests_children() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let root = create_folder(&server, &token, "photos", None).await;
    create_folder(&server, &token, "cats", Some(&root)).await;
    create_folder(&server, &token, "dogs", Some(&root)).await;

    let (status, body) = server
        .json_request("GET", "/api/folders", None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let tree = body.as_array().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0]["name"].as_str(), Some("photos"));
    let children = tree[0]["children"].as_array().unwrap();
    // Sorted by name.
    assert_eq!(children[0]["name"].as_str(), Some("cats"));
    assert_eq!(children[1]["name"].as_str(), Some("dogs"));
}

#[tokio::test]
async fn test_rename_folder() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let id = create_folder(&server, &token, "old", None).await;
    let (status, body) = server
        .json_request(
            "PUT",
            &format!("/api/folders/{id}"),
            Some(json!({ "name": "new" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"].as_str(), Some("new"));
}

#[tokio::test]
async fn test_move_folder_to_root_and_back() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let parent = create_folder(&server, &token, "parent", None).await;
    let child = create_folder(&server, &token, "child", Some(&parent)).await;

    let (status, body) = server
        .json_request(
            "PUT",
            &format!("/api/folders/{child}"),
            Some(json!({ "parent_id": null })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["parent_id"].is_null());

    let (status, body) = server
        .json_request(
            "PUT",
            &format!("/api/folders/{child}"),
            Some(json!({ "parent_id": parent })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parent_id"].as_str(), Some(parent.as_str()));
}

#[tokio::test]
async fn test_move_into_own_subtree_rejected() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let a = create_folder(&server, &token, "a", None).await;
    let b = create_folder(&server, &token, "b", Some(&a)).await;
    let c = create_folder(&server, &token, "c", Some(&b)).await;

    // Into itself.
    let (status, _) = server
        .json_request(
            "PUT",
            &format!("/api/folders/{a}"),
            Some(json!({ "parent_id": a })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Into a grandchild.
    let (status, body) = server
        .json_request(
            "PUT",
            &format!("/api/folders/{a}"),
            Some(json!({ "parent_id": c })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("bad request"), "{body}");
}

#[tokio::test]
async fn test_bulk_folder_images_listing() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let cats = create_folder(&server, &token, "cats", None).await;
    let dogs = create_folder(&server, &token, "dogs", None).await;
    let birds = create_folder(&server, &token, "birds", None).await;
    server.upload_image(&token, "cat.png", Some(&cats)).await;
    server.upload_image(&token, "dog.png", Some(&dogs)).await;
    server.upload_image(&token, "bird.png", Some(&birds)).await;

    let (status, body) = server
        .json_request(
            "POST",
            "/api/folders/images",
            Some(json!({ "folder_ids": [cats, dogs] })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    // An unknown folder in the set fails the whole request.
    let (status, _) = server
        .json_request(
            "POST",
            "/api/folders/images",
            Some(json!({ "folder_ids": [cats, uuid::Uuid::new_v4()] })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_folder_removes_subtree_and_blobs() {
    let server = TestServer::new().await;
    let token = server.register("alice").await;

    let parent = create_folder(&server, &token, "parent", None).await;
    let child = create_folder(&server, &token, "child", Some(&parent)).await;
    let image_id = server.upload_image(&token, "nested.png", Some(&child)).await;

    let image = server
        .metadata()
        .get_image(
            server.state.tokens.verify(&token).unwrap().sub,
            image_id.parse().unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(server.state.storage.exists(&image.object_key).await.unwrap());

    let (status, _) = server
        .json_request("DELETE", &format!("/api/folders/{parent}"), None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for id in [&parent, &child] {
        let (status, _) = server
            .json_request("GET", &format!("/api/folders/{id}"), None, Some(&token))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, _) = server
        .json_request("GET", &format!("/api/images/{image_id}"), None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!server.state.storage.exists(&image.object_key).await.unwrap());
}
