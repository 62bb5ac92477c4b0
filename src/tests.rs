use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use crate::AppState;
use crate::in_memory::{InMemoryFileStorage, InMemoryWallRepository};
use crate::models::Memory;
use crate::routes;
use crate::wall::MemoryWall;

const BOUNDARY: &str = "wall-test-boundary";

fn test_app() -> Router {
    let wall = MemoryWall::new(
        Arc::new(InMemoryWallRepository::new()),
        Arc::new(InMemoryFileStorage::new("http://localhost:3000".to_string())),
    );
    routes::create_router(Arc::new(AppState { wall }))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn multipart_upload_request(event_id: &str, user_id: &str, image: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"user_id\"\r\n\r\n{user_id}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(format!("/events/{event_id}/memories/image"))
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn create_memory_http(app: &Router, event_id: &str, user_id: &str) -> Memory {
    let response = app
        .clone()
        .oneshot(multipart_upload_request(event_id, user_id, b"JPEGDATA"))
        .await
        .expect("upload response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let image_url = response_json(response).await["image_url"]
        .as_str()
        .expect("image_url")
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/events/{event_id}/memories"),
            json!({ "user_id": user_id, "description": "Great show", "image_url": image_url }),
        ))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::CREATED);
    serde_json::from_value(response_json(response).await).expect("memory")
}

#[tokio::test]
async fn upload_create_list_roundtrip() {
    let app = test_app();
    let created = create_memory_http(&app, "E1", "U1").await;
    assert_eq!(created.upvote_count, 0);
    assert_eq!(created.image_url, "http://localhost:3000/images/memory_wall/E1/U1.jpg");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/events/E1/memories")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed: Vec<Memory> = serde_json::from_value(response_json(response).await).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], created);
}

#[tokio::test]
async fn get_single_memory() {
    let app = test_app();
    let created = create_memory_http(&app, "E1", "U1").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/events/E1/memories/U1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: Memory = serde_json::from_value(response_json(response).await).unwrap();
    assert_eq!(fetched, created);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/events/E1/memories/U9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uploaded_image_is_served_back() {
    let app = test_app();
    create_memory_http(&app, "E1", "U1").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/images/memory_wall/E1/U1.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"JPEGDATA");
}

#[tokio::test]
async fn duplicate_upload_conflicts() {
    let app = test_app();
    create_memory_http(&app, "E1", "U1").await;

    let response = app
        .clone()
        .oneshot(multipart_upload_request("E1", "U1", b"OTHERDATA"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let app = test_app();
    let created = create_memory_http(&app, "E1", "U1").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/events/E1/memories",
            json!({ "user_id": "U1", "description": "again", "image_url": created.image_url }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Already posted"));
}

#[tokio::test]
async fn create_with_blank_description_is_bad_request() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/events/E1/memories",
            json!({ "user_id": "U1", "description": "   ", "image_url": "http://x/img.jpg" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn toggle_on_missing_memory_is_not_found() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/events/E1/memories/ghost/upvote",
            json!({ "voter_id": "U2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn toggle_flips_vote_and_profile_total() {
    let app = test_app();
    create_memory_http(&app, "E1", "U1").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/events/E1/memories/U1/upvote",
            json!({ "voter_id": "U2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let after_on: Memory = serde_json::from_value(response_json(response).await).unwrap();
    assert_eq!(after_on.upvote_count, 1);
    assert_eq!(after_on.upvoted_by, vec!["U2".to_string()]);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/users/U1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let profile = response_json(response).await;
    assert_eq!(profile["total_upvotes_received"], 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/events/E1/memories/U1/upvote",
            json!({ "voter_id": "U2" }),
        ))
        .await
        .unwrap();
    let after_off: Memory = serde_json::from_value(response_json(response).await).unwrap();
    assert_eq!(after_off.upvote_count, 0);
    assert!(after_off.upvoted_by.is_empty());
}

#[tokio::test]
async fn leaderboard_ranks_by_received_upvotes() {
    let app = test_app();
    let alice = format!("alice-{}", Uuid::new_v4());
    let bob = format!("bob-{}", Uuid::new_v4());
    create_memory_http(&app, "E1", &alice).await;
    create_memory_http(&app, "E1", &bob).await;

    for voter in ["v1", "v2", "v3"] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/events/E1/memories/{bob}/upvote"),
                json!({ "voter_id": voter }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/events/E1/memories/{alice}/upvote"),
            json!({ "voter_id": "v1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/leaderboard?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let board = response_json(response).await;
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0]["user_id"], bob.as_str());
    assert_eq!(board[0]["total_upvotes_received"], 3);
    assert_eq!(board[1]["user_id"], alice.as_str());
    assert_eq!(board[1]["total_upvotes_received"], 1);
}
