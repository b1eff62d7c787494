//! HTTP surface tests driven through the router with no live socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use bigdrop_core::chunk::chunk_id;
use bigdrop_core::store::ChunkStore;
use bigdrop_core::web::{build_router, WebServerConfig};

const FP: &str = "0123456789abcdef0123456789abcdef";

fn router_over(temp: &TempDir) -> (axum::Router, Arc<ChunkStore>) {
    let store = Arc::new(ChunkStore::new(temp.path()));
    let router = build_router(Arc::clone(&store), &WebServerConfig::default());
    (router, store)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn multipart_upload(fp: &str, chunk_id: &str, payload: &[u8]) -> Request<Body> {
    let boundary = "bigdrop-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"hash\"\r\n\r\n{chunk_id}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"fileHash\"\r\n\r\n{fp}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"chunk\"; filename=\"{chunk_id}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request")
}

#[tokio::test]
async fn verify_fresh_fingerprint_wants_everything() {
    let temp = TempDir::new().expect("temp dir");
    let (router, _) = router_over(&temp);

    let response = router
        .oneshot(json_request(
            "/verify",
            json!({"filename": "video.mp4", "fileHash": FP}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"]["shouldUpload"], true);
    assert_eq!(body["data"]["uploadedChunks"], json!([]));
}

#[tokio::test]
async fn verify_rejects_malformed_fingerprint() {
    let temp = TempDir::new().expect("temp dir");
    let (router, _) = router_over(&temp);

    let response = router
        .oneshot(json_request(
            "/verify",
            json!({"filename": "a.bin", "fileHash": "../../../etc/passwd"}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn verify_rejects_traversal_filename() {
    let temp = TempDir::new().expect("temp dir");
    let (router, _) = router_over(&temp);

    let response = router
        .oneshot(json_request(
            "/verify",
            json!({"filename": "../escape.bin", "fileHash": FP}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn uploaded_chunk_appears_in_inventory() {
    let temp = TempDir::new().expect("temp dir");
    let (router, _) = router_over(&temp);
    let id = chunk_id(FP, 0);

    let response = router
        .clone()
        .oneshot(multipart_upload(FP, &id, b"chunk payload"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(json_request(
            "/verify",
            json!({"filename": "a.bin", "fileHash": FP}),
        ))
        .await
        .expect("response");
    let body = body_json(response).await;
    assert_eq!(body["data"]["uploadedChunks"], json!([id]));
}

#[tokio::test]
async fn upload_missing_file_hash_is_rejected() {
    let temp = TempDir::new().expect("temp dir");
    let (router, _) = router_over(&temp);

    let boundary = "bigdrop-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"hash\"\r\n\r\n{FP}-0\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request");

    let response = router.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_rejects_cross_session_chunk_id() {
    let temp = TempDir::new().expect("temp dir");
    let (router, _) = router_over(&temp);

    let foreign = "ffffffffffffffffffffffffffffffff-0";
    let response = router
        .oneshot(multipart_upload(FP, foreign, b"sneaky"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn merge_assembles_and_serves_the_artifact() {
    let temp = TempDir::new().expect("temp dir");
    let (router, store) = router_over(&temp);

    store
        .put_chunk(FP, &chunk_id(FP, 0), b"hello ")
        .await
        .expect("put 0");
    store
        .put_chunk(FP, &chunk_id(FP, 1), b"world")
        .await
        .expect("put 1");

    let response = router
        .clone()
        .oneshot(json_request(
            "/merge",
            json!({"fileHash": FP, "filename": "greeting.txt", "size": 10}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let url = body["data"]["url"].as_str().expect("url");
    assert_eq!(url, format!("/uploads/{FP}.txt"));

    let response = router
        .oneshot(
            Request::builder()
                .uri(url)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(&bytes[..], b"hello world");
}

#[tokio::test]
async fn downloads_never_reach_inflight_upload_state() {
    let temp = TempDir::new().expect("temp dir");
    let (router, store) = router_over(&temp);
    let id = chunk_id(FP, 0);

    store
        .put_chunk(FP, &id, b"half-uploaded secret")
        .await
        .expect("put");
    std::fs::write(
        temp.path().join(format!(".{FP}.txt.part")),
        b"merge scratch",
    )
    .expect("plant scratch file");

    // The chunk inventory under temp/ is not addressable.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/uploads/temp/{FP}/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Neither is the merge scratch file sitting in the store root.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/uploads/.{FP}.txt.part"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A well-formed artifact name that was never merged is just absent.
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/uploads/{FP}.txt"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn merge_without_chunks_is_a_server_error() {
    let temp = TempDir::new().expect("temp dir");
    let (router, _) = router_over(&temp);

    let response = router
        .oneshot(json_request(
            "/merge",
            json!({"fileHash": FP, "filename": "a.bin", "size": 10}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], 500);
}
