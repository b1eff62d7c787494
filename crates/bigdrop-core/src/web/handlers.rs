//! HTTP endpoint handlers for the store API.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use axum_extra::extract::Multipart;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::chunk::{validate_filename, validate_fingerprint};
use crate::protocol::{ApiResponse, MergeData, MergeRequest, VerifyData, VerifyRequest};
use crate::store::{extract_ext, ChunkStore};

use super::error::{ApiError, ApiResult};

/// `POST /verify`: does the file need uploading, and which chunks are
/// already here?
pub async fn verify(
    State(store): State<Arc<ChunkStore>>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<ApiResponse<VerifyData>>> {
    validate_fingerprint(&req.file_hash)?;
    validate_filename(&req.filename)?;

    let ext = extract_ext(&req.filename);
    if store.has_artifact(&req.file_hash, &ext)? {
        debug!(file_hash = %req.file_hash, "artifact exists, instant transfer");
        return Ok(Json(ApiResponse::ok(
            "file already exists",
            VerifyData::already_stored(),
        )));
    }

    let uploaded = store.list_chunks(&req.file_hash).await?;
    Ok(Json(ApiResponse::ok(
        "upload needed",
        VerifyData::needs_upload(uploaded),
    )))
}

/// `POST /upload`: place one chunk. Multipart form with text fields
/// `hash` (the chunk id) and `fileHash`, and a file field `chunk`.
pub async fn upload_chunk(
    State(store): State<Arc<ChunkStore>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let mut chunk_id: Option<String> = None;
    let mut file_hash: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("hash") => {
                chunk_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("bad hash field: {e}")))?,
                );
            }
            Some("fileHash") => {
                file_hash = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("bad fileHash field: {e}")))?,
                );
            }
            Some("chunk") => {
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("bad chunk field: {e}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let chunk_id = chunk_id.ok_or_else(|| ApiError::bad_request("missing field: hash"))?;
    let file_hash = file_hash.ok_or_else(|| ApiError::bad_request("missing field: fileHash"))?;
    let bytes = bytes.ok_or_else(|| ApiError::bad_request("missing field: chunk"))?;

    store.put_chunk(&file_hash, &chunk_id, &bytes).await?;
    Ok(Json(ApiResponse::ok_empty("chunk received")))
}

/// `POST /merge`: assemble the placed chunks into the final artifact and
/// hand back its URL.
pub async fn merge(
    State(store): State<Arc<ChunkStore>>,
    Json(req): Json<MergeRequest>,
) -> ApiResult<Json<ApiResponse<MergeData>>> {
    store.merge(&req.file_hash, &req.filename).await?;

    let ext = extract_ext(&req.filename);
    let url = format!("/uploads/{}{ext}", req.file_hash);
    Ok(Json(ApiResponse::ok("file merged", MergeData { url })))
}

/// `GET /uploads/{name}`: stream one finished artifact.
///
/// `name` must be a fingerprint-prefixed artifact name; anything else,
/// including chunk inventory paths, is rejected before touching disk.
pub async fn download(
    State(store): State<Arc<ChunkStore>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let path = store.resolve_artifact(&name)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("no such artifact: {name}")))?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}
