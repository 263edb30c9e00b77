//! HTTP handlers for file operations.
//! Streams bodies in both directions and delegates storage concerns to
//! `GridStore`.

use crate::{
    errors::AppError,
    models::{
        file::{CustomMetadata, FileInfo, UploadOptions},
        file_id::FileId,
    },
    services::grid_store::{GridStore, UploadSource},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio_util::io::StreamReader;

/// Request headers starting with this prefix become custom metadata.
const META_HEADER_PREFIX: &str = "x-meta-";
const FILENAME_HEADER: &str = "x-filename";

/// Body returned after a file is stored.
#[derive(Debug, Serialize)]
pub struct StoredFile {
    pub id: FileId,
    pub file: FileInfo,
}

/// Body of `POST /copy/{id}`.
#[derive(Debug, Deserialize)]
pub struct CopyReq {
    /// External id of the copy; supplies the default filename and suffix.
    pub id: String,
    #[serde(flatten)]
    pub options: UploadOptions,
}

/// Body of `POST /delete`.
#[derive(Debug, Deserialize)]
pub struct DeleteManyReq {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub confirm: Option<String>,
}

/// Upload a file to `/files/{*external_id}`.
pub async fn upload_file(
    State(store): State<GridStore>,
    Path(external_id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let options = upload_options(&headers);

    let stream = body
        .into_data_stream()
        .map_err(io::Error::other);
    let reader = StreamReader::new(stream);

    let id = store
        .upload(UploadSource::stream(reader), &external_id, options)
        .await?;
    let file = store.file_info(&id).await?;

    Ok((StatusCode::CREATED, Json(StoredFile { id, file })))
}

/// Copy a stored file without re-uploading its content.
pub async fn copy_file(
    State(store): State<GridStore>,
    Path(source): Path<String>,
    Json(req): Json<CopyReq>,
) -> Result<impl IntoResponse, AppError> {
    let source = parse_id(&source)?;
    let id = store
        .upload(UploadSource::stored(&store, source), &req.id, req.options)
        .await?;
    let file = store.file_info(&id).await?;

    Ok((StatusCode::CREATED, Json(StoredFile { id, file })))
}

/// Download `/files/{id}` as a streaming response.
pub async fn get_file(
    State(store): State<GridStore>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let reader = store.open(&id, false).await?;
    let meta = reader.file().clone();
    let body = Body::from_stream(reader.into_stream());

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// HEAD `/files/{id}` returns the same headers as GET but no body.
pub async fn head_file(
    State(store): State<GridStore>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let meta = store.file_info(&id).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// DELETE `/files/{id}`: succeeds whether or not the file existed.
pub async fn delete_file(
    State(store): State<GridStore>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/delete`: delete every listed file.
pub async fn delete_files(
    State(store): State<GridStore>,
    Json(req): Json<DeleteManyReq>,
) -> Result<impl IntoResponse, AppError> {
    let ids = req
        .ids
        .iter()
        .map(|raw| parse_id(raw))
        .collect::<Result<Vec<_>, _>>()?;
    store.delete_many(&ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE `/files?confirm=confirm`: wipe the whole store.
pub async fn clear_files(
    State(store): State<GridStore>,
    Query(q): Query<ClearQuery>,
) -> Result<impl IntoResponse, AppError> {
    store
        .clear_all(q.confirm.as_deref().unwrap_or_default())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id(raw: &str) -> Result<FileId, AppError> {
    Ok(raw.parse::<FileId>()?)
}

fn upload_options(headers: &HeaderMap) -> UploadOptions {
    let header_str = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut metadata = CustomMetadata::new();
    for (name, value) in headers {
        if let Some(key) = name.as_str().strip_prefix(META_HEADER_PREFIX) {
            if let Ok(value) = value.to_str() {
                metadata.insert(key.to_string(), Value::String(value.to_string()));
            }
        }
    }

    UploadOptions {
        filename: header_str(&HeaderName::from_static(FILENAME_HEADER)),
        content_type: header_str(&header::CONTENT_TYPE),
        metadata,
    }
}

fn set_file_headers(headers: &mut HeaderMap, meta: &FileInfo) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    let length = meta.length.unwrap_or_default().max(0);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if let Some(checksum) = meta.checksum.as_ref() {
        let quoted = format!("\"{}\"", checksum);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Some(digest) = meta.checksum_bytes() {
        if let Ok(value) = HeaderValue::from_str(&general_purpose::STANDARD.encode(digest)) {
            headers.insert(HeaderName::from_static("content-md5"), value);
        }
    }

    if let Some(created_at) = meta.created_at {
        let http_date = created_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}
