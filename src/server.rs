//! Document extraction proxy
//!
//! Serves `POST /api/process-document`. The route accepts a multipart upload
//! with a `file` and a `type` (`pdf` or `docx`) field, forwards the file to
//! the backend converter with the caller's `Authorization` header (or the
//! `authToken` cookie), and answers `{"content": ...}` using
//! [`normalize_extraction`].
//!
//! Error replies are JSON objects with an `error` field:
//!
//! | Status | When |
//! |---|---|
//! | 400 | no file, or unsupported type |
//! | 401 | no `Authorization` header or auth cookie |
//! | upstream status | the converter rejected the file |
//! | 500 | unrecognized converter reply, or any other failure |

use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use crate::config::Config;
use crate::credentials::token_from_cookie_header;
use crate::documents::{normalize_extraction, DocumentKind, PROCESS_DOCUMENT_PATH};
use crate::error::{Result, SessionError};

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
    api_base: String,
}

struct Upload {
    file: Option<(String, Option<String>, Bytes)>,
    kind: Option<String>,
}

/// Builds the proxy router for the backend at `api_base`
pub fn router(api_base: &str) -> Result<Router> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("aihuman/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SessionError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let state = ProxyState {
        client,
        api_base: api_base.trim_end_matches('/').to_string(),
    };

    Ok(Router::new()
        .route(PROCESS_DOCUMENT_PATH, post(process_document))
        .with_state(state))
}

/// Binds `config.server.bind` and serves until the process is stopped
pub async fn serve(config: &Config) -> Result<()> {
    let app = router(&config.api.base_url)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!("Document proxy listening on http://{}", local_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// The caller's bearer: the `Authorization` header, else the auth cookie
fn authorization(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        return Some(value.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(token_from_cookie_header)
        .map(|token| format!("Bearer {}", token))
}

fn error_reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

async fn read_upload(multipart: &mut Multipart) -> std::result::Result<Upload, String> {
    let mut upload = Upload {
        file: None,
        kind: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| e.to_string())?;
                upload.file = Some((file_name, content_type, data));
            }
            Some("type") => {
                upload.kind = Some(field.text().await.map_err(|e| e.to_string())?);
            }
            _ => {}
        }
    }

    Ok(upload)
}

async fn process_document(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(details) => {
            tracing::warn!(%details, "Malformed document upload");
            return error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Error processing file", "details": details}),
            );
        }
    };

    let Some((file_name, content_type, data)) = upload.file else {
        return error_reply(StatusCode::BAD_REQUEST, json!({"error": "No file uploaded"}));
    };

    let Some(authorization) = authorization(&headers) else {
        return error_reply(
            StatusCode::UNAUTHORIZED,
            json!({"error": "Authorization header missing"}),
        );
    };

    let kind: DocumentKind = match upload.kind.as_deref().unwrap_or_default().parse() {
        Ok(kind) => kind,
        Err(e) => {
            return error_reply(
                StatusCode::BAD_REQUEST,
                json!({"error": "Unsupported document type", "details": e.to_string()}),
            );
        }
    };

    match forward(&state, kind, &authorization, file_name, content_type, data).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(kind = %kind, error = %e, "Document processing failed");
            error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Error processing file", "details": e.to_string()}),
            )
        }
    }
}

async fn forward(
    state: &ProxyState,
    kind: DocumentKind,
    authorization: &str,
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
) -> Result<Response> {
    let mut part = Part::bytes(data.to_vec()).file_name(file_name);
    if let Some(content_type) = content_type {
        part = part.mime_str(&content_type)?;
    }
    let form = Form::new().part(kind.upstream_field(), part);

    let url = format!("{}{}", state.api_base, kind.upstream_path());
    tracing::debug!(%url, "Forwarding document to converter");

    let response = state
        .client
        .post(&url)
        .header(header::AUTHORIZATION.as_str(), authorization)
        .multipart(form)
        .send()
        .await?;

    let upstream_status = response.status();
    if !upstream_status.is_success() {
        let details = response
            .json::<Value>()
            .await
            .ok()
            .filter(|value| !value.is_null())
            .unwrap_or_else(|| Value::String("Unknown error".to_string()));
        tracing::warn!(status = %upstream_status, "Converter rejected document");

        let status = StatusCode::from_u16(upstream_status.as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        return Ok(error_reply(
            status,
            json!({
                "error": "File processing failed",
                "status": upstream_status.as_u16(),
                "details": details,
            }),
        ));
    }

    let body: Value = response.json().await?;
    match normalize_extraction(kind, &body) {
        Some(content) => Ok((StatusCode::OK, Json(json!({"content": content}))).into_response()),
        None => {
            tracing::warn!(kind = %kind, "Converter reply not recognized");
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Unexpected response format",
                    "details": "Response format not recognized",
                }),
            ))
        }
    }
}
