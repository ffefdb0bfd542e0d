//! HTTP handlers. Each one is a thin adapter over [`MetadataService`].

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::AppState;
use super::error::AppError;
use crate::pipeline::{AnalyzeOutcome, FieldsView, FinalizedImage, SessionView};

/// Multipart field carrying the upload.
const UPLOAD_FIELD: &str = "file";

/// Used when the multipart part has no filename.
const DEFAULT_FILENAME: &str = "image.jpg";

/// Body of the edit and finalize endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditRequest {
    pub edits: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    sessions: usize,
}

/// `GET /healthz`
pub async fn healthz(State(service): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: service.session_count().await,
    })
}

/// `POST /analyze` with the image in the multipart field `file`.
pub async fn analyze(
    State(service): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeOutcome>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("could not read upload: {e}")))?;
        if data.is_empty() {
            return Err(AppError::bad_request("uploaded file is empty"));
        }

        let outcome = service.analyze(&filename, data).await?;
        return Ok(Json(outcome));
    }

    Err(AppError::bad_request(format!(
        "multipart field {UPLOAD_FIELD:?} is missing"
    )))
}

/// `GET /sessions/{id}`
pub async fn get_session(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(service.session_view(session_id(&id)?).await?))
}

/// `POST /sessions/{id}/edits`
///
/// The body is read as JSON regardless of its content type.
pub async fn edit_session(
    State(service): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<FieldsView>, AppError> {
    let id = session_id(&id)?;
    let request = edit_request(&body)?;
    Ok(Json(service.edit(id, &request.edits).await?))
}

/// `POST /sessions/{id}/reset`
pub async fn reset_session(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FieldsView>, AppError> {
    Ok(Json(service.reset(session_id(&id)?).await?))
}

/// `POST /sessions/{id}/finalize`
///
/// The JSON body with last-minute edits is optional; an empty body
/// finalizes the current fields.
pub async fn finalize_session(
    State(service): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let id = session_id(&id)?;
    let request = edit_request(&body)?;
    let image = service.finalize(id, Some(&request.edits)).await?;
    Ok(attachment(image))
}

/// `GET /sessions/{id}/download`
pub async fn download(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    Ok(attachment(service.download(session_id(&id)?).await?))
}

/// Parse the `{id}` path segment so a malformed id gets the JSON error body.
fn session_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|e| AppError::bad_request(format!("invalid session id {raw:?}: {e}")))
}

/// Parse an edit body whatever its content type. Blank means no edits.
fn edit_request(body: &[u8]) -> Result<EditRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(EditRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("invalid JSON body: {e}")))
}

fn attachment(image: FinalizedImage) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", image.filename);
    (
        [
            (header::CONTENT_TYPE, image.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        image.bytes,
    )
        .into_response()
}
