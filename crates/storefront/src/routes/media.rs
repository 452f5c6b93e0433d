//! Staff media uploads.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use bytes::Bytes;
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::RequireStaff;
use crate::state::AppState;
use crate::storage::SavedObject;

/// `POST /staff/media`
///
/// Multipart form with a `file` part and an optional `name` part overriding
/// the stored name. The file lands in S3 when it is reachable and on local
/// disk otherwise; the response says which.
#[instrument(skip(state, multipart))]
pub async fn upload(
    _staff: RequireStaff,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SavedObject>), AppError> {
    let mut name = None;
    let mut file: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                name = Some(text);
            }
            Some("file") => {
                let file_name = field.file_name().map(ToString::to_string);
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file = Some((file_name, body));
            }
            _ => {}
        }
    }

    let (file_name, body) =
        file.ok_or_else(|| AppError::BadRequest("missing file part".to_string()))?;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .or(file_name)
        .ok_or_else(|| AppError::BadRequest("missing file name".to_string()))?;

    let saved = state.media().save(&name, body).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}
