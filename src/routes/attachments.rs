use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{Ability, Principal};
use crate::error::{AppResult, EngineError};
use crate::models::{Application, Attachment};
use crate::state::AppState;

/// Wire shape of an attachment. Assembled from the model by hand so key
/// material and tenant ids cannot leak into a payload by accident.
#[derive(Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub record_id: Uuid,
    pub data_file_name: String,
    pub data_content_type: String,
    pub data_file_size: i64,
    pub checksum: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
}

impl From<Attachment> for AttachmentResponse {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            record_id: attachment.record_id,
            data_file_name: attachment.data_file_name,
            data_content_type: attachment.data_content_type,
            data_file_size: attachment.data_file_size,
            checksum: attachment.checksum,
            user: attachment.user_email,
            created_at: attachment.created_at,
        }
    }
}

pub async fn upload(
    State(state): State<AppState>,
    Path((company_key, application_key, record_id, file_name, token)): Path<(
        String,
        String,
        Uuid,
        String,
        String,
    )>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<AttachmentResponse>)> {
    let (application, principal) = authorize_call(
        &state,
        &company_key,
        &application_key,
        &token,
        &[Ability::ApiAttachment, Ability::Upload],
    )?;
    ensure_record_in_scope(&state, &application, record_id)?;

    let content_type = mime_guess::from_path(&file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let attachment = state
        .attachments
        .upload(record_id, &file_name, &content_type, body.to_vec(), &principal)
        .await
        .map_err(|err| {
            match &err {
                EngineError::UnsupportedType(mime) => {
                    info!(record_id = %record_id, mime = %mime, "upload rejected");
                }
                other => error!(record_id = %record_id, error = %other, "upload failed"),
            }
            err
        })?;

    Ok((StatusCode::CREATED, Json(attachment.into())))
}

pub async fn list(
    State(state): State<AppState>,
    Path((company_key, application_key, record_id, token)): Path<(String, String, Uuid, String)>,
) -> AppResult<Json<Vec<AttachmentResponse>>> {
    let (application, _principal) = authorize_call(
        &state,
        &company_key,
        &application_key,
        &token,
        &[Ability::ApiAttachment, Ability::Download],
    )?;
    ensure_record_in_scope(&state, &application, record_id)?;

    let attachments = state.attachments.list(record_id)?;
    Ok(Json(attachments.into_iter().map(Into::into).collect()))
}

pub async fn download(
    State(state): State<AppState>,
    Path((company_key, application_key, record_id, attachment_id, token)): Path<(
        String,
        String,
        Uuid,
        Uuid,
        String,
    )>,
) -> AppResult<Response> {
    let (application, _principal) = authorize_call(
        &state,
        &company_key,
        &application_key,
        &token,
        &[Ability::ApiAttachment, Ability::Download],
    )?;
    ensure_record_in_scope(&state, &application, record_id)?;

    let (attachment, bytes) = state.attachments.download(record_id, attachment_id).await?;
    let disposition = attachment_content_disposition(&attachment.data_file_name);

    Ok((
        [
            (header::CONTENT_TYPE, attachment.data_content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn download_as_zip(
    State(state): State<AppState>,
    Path((company_key, application_key, record_id, token)): Path<(String, String, Uuid, String)>,
) -> AppResult<Response> {
    let (application, _principal) = authorize_call(
        &state,
        &company_key,
        &application_key,
        &token,
        &[Ability::ApiAttachment, Ability::Download],
    )?;
    ensure_record_in_scope(&state, &application, record_id)?;

    let archive = state.attachments.download_zip(record_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_content_disposition("attachments.zip"),
            ),
        ],
        archive,
    )
        .into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Path((company_key, application_key, record_id, attachment_id, token)): Path<(
        String,
        String,
        Uuid,
        Uuid,
        String,
    )>,
) -> AppResult<Json<serde_json::Value>> {
    let (application, _principal) = authorize_call(
        &state,
        &company_key,
        &application_key,
        &token,
        &[Ability::ApiAttachment, Ability::DeleteAttachments],
    )?;
    ensure_record_in_scope(&state, &application, record_id)?;

    state.attachments.delete(record_id, attachment_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Resolves the tenant scope and runs every required ability through the
/// gateway. Unknown company/application keys read as a missing record so
/// the path never reveals which segment was wrong.
fn authorize_call(
    state: &AppState,
    company_key: &str,
    application_key: &str,
    token: &str,
    abilities: &[Ability],
) -> Result<(Application, Principal), EngineError> {
    let company = state
        .directory
        .company_by_key(company_key)
        .ok_or(EngineError::RecordNotFound)?;
    let application = state
        .directory
        .application_by_key(company.id, application_key)
        .ok_or(EngineError::RecordNotFound)?;
    let principal = state.gateway.authenticate(token)?;
    state.gateway.require(&principal, &application, abilities)?;
    Ok((application, principal))
}

fn ensure_record_in_scope(
    state: &AppState,
    application: &Application,
    record_id: Uuid,
) -> Result<(), EngineError> {
    let record = state.records.get(record_id)?;
    if record.application_id != application.id {
        return Err(EngineError::RecordNotFound);
    }
    Ok(())
}

fn attachment_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}
