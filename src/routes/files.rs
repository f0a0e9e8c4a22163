use std::time::Duration;

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use diesel::dsl::exists;
use diesel::{prelude::*, select};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{events::load_active_event, to_iso};
use crate::access::{self, EventRole};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::extract;
use crate::models::{EventFile, NewEventFile};
use crate::schema::{categories, event_files};
use crate::state::AppState;

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;

#[derive(Serialize)]
pub struct FileResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub category: String,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: String,
}

impl From<EventFile> for FileResponse {
    fn from(file: EventFile) -> Self {
        Self {
            id: file.id,
            event_id: file.event_id,
            file_name: file.file_name,
            file_path: file.file_path,
            file_size: file.file_size,
            file_type: file.file_type,
            category: file.category,
            uploaded_by: file.uploaded_by,
            uploaded_at: to_iso(file.uploaded_at),
        }
    }
}

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileResponse>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub file: FileResponse,
    #[serde(rename = "signedUrl")]
    pub signed_url: String,
}

#[derive(Deserialize)]
pub struct DeleteFileRequest {
    #[serde(rename = "fileId")]
    pub file_id: Uuid,
}

#[derive(Serialize)]
pub struct DeleteFileResponse {
    pub message: String,
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<FileListResponse>> {
    let mut conn = state.db()?;
    access::require_member(&mut conn, user.user_id, event_id)?;
    load_active_event(&mut conn, event_id)?;

    let files: Vec<EventFile> = event_files::table
        .filter(event_files::event_id.eq(event_id))
        .order(event_files::uploaded_at.desc())
        .load(&mut conn)?;

    Ok(Json(FileListResponse {
        files: files.into_iter().map(FileResponse::from).collect(),
    }))
}

pub async fn upload_file(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    {
        let mut conn = state.db()?;
        access::require_at_least(&mut conn, user.user_id, event_id, EventRole::Manager)?;
        load_active_event(&mut conn, event_id)?;
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut file_type: Option<String> = None;
    let mut category: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|n| n.to_string());
                file_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("category") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid category field: {err}"))
                })?;
                if !value.trim().is_empty() {
                    category = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    // All validation happens before any storage side effect.
    let file_bytes = file_bytes.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    if file_bytes.is_empty() {
        return Err(AppError::bad_request("file must not be empty"));
    }
    let file_name = file_name.ok_or_else(|| AppError::bad_request("filename is required"))?;
    let category = category.ok_or_else(|| AppError::bad_request("Category is required"))?;
    let file_type = file_type.unwrap_or_default();

    if !extract::is_allowed_media_type(&file_type) {
        return Err(AppError::bad_request(
            "File type not supported. Please upload a PDF or TXT file.",
        ));
    }

    {
        let mut conn = state.db()?;
        let known: bool = select(exists(
            categories::table.filter(categories::name.eq(&category)),
        ))
        .get_result(&mut conn)?;
        if !known {
            return Err(AppError::bad_request(format!(
                "unknown category '{category}'"
            )));
        }
    }

    let file_id = Uuid::new_v4();
    let file_path = format!("events/{event_id}/{file_id}/{file_name}");
    let file_size = file_bytes.len() as i64;

    // Synchronous extraction at upload time; the cached text is what chat and
    // timeline generation read later. A failed extraction leaves the cache
    // empty and the corpus loader retries live.
    let extraction_type = file_type.clone();
    let extraction_bytes = file_bytes.clone();
    let extracted_text =
        match task::spawn_blocking(move || extract::extract_text(&extraction_type, &extraction_bytes))
            .await
        {
            Ok(text) => text,
            Err(join_err) => {
                warn!(file_name = %file_name, error = %join_err, "extraction task panicked");
                None
            }
        };

    if extracted_text.is_none() {
        warn!(file_name = %file_name, "no text extracted from uploaded document");
    }

    state
        .storage
        .put_object(&file_path, file_bytes, &file_type)
        .await
        .map_err(|err| {
            error!(error = %err, key = %file_path, "failed to store uploaded file");
            AppError::internal("Failed to upload file to storage")
        })?;

    let new_file = NewEventFile {
        id: file_id,
        event_id,
        file_name: file_name.clone(),
        file_path: file_path.clone(),
        file_size,
        file_type,
        category,
        uploaded_by: Some(user.user_id),
        extracted_text,
    };

    let inserted: Result<EventFile, diesel::result::Error> = {
        let mut conn = state.db()?;
        diesel::insert_into(event_files::table)
            .values(&new_file)
            .execute(&mut conn)
            .and_then(|_| event_files::table.find(file_id).first(&mut conn))
    };

    let file = match inserted {
        Ok(file) => file,
        Err(err) => {
            // Compensating action, not a transaction: remove the blob so the
            // failed upload leaves no orphan. A crash before this line still
            // can (accepted residue).
            error!(error = %err, file_id = %file_id, "failed to save file metadata");
            if let Err(cleanup_err) = state.storage.delete_object(&file_path).await {
                warn!(
                    error = %cleanup_err,
                    key = %file_path,
                    "failed to clean up blob after metadata failure; orphan left behind"
                );
            }
            return Err(AppError::internal("Failed to save file metadata"));
        }
    };

    let signed_url = state
        .storage
        .presign_get_object(&file_path, Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS))
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    info!(
        file_id = %file.id,
        event_id = %event_id,
        file_name = %file.file_name,
        "file uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            file: FileResponse::from(file),
            signed_url,
        }),
    ))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<DeleteFileRequest>,
) -> AppResult<Json<DeleteFileResponse>> {
    let file: EventFile = {
        let mut conn = state.db()?;
        access::require_at_least(&mut conn, user.user_id, event_id, EventRole::Manager)?;
        load_active_event(&mut conn, event_id)?;

        let file: Option<EventFile> = event_files::table
            .find(payload.file_id)
            .filter(event_files::event_id.eq(event_id))
            .first(&mut conn)
            .optional()?;
        let file = file.ok_or_else(|| AppError::not_found_with("File not found"))?;

        diesel::delete(event_files::table.find(file.id)).execute(&mut conn)?;
        file
    };

    // Metadata row first, then the blob; a failed blob delete leaves an
    // orphaned object with no referencing row, which is the accepted residue.
    if let Err(err) = state.storage.delete_object(&file.file_path).await {
        warn!(
            error = %err,
            key = %file.file_path,
            "failed to delete blob for removed file; orphan left behind"
        );
    }

    info!(file_id = %file.id, event_id = %event_id, "file deleted");

    Ok(Json(DeleteFileResponse {
        message: "File deleted successfully".to_string(),
    }))
}
