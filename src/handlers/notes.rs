use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::notedb::{self, NoteDb, NoteRecord, NoteRow};
use crate::models::{
    error_reply, CreateNoteRequest, DeleteNoteResponse, ErrorResponse, NoteListResponse,
    NoteResponse, NoteSummary, ShareEntry, ShareNoteRequest, ShareNoteResponse, UpdateNoteRequest,
};
use crate::routes::auth_middleware::AuthSubject;
use crate::services::access::Role;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn db() -> Result<Arc<NoteDb>, HandlerError> {
    notedb::get_db().ok_or_else(|| {
        error!("Database not initialized");
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Database not initialized")
    })
}

fn parse_note_id(id: &str) -> Result<Uuid, HandlerError> {
    Uuid::parse_str(id).map_err(|e| {
        error!("Invalid note id '{}': {}", id, e);
        error_reply(StatusCode::BAD_REQUEST, format!("Invalid note id '{}'", id))
    })
}

fn storage_error(e: sqlx::Error) -> HandlerError {
    error!("Database error: {}", e);
    error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

fn to_response(record: NoteRecord) -> NoteResponse {
    NoteResponse {
        id: record.note.id,
        title: record.note.title,
        content: record.note.content,
        owner: record.note.owner,
        shared_with: record
            .shares
            .into_iter()
            .map(|s| ShareEntry {
                subject: s.subject,
                role: s.role,
                invited_at: s.invited_at,
            })
            .collect(),
        created_at: record.note.created_at,
        updated_at: record.note.updated_at,
    }
}

fn to_summary(row: NoteRow) -> NoteSummary {
    NoteSummary {
        id: row.id,
        title: row.title,
        owner: row.owner,
        updated_at: row.updated_at,
    }
}

/// Create a note owned by the caller
pub async fn create_note(
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Json(payload): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<NoteResponse>), HandlerError> {
    let db = db()?;

    let note = db
        .create_note(&subject, payload.title.as_deref(), payload.content.as_deref())
        .await
        .map_err(storage_error)?;

    info!("Note '{}' created by {}", note.id, subject);
    Ok((
        StatusCode::CREATED,
        Json(to_response(NoteRecord { note, shares: Vec::new() })),
    ))
}

/// List the caller's notes, owned and shared separately
pub async fn list_notes(
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
) -> Result<(StatusCode, Json<NoteListResponse>), HandlerError> {
    let db = db()?;

    let owned = db.list_owned(&subject).await.map_err(storage_error)?;
    let shared = db.list_shared(&subject).await.map_err(storage_error)?;

    Ok((
        StatusCode::OK,
        Json(NoteListResponse {
            owned: owned.into_iter().map(to_summary).collect(),
            shared: shared.into_iter().map(to_summary).collect(),
        }),
    ))
}

/// Fetch one note; the caller must be the owner or on the access list
pub async fn get_note(
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<NoteResponse>), HandlerError> {
    let note_id = parse_note_id(&id)?;
    let db = db()?;

    let record = db
        .load_note(note_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "not found"))?;

    let is_owner = record.note.owner == subject;
    let is_shared = record.shares.iter().any(|s| s.subject == subject);
    if !is_owner && !is_shared {
        return Err(error_reply(StatusCode::FORBIDDEN, "forbidden"));
    }

    Ok((StatusCode::OK, Json(to_response(record))))
}

/// Patch title and/or content; owner or editor only
pub async fn update_note(
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateNoteRequest>,
) -> Result<(StatusCode, Json<NoteResponse>), HandlerError> {
    let note_id = parse_note_id(&id)?;
    let db = db()?;

    let access = db
        .access_for(note_id, &subject)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "not found"))?;

    let can_edit =
        access.owner == subject || access.role.as_deref().and_then(Role::from_str) == Some(Role::Editor);
    if !can_edit {
        return Err(error_reply(StatusCode::FORBIDDEN, "forbidden"));
    }

    db.update_note(note_id, payload.title.as_deref(), payload.content.as_deref())
        .await
        .map_err(storage_error)?
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "not found"))?;

    // Reload with the access list for the response body
    let record = db
        .load_note(note_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "not found"))?;

    Ok((StatusCode::OK, Json(to_response(record))))
}

/// Soft-delete a note; owner only
pub async fn delete_note(
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<DeleteNoteResponse>), HandlerError> {
    let note_id = parse_note_id(&id)?;
    let db = db()?;

    let access = db
        .access_for(note_id, &subject)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "not found"))?;

    if access.owner != subject {
        return Err(error_reply(StatusCode::FORBIDDEN, "forbidden"));
    }

    db.soft_delete(note_id).await.map_err(storage_error)?;

    info!("Note '{}' marked as deleted by {}", note_id, subject);
    Ok((StatusCode::OK, Json(DeleteNoteResponse { success: true })))
}

/// Share a note with another subject; owner only, upsert semantics
pub async fn share_note(
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<String>,
    Json(payload): Json<ShareNoteRequest>,
) -> Result<(StatusCode, Json<ShareNoteResponse>), HandlerError> {
    let note_id = parse_note_id(&id)?;
    let db = db()?;

    let access = db
        .access_for(note_id, &subject)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "not found"))?;

    if access.owner != subject {
        return Err(error_reply(StatusCode::FORBIDDEN, "forbidden"));
    }

    // The owner already holds editor rights and never sits on its own
    // access list.
    if payload.subject == subject {
        return Err(error_reply(
            StatusCode::BAD_REQUEST,
            "cannot share a note with its owner",
        ));
    }

    // Anything that is not explicitly "editor" shares as viewer
    let role = if payload.role == "editor" { Role::Editor } else { Role::Viewer };

    db.upsert_share(note_id, &payload.subject, role.as_str())
        .await
        .map_err(storage_error)?;

    info!(
        "Note '{}' shared with {} as {} by {}",
        note_id,
        payload.subject,
        role.as_str(),
        subject
    );
    Ok((StatusCode::OK, Json(ShareNoteResponse { success: true })))
}
