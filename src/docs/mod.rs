use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Create a new note
#[utoipa::path(
    post,
    path = "/api/v1/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created successfully", body = NoteResponse),
        (status = 401, description = "Missing or invalid credentials", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn create_note_doc() {}

/// List notes owned by or shared with the caller
#[utoipa::path(
    get,
    path = "/api/v1/notes",
    responses(
        (status = 200, description = "Notes visible to the caller", body = NoteListResponse)
    )
)]
#[allow(dead_code)]
pub async fn list_notes_doc() {}

/// Fetch one note with its access list
#[utoipa::path(
    get,
    path = "/api/v1/notes/{id}",
    params(("id" = String, Path, description = "Note id")),
    responses(
        (status = 200, description = "The note", body = NoteResponse),
        (status = 403, description = "Caller has no access", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_note_doc() {}

/// Update a note's title and/or content
#[utoipa::path(
    patch,
    path = "/api/v1/notes/{id}",
    params(("id" = String, Path, description = "Note id")),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "The updated note", body = NoteResponse),
        (status = 403, description = "Caller may not edit", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn update_note_doc() {}

/// Soft-delete a note
#[utoipa::path(
    delete,
    path = "/api/v1/notes/{id}",
    params(("id" = String, Path, description = "Note id")),
    responses(
        (status = 200, description = "Note deleted", body = DeleteNoteResponse),
        (status = 403, description = "Only the owner may delete", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn delete_note_doc() {}

/// Share a note with another subject
#[utoipa::path(
    post,
    path = "/api/v1/notes/{id}/share",
    params(("id" = String, Path, description = "Note id")),
    request_body = ShareNoteRequest,
    responses(
        (status = 200, description = "Share recorded", body = ShareNoteResponse),
        (status = 400, description = "Self-share rejected", body = ErrorResponse),
        (status = 403, description = "Only the owner may share", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn share_note_doc() {}

/// Collaboration and host statistics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Runtime statistics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        create_note_doc,
        list_notes_doc,
        get_note_doc,
        update_note_doc,
        delete_note_doc,
        share_note_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            CreateNoteRequest,
            UpdateNoteRequest,
            ShareNoteRequest,
            ShareEntry,
            NoteResponse,
            NoteSummary,
            NoteListResponse,
            DeleteNoteResponse,
            ShareNoteResponse,
            DiagnosticsResponse,
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
