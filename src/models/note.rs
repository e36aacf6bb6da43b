use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request to create a note
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct CreateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Request to update a note's title and/or content
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Request to share a note with another subject
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ShareNoteRequest {
    /// Subject id of the invitee
    pub subject: String,
    /// "viewer" or "editor"; anything that is not "editor" shares as viewer
    pub role: String,
}

/// A single access-list entry of a note
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareEntry {
    pub subject: String,
    pub role: String,
    pub invited_at: DateTime<Utc>,
}

/// A note with its access list
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub owner: String,
    pub shared_with: Vec<ShareEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry; content and access list are only returned on single-note fetch
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub id: Uuid,
    pub title: String,
    pub owner: String,
    pub updated_at: DateTime<Utc>,
}

/// Notes visible to the caller, split by ownership
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct NoteListResponse {
    pub owned: Vec<NoteSummary>,
    pub shared: Vec<NoteSummary>,
}

/// Response for note deletion
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct DeleteNoteResponse {
    pub success: bool,
}

/// Response for a share upsert
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ShareNoteResponse {
    pub success: bool,
}
