use std::future::Future;
use std::pin::Pin;

use tracing::error;
use uuid::Uuid;

use crate::db::notedb;

/// Boxed future the oracle methods return; implementations move owned copies
/// of their arguments into it.
pub type AccessFuture<T> = Pin<Box<dyn Future<Output = Result<T, AccessError>> + Send>>;

/// Share role on a note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Viewer,
    Editor,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "editor" => Some(Self::Editor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
        }
    }
}

/// What one subject may do with one note. The owner implicitly holds editor
/// rights and never appears in the access list itself.
#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub is_owner: bool,
    pub role: Option<Role>,
}

impl AccessDecision {
    pub fn can_view(&self) -> bool {
        self.is_owner || self.role.is_some()
    }

    pub fn can_edit(&self) -> bool {
        self.is_owner || self.role == Some(Role::Editor)
    }
}

#[derive(Debug)]
pub enum AccessError {
    /// Note does not exist or is soft-deleted
    NotFound,
    Storage(String),
}

impl std::fmt::Display for AccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessError::NotFound => write!(f, "note not found"),
            AccessError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for AccessError {}

/// The session manager's view of document authority: role lookup, content
/// snapshot and last-write-wins persistence. Consumed as a trait object so
/// tests can substitute an in-memory store.
pub trait NoteAccess: Send + Sync {
    fn get_access(&self, note_id: &str, subject: &str) -> AccessFuture<AccessDecision>;

    fn get_snapshot(&self, note_id: &str) -> AccessFuture<String>;

    /// Best-effort persistence; callers broadcast first and never await this
    /// on the hot path.
    fn apply_edit(&self, note_id: &str, content: &str) -> AccessFuture<()>;
}

/// Production oracle backed by the notes database
pub struct DbNoteAccess;

fn parse_note_id(note_id: &str) -> Result<Uuid, AccessError> {
    // An id that cannot be a note id is indistinguishable from a missing note
    Uuid::parse_str(note_id).map_err(|_| AccessError::NotFound)
}

fn db_handle() -> Result<std::sync::Arc<notedb::NoteDb>, AccessError> {
    notedb::get_db().ok_or_else(|| {
        error!("Database not initialized");
        AccessError::Storage("Database not initialized".to_string())
    })
}

impl NoteAccess for DbNoteAccess {
    fn get_access(&self, note_id: &str, subject: &str) -> AccessFuture<AccessDecision> {
        let note_id = note_id.to_string();
        let subject = subject.to_string();
        Box::pin(async move {
            let note_uuid = parse_note_id(&note_id)?;
            let db = db_handle()?;
            let row = db
                .access_for(note_uuid, &subject)
                .await
                .map_err(|e| {
                    error!("Access lookup failed for note '{}': {}", note_id, e);
                    AccessError::Storage(e.to_string())
                })?
                .ok_or(AccessError::NotFound)?;

            Ok(AccessDecision {
                is_owner: row.owner == subject,
                role: row.role.as_deref().and_then(Role::from_str),
            })
        })
    }

    fn get_snapshot(&self, note_id: &str) -> AccessFuture<String> {
        let note_id = note_id.to_string();
        Box::pin(async move {
            let note_uuid = parse_note_id(&note_id)?;
            let db = db_handle()?;
            db.load_content(note_uuid)
                .await
                .map_err(|e| {
                    error!("Snapshot load failed for note '{}': {}", note_id, e);
                    AccessError::Storage(e.to_string())
                })?
                .ok_or(AccessError::NotFound)
        })
    }

    fn apply_edit(&self, note_id: &str, content: &str) -> AccessFuture<()> {
        let note_id = note_id.to_string();
        let content = content.to_string();
        Box::pin(async move {
            let note_uuid = parse_note_id(&note_id)?;
            let db = db_handle()?;
            let affected = db.replace_content(note_uuid, &content).await.map_err(|e| {
                error!("Persisting content for note '{}' failed: {}", note_id, e);
                AccessError::Storage(e.to_string())
            })?;
            if affected == 0 {
                return Err(AccessError::NotFound);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_can_view_and_edit() {
        let decision = AccessDecision { is_owner: true, role: None };
        assert!(decision.can_view());
        assert!(decision.can_edit());
    }

    #[test]
    fn viewer_can_view_but_not_edit() {
        let decision = AccessDecision { is_owner: false, role: Some(Role::Viewer) };
        assert!(decision.can_view());
        assert!(!decision.can_edit());
    }

    #[test]
    fn editor_can_edit() {
        let decision = AccessDecision { is_owner: false, role: Some(Role::Editor) };
        assert!(decision.can_view());
        assert!(decision.can_edit());
    }

    #[test]
    fn stranger_has_no_access() {
        let decision = AccessDecision { is_owner: false, role: None };
        assert!(!decision.can_view());
        assert!(!decision.can_edit());
    }
}
