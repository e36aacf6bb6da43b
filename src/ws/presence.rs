use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Collaborator;

/// Per-note registry of active connections. This is the only mutable state
/// shared between concurrently running event handlers; every operation takes
/// the lock once, so per-note updates are atomic. Rooms exist exactly as long
/// as they have members; an empty room is an absent entry.
#[derive(Default)]
pub struct PresenceRegistry {
    rooms: RwLock<HashMap<String, HashMap<Uuid, String>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a membership. Re-joining replaces the existing entry for the
    /// same (note, connection) pair rather than erroring.
    pub async fn join(&self, note_id: &str, conn_id: Uuid, subject: &str) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(note_id.to_string())
            .or_default()
            .insert(conn_id, subject.to_string());
    }

    /// Remove a membership; no-op when the connection is not in the room.
    pub async fn leave(&self, note_id: &str, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(note_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(note_id);
            }
        }
    }

    /// Whether the connection currently belongs to the note's room.
    pub async fn is_member(&self, note_id: &str, conn_id: Uuid) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(note_id)
            .map(|members| members.contains_key(&conn_id))
            .unwrap_or(false)
    }

    /// Subjects currently in the room, for presence broadcasts. Iteration
    /// order carries no meaning.
    pub async fn snapshot(&self, note_id: &str) -> Vec<Collaborator> {
        let rooms = self.rooms.read().await;
        rooms
            .get(note_id)
            .map(|members| {
                members
                    .values()
                    .map(|subject| Collaborator { user_id: subject.clone() })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove the connection from every room it is part of; returns the note
    /// ids whose presence must be rebroadcast.
    pub async fn leave_all(&self, conn_id: Uuid) -> Vec<String> {
        let mut rooms = self.rooms.write().await;
        let mut affected = Vec::new();
        rooms.retain(|note_id, members| {
            if members.remove(&conn_id).is_some() {
                affected.push(note_id.clone());
            }
            !members.is_empty()
        });
        affected
    }

    /// Rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Memberships across all rooms.
    pub async fn member_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.values().map(|members| members.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Uuid {
        Uuid::new_v4()
    }

    #[tokio::test]
    async fn join_is_idempotent_by_replacement() {
        let registry = PresenceRegistry::new();
        let c = conn();

        registry.join("n1", c, "alice").await;
        registry.join("n1", c, "alice").await;

        let active = registry.snapshot("n1").await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, "alice");
    }

    #[tokio::test]
    async fn membership_reflects_last_join_or_leave() {
        let registry = PresenceRegistry::new();
        let c = conn();

        registry.join("n1", c, "alice").await;
        registry.leave("n1", c).await;
        registry.join("n1", c, "alice").await;
        assert!(registry.is_member("n1", c).await);

        registry.leave("n1", c).await;
        assert!(!registry.is_member("n1", c).await);
    }

    #[tokio::test]
    async fn leave_of_absent_entry_is_a_noop() {
        let registry = PresenceRegistry::new();
        registry.leave("n1", conn()).await;
        assert!(registry.snapshot("n1").await.is_empty());
    }

    #[tokio::test]
    async fn empty_room_is_indistinguishable_from_absent_room() {
        let registry = PresenceRegistry::new();
        let c = conn();

        registry.join("n1", c, "alice").await;
        registry.leave("n1", c).await;

        assert!(registry.snapshot("n1").await.is_empty());
        // room dropped with its last member
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn leave_all_reports_every_affected_room() {
        let registry = PresenceRegistry::new();
        let c = conn();
        let other = conn();

        registry.join("n1", c, "alice").await;
        registry.join("n2", c, "alice").await;
        registry.join("n2", other, "bob").await;

        let mut affected = registry.leave_all(c).await;
        affected.sort();
        assert_eq!(affected, vec!["n1".to_string(), "n2".to_string()]);

        assert!(!registry.is_member("n1", c).await);
        assert!(!registry.is_member("n2", c).await);
        assert!(registry.is_member("n2", other).await);
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn snapshot_lists_each_connection_entry() {
        let registry = PresenceRegistry::new();
        registry.join("n1", conn(), "alice").await;
        registry.join("n1", conn(), "bob").await;

        let mut subjects: Vec<String> = registry
            .snapshot("n1")
            .await
            .into_iter()
            .map(|c| c.user_id)
            .collect();
        subjects.sort();
        assert_eq!(subjects, vec!["alice".to_string(), "bob".to_string()]);
    }
}
