use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::ServerMessage;
use crate::services::access::NoteAccess;
use crate::ws::presence::PresenceRegistry;

/// An event fanned out over one note's room channel. Every subscriber sees
/// it; each connection's forwarder drops it when the sender is itself and
/// `include_sender` is false.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub sender: Uuid,
    pub include_sender: bool,
    pub message: ServerMessage,
}

/// Shared application state handed to every handler.
pub struct AppState {
    pub presence: PresenceRegistry,
    pub access: Arc<dyn NoteAccess>,
    rooms: RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>,
}

impl AppState {
    pub fn new(access: Arc<dyn NoteAccess>) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            access,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily create the broadcast channel for a note's room.
    pub async fn room_sender(&self, note_id: &str) -> broadcast::Sender<RoomEvent> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(note_id.to_string())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel::<RoomEvent>(100);
                tx
            })
            .clone()
    }

    /// Fan an event out to the room. A room nobody subscribed to is silently
    /// skipped; so is a send into a channel whose receivers are all gone.
    pub async fn broadcast(&self, note_id: &str, event: RoomEvent) {
        let sender = {
            let rooms = self.rooms.read().await;
            rooms.get(note_id).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    /// Broadcast channels currently allocated (never reclaimed; see diagnostics).
    pub async fn channel_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
