use std::collections::HashMap;
use std::sync::Arc;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::{
    ClientMessage, CollaboratorsMessage, CursorBroadcastMessage, InitContentMessage,
    RemoteOpMessage, ServerMessage,
};
use crate::services::access::AccessError;
use crate::state::{AppState, RoomEvent};

/// Per-connection collaboration state machine. The subject is bound once at
/// handshake time and never changes; rooms are joined and left through the
/// events below, and `finish` tears everything down on disconnect.
pub struct CollabSession {
    state: Arc<AppState>,
    conn_id: Uuid,
    subject: String,
    out: mpsc::UnboundedSender<ServerMessage>,
    /// One forwarding task per joined room, relaying room events to `out`
    room_tasks: HashMap<String, JoinHandle<()>>,
}

impl CollabSession {
    pub fn new(
        state: Arc<AppState>,
        conn_id: Uuid,
        subject: String,
        out: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            state,
            conn_id,
            subject,
            out,
            room_tasks: HashMap::new(),
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Dispatch one client event. Events from the same connection are handled
    /// strictly in arrival order by the caller's read loop.
    pub async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinNote(m) => self.handle_join(m.note_id).await,
            ClientMessage::LeaveNote(m) => self.handle_leave(m.note_id).await,
            ClientMessage::Op(m) => self.handle_op(m.note_id, m.content).await,
            ClientMessage::CursorUpdate(m) => self.handle_cursor(m.note_id, m.cursor).await,
        }
    }

    /// Emit an event to this connection only.
    pub fn send(&self, msg: ServerMessage) {
        let _ = self.out.send(msg);
    }

    async fn handle_join(&mut self, note_id: String) {
        let access = match self.state.access.get_access(&note_id, &self.subject).await {
            Ok(access) => access,
            Err(AccessError::NotFound) => {
                self.send(ServerMessage::error("note not found"));
                return;
            }
            Err(e) => {
                error!("Join of note '{}' by {} failed: {}", note_id, self.subject, e);
                self.send(ServerMessage::error("join failed"));
                return;
            }
        };

        if !access.can_view() {
            self.send(ServerMessage::error("no access"));
            return;
        }

        let content = match self.state.access.get_snapshot(&note_id).await {
            Ok(content) => content,
            Err(AccessError::NotFound) => {
                self.send(ServerMessage::error("note not found"));
                return;
            }
            Err(e) => {
                error!("Snapshot of note '{}' failed: {}", note_id, e);
                self.send(ServerMessage::error("join failed"));
                return;
            }
        };

        // Subscribe before the presence broadcast so the joining connection
        // receives the collaborators event as well.
        let rx = self.state.room_sender(&note_id).await.subscribe();
        self.spawn_room_forwarder(note_id.clone(), rx);

        self.state
            .presence
            .join(&note_id, self.conn_id, &self.subject)
            .await;

        // Snapshot goes to the requester only, presence to the whole room.
        self.send(ServerMessage::InitContent(InitContentMessage { content }));

        let active = self.state.presence.snapshot(&note_id).await;
        self.state
            .broadcast(
                &note_id,
                RoomEvent {
                    sender: self.conn_id,
                    include_sender: true,
                    message: ServerMessage::Collaborators(CollaboratorsMessage { active }),
                },
            )
            .await;
    }

    async fn handle_leave(&mut self, note_id: String) {
        if let Some(task) = self.room_tasks.remove(&note_id) {
            task.abort();
        }
        self.state.presence.leave(&note_id, self.conn_id).await;
        self.rebroadcast_presence(&note_id).await;
    }

    async fn handle_op(&mut self, note_id: String, content: String) {
        // Access is re-validated on every op; rights may have been revoked
        // since join.
        let access = match self.state.access.get_access(&note_id, &self.subject).await {
            Ok(access) => access,
            Err(AccessError::NotFound) => {
                self.send(ServerMessage::error("note not found"));
                return;
            }
            Err(e) => {
                error!("Op on note '{}' by {} failed: {}", note_id, self.subject, e);
                self.send(ServerMessage::error("edit failed"));
                return;
            }
        };

        if !access.can_edit() {
            self.send(ServerMessage::error("no edit permission"));
            return;
        }

        self.state
            .broadcast(
                &note_id,
                RoomEvent {
                    sender: self.conn_id,
                    include_sender: false,
                    message: ServerMessage::RemoteOp(RemoteOpMessage {
                        user_id: self.subject.clone(),
                        content: content.clone(),
                    }),
                },
            )
            .await;

        // Persistence is detached from the broadcast path: a failed write is
        // logged and never undoes the events already fanned out.
        let oracle = self.state.access.clone();
        tokio::spawn(async move {
            if let Err(e) = oracle.apply_edit(&note_id, &content).await {
                error!("Failed to persist content for note '{}': {}", note_id, e);
            }
        });
    }

    async fn handle_cursor(&mut self, note_id: String, cursor: Value) {
        // Cursor relays are membership-gated only and never persisted.
        if !self.state.presence.is_member(&note_id, self.conn_id).await {
            debug!(
                "Dropping cursor update for note '{}' from non-member connection {}",
                note_id, self.conn_id
            );
            return;
        }

        self.state
            .broadcast(
                &note_id,
                RoomEvent {
                    sender: self.conn_id,
                    include_sender: false,
                    message: ServerMessage::CursorBroadcast(CursorBroadcastMessage {
                        user_id: self.subject.clone(),
                        cursor,
                    }),
                },
            )
            .await;
    }

    /// Transport-initiated teardown. Always runs on disconnect, whether or
    /// not the client left its rooms explicitly.
    pub async fn finish(&mut self) {
        for (_, task) in self.room_tasks.drain() {
            task.abort();
        }

        let affected = self.state.presence.leave_all(self.conn_id).await;
        for note_id in affected {
            self.rebroadcast_presence(&note_id).await;
        }
    }

    async fn rebroadcast_presence(&self, note_id: &str) {
        let active = self.state.presence.snapshot(note_id).await;
        self.state
            .broadcast(
                note_id,
                RoomEvent {
                    // the leaver already unsubscribed, so the flag is moot
                    sender: self.conn_id,
                    include_sender: false,
                    message: ServerMessage::Collaborators(CollaboratorsMessage { active }),
                },
            )
            .await;
    }

    fn spawn_room_forwarder(&mut self, note_id: String, mut rx: broadcast::Receiver<RoomEvent>) {
        let out = self.out.clone();
        let conn_id = self.conn_id;
        let note_id_for_log = note_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !event.include_sender && event.sender == conn_id {
                            continue;
                        }
                        if out.send(event.message).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "Connection {} lagged {} room events on note '{}'",
                            conn_id, skipped, note_id_for_log
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // A re-join replaces the previous subscription.
        if let Some(old) = self.room_tasks.insert(note_id, handle) {
            old.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::access::{AccessDecision, AccessFuture, NoteAccess, Role};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct StoredNote {
        owner: String,
        content: String,
        shares: HashMap<String, Role>,
    }

    /// In-memory stand-in for the access oracle. Mutations through `notes`
    /// let tests revoke rights between a join and the next op.
    #[derive(Default)]
    struct MemoryNoteAccess {
        notes: Mutex<HashMap<String, StoredNote>>,
        edits: Mutex<Vec<(String, String)>>,
    }

    impl MemoryNoteAccess {
        fn with_note(note_id: &str, owner: &str, content: &str) -> Self {
            let store = Self::default();
            store.notes.lock().unwrap().insert(
                note_id.to_string(),
                StoredNote {
                    owner: owner.to_string(),
                    content: content.to_string(),
                    shares: HashMap::new(),
                },
            );
            store
        }

        fn share(&self, note_id: &str, subject: &str, role: Role) {
            let mut notes = self.notes.lock().unwrap();
            notes
                .get_mut(note_id)
                .unwrap()
                .shares
                .insert(subject.to_string(), role);
        }

        fn edits(&self) -> Vec<(String, String)> {
            self.edits.lock().unwrap().clone()
        }
    }

    impl NoteAccess for MemoryNoteAccess {
        fn get_access(&self, note_id: &str, subject: &str) -> AccessFuture<AccessDecision> {
            let notes = self.notes.lock().unwrap();
            let result = match notes.get(note_id) {
                Some(note) => Ok(AccessDecision {
                    is_owner: note.owner == subject,
                    role: note.shares.get(subject).copied(),
                }),
                None => Err(AccessError::NotFound),
            };
            Box::pin(async move { result })
        }

        fn get_snapshot(&self, note_id: &str) -> AccessFuture<String> {
            let notes = self.notes.lock().unwrap();
            let result = match notes.get(note_id) {
                Some(note) => Ok(note.content.clone()),
                None => Err(AccessError::NotFound),
            };
            Box::pin(async move { result })
        }

        fn apply_edit(&self, note_id: &str, content: &str) -> AccessFuture<()> {
            let result = {
                let mut notes = self.notes.lock().unwrap();
                match notes.get_mut(note_id) {
                    Some(note) => {
                        note.content = content.to_string();
                        self.edits
                            .lock()
                            .unwrap()
                            .push((note_id.to_string(), content.to_string()));
                        Ok(())
                    }
                    None => Err(AccessError::NotFound),
                }
            };
            Box::pin(async move { result })
        }
    }

    struct TestConn {
        session: CollabSession,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    fn connect(state: &Arc<AppState>, subject: &str) -> TestConn {
        let (tx, rx) = mpsc::unbounded_channel();
        TestConn {
            session: CollabSession::new(state.clone(), Uuid::new_v4(), subject.to_string(), tx),
            rx,
        }
    }

    fn make_state(store: Arc<MemoryNoteAccess>) -> Arc<AppState> {
        Arc::new(AppState::new(store))
    }

    async fn recv(conn: &mut TestConn) -> ServerMessage {
        timeout(Duration::from_secs(1), conn.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("outbound channel closed")
    }

    /// Let forwarder tasks deliver anything in flight, then discard it.
    async fn drain(conn: &mut TestConn) {
        sleep(Duration::from_millis(50)).await;
        while conn.rx.try_recv().is_ok() {}
    }

    async fn assert_silent(conn: &mut TestConn) {
        sleep(Duration::from_millis(50)).await;
        assert!(conn.rx.try_recv().is_err(), "expected no event");
    }

    fn join(note_id: &str) -> ClientMessage {
        ClientMessage::JoinNote(crate::models::JoinNoteMessage { note_id: note_id.to_string() })
    }

    fn op(note_id: &str, content: &str) -> ClientMessage {
        ClientMessage::Op(crate::models::OpMessage {
            note_id: note_id.to_string(),
            content: content.to_string(),
        })
    }

    #[tokio::test]
    async fn join_sends_snapshot_to_requester_and_presence_to_room() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", "hello"));
        let state = make_state(store);
        let mut a = connect(&state, "alice");

        a.session.handle(join("1")).await;

        match recv(&mut a).await {
            ServerMessage::InitContent(m) => assert_eq!(m.content, "hello"),
            other => panic!("expected init-content first, got {:?}", other),
        }
        // join presence broadcast includes the requester
        match recv(&mut a).await {
            ServerMessage::Collaborators(m) => {
                assert_eq!(m.active.len(), 1);
                assert_eq!(m.active[0].user_id, "alice");
            }
            other => panic!("expected collaborators, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn viewer_op_is_rejected_and_owner_op_reaches_viewer() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        store.share("1", "bob", Role::Viewer);
        let state = make_state(store.clone());

        let mut a = connect(&state, "alice");
        let mut b = connect(&state, "bob");
        a.session.handle(join("1")).await;
        b.session.handle(join("1")).await;
        drain(&mut a).await;
        drain(&mut b).await;

        // viewer edit: error to requester only, nothing broadcast or persisted
        b.session.handle(op("1", "evil")).await;
        match recv(&mut b).await {
            ServerMessage::Error(m) => assert_eq!(m.reason, "no edit permission"),
            other => panic!("expected error, got {:?}", other),
        }
        assert_silent(&mut a).await;
        assert!(store.edits().is_empty());
        assert_eq!(state.presence.snapshot("1").await.len(), 2);

        // owner edit: remote-op to the viewer, persisted via the oracle
        a.session.handle(op("1", "X")).await;
        match recv(&mut b).await {
            ServerMessage::RemoteOp(m) => {
                assert_eq!(m.user_id, "alice");
                assert_eq!(m.content, "X");
            }
            other => panic!("expected remote-op, got {:?}", other),
        }
        // sender is excluded from its own op broadcast
        assert_silent(&mut a).await;

        // persistence is detached; poll for it
        let mut persisted = false;
        for _ in 0..20 {
            if store.edits() == vec![("1".to_string(), "X".to_string())] {
                persisted = true;
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(persisted, "apply_edit was not invoked with (\"1\", \"X\")");
    }

    #[tokio::test]
    async fn revoked_editor_is_rejected_on_next_op() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        store.share("1", "bob", Role::Editor);
        let state = make_state(store.clone());

        let mut a = connect(&state, "alice");
        let mut b = connect(&state, "bob");
        a.session.handle(join("1")).await;
        b.session.handle(join("1")).await;
        drain(&mut a).await;
        drain(&mut b).await;

        // rights revoked after join; the next op must re-validate
        store.share("1", "bob", Role::Viewer);

        b.session.handle(op("1", "late")).await;
        match recv(&mut b).await {
            ServerMessage::Error(m) => assert_eq!(m.reason, "no edit permission"),
            other => panic!("expected error, got {:?}", other),
        }
        assert_silent(&mut a).await;
        assert!(store.edits().is_empty());
    }

    #[tokio::test]
    async fn join_without_access_is_rejected_and_never_registered() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", "secret"));
        let state = make_state(store);
        let mut c = connect(&state, "mallory");

        c.session.handle(join("1")).await;

        match recv(&mut c).await {
            ServerMessage::Error(m) => assert_eq!(m.reason, "no access"),
            other => panic!("expected error, got {:?}", other),
        }
        // no init-content, no registry entry
        assert_silent(&mut c).await;
        assert!(state.presence.snapshot("1").await.is_empty());
    }

    #[tokio::test]
    async fn join_of_missing_note_reports_not_found() {
        let store = Arc::new(MemoryNoteAccess::default());
        let state = make_state(store);
        let mut a = connect(&state, "alice");

        a.session.handle(join("missing")).await;

        match recv(&mut a).await {
            ServerMessage::Error(m) => assert_eq!(m.reason, "note not found"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn disconnect_cleans_registry_and_rebroadcasts_presence() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        store.share("1", "bob", Role::Viewer);
        let state = make_state(store);

        let mut a = connect(&state, "alice");
        let mut b = connect(&state, "bob");
        a.session.handle(join("1")).await;
        b.session.handle(join("1")).await;
        drain(&mut a).await;
        drain(&mut b).await;

        // transport drop, no explicit leave
        a.session.finish().await;

        match recv(&mut b).await {
            ServerMessage::Collaborators(m) => {
                assert_eq!(m.active.len(), 1);
                assert_eq!(m.active[0].user_id, "bob");
            }
            other => panic!("expected collaborators, got {:?}", other),
        }
        assert!(!state.presence.is_member("1", a.session.conn_id()).await);
        // the disconnected side receives nothing further
        assert_silent(&mut a).await;
    }

    #[tokio::test]
    async fn explicit_leave_rebroadcasts_to_remaining_members_only() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        store.share("1", "bob", Role::Viewer);
        let state = make_state(store);

        let mut a = connect(&state, "alice");
        let mut b = connect(&state, "bob");
        a.session.handle(join("1")).await;
        b.session.handle(join("1")).await;
        drain(&mut a).await;
        drain(&mut b).await;

        b.session
            .handle(ClientMessage::LeaveNote(crate::models::LeaveNoteMessage {
                note_id: "1".to_string(),
            }))
            .await;

        match recv(&mut a).await {
            ServerMessage::Collaborators(m) => {
                assert_eq!(m.active.len(), 1);
                assert_eq!(m.active[0].user_id, "alice");
            }
            other => panic!("expected collaborators, got {:?}", other),
        }
        // the leaver is not among the recipients
        assert_silent(&mut b).await;
    }

    #[tokio::test]
    async fn cursor_updates_reach_everyone_but_the_sender() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        store.share("1", "bob", Role::Viewer);
        let state = make_state(store);

        let mut a = connect(&state, "alice");
        let mut b = connect(&state, "bob");
        a.session.handle(join("1")).await;
        b.session.handle(join("1")).await;
        drain(&mut a).await;
        drain(&mut b).await;

        a.session
            .handle(ClientMessage::CursorUpdate(crate::models::CursorUpdateMessage {
                note_id: "1".to_string(),
                cursor: serde_json::json!({"index": 4}),
            }))
            .await;

        match recv(&mut b).await {
            ServerMessage::CursorBroadcast(m) => {
                assert_eq!(m.user_id, "alice");
                assert_eq!(m.cursor, serde_json::json!({"index": 4}));
            }
            other => panic!("expected cursor-broadcast, got {:?}", other),
        }
        assert_silent(&mut a).await;
    }

    #[tokio::test]
    async fn cursor_update_from_non_member_is_dropped() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        store.share("1", "bob", Role::Viewer);
        let state = make_state(store);

        let mut a = connect(&state, "alice");
        let mut b = connect(&state, "bob");
        a.session.handle(join("1")).await;
        drain(&mut a).await;

        // bob never joined the room
        b.session
            .handle(ClientMessage::CursorUpdate(crate::models::CursorUpdateMessage {
                note_id: "1".to_string(),
                cursor: serde_json::json!(0),
            }))
            .await;

        assert_silent(&mut a).await;
        assert_silent(&mut b).await;
    }

    #[tokio::test]
    async fn rejoin_keeps_a_single_registry_entry() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        let state = make_state(store);
        let mut a = connect(&state, "alice");

        a.session.handle(join("1")).await;
        a.session.handle(join("1")).await;
        drain(&mut a).await;

        assert_eq!(state.presence.snapshot("1").await.len(), 1);
    }

    #[tokio::test]
    async fn op_on_missing_note_reports_not_found() {
        let store = Arc::new(MemoryNoteAccess::with_note("1", "alice", ""));
        let state = make_state(store.clone());
        let mut a = connect(&state, "alice");
        a.session.handle(join("1")).await;
        drain(&mut a).await;

        a.session.handle(op("2", "x")).await;

        match recv(&mut a).await {
            ServerMessage::Error(m) => assert_eq!(m.reason, "note not found"),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(store.edits().is_empty());
    }
}
