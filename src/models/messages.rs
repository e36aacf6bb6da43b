use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JoinNoteMessage {
    pub note_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LeaveNoteMessage {
    pub note_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OpMessage {
    pub note_id: String,
    pub content: String,
}

/// Cursor payloads are ephemeral and opaque to the server; they are relayed as-is.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdateMessage {
    pub note_id: String,
    pub cursor: Value,
}

/// Events a client may send over the collaboration socket
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join-note")]
    JoinNote(JoinNoteMessage),
    #[serde(rename = "leave-note")]
    LeaveNote(LeaveNoteMessage),
    #[serde(rename = "op")]
    Op(OpMessage),
    #[serde(rename = "cursor-update")]
    CursorUpdate(CursorUpdateMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitContentMessage {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorsMessage {
    pub active: Vec<Collaborator>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOpMessage {
    pub user_id: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorBroadcastMessage {
    pub user_id: String,
    pub cursor: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub reason: String,
}

/// Events the server emits to a client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init-content")]
    InitContent(InitContentMessage),
    #[serde(rename = "collaborators")]
    Collaborators(CollaboratorsMessage),
    #[serde(rename = "remote-op")]
    RemoteOp(RemoteOpMessage),
    #[serde(rename = "cursor-broadcast")]
    CursorBroadcast(CursorBroadcastMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn error(reason: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage { reason: reason.into() })
    }
}
