use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Runtime statistics for the collaboration layer and the host
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    /// Rooms with at least one active member
    pub n_rooms: u32,
    /// Room memberships across all connections
    pub n_members: u32,
    /// Per-note broadcast channels currently allocated
    pub n_channels: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
