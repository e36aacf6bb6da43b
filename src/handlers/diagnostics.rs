use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use std::sync::{Arc, Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

use crate::models::{DiagnosticsResponse, ErrorResponse};
use crate::routes::auth_middleware::AuthSubject;
use crate::state::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Report collaboration-layer and host statistics
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Extension(AuthSubject(_subject)): Extension<AuthSubject>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    // Aggregate room stats from the presence registry
    let n_rooms = state.presence.room_count().await as u32;
    let n_members = state.presence.member_count().await as u32;
    let n_channels = state.channel_count().await as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Rooms: {}, Members: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_rooms,
        n_members
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_rooms,
            n_members,
            n_channels,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
