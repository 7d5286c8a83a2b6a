use crate::{auth::auth::{self, Identity}, models::{DiagnosticsResponse, ErrorResponse}, state::AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

/// Live counters for the collaboration core plus host stats
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    // Only administrators may look inside
    auth::ensure_admin(&identity)?;

    let stats = state.registry.stats().await;
    let n_conn = state.transport.connection_count() as u32;
    let n_rate_windows = state.chat_limiter.len() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let mut sys = state.system.lock();
        sys.refresh_cpu();
        sys.refresh_memory();
        (
            sys.global_cpu_info().cpu_usage(),
            sys.used_memory(),
            sys.free_memory(),
            sys.total_memory(),
        )
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}, Dirty: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        stats.rooms,
        stats.dirty_rooms
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_rooms: stats.rooms as u32,
            n_participants: stats.participants as u32,
            n_dirty_rooms: stats.dirty_rooms as u32,
            n_rate_windows,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
