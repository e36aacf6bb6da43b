use crate::handlers::{
    create_note, delete_note, diagnostics, get_note, list_notes, share_note, update_note,
};
use crate::routes::auth_middleware::auth_middleware;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/v1/notes", post(create_note).get(list_notes))
        .route(
            "/v1/notes/:id",
            get(get_note).patch(update_note).delete(delete_note),
        )
        .route("/v1/notes/:id/share", post(share_note))
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn(auth_middleware)) // Applies to all routes added above
        .with_state(state)
}
