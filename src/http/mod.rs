//! HTTP router and handlers for the mailbox API.

use crate::app::AppState;
use axum::{Router, routing::get};

pub mod messages;
pub mod ui;

/// Assemble the HTTP router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ui::ui_index))
        .route("/api/emails/:address", get(messages::list_emails))
        .route(
            "/api/email/:id",
            get(messages::get_email)
                .patch(messages::update_email)
                .delete(messages::delete_email),
        )
        .route("/api/stats", get(messages::stats))
        .route("/api/health", get(messages::health))
        .route("/email/:id/html", get(messages::get_email_html))
        .with_state(state)
}
