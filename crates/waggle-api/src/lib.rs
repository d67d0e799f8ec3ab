pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;

use std::sync::Arc;

use anyhow::anyhow;
use axum::Router;
use axum::middleware as axum_middleware;
use axum::routing::{get, patch, post, put};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use waggle_db::Database;

use crate::error::ApiError;
use crate::middleware::require_auth;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

/// The full protected API surface. Identity is enforced by the middleware
/// layer, so every handler can rely on a Claims extension being present.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/conversations", get(conversations::get_conversations))
        .route("/conversations/create-or-find", post(conversations::create_or_find))
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/conversations/{conversation_id}/read",
            patch(conversations::mark_conversation_read),
        )
        .route(
            "/messages/{message_id}",
            put(messages::edit_message).delete(messages::delete_message),
        )
        .route("/notifications", get(notifications::get_notifications))
        .route(
            "/notifications/messages/mark-as-read",
            post(notifications::mark_all_read),
        )
        .layer(axum_middleware::from_fn(require_auth))
        .with_state(state)
}

/// Run a blocking store closure off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow!("spawn_blocking join error: {}", e)))?
}

/// SQLite hands timestamps back as text; usually the RFC 3339 we wrote, but
/// tolerate the bare `YYYY-MM-DD HH:MM:SS` form too.
pub(crate) fn parse_timestamp(value: &str, context: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", value, context, e);
            DateTime::default()
        })
}

pub(crate) fn parse_uuid(value: &str, context: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on {}: {}", value, context, e);
        Uuid::default()
    })
}

#[cfg(test)]
mod tests {
    use super::parse_timestamp;
    use chrono::{DateTime, Utc};

    #[test]
    fn parses_rfc3339_and_sqlite_datetime_forms() {
        let rfc = parse_timestamp("2026-08-01T10:01:00+00:00", "test");
        let bare = parse_timestamp("2026-08-01 10:01:00", "test");
        assert_eq!(rfc, bare);
        assert_eq!(rfc.to_rfc3339(), "2026-08-01T10:01:00+00:00");
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp("not-a-date", "test"), DateTime::<Utc>::default());
    }
}
