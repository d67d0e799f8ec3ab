use axum::{Extension, Json, extract::State, response::IntoResponse};

use waggle_types::api::{Claims, NotificationEntry, NotificationsResponse, SuccessResponse};

use crate::error::ApiError;
use crate::{AppState, blocking, parse_uuid};

pub async fn get_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let (count, rows) = blocking(move || {
        let count = db.db.unread_notification_count(&user_id)?;
        let rows = db.db.notifications_for(&user_id)?;
        Ok((count, rows))
    })
    .await?;

    let notifications: Vec<NotificationEntry> = rows
        .into_iter()
        .map(|row| NotificationEntry {
            id: parse_uuid(&row.id, "notification"),
            is_read: row.is_read,
            related_table: row.related_table,
            related_id: parse_uuid(&row.related_id, "notification target"),
        })
        .collect();

    Ok(Json(NotificationsResponse { count, notifications }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    blocking(move || {
        db.db.mark_all_notifications_read(&user_id)?;
        Ok(())
    })
    .await?;

    Ok(Json(SuccessResponse::ok()))
}
