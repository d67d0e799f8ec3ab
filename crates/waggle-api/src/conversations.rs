use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use waggle_db::models::UserRow;
use waggle_types::api::{
    Claims, ConversationSummary, CreateOrFindRequest, CreateOrFindResponse, LastMessageSummary,
    ParticipantSummary, SuccessResponse,
};

use crate::error::ApiError;
use crate::{AppState, blocking, parse_timestamp, parse_uuid};

pub async fn get_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = claims.sub.to_string();

    let db = state.clone();
    let user_id = caller_id.clone();
    let (rows, unread, participant_rows) = blocking(move || {
        let rows = db.db.conversations_for_participant(&user_id)?;
        let unread = db.db.unread_counts(&user_id)?;
        let ids: Vec<String> = rows.iter().map(|(c, _)| c.id.clone()).collect();
        let participant_rows = db.db.participants_for_conversations(&ids)?;
        Ok((rows, unread, participant_rows))
    })
    .await?;

    let mut participants: HashMap<String, Vec<UserRow>> = HashMap::new();
    for (conversation_id, user) in participant_rows {
        participants.entry(conversation_id).or_default().push(user);
    }

    let data: Vec<ConversationSummary> = rows
        .into_iter()
        .map(|(conversation, last)| {
            let others: Vec<UserRow> = participants
                .remove(&conversation.id)
                .unwrap_or_default()
                .into_iter()
                .filter(|u| u.id != caller_id)
                .collect();

            let name = conversation
                .name
                .clone()
                .unwrap_or_else(|| display_name(&others));

            let last_message = last.map(|m| {
                // The sender's own copy always reads as seen.
                let is_read = m.sender_id == caller_id || m.is_read;
                LastMessageSummary {
                    id: parse_uuid(&m.id, "message"),
                    sender_id: parse_uuid(&m.sender_id, "message sender"),
                    sender_name: m.sender_name,
                    created_at: parse_timestamp(&m.created_at, "message"),
                    content: m.content,
                    is_read,
                }
            });

            ConversationSummary {
                id: parse_uuid(&conversation.id, "conversation"),
                name,
                participants: others.iter().map(participant_summary).collect(),
                last_message,
                created_at: parse_timestamp(&conversation.created_at, "conversation"),
                updated_at: parse_timestamp(&conversation.updated_at, "conversation"),
                unread_count: unread.get(&conversation.id).copied().unwrap_or(0),
            }
        })
        .collect();

    Ok(Json(data))
}

pub async fn create_or_find(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrFindRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.participant_ids.is_empty() {
        return Err(ApiError::Validation("No participants provided".into()));
    }

    let db = state.clone();
    let caller_id = claims.sub.to_string();
    let (id, created) = blocking(move || {
        let targets: Vec<String> = req.participant_ids.iter().map(Uuid::to_string).collect();

        let mut full_set = targets.clone();
        full_set.push(caller_id.clone());
        if let Some(existing) = db.db.find_by_exact_participants(&full_set)? {
            return Ok((existing, false));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        db.db.create_conversation(&id, &caller_id, &targets, &now)?;
        Ok((id, true))
    })
    .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    let body = CreateOrFindResponse {
        id: parse_uuid(&id, "conversation"),
        created: created.then_some(true),
    };
    Ok((status, Json(body)))
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    blocking(move || {
        db.db
            .mark_conversation_read(&conversation_id.to_string(), &claims.sub.to_string())?;
        Ok(())
    })
    .await?;

    Ok(Json(SuccessResponse::ok()))
}

/// Display name for an unnamed conversation, derived from the *other*
/// participants as the viewer sees them.
fn display_name(others: &[UserRow]) -> String {
    match others {
        [] => "Conversation".to_string(),
        [only] => only.name.clone(),
        [first, second, ..] => format!("{}, {}...", first.name, second.name),
    }
}

fn participant_summary(user: &UserRow) -> ParticipantSummary {
    ParticipantSummary {
        id: parse_uuid(&user.id, "user"),
        name: user.name.clone(),
        email: user.email.clone(),
        profile_picture: user.profile_picture.clone(),
        is_online: user.is_online,
        last_activity: user
            .last_activity
            .as_deref()
            .map(|at| parse_timestamp(at, "user activity")),
    }
}

#[cfg(test)]
mod tests {
    use super::display_name;
    use waggle_db::models::UserRow;

    fn user(name: &str) -> UserRow {
        UserRow {
            id: name.to_lowercase(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            profile_picture: None,
            is_online: false,
            last_activity: None,
        }
    }

    #[test]
    fn two_party_conversation_shows_the_other_name() {
        assert_eq!(display_name(&[user("Bob")]), "Bob");
    }

    #[test]
    fn group_shows_first_two_names_with_ellipsis() {
        assert_eq!(display_name(&[user("Bob"), user("Carol")]), "Bob, Carol...");
        assert_eq!(display_name(&[user("Bob"), user("Carol"), user("Dave")]), "Bob, Carol...");
    }

    #[test]
    fn empty_other_set_falls_back_to_fixed_label() {
        assert_eq!(display_name(&[]), "Conversation");
    }
}
