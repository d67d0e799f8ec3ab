use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use waggle_types::api::{
    Claims, EditMessageRequest, MessageCreated, MessageEntry, SendMessageRequest, SenderSummary,
    SuccessResponse,
};

use crate::error::ApiError;
use crate::{AppState, blocking, parse_timestamp, parse_uuid};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// 1-based page number.
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.min(200);
    let offset = (query.page.max(1) - 1).saturating_mul(limit);

    let db = state.clone();
    let caller_id = claims.sub.to_string();
    let user_id = caller_id.clone();
    let rows = blocking(move || {
        let cid = conversation_id.to_string();
        if !db.db.conversation_exists(&cid)? {
            return Err(ApiError::NotFound("Conversation"));
        }
        if !db.db.is_participant(&cid, &user_id)? {
            return Err(ApiError::Forbidden);
        }
        Ok(db.db.messages_page(&cid, limit, offset)?)
    })
    .await?;

    let data: Vec<MessageEntry> = rows
        .into_iter()
        .map(|row| {
            let is_own = row.sender_id == caller_id;
            MessageEntry {
                id: parse_uuid(&row.id, "message"),
                sender: SenderSummary {
                    id: parse_uuid(&row.sender_id, "message sender"),
                    name: row.sender_name,
                    profile_picture: row.sender_profile_picture,
                },
                content: row.content,
                attachment: row.attachment_path,
                created_at: parse_timestamp(&row.created_at, "message"),
                edited_at: row.edited_at.as_deref().map(|at| parse_timestamp(at, "message edit")),
                is_own,
            }
        })
        .collect();

    Ok(Json(data))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message_id = Uuid::new_v4();
    let now = Utc::now();

    let db = state.clone();
    let caller_id = claims.sub.to_string();
    let content = req.content.clone();
    let sender = blocking(move || {
        let cid = conversation_id.to_string();
        if !db.db.conversation_exists(&cid)? {
            return Err(ApiError::NotFound("Conversation"));
        }
        if !db.db.is_participant(&cid, &caller_id)? {
            return Err(ApiError::Forbidden);
        }
        if content.trim().is_empty() {
            return Err(ApiError::Validation("Message content is required".into()));
        }

        let sender = db
            .db
            .get_user(&caller_id)?
            .ok_or_else(|| anyhow!("sender row missing for participant {}", caller_id))?;

        db.db.insert_message_with_fanout(
            &message_id.to_string(),
            &cid,
            &caller_id,
            &content,
            &now.to_rfc3339(),
        )?;
        Ok(sender)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageCreated {
            id: message_id,
            sender: SenderSummary {
                id: claims.sub,
                name: sender.name,
                profile_picture: sender.profile_picture,
            },
            content: req.content,
            created_at: now,
        }),
    ))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let caller_id = claims.sub.to_string();
    blocking(move || {
        let mid = message_id.to_string();
        let message = db.db.get_message(&mid)?.ok_or(ApiError::NotFound("Message"))?;
        if message.sender_id != caller_id {
            return Err(ApiError::Forbidden);
        }
        if req.content.trim().is_empty() {
            return Err(ApiError::Validation("Message content is required".into()));
        }

        db.db
            .update_message_content(&mid, &req.content, &Utc::now().to_rfc3339())?;
        Ok(())
    })
    .await?;

    Ok(Json(SuccessResponse::ok()))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let caller_id = claims.sub.to_string();
    blocking(move || {
        let mid = message_id.to_string();
        let message = db.db.get_message(&mid)?.ok_or(ApiError::NotFound("Message"))?;
        if message.sender_id != caller_id {
            return Err(ApiError::Forbidden);
        }

        db.db.delete_message(&mid)?;
        Ok(())
    })
    .await?;

    Ok(Json(SuccessResponse::ok()))
}
