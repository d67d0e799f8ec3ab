/// Database row types — these map directly to SQLite rows.
/// Distinct from waggle-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub is_online: bool,
    pub last_activity: Option<String>,
}

pub struct ConversationRow {
    pub id: String,
    pub name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Denormalized last-message summary joined onto a conversation listing.
pub struct LastMessageRow {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    pub created_at: String,
    pub is_read: bool,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_profile_picture: Option<String>,
    pub content: String,
    pub attachment_path: Option<String>,
    pub is_read: bool,
    pub created_at: String,
    pub edited_at: Option<String>,
}

pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub is_read: bool,
    pub related_table: String,
    pub related_id: String,
    pub created_at: String,
}
