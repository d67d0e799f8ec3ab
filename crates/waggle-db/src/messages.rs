use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::Database;
use crate::models::MessageRow;

pub const NOTIFICATION_MESSAGE_RECEIVED: &str = "message_received";

impl Database {
    /// One page of a conversation's history, oldest first. `offset`/`limit`
    /// are computed by the caller from its 1-based page number.
    pub fn messages_page(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.conversation_id, m.sender_id, u.name, u.profile_picture,
                        m.content, m.attachment_path, m.is_read, m.created_at, m.edited_at
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.conversation_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit, offset], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT m.id, m.conversation_id, m.sender_id, u.name, u.profile_picture,
                            m.content, m.attachment_path, m.is_read, m.created_at, m.edited_at
                     FROM messages m
                     LEFT JOIN users u ON u.id = m.sender_id
                     WHERE m.id = ?1",
                    [id],
                    map_message_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Append a message and fan out its notifications in one transaction:
    /// insert the row, advance the conversation's updated_at and last-message
    /// pointer, and create one `message_received` notification per
    /// participant other than the sender. All of it lands or none of it does.
    pub fn insert_message_with_fanout(
        &self,
        message_id: &str,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (message_id, conversation_id, sender_id, content, now),
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?2, last_message_id = ?3 WHERE id = ?1",
                (conversation_id, now, message_id),
            )?;

            let recipients: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT user_id FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id != ?2",
                )?;
                stmt.query_map((conversation_id, sender_id), |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            for recipient in recipients {
                tx.execute(
                    "INSERT INTO notifications
                         (id, recipient_id, kind, is_read, related_table, related_id, created_at)
                     VALUES (?1, ?2, ?3, 0, 'message', ?4, ?5)",
                    (
                        Uuid::new_v4().to_string(),
                        recipient,
                        NOTIFICATION_MESSAGE_RECEIVED,
                        message_id,
                        now,
                    ),
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn update_message_content(&self, id: &str, content: &str, edited_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET content = ?2, edited_at = ?3 WHERE id = ?1",
                (id, content, edited_at),
            )?;
            Ok(())
        })
    }

    /// Delete a message. When it is the conversation's last message the
    /// pointer is repointed to the newest remaining message (or NULL) in the
    /// same transaction, so the listing never serves a deleted message.
    pub fn delete_message(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let pointing: Option<String> = tx
                .query_row(
                    "SELECT id FROM conversations WHERE last_message_id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(conversation_id) = pointing {
                let replacement: Option<String> = tx
                    .query_row(
                        "SELECT id FROM messages
                         WHERE conversation_id = ?1 AND id != ?2
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT 1",
                        (&conversation_id, id),
                        |row| row.get(0),
                    )
                    .optional()?;
                tx.execute(
                    "UPDATE conversations SET last_message_id = ?2 WHERE id = ?1",
                    (&conversation_id, replacement),
                )?;
            }

            tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;

            tx.commit()?;
            Ok(())
        })
    }
}

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        sender_profile_picture: row.get(4)?,
        content: row.get(5)?,
        attachment_path: row.get(6)?,
        is_read: row.get(7)?,
        created_at: row.get(8)?,
        edited_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::NOTIFICATION_MESSAGE_RECEIVED;
    use crate::test_util::db_with_users;

    #[test]
    fn send_fans_out_one_notification_per_other_participant() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]);
        db.create_conversation("conv-1", "a", &["b".into(), "c".into()], "2026-08-01T10:00:00Z")
            .unwrap();

        db.insert_message_with_fanout("m1", "conv-1", "a", "hello", "2026-08-01T10:01:00Z")
            .unwrap();

        // Sender gets nothing; each other participant gets exactly one.
        assert!(db.notifications_for("a").unwrap().is_empty());
        for user in ["b", "c"] {
            let notifications = db.notifications_for(user).unwrap();
            assert_eq!(notifications.len(), 1);
            let n = &notifications[0];
            assert_eq!(n.kind, NOTIFICATION_MESSAGE_RECEIVED);
            assert_eq!(n.related_table, "message");
            assert_eq!(n.related_id, "m1");
            assert!(!n.is_read);
        }
    }

    #[test]
    fn send_advances_conversation_activity_and_pointer() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();

        db.insert_message_with_fanout("m1", "conv-1", "a", "first", "2026-08-01T10:01:00Z")
            .unwrap();
        db.insert_message_with_fanout("m2", "conv-1", "a", "second", "2026-08-01T10:02:00Z")
            .unwrap();

        let listed = db.conversations_for_participant("b").unwrap();
        let (conversation, last) = &listed[0];
        assert_eq!(conversation.updated_at, "2026-08-01T10:02:00Z");
        assert_eq!(last.as_ref().unwrap().id, "m2");
    }

    #[test]
    fn pagination_windows_ascending_history() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();

        for i in 1..=25 {
            let id = format!("m{:02}", i);
            let at = format!("2026-08-01T10:{:02}:00Z", i);
            db.insert_message_with_fanout(&id, "conv-1", "a", "tick", &at).unwrap();
        }

        // Page 2, limit 10 => messages 11..=20, oldest first.
        let page = db.messages_page("conv-1", 10, 10).unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page.first().unwrap().id, "m11");
        assert_eq!(page.last().unwrap().id, "m20");

        // Trailing partial page.
        let page = db.messages_page("conv-1", 10, 20).unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page.last().unwrap().id, "m25");
    }

    #[test]
    fn edit_sets_content_and_edit_timestamp() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();
        db.insert_message_with_fanout("m1", "conv-1", "a", "typo", "2026-08-01T10:01:00Z")
            .unwrap();

        db.update_message_content("m1", "fixed", "2026-08-01T10:05:00Z").unwrap();

        let message = db.get_message("m1").unwrap().unwrap();
        assert_eq!(message.content, "fixed");
        assert_eq!(message.edited_at.as_deref(), Some("2026-08-01T10:05:00Z"));
        assert_eq!(message.created_at, "2026-08-01T10:01:00Z");
    }

    #[test]
    fn deleting_latest_message_repoints_last_message() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();
        db.insert_message_with_fanout("m1", "conv-1", "a", "first", "2026-08-01T10:01:00Z")
            .unwrap();
        db.insert_message_with_fanout("m2", "conv-1", "a", "second", "2026-08-01T10:02:00Z")
            .unwrap();

        db.delete_message("m2").unwrap();

        assert!(db.get_message("m2").unwrap().is_none());
        let listed = db.conversations_for_participant("a").unwrap();
        assert_eq!(listed[0].1.as_ref().unwrap().id, "m1");

        // Deleting the only remaining message clears the pointer.
        db.delete_message("m1").unwrap();
        let listed = db.conversations_for_participant("a").unwrap();
        assert!(listed[0].1.is_none());
    }

    #[test]
    fn deleting_non_latest_message_leaves_pointer_alone() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();
        db.insert_message_with_fanout("m1", "conv-1", "a", "first", "2026-08-01T10:01:00Z")
            .unwrap();
        db.insert_message_with_fanout("m2", "conv-1", "a", "second", "2026-08-01T10:02:00Z")
            .unwrap();

        db.delete_message("m1").unwrap();

        let listed = db.conversations_for_participant("a").unwrap();
        assert_eq!(listed[0].1.as_ref().unwrap().id, "m2");
    }
}
