use std::collections::HashMap;

use anyhow::Result;
use rusqlite::OptionalExtension;

use crate::Database;
use crate::models::{ConversationRow, LastMessageRow, UserRow};

impl Database {
    /// All conversations the user participates in, most recent activity
    /// first, with the last message joined on (sender name included) so the
    /// listing needs no per-conversation follow-up query.
    pub fn conversations_for_participant(
        &self,
        user_id: &str,
    ) -> Result<Vec<(ConversationRow, Option<LastMessageRow>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.created_at, c.updated_at,
                        m.id, m.content, m.sender_id, u.name, m.created_at, m.is_read
                 FROM conversations c
                 JOIN conversation_participants cp ON cp.conversation_id = c.id
                 LEFT JOIN messages m ON m.id = c.last_message_id
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE cp.user_id = ?1
                 ORDER BY c.updated_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    let conversation = ConversationRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    };
                    let last_message = match row.get::<_, Option<String>>(4)? {
                        Some(id) => Some(LastMessageRow {
                            id,
                            content: row.get(5)?,
                            sender_id: row.get(6)?,
                            sender_name: row
                                .get::<_, Option<String>>(7)?
                                .unwrap_or_else(|| "unknown".to_string()),
                            created_at: row.get(8)?,
                            is_read: row.get(9)?,
                        }),
                        None => None,
                    };
                    Ok((conversation, last_message))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Batch-fetch participants for a set of conversation ids.
    pub fn participants_for_conversations(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<(String, UserRow)>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=conversation_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT cp.conversation_id, u.id, u.name, u.email, u.profile_picture,
                        u.is_online, u.last_activity
                 FROM conversation_participants cp
                 JOIN users u ON u.id = cp.user_id
                 WHERE cp.conversation_id IN ({})
                 ORDER BY cp.rowid",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = conversation_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        UserRow {
                            id: row.get(1)?,
                            name: row.get(2)?,
                            email: row.get(3)?,
                            profile_picture: row.get(4)?,
                            is_online: row.get(5)?,
                            last_activity: row.get(6)?,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id = ?2",
                    (conversation_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn conversation_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM conversations WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Find a conversation whose participant set equals `user_ids` exactly
    /// (no more, no fewer). Input order is irrelevant; duplicates collapse.
    pub fn find_by_exact_participants(&self, user_ids: &[String]) -> Result<Option<String>> {
        let mut ids: Vec<String> = user_ids.to_vec();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(None);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let count_idx = ids.len() + 1;
            let sql = format!(
                "SELECT conversation_id FROM conversation_participants
                 GROUP BY conversation_id
                 HAVING COUNT(*) = ?{count_idx}
                    AND SUM(CASE WHEN user_id IN ({}) THEN 1 ELSE 0 END) = ?{count_idx}",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let expected = ids.len() as i64;
            let mut params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            params.push(&expected);

            let found: Option<String> =
                stmt.query_row(params.as_slice(), |row| row.get(0)).optional()?;
            Ok(found)
        })
    }

    /// Create a conversation with the caller plus every resolvable target id.
    /// Unknown target ids are skipped silently; the caller is always a
    /// participant, so the set is never empty. Single transaction.
    pub fn create_conversation(
        &self,
        id: &str,
        caller_id: &str,
        target_ids: &[String],
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO conversations (id, name, last_message_id, created_at, updated_at)
                 VALUES (?1, NULL, NULL, ?2, ?2)",
                (id, now),
            )?;
            tx.execute(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                (id, caller_id),
            )?;
            for target in target_ids {
                // INSERT..SELECT resolves the id; unknown users insert nothing.
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                     SELECT ?1, id FROM users WHERE id = ?2",
                    (id, target),
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Flip every unread message in the conversation not authored by the
    /// user to read, in one statement. Returns the number of rows flipped;
    /// repeat calls are no-ops.
    pub fn mark_conversation_read(&self, conversation_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                (conversation_id, user_id),
            )?;
            Ok(changed)
        })
    }

    /// Unread message counts for all of the user's conversations, keyed by
    /// conversation id, in one grouped query. Absent key means zero.
    pub fn unread_counts(&self, user_id: &str) -> Result<HashMap<String, i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.conversation_id, COUNT(*)
                 FROM messages m
                 JOIN conversation_participants cp
                   ON cp.conversation_id = m.conversation_id AND cp.user_id = ?1
                 WHERE m.sender_id != ?1 AND m.is_read = 0
                 GROUP BY m.conversation_id",
            )?;

            let mut counts = HashMap::new();
            let rows = stmt.query_map([user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (conversation_id, count) = row?;
                counts.insert(conversation_id, count);
            }

            Ok(counts)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_util::db_with_users;

    #[test]
    fn find_by_exact_participants_ignores_order_and_duplicates() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]);
        db.create_conversation("conv-1", "a", &["b".into(), "c".into()], "2026-08-01T10:00:00Z")
            .unwrap();

        let found = db
            .find_by_exact_participants(&["c".into(), "a".into(), "b".into(), "b".into()])
            .unwrap();
        assert_eq!(found.as_deref(), Some("conv-1"));
    }

    #[test]
    fn find_by_exact_participants_rejects_subsets_and_supersets() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]);
        db.create_conversation("conv-1", "a", &["b".into(), "c".into()], "2026-08-01T10:00:00Z")
            .unwrap();

        assert_eq!(db.find_by_exact_participants(&["a".into(), "b".into()]).unwrap(), None);
        assert_eq!(
            db.find_by_exact_participants(&[
                "a".into(),
                "b".into(),
                "c".into(),
                "missing".into()
            ])
            .unwrap(),
            None
        );
    }

    #[test]
    fn create_conversation_skips_unresolvable_targets() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob")]);
        db.create_conversation(
            "conv-1",
            "a",
            &["b".into(), "ghost".into()],
            "2026-08-01T10:00:00Z",
        )
        .unwrap();

        let participants = db
            .participants_for_conversations(&["conv-1".into()])
            .unwrap();
        let mut ids: Vec<&str> = participants.iter().map(|(_, u)| u.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn mark_conversation_read_flips_only_unread_non_own_and_is_idempotent() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();

        db.insert_message_with_fanout("m1", "conv-1", "b", "hi", "2026-08-01T10:01:00Z")
            .unwrap();
        db.insert_message_with_fanout("m2", "conv-1", "b", "there", "2026-08-01T10:02:00Z")
            .unwrap();
        db.insert_message_with_fanout("m3", "conv-1", "a", "hey", "2026-08-01T10:03:00Z")
            .unwrap();

        assert_eq!(db.mark_conversation_read("conv-1", "a").unwrap(), 2);
        // Second pass finds nothing left to flip.
        assert_eq!(db.mark_conversation_read("conv-1", "a").unwrap(), 0);

        // Alice's own message stays unread (it is read implicitly for her,
        // never flipped in the store).
        let own = db.get_message("m3").unwrap().unwrap();
        assert!(!own.is_read);
    }

    #[test]
    fn unread_counts_aggregate_per_conversation_and_default_to_absent() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();
        db.create_conversation("conv-2", "a", &["c".into()], "2026-08-01T10:00:00Z")
            .unwrap();

        db.insert_message_with_fanout("m1", "conv-1", "b", "one", "2026-08-01T10:01:00Z")
            .unwrap();
        db.insert_message_with_fanout("m2", "conv-1", "b", "two", "2026-08-01T10:02:00Z")
            .unwrap();
        db.insert_message_with_fanout("m3", "conv-1", "a", "own", "2026-08-01T10:03:00Z")
            .unwrap();

        let counts = db.unread_counts("a").unwrap();
        assert_eq!(counts.get("conv-1"), Some(&2));
        assert_eq!(counts.get("conv-2"), None);

        // Bob sees Alice's message as his single unread.
        let counts = db.unread_counts("b").unwrap();
        assert_eq!(counts.get("conv-1"), Some(&1));
    }

    #[test]
    fn listing_orders_by_recent_activity_and_carries_last_message() {
        let db = db_with_users(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]);
        db.create_conversation("conv-1", "a", &["b".into()], "2026-08-01T10:00:00Z")
            .unwrap();
        db.create_conversation("conv-2", "a", &["c".into()], "2026-08-01T11:00:00Z")
            .unwrap();

        // Activity in conv-1 moves it ahead of conv-2.
        db.insert_message_with_fanout("m1", "conv-1", "b", "ping", "2026-08-01T12:00:00Z")
            .unwrap();

        let listed = db.conversations_for_participant("a").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0.id, "conv-1");
        let last = listed[0].1.as_ref().unwrap();
        assert_eq!(last.id, "m1");
        assert_eq!(last.sender_name, "Bob");
        assert!(listed[1].1.is_none());
    }
}
