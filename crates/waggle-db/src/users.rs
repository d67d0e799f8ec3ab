use crate::Database;
use crate::models::UserRow;
use anyhow::Result;
use rusqlite::OptionalExtension;

/// Users are provisioned by the account system; this subsystem only needs to
/// read them back (sender summaries, participant resolution) and to seed them
/// in tests.
impl Database {
    pub fn insert_user(&self, id: &str, name: &str, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3)",
                (id, name, email),
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, email, profile_picture, is_online, last_activity
                     FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            email: row.get(2)?,
                            profile_picture: row.get(3)?,
                            is_online: row.get(4)?,
                            last_activity: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}
