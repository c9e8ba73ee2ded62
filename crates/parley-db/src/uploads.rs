use anyhow::Result;
use rusqlite::params;
use uuid::Uuid;

use crate::Database;
use crate::models::FileRow;
use crate::queries::{OptionalExt, uuid_col};

impl Database {
    // -- Upload tickets --

    pub fn create_upload_ticket(&self, token: &str, user_id: Uuid, expires_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO upload_tickets (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token, user_id.to_string(), expires_at],
            )?;
            Ok(())
        })
    }

    /// Spend a ticket. Returns the user it was issued to, or `None` when the
    /// ticket is unknown, expired or already used.
    pub fn redeem_upload_ticket(&self, token: &str, now: i64) -> Result<Option<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let user_id = tx
                .query_row(
                    "SELECT user_id FROM upload_tickets WHERE token = ?1 AND used = 0 AND expires_at > ?2",
                    params![token, now],
                    |row| uuid_col(row, 0),
                )
                .optional()?;
            if user_id.is_some() {
                tx.execute("UPDATE upload_tickets SET used = 1 WHERE token = ?1", [token])?;
            }
            tx.commit()?;
            Ok(user_id)
        })
    }

    /// Drop spent and expired tickets.
    pub fn purge_upload_tickets(&self, now: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM upload_tickets WHERE used = 1 OR expires_at <= ?1",
                [now],
            )?;
            Ok(n)
        })
    }

    // -- Files --

    pub fn insert_file(&self, file: &FileRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, user_id, content_type, size, sha256, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    file.id.to_string(),
                    file.user_id.to_string(),
                    file.content_type,
                    file.size,
                    file.sha256,
                    file.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: Uuid) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, content_type, size, sha256, created_at FROM files WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(FileRow {
                        id: uuid_col(row, 0)?,
                        user_id: uuid_col(row, 1)?,
                        content_type: row.get(2)?,
                        size: row.get(3)?,
                        sha256: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn file_in_use(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let used: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE image = ?1)",
                [id.to_string()],
                |row| row.get(0),
            )?;
            Ok(used)
        })
    }

    pub fn delete_file(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM files WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        db.upsert_user(user, "Ada", None).unwrap();
        (db, user)
    }

    #[test]
    fn ticket_is_single_use() {
        let (db, user) = db_with_user();
        db.create_upload_ticket("t1", user, 10_000).unwrap();

        assert_eq!(db.redeem_upload_ticket("t1", 5_000).unwrap(), Some(user));
        assert_eq!(db.redeem_upload_ticket("t1", 5_000).unwrap(), None);
    }

    #[test]
    fn expired_ticket_is_rejected() {
        let (db, user) = db_with_user();
        db.create_upload_ticket("t2", user, 10_000).unwrap();

        assert_eq!(db.redeem_upload_ticket("t2", 10_000).unwrap(), None);
        assert_eq!(db.purge_upload_tickets(10_000).unwrap(), 1);
        assert_eq!(db.redeem_upload_ticket("unknown", 0).unwrap(), None);
    }

    #[test]
    fn file_round_trip_and_delete() {
        let (db, user) = db_with_user();
        let id = Uuid::new_v4();
        db.insert_file(&FileRow {
            id,
            user_id: user,
            content_type: "image/png".into(),
            size: 4,
            sha256: "00".into(),
            created_at: 1,
        })
        .unwrap();

        let row = db.get_file(id).unwrap().unwrap();
        assert_eq!(row.content_type, "image/png");
        assert!(!db.file_in_use(id).unwrap());

        db.delete_file(id).unwrap();
        assert!(db.get_file(id).unwrap().is_none());
    }
}
