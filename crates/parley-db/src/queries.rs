use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use parley_types::models::{Channel, Conversation, Member, MemberWithUser, Role, User, Workspace};

use crate::Database;
use crate::models::RemovalReport;

impl Database {
    // -- Users --

    /// Insert or refresh a user profile from verified token claims.
    pub fn upsert_user(&self, id: Uuid, name: &str, image: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, image) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, image = excluded.image",
                params![id.to_string(), name, image],
            )?;
            Ok(())
        })
    }

    // -- Workspaces --

    /// Create a workspace with its creator as admin and a `general` channel.
    pub fn create_workspace(&self, workspace: &Workspace, member_id: Uuid, channel_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let created_at = workspace.created_at.timestamp_millis();
            tx.execute(
                "INSERT INTO workspaces (id, name, user_id, join_code, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    workspace.id.to_string(),
                    workspace.name,
                    workspace.user_id.to_string(),
                    workspace.join_code,
                    created_at
                ],
            )?;
            tx.execute(
                "INSERT INTO members (id, workspace_id, user_id, role) VALUES (?1, ?2, ?3, 'admin')",
                params![member_id.to_string(), workspace.id.to_string(), workspace.user_id.to_string()],
            )?;
            tx.execute(
                "INSERT INTO channels (id, workspace_id, name, created_at) VALUES (?1, ?2, 'general', ?3)",
                params![channel_id.to_string(), workspace.id.to_string(), created_at],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_workspace(&self, id: Uuid) -> Result<Option<Workspace>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, user_id, join_code, created_at FROM workspaces WHERE id = ?1",
                [id.to_string()],
                workspace_from_row,
            )
            .optional()
        })
    }

    pub fn list_workspaces_for_user(&self, user_id: Uuid) -> Result<Vec<Workspace>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT w.id, w.name, w.user_id, w.join_code, w.created_at
                 FROM workspaces w
                 JOIN members m ON m.workspace_id = w.id
                 WHERE m.user_id = ?1
                 ORDER BY w.created_at",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], workspace_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn rename_workspace(&self, id: Uuid, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE workspaces SET name = ?2 WHERE id = ?1", params![id.to_string(), name])?;
            Ok(())
        })
    }

    /// Replace the join code; the old one stops working immediately.
    pub fn update_join_code(&self, id: Uuid, join_code: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE workspaces SET join_code = ?2 WHERE id = ?1",
                params![id.to_string(), join_code],
            )?;
            Ok(())
        })
    }

    // -- Members --

    pub fn get_member(&self, id: Uuid) -> Result<Option<Member>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, workspace_id, user_id, role FROM members WHERE id = ?1",
                [id.to_string()],
                member_from_row,
            )
            .optional()
        })
    }

    /// The unique membership row for (workspace, user), if any.
    pub fn get_member_by_user(&self, workspace_id: Uuid, user_id: Uuid) -> Result<Option<Member>> {
        self.with_conn(|conn| query_member_by_user(conn, workspace_id, user_id))
    }

    pub fn list_memberships(&self, user_id: Uuid) -> Result<Vec<Member>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, workspace_id, user_id, role FROM members WHERE user_id = ?1")?;
            let rows = stmt
                .query_map([user_id.to_string()], member_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_members(&self, workspace_id: Uuid) -> Result<Vec<MemberWithUser>> {
        // JOIN users to fetch profiles in a single query (no N+1)
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.workspace_id, m.user_id, m.role, u.name, u.image
                 FROM members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.workspace_id = ?1
                 ORDER BY u.name",
            )?;
            let rows = stmt
                .query_map([workspace_id.to_string()], |row| {
                    let member = member_from_row(row)?;
                    let user = User {
                        id: member.user_id,
                        name: row.get(4)?,
                        image: row.get(5)?,
                    };
                    Ok(MemberWithUser { member, user })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Add a user to a workspace as a plain member. Returns the existing row
    /// unchanged if they already belong to it.
    pub fn join_workspace(&self, member_id: Uuid, workspace_id: Uuid, user_id: Uuid) -> Result<Member> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO members (id, workspace_id, user_id, role) VALUES (?1, ?2, ?3, 'member')",
                params![member_id.to_string(), workspace_id.to_string(), user_id.to_string()],
            )?;
            query_member_by_user(conn, workspace_id, user_id)?
                .ok_or_else(|| anyhow::anyhow!("membership missing after insert"))
        })
    }

    pub fn update_member_role(&self, id: Uuid, role: Role) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE members SET role = ?2 WHERE id = ?1",
                params![id.to_string(), role.as_str()],
            )?;
            Ok(())
        })
    }

    /// Delete a member and everything that hangs off them: their messages,
    /// their reactions and every 1:1 conversation they take part in. Runs in
    /// a single transaction.
    pub fn remove_member(&self, id: Uuid) -> Result<RemovalReport> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let member_id = id.to_string();

            let conversation_ids = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM conversations WHERE member_one_id = ?1 OR member_two_id = ?1",
                )?;
                let ids = stmt
                    .query_map([&member_id], |row| uuid_col(row, 0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };

            let reply_parents: Vec<Uuid> = {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT parent_message_id FROM messages
                     WHERE member_id = ?1 AND parent_message_id IS NOT NULL",
                )?;
                let ids = stmt
                    .query_map([&member_id], |row| uuid_col(row, 0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };

            let reactions_deleted = tx.execute("DELETE FROM reactions WHERE member_id = ?1", [&member_id])?;
            let messages_deleted = tx.execute("DELETE FROM messages WHERE member_id = ?1", [&member_id])?;
            tx.execute(
                "DELETE FROM conversations WHERE member_one_id = ?1 OR member_two_id = ?1",
                [&member_id],
            )?;
            tx.execute("DELETE FROM members WHERE id = ?1", [&member_id])?;

            let mut affected_parents = Vec::with_capacity(reply_parents.len());
            for parent in reply_parents {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                    [parent.to_string()],
                    |row| row.get(0),
                )?;
                if exists {
                    affected_parents.push(parent);
                }
            }

            tx.commit()?;

            Ok(RemovalReport {
                messages_deleted,
                reactions_deleted,
                conversation_ids,
                affected_parents,
            })
        })
    }

    // -- Channels --

    pub fn create_channel(&self, channel: &Channel) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, workspace_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    channel.id.to_string(),
                    channel.workspace_id.to_string(),
                    channel.name,
                    channel.created_at.timestamp_millis()
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, workspace_id, name, created_at FROM channels WHERE id = ?1",
                [id.to_string()],
                channel_from_row,
            )
            .optional()
        })
    }

    pub fn list_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, workspace_id, name, created_at FROM channels
                 WHERE workspace_id = ?1 ORDER BY created_at, name",
            )?;
            let rows = stmt
                .query_map([workspace_id.to_string()], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn rename_channel(&self, id: Uuid, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE channels SET name = ?2 WHERE id = ?1", params![id.to_string(), name])?;
            Ok(())
        })
    }

    /// Messages (and through them their reactions) go with the channel.
    pub fn delete_channel(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM channels WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, workspace_id, member_one_id, member_two_id FROM conversations WHERE id = ?1",
                [id.to_string()],
                conversation_from_row,
            )
            .optional()
        })
    }

    /// Return the conversation between two members, creating it on first use.
    pub fn get_or_create_conversation(
        &self,
        id: Uuid,
        workspace_id: Uuid,
        member_one_id: Uuid,
        member_two_id: Uuid,
    ) -> Result<Conversation> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    "SELECT id, workspace_id, member_one_id, member_two_id FROM conversations
                     WHERE workspace_id = ?1
                       AND ((member_one_id = ?2 AND member_two_id = ?3)
                         OR (member_one_id = ?3 AND member_two_id = ?2))",
                    params![
                        workspace_id.to_string(),
                        member_one_id.to_string(),
                        member_two_id.to_string()
                    ],
                    conversation_from_row,
                )
                .optional()?;

            let conversation = match existing {
                Some(c) => c,
                None => {
                    tx.execute(
                        "INSERT INTO conversations (id, workspace_id, member_one_id, member_two_id)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            id.to_string(),
                            workspace_id.to_string(),
                            member_one_id.to_string(),
                            member_two_id.to_string()
                        ],
                    )?;
                    Conversation {
                        id,
                        workspace_id,
                        member_one_id,
                        member_two_id,
                    }
                }
            };
            tx.commit()?;
            Ok(conversation)
        })
    }
}

fn query_member_by_user(conn: &Connection, workspace_id: Uuid, user_id: Uuid) -> Result<Option<Member>> {
    conn.query_row(
        "SELECT id, workspace_id, user_id, role FROM members WHERE workspace_id = ?1 AND user_id = ?2",
        params![workspace_id.to_string(), user_id.to_string()],
        member_from_row,
    )
    .optional()
}

fn workspace_from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        user_id: uuid_col(row, 2)?,
        join_code: row.get(3)?,
        created_at: ms_to_datetime(row.get(4)?),
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    let role: String = row.get(3)?;
    Ok(Member {
        id: uuid_col(row, 0)?,
        workspace_id: uuid_col(row, 1)?,
        user_id: uuid_col(row, 2)?,
        role: role.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: uuid_col(row, 0)?,
        workspace_id: uuid_col(row, 1)?,
        name: row.get(2)?,
        created_at: ms_to_datetime(row.get(3)?),
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_col(row, 0)?,
        workspace_id: uuid_col(row, 1)?,
        member_one_id: uuid_col(row, 2)?,
        member_two_id: uuid_col(row, 3)?,
    })
}

/// Ids are stored as hyphenated TEXT.
pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
    })
    .transpose()
}

pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
