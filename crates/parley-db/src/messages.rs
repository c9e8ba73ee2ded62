use anyhow::Result;
use rusqlite::{Row, params, params_from_iter};
use uuid::Uuid;

use parley_types::models::FeedScope;

use crate::Database;
use crate::cursor::Cursor;
use crate::models::{MessageRow, NewMessage, ReactionRow, ReplyRow, ScopeOwner};
use crate::queries::{OptionalExt, opt_uuid_col, uuid_col};

const MESSAGE_COLUMNS: &str = "m.id, m.workspace_id, m.channel_id, m.conversation_id, m.parent_message_id,
     m.member_id, u.id, u.name, u.image, m.body, m.image, m.created_at, m.updated_at";

impl Database {
    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, workspace_id, channel_id, conversation_id, parent_message_id, member_id, body, image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    msg.id.to_string(),
                    msg.workspace_id.to_string(),
                    msg.channel_id.map(|id| id.to_string()),
                    msg.conversation_id.map(|id| id.to_string()),
                    msg.parent_message_id.map(|id| id.to_string()),
                    msg.member_id.to_string(),
                    msg.body,
                    msg.image.map(|id| id.to_string()),
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN members mb ON mb.id = m.member_id
                 JOIN users u ON u.id = mb.user_id
                 WHERE m.id = ?1"
            );
            conn.query_row(&sql, [id.to_string()], message_from_row).optional()
        })
    }

    /// One page of a feed, newest first, starting strictly after `cursor`.
    /// Top-level feeds exclude thread replies.
    pub fn list_messages(&self, scope: &FeedScope, cursor: Option<&Cursor>, limit: u32) -> Result<Vec<MessageRow>> {
        let (filter, scope_id) = match scope {
            FeedScope::Channel(id) => ("m.channel_id = ?1 AND m.parent_message_id IS NULL", id),
            FeedScope::Conversation(id) => ("m.conversation_id = ?1 AND m.parent_message_id IS NULL", id),
            FeedScope::Thread(id) => ("m.parent_message_id = ?1", id),
        };

        // JOIN members/users to fetch the author profile in a single query
        self.with_conn(|conn| {
            let rows = match cursor {
                Some(c) => {
                    let sql = format!(
                        "SELECT {MESSAGE_COLUMNS}
                         FROM messages m
                         JOIN members mb ON mb.id = m.member_id
                         JOIN users u ON u.id = mb.user_id
                         WHERE {filter}
                           AND (m.created_at < ?2 OR (m.created_at = ?2 AND m.id < ?3))
                         ORDER BY m.created_at DESC, m.id DESC
                         LIMIT ?4"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map(
                            params![scope_id.to_string(), c.created_at, c.id.to_string(), limit],
                            message_from_row,
                        )?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let sql = format!(
                        "SELECT {MESSAGE_COLUMNS}
                         FROM messages m
                         JOIN members mb ON mb.id = m.member_id
                         JOIN users u ON u.id = mb.user_id
                         WHERE {filter}
                         ORDER BY m.created_at DESC, m.id DESC
                         LIMIT ?2"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map(params![scope_id.to_string(), limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
            };
            Ok(rows)
        })
    }

    /// Resolve the owner of a feed. `None` when the channel, conversation or
    /// thread parent does not exist.
    pub fn resolve_scope(&self, scope: &FeedScope) -> Result<Option<ScopeOwner>> {
        let conversation_id = match *scope {
            FeedScope::Channel(id) => {
                return Ok(self.get_channel(id)?.map(|channel| ScopeOwner {
                    workspace_id: channel.workspace_id,
                    conversation: None,
                }));
            }
            FeedScope::Conversation(id) => Some(id),
            FeedScope::Thread(parent) => match self.get_message(parent)? {
                Some(row) => match row.conversation_id {
                    Some(id) => Some(id),
                    None => {
                        return Ok(Some(ScopeOwner {
                            workspace_id: row.workspace_id,
                            conversation: None,
                        }));
                    }
                },
                None => return Ok(None),
            },
        };

        let Some(id) = conversation_id else {
            return Ok(None);
        };
        Ok(self.get_conversation(id)?.map(|conversation| ScopeOwner {
            workspace_id: conversation.workspace_id,
            conversation: Some(conversation),
        }))
    }

    /// Edits never touch `created_at`, so a message keeps its place in the feed.
    pub fn update_message_body(&self, id: Uuid, body: &str, updated_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET body = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), body, updated_at],
            )?;
            Ok(())
        })
    }

    /// Reactions on the message are removed with it.
    pub fn delete_message(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }

    /// Batch-fetch thread replies for a set of parent ids, oldest first.
    pub fn get_replies_for_messages(&self, parent_ids: &[Uuid]) -> Result<Vec<ReplyRow>> {
        if parent_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT m.parent_message_id, m.created_at, u.name, u.image
                 FROM messages m
                 JOIN members mb ON mb.id = m.member_id
                 JOIN users u ON u.id = mb.user_id
                 WHERE m.parent_message_id IN ({})
                 ORDER BY m.created_at ASC, m.id ASC",
                placeholders(parent_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(parent_ids.iter().map(|id| id.to_string())), |row| {
                    Ok(ReplyRow {
                        parent_message_id: uuid_col(row, 0)?,
                        created_at: row.get(1)?,
                        author_name: row.get(2)?,
                        author_image: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reactions --

    /// Toggle a reaction: removes if exists, inserts if not.
    /// Returns true when the reaction was added.
    pub fn toggle_reaction(
        &self,
        id: Uuid,
        workspace_id: Uuid,
        message_id: Uuid,
        member_id: Uuid,
        value: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM reactions WHERE message_id = ?1 AND member_id = ?2 AND value = ?3",
                    params![message_id.to_string(), member_id.to_string(), value],
                    |row| row.get(0),
                )
                .optional()?;

            let added = match existing {
                Some(existing_id) => {
                    tx.execute("DELETE FROM reactions WHERE id = ?1", [&existing_id])?;
                    false
                }
                None => {
                    tx.execute(
                        "INSERT INTO reactions (id, workspace_id, message_id, member_id, value)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            id.to_string(),
                            workspace_id.to_string(),
                            message_id.to_string(),
                            member_id.to_string(),
                            value
                        ],
                    )?;
                    true
                }
            };
            tx.commit()?;
            Ok(added)
        })
    }

    /// Batch-fetch reactions for a set of message ids, in insertion order.
    pub fn get_reactions_for_messages(&self, message_ids: &[Uuid]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, member_id, value FROM reactions
                 WHERE message_id IN ({}) ORDER BY rowid",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(message_ids.iter().map(|id| id.to_string())), |row| {
                    Ok(ReactionRow {
                        message_id: uuid_col(row, 0)?,
                        member_id: uuid_col(row, 1)?,
                        value: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: uuid_col(row, 0)?,
        workspace_id: uuid_col(row, 1)?,
        channel_id: opt_uuid_col(row, 2)?,
        conversation_id: opt_uuid_col(row, 3)?,
        parent_message_id: opt_uuid_col(row, 4)?,
        member_id: uuid_col(row, 5)?,
        author_user_id: uuid_col(row, 6)?,
        author_name: row.get(7)?,
        author_image: row.get(8)?,
        body: row.get(9)?,
        image: opt_uuid_col(row, 10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
