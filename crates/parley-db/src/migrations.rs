use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Timestamps are stored as unix milliseconds so feeds can order and page on them.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            image       TEXT
        );

        CREATE TABLE IF NOT EXISTS workspaces (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            user_id     TEXT NOT NULL REFERENCES users(id),
            join_code   TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS members (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id),
            role            TEXT NOT NULL CHECK (role IN ('admin', 'member')),
            UNIQUE(workspace_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON members(user_id);

        CREATE TABLE IF NOT EXISTS channels (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channels_workspace
            ON channels(workspace_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            member_one_id   TEXT NOT NULL REFERENCES members(id),
            member_two_id   TEXT NOT NULL REFERENCES members(id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_one
            ON conversations(member_one_id);
        CREATE INDEX IF NOT EXISTS idx_conversations_two
            ON conversations(member_two_id);

        CREATE TABLE IF NOT EXISTS files (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            content_type    TEXT NOT NULL,
            size            INTEGER NOT NULL,
            sha256          TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS upload_tickets (
            token       TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            expires_at  INTEGER NOT NULL,
            used        INTEGER NOT NULL DEFAULT 0
        );

        -- parent_message_id has no foreign key: replies outlive a deleted parent.
        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            workspace_id        TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            channel_id          TEXT REFERENCES channels(id) ON DELETE CASCADE,
            conversation_id     TEXT REFERENCES conversations(id) ON DELETE CASCADE,
            parent_message_id   TEXT,
            member_id           TEXT NOT NULL REFERENCES members(id),
            body                TEXT NOT NULL,
            image               TEXT REFERENCES files(id),
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER,
            CHECK ((channel_id IS NULL) <> (conversation_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, parent_message_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, parent_message_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_message_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_member
            ON messages(member_id);

        CREATE TABLE IF NOT EXISTS reactions (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            message_id      TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            member_id       TEXT NOT NULL REFERENCES members(id),
            value           TEXT NOT NULL,
            UNIQUE(message_id, member_id, value)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);
        CREATE INDEX IF NOT EXISTS idx_reactions_member
            ON reactions(member_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
