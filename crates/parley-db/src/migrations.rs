use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            subject     TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL,
            image_url   TEXT NOT NULL DEFAULT '',
            created_at  INTEGER NOT NULL
        );

        -- direct_key holds the sorted member pair of a direct conversation so
        -- two users can never end up with two direct conversations.
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            is_group    INTEGER NOT NULL,
            group_name  TEXT,
            direct_key  TEXT UNIQUE,
            created_at  INTEGER NOT NULL,
            CHECK ((is_group = 1) = (group_name IS NOT NULL))
        );

        -- last_seen_message_id is a weak pointer: no foreign key, resolved at read time.
        CREATE TABLE IF NOT EXISTS conversation_members (
            conversation_id         TEXT NOT NULL REFERENCES conversations(id),
            user_id                 TEXT NOT NULL REFERENCES users(id),
            last_seen_message_id    TEXT,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON conversation_members(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, seq);

        CREATE TABLE IF NOT EXISTS reactions (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS presence (
            user_id     TEXT PRIMARY KEY REFERENCES users(id),
            updated_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS typing (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            updated_at      INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
