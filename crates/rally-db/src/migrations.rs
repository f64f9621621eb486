use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            password    TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        -- Membership set: the primary key makes add-to-set idempotent
        CREATE TABLE IF NOT EXISTS channel_members (
            channel_id  TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_channel_members_user
            ON channel_members(user_id);

        CREATE TABLE IF NOT EXISTS todo_lists (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            description TEXT,
            owner_id    TEXT NOT NULL,
            channel_id  TEXT REFERENCES channels(id) ON DELETE SET NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_todo_lists_owner
            ON todo_lists(owner_id);

        CREATE INDEX IF NOT EXISTS idx_todo_lists_channel
            ON todo_lists(channel_id);

        -- Tasks are embedded in their list: no life outside it
        CREATE TABLE IF NOT EXISTS tasks (
            list_id     TEXT NOT NULL REFERENCES todo_lists(id) ON DELETE CASCADE,
            id          TEXT NOT NULL,
            position    INTEGER NOT NULL,
            title       TEXT NOT NULL,
            description TEXT,
            completed   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            updated_by  TEXT NOT NULL,
            PRIMARY KEY (list_id, id)
        );

        CREATE TABLE IF NOT EXISTS push_subscriptions (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            endpoint        TEXT NOT NULL,
            p256dh          TEXT NOT NULL,
            auth            TEXT NOT NULL,
            expiration_time INTEGER,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_push_subscriptions_user
            ON push_subscriptions(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
