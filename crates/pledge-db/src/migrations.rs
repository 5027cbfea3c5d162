use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            name        TEXT,
            image       TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS promises (
            id               TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL,
            promise_to       TEXT NOT NULL,
            recipient_email  TEXT,
            expiry_date      TEXT,
            is_recurring     INTEGER NOT NULL DEFAULT 0,
            recurring_period TEXT CHECK (recurring_period IN ('WEEKLY', 'MONTHLY')),
            vow_template     TEXT,
            vow              TEXT,
            proof_comment    TEXT,
            theme            TEXT,
            proof_image      TEXT,
            voice_recording  TEXT,
            is_secret        INTEGER NOT NULL DEFAULT 0,
            reveal_date      TEXT,
            status           TEXT NOT NULL DEFAULT 'ACTIVE'
                                 CHECK (status IN ('ACTIVE', 'FULFILLED', 'CANCELLED')),
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            creator_id       TEXT NOT NULL REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_promises_creator
            ON promises(creator_id, created_at);

        CREATE TABLE IF NOT EXISTS reminders (
            id          TEXT PRIMARY KEY,
            promise_id  TEXT NOT NULL REFERENCES promises(id),
            date        TEXT NOT NULL,
            sent        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reminders_promise
            ON reminders(promise_id);

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            promise_id  TEXT NOT NULL REFERENCES promises(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_promise
            ON reactions(promise_id);

        CREATE TABLE IF NOT EXISTS challenges (
            id             TEXT PRIMARY KEY,
            promise_id     TEXT NOT NULL REFERENCES promises(id),
            challenger_id  TEXT NOT NULL REFERENCES users(id),
            message        TEXT NOT NULL,
            created_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_challenges_promise
            ON challenges(promise_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
