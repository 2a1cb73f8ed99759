use rusqlite::Connection;

use crate::error::Result;

/// Creates the `sessions` table if it doesn't already exist. Idempotent —
/// safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id               TEXT PRIMARY KEY,
            session_key      TEXT NOT NULL UNIQUE,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            system_sent      INTEGER NOT NULL DEFAULT 0,
            think_default    TEXT NOT NULL DEFAULT 'off',
            verbose_default  TEXT NOT NULL DEFAULT 'off',
            abort_pending    INTEGER NOT NULL DEFAULT 0
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions (updated_at DESC);",
    )?;
    Ok(())
}
