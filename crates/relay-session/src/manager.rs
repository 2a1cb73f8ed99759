//! Persistent session store: a single-writer SQLite table behind a mutex,
//! the only component allowed to mutate `Session` records.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use relay_core::types::{Session, ThinkLevel, VerboseLevel};

use crate::db::init_db;
use crate::error::{Result, SessionError};

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(SessionStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(SessionStore { conn: Mutex::new(conn) })
    }

    /// Returns the session for `key`, creating one if none exists, the
    /// existing one is expired, or a reset was requested. Returns
    /// `(session, is_new, is_first_turn)`; a freshly created session is
    /// always both new and on its first turn.
    #[instrument(skip(self), fields(key = %key))]
    pub fn get(&self, key: &str, reset_requested: bool, idle_minutes: i64) -> Result<(Session, bool, bool)> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        let existing = query_session(&conn, key)?;

        let needs_fresh = match &existing {
            None => true,
            Some(s) => reset_requested || s.is_expired(Utc::now(), idle_minutes),
        };

        if !needs_fresh {
            let session = existing.expect("checked above");
            return Ok((session, false, false));
        }

        if existing.is_some() {
            conn.execute("DELETE FROM sessions WHERE session_key = ?1", params![key])?;
        }

        let now = Utc::now();
        let id = Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO sessions (id, session_key, created_at, updated_at, system_sent, think_default, verbose_default, abort_pending)
             VALUES (?1, ?2, ?3, ?3, 0, 'off', 'off', 0)",
            params![id, key, now.to_rfc3339()],
        )?;

        let session = query_session(&conn, key)?.ok_or_else(|| SessionError::NotFound { key: key.to_string() })?;
        Ok((session, true, true))
    }

    /// Updates `updated_at` to now. Called on the user-initiated path only
    /// — heartbeat probes must never call this.
    #[instrument(skip(self), fields(key = %key))]
    pub fn touch(&self, key: &str) -> Result<()> {
        self.update_field(key, "updated_at", &Utc::now().to_rfc3339())
    }

    #[instrument(skip(self), fields(key = %key))]
    pub fn set_system_sent(&self, key: &str) -> Result<()> {
        self.update_bool_field(key, "system_sent", true)
    }

    #[instrument(skip(self), fields(key = %key, level = %level))]
    pub fn set_think_default(&self, key: &str, level: ThinkLevel) -> Result<()> {
        self.update_field(key, "think_default", &level.to_string())
    }

    #[instrument(skip(self), fields(key = %key, level = %level))]
    pub fn set_verbose_default(&self, key: &str, level: VerboseLevel) -> Result<()> {
        self.update_field(key, "verbose_default", &level.to_string())
    }

    #[instrument(skip(self), fields(key = %key, pending))]
    pub fn set_abort_pending(&self, key: &str, pending: bool) -> Result<()> {
        self.update_bool_field(key, "abort_pending", pending)
    }

    /// Lists every session key currently on record, for the heartbeat
    /// scheduler to sweep. Order is unspecified.
    #[instrument(skip(self))]
    pub fn active_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        let mut stmt = conn.prepare("SELECT session_key FROM sessions")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Fetches a session snapshot without creating or resetting it.
    #[instrument(skip(self), fields(key = %key))]
    pub fn peek(&self, key: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        query_session(&conn, key)
    }

    /// Atomic read-modify-write over a session record.
    #[instrument(skip(self, updater), fields(key = %key))]
    pub fn for_session<F>(&self, key: &str, updater: F) -> Result<Session>
    where
        F: FnOnce(&mut Session),
    {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        let mut session = query_session(&conn, key)?.ok_or_else(|| SessionError::NotFound { key: key.to_string() })?;
        updater(&mut session);
        conn.execute(
            "UPDATE sessions SET updated_at = ?1, system_sent = ?2, think_default = ?3, verbose_default = ?4, abort_pending = ?5
             WHERE session_key = ?6",
            params![
                session.updated_at.to_rfc3339(),
                session.system_sent as i64,
                session.think_default.to_string(),
                session.verbose_default.to_string(),
                session.abort_pending as i64,
                key,
            ],
        )?;
        Ok(session)
    }

    fn update_field(&self, key: &str, column: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        let sql = format!("UPDATE sessions SET {column} = ?1 WHERE session_key = ?2");
        let changed = conn.execute(&sql, params![value, key])?;
        if changed == 0 {
            return Err(SessionError::NotFound { key: key.to_string() });
        }
        Ok(())
    }

    fn update_bool_field(&self, key: &str, column: &str, value: bool) -> Result<()> {
        self.update_field(key, column, if value { "1" } else { "0" })
    }
}

fn query_session(conn: &Connection, key: &str) -> Result<Option<Session>> {
    conn.query_row(
        "SELECT id, session_key, created_at, updated_at, system_sent, think_default, verbose_default, abort_pending
         FROM sessions WHERE session_key = ?1",
        params![key],
        row_to_session,
    )
    .optional()
    .map_err(SessionError::from)
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let created_at: String = row.get(2)?;
    let updated_at: String = row.get(3)?;
    let think_default: String = row.get(5)?;
    let verbose_default: String = row.get(6)?;
    Ok(Session {
        id: row.get(0)?,
        key: row.get(1)?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
        system_sent: row.get::<_, i64>(4)? != 0,
        think_default: ThinkLevel::parse(&think_default).unwrap_or_default(),
        verbose_default: VerboseLevel::parse(&verbose_default).unwrap_or_default(),
        abort_pending: row.get::<_, i64>(7)? != 0,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_creates_a_fresh_session_when_none_exists() {
        let store = SessionStore::open_in_memory().unwrap();
        let (session, is_new, is_first) = store.get("+15551234567", false, 30).unwrap();
        assert!(is_new);
        assert!(is_first);
        assert_eq!(session.key, "+15551234567");
        assert!(!session.system_sent);
    }

    #[test]
    fn get_returns_existing_session_when_fresh() {
        let store = SessionStore::open_in_memory().unwrap();
        let (first, _, _) = store.get("a", false, 30).unwrap();
        let (second, is_new, is_first) = store.get("a", false, 30).unwrap();
        assert!(!is_new);
        assert!(!is_first);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn get_with_reset_requested_issues_a_new_id() {
        let store = SessionStore::open_in_memory().unwrap();
        let (first, _, _) = store.get("a", false, 30).unwrap();
        let (second, is_new, _) = store.get("a", true, 30).unwrap();
        assert!(is_new);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn touch_does_not_change_think_default() {
        let store = SessionStore::open_in_memory().unwrap();
        store.get("a", false, 30).unwrap();
        store.set_think_default("a", ThinkLevel::High).unwrap();
        store.touch("a").unwrap();
        let (session, _, _) = store.get("a", false, 30).unwrap();
        assert_eq!(session.think_default, ThinkLevel::High);
    }

    #[test]
    fn for_session_applies_atomic_updates() {
        let store = SessionStore::open_in_memory().unwrap();
        store.get("a", false, 30).unwrap();
        let updated = store
            .for_session("a", |s| {
                s.abort_pending = true;
                s.verbose_default = VerboseLevel::On;
            })
            .unwrap();
        assert!(updated.abort_pending);
        assert_eq!(updated.verbose_default, VerboseLevel::On);
    }

    #[test]
    fn set_think_default_on_unknown_key_errors() {
        let store = SessionStore::open_in_memory().unwrap();
        let err = store.set_think_default("nope", ThinkLevel::Low).unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[test]
    fn active_keys_lists_every_session() {
        let store = SessionStore::open_in_memory().unwrap();
        store.get("a", false, 30).unwrap();
        store.get("b", false, 30).unwrap();
        let mut keys = store.active_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn peek_does_not_create_a_session() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(store.peek("ghost").unwrap().is_none());
        assert!(store.active_keys().unwrap().is_empty());
    }
}
