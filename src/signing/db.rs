use std::cell::Cell;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::models::*;

/// Async-safe handle to the signing database.
///
/// Wraps `SigningDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<SigningDb>>,
}

impl DbHandle {
    pub fn new(db: SigningDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&SigningDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

/// Result of trying to insert a signature.
#[derive(Debug)]
pub enum RecordOutcome {
    Recorded(Signature),
    /// The (initiative, signer) pair already has a signature.
    Duplicate,
}

/// Expired sessions are swept once every this many session writes.
pub const SESSION_PURGE_INTERVAL: u64 = 64;

const DEFAULT_SESSION_TTL_HOURS: u32 = 24;

pub struct SigningDb {
    conn: Connection,
    session_ttl_hours: u32,
    session_writes: Cell<u64>,
}

impl SigningDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self::from_connection(conn);
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self::from_connection(conn);
        db.init()?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            session_writes: Cell::new(0),
        }
    }

    /// Age after which sessions are swept on the write path.
    pub fn with_session_ttl(mut self, ttl_hours: u32) -> Self {
        self.session_ttl_hours = ttl_hours;
        self
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS initiative_types (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    collects_extra_fields INTEGER NOT NULL DEFAULT 0,
                    requires_sms_verification INTEGER NOT NULL DEFAULT 0,
                    extra_fields_legal_text TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS initiatives (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    type_id INTEGER NOT NULL REFERENCES initiative_types(id),
                    state TEXT NOT NULL DEFAULT 'created',
                    online_votes INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS signatures (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    initiative_id INTEGER NOT NULL REFERENCES initiatives(id) ON DELETE CASCADE,
                    signer_id TEXT NOT NULL,
                    extra_fields TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(initiative_id, signer_id)
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    data TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_initiatives_type ON initiatives(type_id);
                CREATE INDEX IF NOT EXISTS idx_signatures_initiative ON signatures(initiative_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Initiative types ──────────────────────────────────────────────

    pub fn create_initiative_type(
        &self,
        title: &str,
        collects_extra_fields: bool,
        requires_sms_verification: bool,
        extra_fields_legal_text: &str,
    ) -> Result<InitiativeType> {
        self.conn
            .execute(
                "INSERT INTO initiative_types (title, collects_extra_fields, requires_sms_verification, extra_fields_legal_text)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    title,
                    collects_extra_fields,
                    requires_sms_verification,
                    extra_fields_legal_text
                ],
            )
            .context("Failed to insert initiative type")?;
        let id = self.conn.last_insert_rowid();
        self.get_initiative_type(id)?
            .context("Initiative type not found after insert")
    }

    pub fn get_initiative_type(&self, id: i64) -> Result<Option<InitiativeType>> {
        self.conn
            .query_row(
                "SELECT id, title, collects_extra_fields, requires_sms_verification, extra_fields_legal_text
                 FROM initiative_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(InitiativeType {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        collects_extra_fields: row.get(2)?,
                        requires_sms_verification: row.get(3)?,
                        extra_fields_legal_text: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to query initiative type")
    }

    pub fn find_initiative_type_by_title(&self, title: &str) -> Result<Option<InitiativeType>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM initiative_types WHERE title = ?1 ORDER BY id LIMIT 1",
                params![title],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query initiative type by title")?;
        match id {
            Some(id) => self.get_initiative_type(id),
            None => Ok(None),
        }
    }

    /// Change which signing steps an initiative type requires.
    pub fn update_initiative_type_requirements(
        &self,
        id: i64,
        collects_extra_fields: bool,
        requires_sms_verification: bool,
    ) -> Result<InitiativeType> {
        self.conn
            .execute(
                "UPDATE initiative_types SET collects_extra_fields = ?1, requires_sms_verification = ?2 WHERE id = ?3",
                params![collects_extra_fields, requires_sms_verification, id],
            )
            .context("Failed to update initiative type")?;
        self.get_initiative_type(id)?
            .context("Initiative type not found after update")
    }

    pub fn update_initiative_type_legal_text(&self, id: i64, legal_text: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE initiative_types SET extra_fields_legal_text = ?1 WHERE id = ?2",
                params![legal_text, id],
            )
            .context("Failed to update initiative type legal text")?;
        Ok(())
    }

    // ── Initiatives ───────────────────────────────────────────────────

    pub fn create_initiative(
        &self,
        title: &str,
        type_id: i64,
        state: InitiativeState,
    ) -> Result<Initiative> {
        self.conn
            .execute(
                "INSERT INTO initiatives (title, type_id, state) VALUES (?1, ?2, ?3)",
                params![title, type_id, state.as_str()],
            )
            .context("Failed to insert initiative")?;
        let id = self.conn.last_insert_rowid();
        self.get_initiative(id)?
            .context("Initiative not found after insert")
    }

    pub fn get_initiative(&self, id: i64) -> Result<Option<Initiative>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, type_id, state, online_votes, created_at FROM initiatives WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query initiative")?;
        match row {
            Some((id, title, type_id, state, online_votes, created_at)) => Ok(Some(Initiative {
                id,
                title,
                type_id,
                state: InitiativeState::from_str(&state).map_err(|e| anyhow::anyhow!(e))?,
                online_votes,
                created_at,
            })),
            None => Ok(None),
        }
    }

    /// The initiative together with its type, as the signing wizard sees it.
    pub fn current_initiative(&self, id: i64) -> Result<Option<CurrentInitiative>> {
        let Some(initiative) = self.get_initiative(id)? else {
            return Ok(None);
        };
        let initiative_type = self
            .get_initiative_type(initiative.type_id)?
            .with_context(|| {
                format!(
                    "Initiative {} references missing type {}",
                    id, initiative.type_id
                )
            })?;
        Ok(Some(CurrentInitiative {
            initiative,
            initiative_type,
        }))
    }

    pub fn update_initiative_state(&self, id: i64, state: InitiativeState) -> Result<Initiative> {
        self.conn
            .execute(
                "UPDATE initiatives SET state = ?1 WHERE id = ?2",
                params![state.as_str(), id],
            )
            .context("Failed to update initiative state")?;
        self.get_initiative(id)?
            .context("Initiative not found after state update")
    }

    // ── Signatures ────────────────────────────────────────────────────

    /// Insert a signature and bump the initiative's vote counter in one
    /// transaction. The UNIQUE(initiative_id, signer_id) constraint decides
    /// between concurrent writers.
    pub fn record_signature(
        &self,
        initiative_id: i64,
        signer_id: &str,
        extra_fields: Option<&ExtraFields>,
    ) -> Result<RecordOutcome> {
        let extra_json = extra_fields
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize extra fields")?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin signature transaction")?;
        let inserted = tx.execute(
            "INSERT INTO signatures (initiative_id, signer_id, extra_fields) VALUES (?1, ?2, ?3)",
            params![initiative_id, signer_id, extra_json],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                // dropping the transaction rolls it back
                return Ok(RecordOutcome::Duplicate);
            }
            Err(e) => return Err(anyhow::anyhow!("Failed to insert signature: {}", e)),
        }
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE initiatives SET online_votes = online_votes + 1 WHERE id = ?1",
            params![initiative_id],
        )
        .context("Failed to update vote count")?;
        tx.commit().context("Failed to commit signature")?;

        let signature = self
            .get_signature(id)?
            .context("Signature not found after insert")?;
        Ok(RecordOutcome::Recorded(signature))
    }

    pub fn get_signature(&self, id: i64) -> Result<Option<Signature>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, initiative_id, signer_id, extra_fields, created_at FROM signatures WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query signature")?;
        match row {
            Some((id, initiative_id, signer_id, extra_json, created_at)) => {
                let extra_fields = extra_json
                    .map(|json| serde_json::from_str::<ExtraFields>(&json))
                    .transpose()
                    .context("Failed to parse stored extra fields")?;
                Ok(Some(Signature {
                    id,
                    initiative_id,
                    signer_id,
                    extra_fields,
                    created_at,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn count_signatures(&self, initiative_id: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM signatures WHERE initiative_id = ?1",
                params![initiative_id],
                |row| row.get(0),
            )
            .context("Failed to count signatures")
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn load_session(&self, id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT data FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to load session")
    }

    /// Upsert a session record. Every [`SESSION_PURGE_INTERVAL`] writes also
    /// sweeps sessions older than the configured TTL.
    pub fn save_session(&self, id: &str, data: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (id, data) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = datetime('now')",
                params![id, data],
            )
            .context("Failed to save session")?;

        let writes = self.session_writes.get() + 1;
        self.session_writes.set(writes);
        if writes % SESSION_PURGE_INTERVAL == 0 {
            let purged = self.purge_sessions(self.session_ttl_hours)?;
            if purged > 0 {
                debug!(purged, "expired sessions swept");
            }
        }
        Ok(())
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])
            .context("Failed to delete session")?;
        Ok(affected > 0)
    }

    /// Delete sessions not written for `ttl_hours`. Returns how many were removed.
    pub fn purge_sessions(&self, ttl_hours: u32) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM sessions WHERE updated_at < datetime('now', ?1)",
                params![format!("-{} hours", ttl_hours)],
            )
            .context("Failed to purge sessions")
    }
}
