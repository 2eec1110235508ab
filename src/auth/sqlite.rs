// Credential persistence in a SQLite key/value table

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use super::store::CredentialStore;
use super::types::{expiration_from_lifetime, CredentialSnapshot, UserCredentials};

const KEY_TOKEN: &str = "token";
const KEY_TOKEN_EXPIRATION: &str = "token_expiration";
const KEY_USER_CREDENTIALS: &str = "user_credentials";
const KEY_USER_ID: &str = "user_id";

/// Credential store persisted across restarts
///
/// Values are cached in memory on open and written through on every change.
pub struct SqliteCredentialStore {
    conn: Connection,
    state: CredentialSnapshot,
}

impl SqliteCredentialStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create credentials directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create auth_kv table")?;

        let state = load_snapshot(&conn)?;
        tracing::debug!(
            has_token = state.token.is_some(),
            has_credentials = state.credentials.is_some(),
            user_id = ?state.user_id,
            "Loaded stored credentials"
        );

        Ok(Self { conn, state })
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )
            .with_context(|| format!("Failed to store {}", key))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM auth_kv WHERE key = ?", [key])
            .with_context(|| format!("Failed to delete {}", key))?;
        Ok(())
    }
}

fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
    .with_context(|| format!("Failed to load {} from SQLite", key))
}

fn load_snapshot(conn: &Connection) -> Result<CredentialSnapshot> {
    let token = get(conn, KEY_TOKEN)?;

    // Unreadable values are treated as absent rather than failing the open
    let expires_at = get(conn, KEY_TOKEN_EXPIRATION)?.and_then(|s| match parse_datetime(&s) {
        Ok(dt) => Some(dt),
        Err(e) => {
            tracing::warn!("Ignoring stored token expiration: {}", e);
            None
        }
    });

    let credentials = get(conn, KEY_USER_CREDENTIALS)?.and_then(|s| {
        match serde_json::from_str::<UserCredentials>(&s) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Ignoring stored user credentials: {}", e);
                None
            }
        }
    });

    let user_id = get(conn, KEY_USER_ID)?.and_then(|s| s.parse::<i64>().ok());

    Ok(CredentialSnapshot {
        token,
        expires_at,
        credentials,
        user_id,
    })
}

/// Parse datetime from various ISO 8601 formats
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Handle Z suffix
    let normalized = if s.ends_with('Z') {
        s.replace('Z', "+00:00")
    } else {
        s.to_string()
    };

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse datetime: {}", s))
}

impl CredentialStore for SqliteCredentialStore {
    fn token(&self) -> Option<String> {
        self.state.token.clone()
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.expires_at
    }

    fn credentials(&self) -> Option<UserCredentials> {
        self.state.credentials.clone()
    }

    fn user_id(&self) -> Option<i64> {
        self.state.user_id
    }

    fn set_token(&mut self, token: &str, expires_in_secs: Option<i64>) -> Result<()> {
        self.put(KEY_TOKEN, token)?;
        self.state.token = Some(token.to_string());

        if let Some(secs) = expires_in_secs {
            let expires_at = expiration_from_lifetime(Utc::now(), secs);
            self.put(KEY_TOKEN_EXPIRATION, &expires_at.to_rfc3339())?;
            self.state.expires_at = Some(expires_at);
        }
        Ok(())
    }

    fn set_user_id(&mut self, user_id: i64) -> Result<()> {
        self.put(KEY_USER_ID, &user_id.to_string())?;
        self.state.user_id = Some(user_id);
        Ok(())
    }

    fn set_credentials(&mut self, credentials: Option<UserCredentials>) -> Result<()> {
        match &credentials {
            Some(creds) => {
                let encoded =
                    serde_json::to_string(creds).context("Failed to encode user credentials")?;
                self.put(KEY_USER_CREDENTIALS, &encoded)?;
            }
            None => self.delete(KEY_USER_CREDENTIALS)?,
        }
        self.state.credentials = credentials;
        Ok(())
    }

    fn snapshot(&self) -> CredentialSnapshot {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime() {
        // Test with Z suffix
        let dt = parse_datetime("2025-01-12T10:30:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-12T10:30:00+00:00");

        // Test with timezone
        let dt = parse_datetime("2025-01-12T10:30:00+00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-12T10:30:00+00:00");
    }

    #[test]
    fn test_empty_database() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        assert_eq!(store.snapshot(), CredentialSnapshot::default());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.sqlite3");

        {
            let mut store = SqliteCredentialStore::open(&path).unwrap();
            store
                .set_credentials(Some(UserCredentials::new("alice", "secret")))
                .unwrap();
            store.set_token("T1", Some(3600)).unwrap();
            store.set_user_id(42).unwrap();
        }

        let store = SqliteCredentialStore::open(&path).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.valid_token(), Some("T1"));
        assert_eq!(snap.user_id, Some(42));
        assert_eq!(snap.credentials, Some(UserCredentials::new("alice", "secret")));
        assert!(snap.expires_at.is_some());
    }

    #[test]
    fn test_clearing_credentials_removes_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.sqlite3");

        {
            let mut store = SqliteCredentialStore::open(&path).unwrap();
            store
                .set_credentials(Some(UserCredentials::new("alice", "secret")))
                .unwrap();
            store.set_credentials(None).unwrap();
        }

        let store = SqliteCredentialStore::open(&path).unwrap();
        assert!(store.credentials().is_none());
    }

    #[test]
    fn test_corrupt_expiration_is_ignored() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        store.put(KEY_TOKEN, "T1").unwrap();
        store.put(KEY_TOKEN_EXPIRATION, "not a date").unwrap();

        let snap = load_snapshot(&store.conn).unwrap();
        assert_eq!(snap.token.as_deref(), Some("T1"));
        assert!(snap.expires_at.is_none());
    }
}
