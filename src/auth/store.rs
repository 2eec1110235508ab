// Credential store boundary and in-memory implementation

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::types::{expiration_from_lifetime, CredentialSnapshot, UserCredentials};

/// Holds the token, its expiration, the user id and the long-lived credentials
///
/// Getters return the raw stored values; expiry is applied by
/// `CredentialSnapshot::valid_token`. Setters persist immediately.
pub trait CredentialStore: Send {
    fn token(&self) -> Option<String>;
    fn expires_at(&self) -> Option<DateTime<Utc>>;
    fn credentials(&self) -> Option<UserCredentials>;
    fn user_id(&self) -> Option<i64>;

    /// Store a token; `expires_in_secs` of `None` keeps the previous expiration
    fn set_token(&mut self, token: &str, expires_in_secs: Option<i64>) -> Result<()>;
    fn set_user_id(&mut self, user_id: i64) -> Result<()>;
    fn set_credentials(&mut self, credentials: Option<UserCredentials>) -> Result<()>;

    fn snapshot(&self) -> CredentialSnapshot {
        CredentialSnapshot {
            token: self.token(),
            expires_at: self.expires_at(),
            credentials: self.credentials(),
            user_id: self.user_id(),
        }
    }
}

/// Volatile store, for tests and embedders that persist elsewhere
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    state: CredentialSnapshot,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: UserCredentials) -> Self {
        Self {
            state: CredentialSnapshot {
                credentials: Some(credentials),
                ..Default::default()
            },
        }
    }

    pub fn from_snapshot(state: CredentialSnapshot) -> Self {
        Self { state }
    }
}

impl CredentialStore for MemoryCredentialStore {
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
        self.state.token = Some(token.to_string());
        if let Some(secs) = expires_in_secs {
            self.state.expires_at = Some(expiration_from_lifetime(Utc::now(), secs));
        }
        Ok(())
    }

    fn set_user_id(&mut self, user_id: i64) -> Result<()> {
        self.state.user_id = Some(user_id);
        Ok(())
    }

    fn set_credentials(&mut self, credentials: Option<UserCredentials>) -> Result<()> {
        self.state.credentials = credentials;
        Ok(())
    }

    fn snapshot(&self) -> CredentialSnapshot {
        self.state.clone()
    }
}
