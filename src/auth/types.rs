// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token lifetime assumed when the server omits one (effectively non-expiring)
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1_000_000_000;

/// Long-lived user credentials used to obtain fresh tokens
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub login: String,
    pub password: String,
}

impl UserCredentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login/register response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub user_id: i64,
    pub token_lifetime: Option<i64>,
}

impl AuthResponse {
    /// Lifetime in seconds, falling back to `DEFAULT_TOKEN_LIFETIME_SECS`
    pub fn lifetime_seconds(&self) -> i64 {
        self.token_lifetime.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
    }

    /// Recognize an auth response inside an arbitrary decoded payload
    ///
    /// A payload counts as an auth response when it carries both an access
    /// token and a user id.
    pub fn detect(value: &serde_json::Value) -> Option<Self> {
        let object = value.as_object()?;
        if !object.contains_key("access_token") || !object.contains_key("user_id") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Upload response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
}

/// Registration user block
#[derive(Debug, Clone, Serialize)]
pub struct RegisterUser {
    pub name: String,
    pub family_name: String,
    pub username: String,
}

/// Registration request
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub user: RegisterUser,
    pub password: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable view of the credential state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialSnapshot {
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub credentials: Option<UserCredentials>,
    pub user_id: Option<i64>,
}

impl CredentialSnapshot {
    /// Token usable at `now`; expired or empty tokens count as absent
    pub fn token_at(&self, now: DateTime<Utc>) -> Option<&str> {
        if matches!(self.expires_at, Some(exp) if exp <= now) {
            return None;
        }
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn valid_token(&self) -> Option<&str> {
        self.token_at(Utc::now())
    }
}

/// Absolute expiration for a lifetime in seconds, saturating on overflow
pub fn expiration_from_lifetime(now: DateTime<Utc>, lifetime_secs: i64) -> DateTime<Utc> {
    Duration::try_seconds(lifetime_secs)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn snapshot(token: &str, expires_at: Option<DateTime<Utc>>) -> CredentialSnapshot {
        CredentialSnapshot {
            token: Some(token.to_string()),
            expires_at,
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_auth_response() {
        let value = json!({
            "access_token": "T1",
            "refresh_token": "R1",
            "user_id": 42,
            "token_lifetime": 3600
        });
        let auth = AuthResponse::detect(&value).unwrap();
        assert_eq!(auth.access_token, "T1");
        assert_eq!(auth.user_id, 42);
        assert_eq!(auth.lifetime_seconds(), 3600);
    }

    #[test]
    fn test_detect_ignores_other_payloads() {
        assert!(AuthResponse::detect(&json!({"filename": "a.jpg"})).is_none());
        assert!(AuthResponse::detect(&json!([{"access_token": "x", "user_id": 1}])).is_none());
        assert!(AuthResponse::detect(&json!({"access_token": "x"})).is_none());
    }

    #[test]
    fn test_missing_lifetime_defaults_to_large_value() {
        let auth = AuthResponse::detect(&json!({
            "access_token": "T",
            "refresh_token": "R",
            "user_id": 1
        }))
        .unwrap();
        assert_eq!(auth.lifetime_seconds(), DEFAULT_TOKEN_LIFETIME_SECS);
    }

    #[test]
    fn test_token_without_expiration_is_valid() {
        assert_eq!(snapshot("abc", None).valid_token(), Some("abc"));
    }

    #[test]
    fn test_empty_token_is_absent() {
        let snap = snapshot("", Some(Utc::now() + Duration::hours(1)));
        assert_eq!(snap.valid_token(), None);
    }

    #[test]
    fn test_expiration_boundary_is_exclusive() {
        let now = Utc::now();
        assert_eq!(snapshot("abc", Some(now)).token_at(now), None);
        assert_eq!(
            snapshot("abc", Some(now + Duration::seconds(1))).token_at(now),
            Some("abc")
        );
    }

    #[test]
    fn test_expiration_saturates() {
        let now = Utc::now();
        assert_eq!(expiration_from_lifetime(now, i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            expiration_from_lifetime(now, 3600),
            now + Duration::seconds(3600)
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = UserCredentials::new("alice", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    proptest! {
        #[test]
        fn expired_tokens_are_always_absent(secs_ago in 0i64..10_000_000, token in "[a-zA-Z0-9]{1,32}") {
            let now = Utc::now();
            let snap = snapshot(&token, Some(now - Duration::seconds(secs_ago)));
            prop_assert_eq!(snap.token_at(now), None);
        }

        #[test]
        fn future_tokens_are_present(secs_ahead in 1i64..10_000_000, token in "[a-zA-Z0-9]{1,32}") {
            let now = Utc::now();
            let snap = snapshot(&token, Some(now + Duration::seconds(secs_ahead)));
            prop_assert_eq!(snap.token_at(now), Some(token.as_str()));
        }
    }
}
