use bytes::Bytes;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::{
    AuthResponse, CredentialSnapshot, CredentialStore, RegisterRequest, UploadResponse,
    UserCredentials,
};
use crate::endpoint::{AuthEndpoint, Endpoint};
use crate::error::{ApiError, Result};
use crate::transport::{
    HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport, TransportError,
};

/// Default bound on a refresh login call
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Marketplace API client with transparent token refresh
///
/// All credential reads and writes go through one lock. The lock is held
/// only for the auth decision and for committing results, except during a
/// refresh, where it is held across the login call so that at most one
/// refresh runs at a time and concurrent callers wait for its outcome.
pub struct MarketClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    store: Mutex<Box<dyn CredentialStore>>,
    refresh_timeout: Duration,
}

impl MarketClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Box<dyn CredentialStore>,
        base_url: Url,
    ) -> Self {
        Self {
            transport,
            base_url,
            store: Mutex::new(store),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Current credential state
    pub async fn snapshot(&self) -> CredentialSnapshot {
        self.store.lock().await.snapshot()
    }

    pub async fn user_id(&self) -> Option<i64> {
        self.store.lock().await.user_id()
    }

    /// `fetch` without a request body
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T> {
        self.fetch::<T, ()>(endpoint, None).await
    }

    /// Execute `endpoint` and decode its JSON response
    ///
    /// Automatically handles:
    /// - missing or expired token: refreshes before sending
    /// - 401: refreshes and replays the request once
    ///
    /// Auth responses (payloads with `access_token` and `user_id`) are
    /// committed to the credential store before returning.
    pub async fn fetch<T, B>(&self, endpoint: &Endpoint, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = encode_json_body(endpoint, body)?;
        let mut refreshed = false;

        loop {
            let token = self.current_token().await;

            if endpoint.requires_auth() && token.is_none() {
                if refreshed {
                    return Err(ApiError::Auth(
                        "No valid token after re-authentication".to_string(),
                    ));
                }
                tracing::debug!(path = endpoint.path(), "No valid token, refreshing before send");
                self.refresh_token(None).await?;
                refreshed = true;
                continue;
            }

            let request = self.build_request(endpoint, token.as_deref(), body.clone())?;
            match self.transport.send(request).await {
                Ok(response) => return self.decode_and_commit(response).await,
                Err(e) if e.is_unauthorized() && endpoint.requires_auth() && !refreshed => {
                    tracing::warn!(
                        path = endpoint.path(),
                        "Received 401, refreshing token and retrying..."
                    );
                    self.refresh_token(token.as_deref()).await?;
                    refreshed = true;
                }
                Err(e) => {
                    tracing::debug!(path = endpoint.path(), error = %e, "Request failed");
                    return Err(ApiError::Network(e));
                }
            }
        }
    }

    /// Fetch raw bytes from a GET endpoint
    ///
    /// A 401 here is returned to the caller without a refresh.
    pub async fn download(&self, endpoint: &Endpoint) -> Result<Bytes> {
        if *endpoint.method() != Method::GET {
            return Err(ApiError::Download(
                "Download should have GET method".to_string(),
            ));
        }

        let token = if endpoint.requires_auth() {
            self.current_token().await
        } else {
            None
        };

        let request = self.build_request(endpoint, token.as_deref(), None)?;
        let response = self.transport.send(request).await?;

        if response.body.is_empty() {
            return Err(ApiError::Download("No data received".to_string()));
        }
        Ok(response.body)
    }

    /// Upload a JPEG photo for an item
    ///
    /// Requires a valid token up front when the endpoint is authorized; no
    /// refresh is attempted.
    pub async fn upload_photo(
        &self,
        endpoint: &Endpoint,
        data: impl Into<Bytes>,
        item_id: i64,
    ) -> Result<UploadResponse> {
        let token = self.current_token().await;
        if endpoint.requires_auth() && token.is_none() {
            return Err(ApiError::Auth(
                "Sign in again to upload photos".to_string(),
            ));
        }

        let form = MultipartForm::new()
            .file("photo", data, "photo.jpg", "image/jpeg")
            .text("itemId", item_id.to_string());

        // The transport sets Content-Type with the boundary and the exact Content-Length
        let mut headers: Vec<(String, String)> = endpoint
            .headers()
            .iter()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case("Content-Type")
                    && !name.eq_ignore_ascii_case("Content-Length")
            })
            .cloned()
            .collect();
        if endpoint.requires_auth() {
            if let Some(token) = &token {
                headers.push(bearer(token));
            }
        }

        tracing::debug!(
            path = endpoint.path(),
            item_id,
            payload_len = form.payload_len(),
            "Uploading photo"
        );

        let request = HttpRequest {
            method: Method::POST,
            url: endpoint.url(&self.base_url)?.to_string(),
            headers,
            body: Some(RequestBody::Multipart(form)),
        };
        let response = self.transport.send(request).await?;

        serde_json::from_slice::<UploadResponse>(&response.body).map_err(|e| {
            tracing::warn!(
                response_body = %String::from_utf8_lossy(&response.body),
                error = %e,
                "Failed to decode upload response"
            );
            ApiError::DataCorrupted(e.to_string())
        })
    }

    /// Sign in with long-lived credentials and remember them for refreshes
    pub async fn login(&self, credentials: UserCredentials) -> Result<AuthResponse> {
        {
            let mut store = self.store.lock().await;
            store.set_credentials(Some(credentials.clone()))?;
        }

        let result = self
            .fetch::<AuthResponse, _>(&AuthEndpoint::Login.endpoint(), Some(&credentials))
            .await;

        if let Err(e) = &result {
            tracing::warn!(login = %credentials.login, error = %e, "Login failed, forgetting credentials");
            if let Err(store_err) = self.store.lock().await.set_credentials(None) {
                tracing::error!(error = %store_err, "Failed to forget credentials");
            }
        }
        result
    }

    /// Create an account; on success the account's credentials are stored
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let auth = self
            .fetch::<AuthResponse, _>(&AuthEndpoint::Register.endpoint(), Some(request))
            .await?;

        let mut store = self.store.lock().await;
        store.set_credentials(Some(UserCredentials::new(
            request.user.username.clone(),
            request.password.clone(),
        )))?;
        Ok(auth)
    }

    /// Forget the token and the long-lived credentials
    pub async fn logout(&self) -> Result<()> {
        let mut store = self.store.lock().await;
        store.set_token("", Some(-1))?;
        store.set_credentials(None)?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Make sure a valid token is held, re-authenticating if needed
    ///
    /// Lets callers prepare for `upload_photo`, which never refreshes.
    pub async fn ensure_token(&self) -> Result<()> {
        if self.current_token().await.is_none() {
            self.refresh_token(None).await?;
        }
        Ok(())
    }

    async fn current_token(&self) -> Option<String> {
        let store = self.store.lock().await;
        store.snapshot().valid_token().map(str::to_string)
    }

    /// Re-authenticate with the stored credentials
    ///
    /// `stale` is the token the caller saw failing (`None` if it saw no
    /// token). If a different valid token is present once the lock is
    /// acquired, another caller already refreshed and no login is sent.
    async fn refresh_token(&self, stale: Option<&str>) -> Result<()> {
        let mut store = self.store.lock().await;
        let snapshot = store.snapshot();

        if let Some(current) = snapshot.valid_token() {
            if stale != Some(current) {
                tracing::debug!("Token already refreshed by another request");
                return Ok(());
            }
        }

        // Nobody may use the old token from here on
        store.set_token("", Some(-1))?;

        let Some(credentials) = snapshot.credentials else {
            tracing::warn!("No stored credentials, cannot refresh token");
            return Err(ApiError::Auth(
                "No stored credentials, sign in again".to_string(),
            ));
        };

        tracing::debug!(login = %credentials.login, "Refreshing access token...");

        match self.send_login(&credentials).await {
            Ok(auth) => {
                commit_auth(&mut **store, &auth)?;
                tracing::info!(
                    user_id = auth.user_id,
                    lifetime_secs = auth.lifetime_seconds(),
                    token_prefix = %token_prefix(&auth.access_token),
                    "Token refreshed"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Token refresh failed, clearing stored credentials");
                store.set_credentials(None)?;
                Err(e)
            }
        }
    }

    async fn send_login(&self, credentials: &UserCredentials) -> Result<AuthResponse> {
        let endpoint = AuthEndpoint::Login.endpoint();
        let body = encode_json_body(&endpoint, Some(credentials))?;
        let request = self.build_request(&endpoint, None, body)?;

        let response = tokio::time::timeout(self.refresh_timeout, self.transport.send(request))
            .await
            .map_err(|_| TransportError::Timeout(self.refresh_timeout))??;

        serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::DataCorrupted(format!("Invalid login response: {}", e)))
    }

    fn build_request(
        &self,
        endpoint: &Endpoint,
        token: Option<&str>,
        body: Option<RequestBody>,
    ) -> Result<HttpRequest> {
        let mut headers = endpoint.headers().to_vec();
        if endpoint.requires_auth() {
            if let Some(token) = token {
                headers.push(bearer(token));
            }
        }
        if matches!(body, Some(RequestBody::Json(_)))
            && !headers
                .iter()
                .any(|(n, _)| n.eq_ignore_ascii_case("Content-Type"))
        {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(HttpRequest {
            method: endpoint.method().clone(),
            url: endpoint.url(&self.base_url)?.to_string(),
            headers,
            body,
        })
    }

    async fn decode_and_commit<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T> {
        let value: serde_json::Value = if response.body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&response.body)
                .map_err(|e| ApiError::DataCorrupted(e.to_string()))?
        };

        if let Some(auth) = AuthResponse::detect(&value) {
            let mut store = self.store.lock().await;
            commit_auth(&mut **store, &auth)?;
            tracing::debug!(user_id = auth.user_id, "Stored token from auth response");
        }

        serde_json::from_value(value).map_err(|e| ApiError::DataCorrupted(e.to_string()))
    }
}

fn commit_auth(store: &mut dyn CredentialStore, auth: &AuthResponse) -> Result<()> {
    store.set_token(&auth.access_token, Some(auth.lifetime_seconds()))?;
    store.set_user_id(auth.user_id)?;
    Ok(())
}

/// JSON body for non-GET endpoints; GET requests never carry one
fn encode_json_body<B: Serialize + ?Sized>(
    endpoint: &Endpoint,
    body: Option<&B>,
) -> Result<Option<RequestBody>> {
    match body {
        Some(body) if *endpoint.method() != Method::GET => {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                ApiError::Configuration(format!("Request body is not serializable: {}", e))
            })?;
            Ok(Some(RequestBody::Json(bytes)))
        }
        _ => Ok(None),
    }
}

fn bearer(token: &str) -> (String, String) {
    ("Authorization".to_string(), format!("Bearer {}", token))
}

fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}
