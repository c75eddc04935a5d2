//! The authenticated HTTP session.
//!
//! A [`Session`] owns a [`Transport`], attaches the bearer token to every call
//! and, in console mode, recovers from an expired access token: a 401 triggers
//! one refresh (or a fresh login when the refresh token is gone or rejected),
//! after which the rejected request is replayed exactly once.
//!
//! ```no_run
//! use dify_knowledge::cache::MemoryCache;
//! use dify_knowledge::http::ReqwestTransport;
//! use dify_knowledge::session::{AuthMode, Session, SessionConfig};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> dify_knowledge::error::Result<()> {
//! let transport = ReqwestTransport::new(Duration::from_secs(10), Duration::from_secs(5))?;
//! let session = Session::new(
//!     SessionConfig::new(
//!         "https://dify.example.com",
//!         AuthMode::login("admin@example.com", "password"),
//!     ),
//!     Arc::new(transport),
//!     Arc::new(MemoryCache::new()),
//! );
//! session.restore().await;
//! let datasets: serde_json::Value = session.get("/datasets", &[]).await?;
//! # let _ = datasets;
//! # Ok(())
//! # }
//! ```
use crate::{
    api::ApiPath,
    cache::CacheStore,
    error::{Error, Result},
    http::{header, FormPart, HttpRequest, HttpResponse, Method, RequestBody, StatusCode, Transport},
    token::{LoginResponse, TokenStorage, TokenTtl},
};
use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value as JsonValue};
use std::{
    fmt,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::debug;

/// Seconds before `exp` at which a token already counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// How a session authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// The public API, authenticated with a dataset API key.
    ApiKey(String),
    /// The console API, authenticated by logging in.
    Login { email: String, password: String },
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::ApiKey(_) => f.debug_tuple("ApiKey").field(&"***").finish(),
            AuthMode::Login { email, .. } => f
                .debug_struct("Login")
                .field("email", email)
                .field("password", &"***")
                .finish(),
        }
    }
}

impl AuthMode {
    pub fn api_key<K: Into<String>>(key: K) -> Self {
        AuthMode::ApiKey(key.into())
    }

    pub fn login<E, P>(email: E, password: P) -> Self
    where
        E: Into<String>,
        P: Into<String>,
    {
        AuthMode::Login {
            email: email.into(),
            password: password.into(),
        }
    }

    /// The prefix every endpoint path is appended to.
    pub fn base_path(&self) -> &'static str {
        match self {
            AuthMode::ApiKey(_) => "/v1",
            AuthMode::Login { .. } => "/console/api",
        }
    }
}

/// Settings fixed for the life of a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Host root, without a trailing slash or API prefix.
    pub base_url: String,
    pub mode: AuthMode,
    /// Log every request and response at `debug` level.
    pub debug: bool,
    pub token_ttl: TokenTtl,
}

impl SessionConfig {
    pub fn new<U: Into<String>>(base_url: U, mode: AuthMode) -> Self {
        Self {
            base_url: base_url.into(),
            mode,
            debug: false,
            token_ttl: TokenTtl::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// A 401 is being recovered from.
    Refreshing,
}

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    refreshing: bool,
}

/// Marks a session as `Refreshing` until dropped, including when the
/// recovering future is cancelled.
struct RefreshingFlag<'a> {
    session: &'a Session,
}

impl<'a> RefreshingFlag<'a> {
    fn raise(session: &'a Session) -> Self {
        session.write_auth().refreshing = true;
        Self { session }
    }
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.session.write_auth().refreshing = false;
    }
}

/// A request kept as data so it can be sent a second time.
#[derive(Debug)]
struct Call {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
}

pub struct Session {
    base_url: String,
    mode: AuthMode,
    debug: bool,
    transport: Arc<dyn Transport>,
    tokens: TokenStorage,
    auth: RwLock<AuthState>,
    refresh_guard: futures::lock::Mutex<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let token = match &config.mode {
            AuthMode::ApiKey(key) => Some(key.clone()),
            AuthMode::Login { .. } => None,
        };
        Self {
            base_url: config.base_url.trim_end_matches('/').into(),
            mode: config.mode,
            debug: config.debug,
            transport,
            tokens: TokenStorage::new(cache, config.token_ttl),
            auth: RwLock::new(AuthState {
                token,
                refreshing: false,
            }),
            refresh_guard: futures::lock::Mutex::new(()),
        }
    }

    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStorage {
        &self.tokens
    }

    fn read_auth(&self) -> RwLockReadGuard<'_, AuthState> {
        self.auth.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_auth(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.auth.write().unwrap_or_else(|e| e.into_inner())
    }

    fn is_console(&self) -> bool {
        matches!(self.mode, AuthMode::Login { .. })
    }

    pub fn state(&self) -> SessionState {
        let auth = self.read_auth();
        if auth.refreshing {
            SessionState::Refreshing
        } else if auth.token.as_deref().map_or(false, |t| !t.is_empty()) {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Loads a previously stored access token. Returns whether one was found.
    pub async fn restore(&self) -> bool {
        if !self.is_console() {
            return true;
        }
        match self.tokens.access_token().await {
            Some(token) => {
                self.write_auth().token = Some(token);
                true
            }
            None => false,
        }
    }

    /// The token sent as bearer; falls back to the store when none is held.
    pub async fn token(&self) -> Option<String> {
        let held = self.read_auth().token.clone();
        if held.is_some() || !self.is_console() {
            return held;
        }
        let stored = self.tokens.access_token().await;
        if let Some(token) = &stored {
            self.write_auth().token = Some(token.clone());
        }
        stored
    }

    pub async fn refresh_token_value(&self) -> Option<String> {
        self.tokens.refresh_token().await
    }

    /// Logs in with the configured credentials.
    pub async fn login(&self) -> Result<LoginResponse> {
        match &self.mode {
            AuthMode::Login { email, password } => self.login_with(email, password).await,
            AuthMode::ApiKey(_) => Err(Error::NotConfigured(
                "console credentials are not configured".into(),
            )),
        }
    }

    /// Logs in with explicit credentials and stores the returned tokens.
    ///
    /// Nothing is stored unless the server answers with the success shape.
    pub async fn login_with(&self, email: &str, password: &str) -> Result<LoginResponse> {
        if !self.is_console() {
            return Err(Error::NotConfigured(
                "login requires a console session".into(),
            ));
        }
        let call = Call::json(
            Method::POST,
            ApiPath::Login.as_str(),
            json!({
                "email": email,
                "password": password,
                "remember_me": false,
            }),
        );
        let value = self
            .dispatch(&call, None)
            .await
            .and_then(|resp| self.handle_response(resp))
            .map_err(Self::login_failure)?;
        let login: LoginResponse = serde_json::from_value(value)
            .map_err(|e| Error::authentication(format!("unexpected login response: {}", e)))?;
        let Some(pair) = login.tokens() else {
            return Err(Error::authentication(format!(
                "login was not successful: {}",
                login.result
            )));
        };
        self.store_tokens(&pair.access_token, pair.refresh_token.as_deref())
            .await;
        debug!(email, "console login succeeded");
        Ok(login)
    }

    fn login_failure(err: Error) -> Error {
        if let Some(resp) = err.response().cloned() {
            return Error::Authentication(resp);
        }
        match err {
            Error::Transport(_) | Error::NotConfigured(_) => err,
            other => Error::authentication(other),
        }
    }

    /// Exchanges the stored refresh token for new tokens.
    ///
    /// Returns `false` when there is no refresh token or the server does not
    /// answer with the success shape; the stored tokens are left untouched then.
    pub async fn refresh_token(&self) -> bool {
        if !self.is_console() {
            return false;
        }
        let Some(refresh_token) = self.tokens.refresh_token().await else {
            debug!("no refresh token stored");
            return false;
        };
        let call = Call::json(
            Method::POST,
            ApiPath::RefreshToken.as_str(),
            json!({ "refresh_token": refresh_token }),
        );
        let refreshed = self
            .dispatch(&call, None)
            .await
            .and_then(|resp| self.handle_response(resp))
            .and_then(|value| {
                serde_json::from_value::<LoginResponse>(value)
                    .map_err(|e| Error::InvalidResponse(e.to_string()))
            });
        match refreshed {
            Ok(resp) => match resp.tokens() {
                Some(pair) => {
                    self.store_tokens(&pair.access_token, pair.refresh_token.as_deref())
                        .await;
                    debug!("access token refreshed");
                    true
                }
                None => {
                    debug!(result = %resp.result, "token refresh rejected");
                    false
                }
            },
            Err(e) => {
                debug!(error = %e, "token refresh failed");
                false
            }
        }
    }

    /// Whether the held token is a JWT whose `exp` is within 30 seconds of now.
    ///
    /// Anything that cannot be decoded counts as expired. API keys never expire.
    pub async fn is_token_expired(&self) -> bool {
        if !self.is_console() {
            return false;
        }
        match self.token().await {
            Some(token) => is_jwt_expired(&token, chrono::Utc::now().timestamp()),
            None => true,
        }
    }

    /// Injects tokens obtained elsewhere. A `None` refresh token keeps the stored one.
    pub async fn set_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> bool {
        if !self.is_console() {
            return false;
        }
        self.store_tokens(access_token, refresh_token).await
    }

    async fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> bool {
        self.write_auth().token = Some(access_token.to_string());
        self.tokens.set_tokens(access_token, refresh_token).await
    }

    /// Forgets both tokens, in memory and in the store.
    pub async fn clear_tokens(&self) -> bool {
        if self.is_console() {
            self.write_auth().token = None;
        }
        self.tokens.clear_tokens().await
    }

    pub async fn get<T>(&self, path: &str, query: &[(String, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, path, query, RequestBody::Empty)
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = json_body(body)?;
        self.request(Method::POST, path, &[], body).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = json_body(body)?;
        self.request(Method::PUT, path, &[], body).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = json_body(body)?;
        self.request(Method::PATCH, path, &[], body).await
    }

    pub async fn delete<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request(Method::DELETE, path, &[], RequestBody::Empty)
            .await
    }

    /// Sends a multipart form.
    pub async fn upload<T>(&self, path: &str, parts: Vec<FormPart>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, &[], RequestBody::Multipart(parts))
            .await
    }

    /// Sends a request relative to the session's base path and decodes the body.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: RequestBody,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let call = Call {
            method,
            path: path.to_string(),
            query: query.to_vec(),
            body,
        };
        let value = self.send(&call).await?;
        serde_json::from_value(value).map_err(|e| {
            Error::InvalidResponse(format!("{} {}: {}", call.method, call.path, e))
        })
    }

    async fn send(&self, call: &Call) -> Result<JsonValue> {
        let token = self.token().await;
        let resp = self.dispatch(call, token.as_deref()).await?;
        if resp.status != StatusCode::UNAUTHORIZED || !self.can_recover(&call.path) {
            return self.handle_response(resp);
        }

        debug!(path = %call.path, "access token rejected, recovering");
        self.recover(token.as_deref()).await?;
        let token = self.token().await;
        let resp = self.dispatch(call, token.as_deref()).await?;
        self.handle_response(resp)
    }

    fn can_recover(&self, path: &str) -> bool {
        self.is_console() && !is_auth_path(path)
    }

    /// Replaces a rejected token: refresh first, log in again if that fails.
    ///
    /// Callers queue on `refresh_guard`; one that finds the token already
    /// replaced goes straight back to retrying.
    async fn recover(&self, stale: Option<&str>) -> Result<()> {
        let _guard = self.refresh_guard.lock().await;
        let current = self.read_auth().token.clone();
        if current.is_some() && current.as_deref() != stale {
            debug!("token already replaced by a concurrent request");
            return Ok(());
        }

        let _refreshing = RefreshingFlag::raise(self);
        self.refresh_or_login().await
    }

    async fn refresh_or_login(&self) -> Result<()> {
        if self.refresh_token().await {
            return Ok(());
        }
        self.tokens.clear_refresh_token().await;
        match self.login().await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.clear_tokens().await;
                Err(e)
            }
        }
    }

    async fn dispatch(&self, call: &Call, token: Option<&str>) -> Result<HttpResponse> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token.filter(|_| !is_auth_path(&call.path)) {
            let mut bearer = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::InvalidRequest(format!("invalid token: {}", e)))?;
            bearer.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, bearer);
        }
        let request = HttpRequest {
            method: call.method.clone(),
            url: format!("{}{}{}", self.base_url, self.mode.base_path(), call.path),
            headers,
            query: call.query.clone(),
            body: call.body.clone(),
        };

        if self.debug {
            debug!(
                method = %request.method,
                url = %request.url,
                query = ?request.query,
                headers = ?request.sanitized_headers(),
                body = %request.body_summary(),
                "dify request"
            );
        }
        let resp = self.transport.execute(request).await?;
        if self.debug {
            debug!(status = resp.status.as_u16(), body = %resp.body_summary(), "dify response");
        }
        Ok(resp)
    }

    fn handle_response(&self, resp: HttpResponse) -> Result<JsonValue> {
        let status = resp.status.as_u16();
        if status >= 400 {
            return Err(Error::from_status(status, &resp.body));
        }
        if resp.body.trim().is_empty() {
            return Ok(JsonValue::Object(Default::default()));
        }
        serde_json::from_str(&resp.body)
            .map_err(|e| Error::InvalidResponse(format!("status {}: {}", status, e)))
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(|e| Error::InvalidRequest(e.to_string()))
}

fn is_auth_path(path: &str) -> bool {
    path == ApiPath::Login.as_str() || path == ApiPath::RefreshToken.as_str()
}

impl Call {
    fn json(method: Method, path: &str, body: JsonValue) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: RequestBody::Json(body),
        }
    }
}

/// The `exp` claim of a three-part JWT.
fn token_expiry(token: &str) -> Option<i64> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let claims: JsonValue = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?;
    exp.as_i64().or_else(|| exp.as_f64().map(|v| v as i64))
}

pub(crate) fn is_jwt_expired(token: &str, now: i64) -> bool {
    match token_expiry(token) {
        Some(exp) => exp - EXPIRY_MARGIN_SECS < now,
        None => true,
    }
}
