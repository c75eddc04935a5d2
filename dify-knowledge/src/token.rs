//! Console credentials and where they are kept.
use crate::cache::CacheStore;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};

/// Lifetime of a stored access token.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Lifetime of a stored refresh token.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How long each token is kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtl {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            access: ACCESS_TOKEN_TTL,
            refresh: REFRESH_TOKEN_TTL,
        }
    }
}

/// 令牌对
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// 访问令牌
    pub access_token: String,
    /// 刷新令牌
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// 登录/刷新响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// 结果, 成功时为 `success`
    #[serde(default)]
    pub result: String,
    /// 令牌
    #[serde(default)]
    pub data: Option<TokenPair>,
}

impl LoginResponse {
    /// The tokens, if this is the success shape.
    pub fn tokens(&self) -> Option<&TokenPair> {
        if self.result != "success" {
            return None;
        }
        self.data
            .as_ref()
            .filter(|pair| !pair.access_token.is_empty())
    }
}

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Access and refresh tokens persisted in a [`CacheStore`].
#[derive(Clone)]
pub struct TokenStorage {
    cache: Arc<dyn CacheStore>,
    ttl: TokenTtl,
}

impl fmt::Debug for TokenStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStorage")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenStorage {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: TokenTtl) -> Self {
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> TokenTtl {
        self.ttl
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub async fn access_token(&self) -> Option<String> {
        self.cache.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.cache.get(REFRESH_TOKEN_KEY).await
    }

    pub async fn set_access_token(&self, token: &str) -> bool {
        self.cache
            .set(ACCESS_TOKEN_KEY, token, Some(self.ttl.access))
            .await
    }

    pub async fn set_refresh_token(&self, token: &str) -> bool {
        self.cache
            .set(REFRESH_TOKEN_KEY, token, Some(self.ttl.refresh))
            .await
    }

    /// Stores both tokens; a missing refresh token leaves the stored one alone.
    pub async fn set_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> bool {
        let mut stored = self.set_access_token(access_token).await;
        if let Some(refresh_token) = refresh_token {
            stored &= self.set_refresh_token(refresh_token).await;
        }
        stored
    }

    pub async fn has_access_token(&self) -> bool {
        self.cache.has(ACCESS_TOKEN_KEY).await
    }

    pub async fn has_refresh_token(&self) -> bool {
        self.cache.has(REFRESH_TOKEN_KEY).await
    }

    pub async fn clear_refresh_token(&self) -> bool {
        self.cache.delete(REFRESH_TOKEN_KEY).await
    }

    pub async fn clear_tokens(&self) -> bool {
        let access = self.cache.delete(ACCESS_TOKEN_KEY).await;
        let refresh = self.cache.delete(REFRESH_TOKEN_KEY).await;
        access && refresh
    }
}
