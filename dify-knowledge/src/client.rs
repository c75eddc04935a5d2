//! This module contains the implementation of the Dify knowledge client.
//!
//! The `client` module provides a `Client` struct that holds one session for the
//! public API and, when console credentials are configured, a second session for
//! the console API. It also includes a `Config` struct that holds the
//! configuration for the client.
//!
//! # Examples
//!
//! Creating a new client with default configuration:
//!
//! ```rust
//! use dify_knowledge::client::Client;
//!
//! let client = Client::new("https://api.dify.ai", "API_KEY").unwrap();
//! assert!(client.console().is_err());
//! ```
//!
//! Creating a new client with console access and a file cache:
//!
//! ```no_run
//! use dify_knowledge::cache::{CacheConfig, CacheDriver};
//! use dify_knowledge::client::{Client, Config, ConsoleConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config {
//!     base_url: "https://dify.example.com".into(),
//!     api_key: "DATASET_API_KEY".into(),
//!     timeout: Duration::from_secs(30),
//!     console: Some(ConsoleConfig::new("admin@example.com", "password")),
//!     cache: CacheConfig {
//!         driver: CacheDriver::File { directory: Some("/var/cache/dify".into()) },
//!         ..CacheConfig::default()
//!     },
//!     ..Config::default()
//! };
//!
//! let client = Client::new_with_config(config).await?;
//! let datasets = client.console()?.datasets().list(1, 20).await?;
//! # let _ = datasets;
//! # Ok(())
//! # }
//! ```
use super::{
    api::{Console, Datasets, Documents, Segments},
    cache::{self, CacheConfig, CacheDriver, CacheStore, MemoryCache, RedisConfig},
    error::{Error, Result},
    http::{ReqwestTransport, Transport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT},
    session::{AuthMode, Session, SessionConfig},
    token::TokenTtl,
};
use anyhow::{bail, Context, Result as AnyResult};
use std::{env, fmt, sync::Arc, time::Duration};

/// Console login settings.
#[derive(Clone)]
pub struct ConsoleConfig {
    /// The console account email.
    pub email: String,
    /// The console account password.
    pub password: String,
    /// How long tokens are kept in the cache.
    pub token_ttl: TokenTtl,
}

impl ConsoleConfig {
    pub fn new<E, P>(email: E, password: P) -> Self
    where
        E: Into<String>,
        P: Into<String>,
    {
        Self {
            email: email.into(),
            password: password.into(),
            token_ttl: TokenTtl::default(),
        }
    }
}

impl fmt::Debug for ConsoleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleConfig")
            .field("email", &self.email)
            .field("password", &"***")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

#[derive(Clone)]
/// The configuration for the Dify knowledge client.
pub struct Config {
    /// The base URL of the Dify server. A trailing `/v1` is ignored.
    pub base_url: String,
    /// The dataset API key for the public API.
    pub api_key: String,
    /// The timeout for the client requests.
    pub timeout: Duration,
    /// The timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Log every request and response at `debug` level.
    pub debug: bool,
    /// Console credentials; the console API is unavailable without them.
    pub console: Option<ConsoleConfig>,
    /// Where console tokens are cached.
    pub cache: CacheConfig,
}

/// Implements the default configuration for the client.
impl Default for Config {
    /// Returns a new instance of `Config` with default values.
    fn default() -> Self {
        Self {
            base_url: "https://api.dify.ai".into(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            debug: false,
            console: None,
            cache: CacheConfig::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("debug", &self.debug)
            .field("console", &self.console)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Config {
    /// Reads the configuration from `DIFY_*` environment variables.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `DIFY_BASE_URL` | `base_url` |
    /// | `DIFY_API_KEY` | `api_key` |
    /// | `DIFY_DEBUG` | `debug` (`1` or `true`) |
    /// | `DIFY_CONSOLE_EMAIL`, `DIFY_CONSOLE_PASSWORD` | `console` (both required) |
    /// | `DIFY_CACHE_DRIVER` | `memory`, `file` (default) or `redis` |
    /// | `DIFY_CACHE_DIR` | file cache directory |
    /// | `DIFY_CACHE_PREFIX` | key prefix |
    /// | `DIFY_REDIS_HOST`, `DIFY_REDIS_PORT`, `DIFY_REDIS_PASSWORD`, `DIFY_REDIS_DB` | redis connection |
    pub fn from_env() -> AnyResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> AnyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Config::default();

        if let Some(base_url) = var("DIFY_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(api_key) = var("DIFY_API_KEY") {
            config.api_key = api_key;
        }
        if let Some(debug) = var("DIFY_DEBUG") {
            config.debug = matches!(debug.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let (Some(email), Some(password)) =
            (var("DIFY_CONSOLE_EMAIL"), var("DIFY_CONSOLE_PASSWORD"))
        {
            config.console = Some(ConsoleConfig::new(email, password));
        }
        if let Some(prefix) = var("DIFY_CACHE_PREFIX") {
            config.cache.prefix = prefix;
        }

        let driver = var("DIFY_CACHE_DRIVER").unwrap_or_else(|| "file".into());
        config.cache.driver = match driver.to_ascii_lowercase().as_str() {
            "memory" => CacheDriver::Memory,
            "file" => CacheDriver::File {
                directory: var("DIFY_CACHE_DIR").map(Into::into),
            },
            "redis" => {
                let mut redis = RedisConfig::default();
                if let Some(host) = var("DIFY_REDIS_HOST") {
                    redis.host = host;
                }
                if let Some(port) = var("DIFY_REDIS_PORT") {
                    redis.port = port
                        .parse()
                        .with_context(|| format!("Invalid DIFY_REDIS_PORT: {}", port))?;
                }
                if let Some(db) = var("DIFY_REDIS_DB") {
                    redis.database = db
                        .parse()
                        .with_context(|| format!("Invalid DIFY_REDIS_DB: {}", db))?;
                }
                redis.password = var("DIFY_REDIS_PASSWORD");
                CacheDriver::Redis(redis)
            }
            other => bail!("Unsupported DIFY_CACHE_DRIVER: {}", other),
        };
        Ok(config)
    }
}

/// Strips trailing slashes and an API prefix so paths can be appended.
fn normalize_base_url(base_url: &str) -> String {
    let url = base_url.trim().trim_end_matches('/');
    let url = url.strip_suffix("/v1").unwrap_or(url);
    url.trim_end_matches('/').to_string()
}

/// The `Client` struct represents a client for interacting with the Dify knowledge API.
#[derive(Clone, Debug)]
pub struct Client {
    /// The configuration for the client.
    pub config: Arc<Config>,
    /// The session for the public API.
    public: Arc<Session>,
    /// The session for the console API.
    console: Option<Arc<Session>>,
}

/// The `Client` struct represents a client for interacting with the Dify knowledge API.
impl Client {
    /// Creates a new `Client` for the public API with the specified base URL and API key.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Dify server.
    /// * `api_key` - The dataset API key for authentication.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> AnyResult<Self> {
        let config = Config {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Config::default()
        };
        let transport = ReqwestTransport::new(config.timeout, config.connect_timeout)?;
        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            Arc::new(MemoryCache::new()),
        ))
    }

    /// Creates a new `Client` instance with the specified configuration.
    ///
    /// The token cache is only opened when console credentials are configured,
    /// and a previously cached console token is restored.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the cache cannot be opened.
    pub async fn new_with_config(c: Config) -> AnyResult<Self> {
        let transport = ReqwestTransport::new(c.timeout, c.connect_timeout)
            .context("Failed to create http client")?;
        let cache: Arc<dyn CacheStore> = match c.console {
            Some(_) => cache::create(&c.cache)
                .await
                .context("Failed to open the token cache")?,
            None => Arc::new(MemoryCache::new()),
        };
        let client = Self::with_transport(c, Arc::new(transport), cache);
        if let Some(console) = &client.console {
            console.restore().await;
        }
        Ok(client)
    }

    /// Creates a `Client` over the given transport and token cache.
    pub fn with_transport(
        mut c: Config,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        c.base_url = normalize_base_url(&c.base_url);

        let mut public = SessionConfig::new(c.base_url.clone(), AuthMode::api_key(&c.api_key));
        public.debug = c.debug;
        let public = Session::new(public, transport.clone(), cache.clone());

        let console = c.console.as_ref().map(|console| {
            let mut session = SessionConfig::new(
                c.base_url.clone(),
                AuthMode::login(&console.email, &console.password),
            );
            session.debug = c.debug;
            session.token_ttl = console.token_ttl;
            Arc::new(Session::new(session, transport, cache))
        });

        Self {
            config: Arc::new(c),
            public: Arc::new(public),
            console,
        }
    }

    /// Returns the datasets API of the public session.
    pub fn datasets(&self) -> Datasets<'_> {
        Datasets::new(&self.public)
    }

    /// Returns the documents API of the public session.
    pub fn documents(&self) -> Documents<'_> {
        Documents::new(&self.public)
    }

    /// Returns the segments API of the public session.
    pub fn segments(&self) -> Segments<'_> {
        Segments::new(&self.public)
    }

    /// The public API session.
    pub fn session(&self) -> &Session {
        &self.public
    }

    /// Returns the console API.
    ///
    /// # Errors
    /// Fails with a not-configured error when no console credentials were given.
    pub fn console(&self) -> Result<Console<'_>> {
        self.console
            .as_deref()
            .map(Console::new)
            .ok_or_else(|| Error::NotConfigured("console credentials are not configured".into()))
    }
}
