//! Configuration types.
//!
//! Everything has a default; `Config::from_env` overrides from `PORTER_*`
//! variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::app::retry::RetryPolicy;
use crate::error::ConfigError;

/// Broker connection and worker settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Timeout for declare / publish / register / subscribe / ack calls.
    /// Polls are never timed out.
    pub timeout: Duration,
    /// Queue this process publishes to and consumes from.
    pub queue_name: String,
    /// Number of pollers a worker runs.
    pub concurrency: usize,
    /// Optional result store.
    pub results_backend: Option<ResultBackendConfig>,
    /// Backoff applied when a poll fails.
    pub poll_retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1894,
            timeout: Duration::from_secs(5),
            queue_name: String::new(),
            concurrency: 1,
            results_backend: None,
            poll_retry: RetryPolicy::default_poll(),
        }
    }
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            ..Self::default()
        }
    }

    pub fn with_queue(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_results_backend(mut self, backend: ResultBackendConfig) -> Self {
        self.results_backend = Some(backend);
        self
    }

    pub fn with_poll_retry(mut self, policy: RetryPolicy) -> Self {
        self.poll_retry = policy;
        self
    }

    /// `http://host:port`
    pub fn broker_uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Defaults overridden by `PORTER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("PORTER_BROKER_HOST") {
            config.host = host;
        }
        if let Some(port) = parse(&lookup, "PORTER_BROKER_PORT")? {
            config.port = port;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "PORTER_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(queue) = lookup("PORTER_QUEUE") {
            config.queue_name = queue;
        }
        if let Some(concurrency) = parse::<usize, _>(&lookup, "PORTER_CONCURRENCY")? {
            if concurrency == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "PORTER_CONCURRENCY".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.concurrency = concurrency;
        }
        if let Some(max) = parse(&lookup, "PORTER_POLL_MAX_ATTEMPTS")? {
            config.poll_retry.max_attempts = max;
        }

        if let Some(kind) = lookup("PORTER_RESULT_BACKEND") {
            let mut backend = ResultBackendConfig::new(kind.trim().parse()?);
            if let Some(host) = lookup("PORTER_RESULT_HOST") {
                backend.host = host;
            }
            if let Some(port) = parse(&lookup, "PORTER_RESULT_PORT")? {
                backend.port = port;
            }
            backend.username = lookup("PORTER_RESULT_USERNAME");
            backend.password = lookup("PORTER_RESULT_PASSWORD");
            if let Some(db) = parse(&lookup, "PORTER_RESULT_DB")? {
                backend.db = db;
            }
            if let Some(secs) = parse::<u64, _>(&lookup, "PORTER_RESULT_EXPIRE_SECS")? {
                backend.results_expire_in = Duration::from_secs(secs);
            }
            config.results_backend = Some(backend);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

/// Which result store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    /// Process-local store, mostly for development.
    Memory,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Redis => f.write_str("redis"),
            BackendKind::Memory => f.write_str("memory"),
        }
    }
}

/// Result store descriptor.
#[derive(Clone)]
pub struct ResultBackendConfig {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: u32,
    /// TTL applied to every stored record. Zero keeps records forever.
    pub results_expire_in: Duration,
}

impl ResultBackendConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            db: 0,
            results_expire_in: Duration::from_secs(3600),
        }
    }

    /// `redis://[user][:password@]host:port/db`, with the credentials
    /// percent-encoded.
    pub fn redis_url(&self) -> String {
        let username = self.username.as_deref().map(urlencoding::encode);
        let password = self.password.as_deref().map(urlencoding::encode);
        let auth = match (&username, &password) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (None, Some(password)) => format!(":{password}@"),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.db)
    }
}

// password stays out of logs
impl fmt::Debug for ResultBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBackendConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("results_expire_in", &self.results_expire_in)
            .finish()
    }
}
