//! Handler configuration
//!
//! `HandlerConfig` carries everything a registered handler needs to consume a
//! queue. Values come from the builder methods, from the environment
//! (`HandlerConfig::from_env`), or from `ConfigOverrides` applied before the
//! scheduler starts.

use crate::decode::BodyDecoder;
use crate::error::ConfigError;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default visibility timeout in seconds
pub const DEFAULT_VISIBILITY_TIMEOUT: i32 = 10;

/// Long-poll wait per receive, the maximum SQS allows
pub const DEFAULT_WAIT_TIME_SECONDS: i32 = 20;

/// SQS returns at most 10 messages per receive
pub const MAX_BATCH_SIZE: i32 = 10;

/// How a worker slot runs the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerKind {
    /// Spawned onto the runtime as an async task
    #[default]
    Task,
    /// Driven on a dedicated blocking thread, isolated from the scheduler
    Blocking,
}

impl FromStr for WorkerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "task" | "thread" => Ok(WorkerKind::Task),
            "blocking" | "process" => Ok(WorkerKind::Blocking),
            other => Err(ConfigError::InvalidValue {
                field: "worker_kind",
                details: format!("unknown worker kind '{other}'"),
            }),
        }
    }
}

/// Connection profile for the queue client
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl ConnectionProfile {
    /// Load from the standard `AWS_*` environment variables
    pub fn from_env() -> Self {
        Self {
            region: env_opt("AWS_REGION").or_else(|| env_opt("AWS_DEFAULT_REGION")),
            endpoint_url: env_opt("AWS_ENDPOINT_URL"),
            access_key_id: env_opt("AWS_ACCESS_KEY_ID"),
            secret_access_key: env_opt("AWS_SECRET_ACCESS_KEY"),
            session_token: env_opt("AWS_SESSION_TOKEN"),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Point the client at a custom endpoint (LocalStack, ElasticMQ)
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Static credentials, if both halves are present
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Reject half-configured credentials
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => Err(ConfigError::InvalidValue {
                field: "connection",
                details: "access_key_id and secret_access_key must be set together".into(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Configuration for one registered handler
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Logical queue name, resolved to a URL at startup
    pub queue_name: Option<String>,

    /// Literal queue URL
    pub queue_url: Option<String>,

    /// Visibility timeout in seconds applied to each receive
    pub visibility_timeout: i32,

    /// Delay between polls
    pub poll_interval: Duration,

    /// Number of concurrent execution slots
    pub max_workers: usize,

    /// How execution slots run the handler
    pub worker_kind: WorkerKind,

    /// Receive batch size (1..=10)
    pub max_messages: i32,

    /// Long-poll wait per receive in seconds
    pub wait_time_seconds: i32,

    /// Delete messages whose handler failed instead of retrying them
    pub deletable_on_error: bool,

    /// Reject after this many retries (0 = unlimited)
    pub max_retry_count: u32,

    /// Queue client connection profile
    pub connection: ConnectionProfile,

    /// Body decoder applied before the handler runs
    pub decoder: BodyDecoder,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            queue_url: None,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            poll_interval: Duration::from_secs(1),
            max_workers: 1,
            worker_kind: WorkerKind::Task,
            max_messages: 1,
            wait_time_seconds: DEFAULT_WAIT_TIME_SECONDS,
            deletable_on_error: false,
            max_retry_count: 0,
            connection: ConnectionProfile::default(),
            decoder: BodyDecoder::identity(),
        }
    }
}

impl HandlerConfig {
    /// Consume the queue with the given logical name
    pub fn for_queue_name(name: impl Into<String>) -> Self {
        Self {
            queue_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Consume the queue at the given URL
    pub fn for_queue_url(url: impl Into<String>) -> Self {
        Self {
            queue_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Load from `SQS_*` and `AWS_*` environment variables
    ///
    /// Missing variables keep their defaults. The queue identity invariant is
    /// checked before returning.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            queue_name: env_opt("SQS_QUEUE_NAME"),
            queue_url: env_opt("SQS_QUEUE_URL"),
            connection: ConnectionProfile::from_env(),
            ..Self::default()
        };

        if let Some(timeout) = env_parse("SQS_VISIBILITY_TIMEOUT")? {
            config.visibility_timeout = timeout;
        }
        if let Some(secs) = env_parse::<f64>("SQS_POLL_INTERVAL_SECS")? {
            config = config.with_poll_interval(duration_from_secs("SQS_POLL_INTERVAL_SECS", secs)?);
        }
        if let Some(workers) = env_parse("SQS_MAX_WORKERS")? {
            config = config.with_max_workers(workers);
        }
        if let Some(kind) = env_parse("SQS_WORKER_KIND")? {
            config.worker_kind = kind;
        }
        if let Some(size) = env_parse("SQS_MAX_MESSAGES")? {
            config = config.with_max_messages(size);
        }
        if let Some(wait) = env_parse("SQS_WAIT_TIME_SECONDS")? {
            config = config.with_wait_time_seconds(wait);
        }
        if let Some(deletable) = env_parse("SQS_DELETABLE_ON_ERROR")? {
            config.deletable_on_error = deletable;
        }
        if let Some(count) = env_parse("SQS_MAX_RETRY_COUNT")? {
            config.max_retry_count = count;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout = seconds.max(0);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the number of execution slots (at least one)
    pub fn with_max_workers(mut self, count: usize) -> Self {
        self.max_workers = count.max(1);
        self
    }

    pub fn with_worker_kind(mut self, kind: WorkerKind) -> Self {
        self.worker_kind = kind;
        self
    }

    /// Set the receive batch size, clamped to what SQS accepts
    pub fn with_max_messages(mut self, size: i32) -> Self {
        self.max_messages = size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_wait_time_seconds(mut self, seconds: i32) -> Self {
        self.wait_time_seconds = seconds.clamp(0, DEFAULT_WAIT_TIME_SECONDS);
        self
    }

    pub fn with_deletable_on_error(mut self, deletable: bool) -> Self {
        self.deletable_on_error = deletable;
        self
    }

    pub fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionProfile) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_decoder(mut self, decoder: BodyDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Check that exactly one queue identity is set
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.queue_name.as_deref().filter(|s| !s.is_empty());
        let url = self.queue_url.as_deref().filter(|s| !s.is_empty());

        match (name, url) {
            (None, None) => return Err(ConfigError::MissingQueueIdentity),
            (Some(name), Some(url)) => {
                return Err(ConfigError::AmbiguousQueueIdentity {
                    queue_name: name.to_string(),
                    queue_url: url.to_string(),
                });
            }
            _ => {}
        }

        self.connection.validate()
    }

    /// Apply overrides in place
    ///
    /// A queue URL override replaces the logical name so the identity stays unique.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.queue_url.filter(|u| !u.is_empty()) {
            self.queue_url = Some(url);
            self.queue_name = None;
        }
        if let Some(timeout) = overrides.visibility_timeout {
            self.visibility_timeout = timeout.max(0);
        }
        if let Some(deletable) = overrides.deletable_on_error {
            self.deletable_on_error = deletable;
        }
        if let Some(interval) = overrides.poll_interval {
            self.poll_interval = interval;
        }
        if let Some(workers) = overrides.max_workers {
            self.max_workers = workers.max(1);
        }
        if let Some(size) = overrides.max_messages {
            self.max_messages = size.clamp(1, MAX_BATCH_SIZE);
        }
        if let Some(kind) = overrides.worker_kind {
            self.worker_kind = kind;
        }
        if let Some(count) = overrides.max_retry_count {
            self.max_retry_count = count;
        }
        if let Some(connection) = overrides.connection {
            self.connection = connection;
        }
    }
}

/// Partial configuration applied on top of a registered handler
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub queue_url: Option<String>,
    pub visibility_timeout: Option<i32>,
    pub deletable_on_error: Option<bool>,
    pub poll_interval: Option<Duration>,
    pub max_workers: Option<usize>,
    pub max_messages: Option<i32>,
    pub worker_kind: Option<WorkerKind>,
    pub max_retry_count: Option<u32>,
    pub connection: Option<ConnectionProfile>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.queue_url.is_none()
            && self.visibility_timeout.is_none()
            && self.deletable_on_error.is_none()
            && self.poll_interval.is_none()
            && self.max_workers.is_none()
            && self.max_messages.is_none()
            && self.worker_kind.is_none()
            && self.max_retry_count.is_none()
            && self.connection.is_none()
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::ParseError {
                key: key.to_string(),
                details: e.to_string(),
            })
        })
        .transpose()
}

fn duration_from_secs(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::ParseError {
        key: key.to_string(),
        details: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQS_VARS: [&str; 11] = [
        "SQS_QUEUE_NAME",
        "SQS_QUEUE_URL",
        "SQS_VISIBILITY_TIMEOUT",
        "SQS_POLL_INTERVAL_SECS",
        "SQS_MAX_WORKERS",
        "SQS_WORKER_KIND",
        "SQS_MAX_MESSAGES",
        "SQS_WAIT_TIME_SECONDS",
        "SQS_DELETABLE_ON_ERROR",
        "SQS_MAX_RETRY_COUNT",
        "AWS_SECRET_ACCESS_KEY",
    ];

    fn cleared(extra: &[(&'static str, Option<&'static str>)]) -> Vec<(&'static str, Option<&'static str>)> {
        let mut vars: Vec<_> = SQS_VARS.iter().map(|k| (*k, None)).collect();
        vars.push(("AWS_ACCESS_KEY_ID", None));
        vars.extend_from_slice(extra);
        vars
    }

    #[test]
    fn test_defaults() {
        let config = HandlerConfig::for_queue_name("orders");
        assert_eq!(config.visibility_timeout, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.worker_kind, WorkerKind::Task);
        assert_eq!(config.max_messages, 1);
        assert_eq!(config.wait_time_seconds, 20);
        assert!(!config.deletable_on_error);
        assert_eq!(config.max_retry_count, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_identity_must_be_unique() {
        assert_eq!(
            HandlerConfig::default().validate(),
            Err(ConfigError::MissingQueueIdentity)
        );

        let mut both = HandlerConfig::for_queue_name("orders");
        both.queue_url = Some("http://localhost:4566/000000000000/orders".into());
        assert!(matches!(
            both.validate(),
            Err(ConfigError::AmbiguousQueueIdentity { .. })
        ));

        let mut empty_name = HandlerConfig::for_queue_url("http://q");
        empty_name.queue_name = Some(String::new());
        assert!(empty_name.validate().is_ok());
    }

    #[test]
    fn test_builder_clamps() {
        let config = HandlerConfig::for_queue_url("http://q")
            .with_max_workers(0)
            .with_max_messages(50)
            .with_wait_time_seconds(60);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.max_messages, 10);
        assert_eq!(config.wait_time_seconds, 20);
    }

    #[test]
    fn test_half_configured_credentials_rejected() {
        let mut profile = ConnectionProfile::default();
        profile.access_key_id = Some("AKIA".into());
        assert!(profile.validate().is_err());
        assert!(profile.static_credentials().is_none());

        let profile = ConnectionProfile::default().with_credentials("AKIA", "secret");
        assert_eq!(profile.static_credentials(), Some(("AKIA", "secret")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let profile = ConnectionProfile::default()
            .with_credentials("AKIA", "very-secret")
            .with_session_token("token-value");
        let rendered = format!("{profile:?}");
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("token-value"));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = HandlerConfig::for_queue_name("orders");
        config.apply(ConfigOverrides {
            queue_url: Some("http://localhost:9324/queue/orders".into()),
            visibility_timeout: Some(30),
            max_workers: Some(4),
            max_messages: Some(10),
            ..Default::default()
        });

        assert_eq!(config.queue_name, None);
        assert_eq!(
            config.queue_url.as_deref(),
            Some("http://localhost:9324/queue/orders")
        );
        assert_eq!(config.visibility_timeout, 30);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.max_messages, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_overrides() {
        assert!(ConfigOverrides::default().is_empty());
        let overrides = ConfigOverrides {
            max_workers: Some(2),
            ..Default::default()
        };
        assert!(!overrides.is_empty());
    }

    #[test]
    fn test_worker_kind_from_str() {
        assert_eq!("task".parse::<WorkerKind>(), Ok(WorkerKind::Task));
        assert_eq!("Blocking".parse::<WorkerKind>(), Ok(WorkerKind::Blocking));
        assert_eq!("process".parse::<WorkerKind>(), Ok(WorkerKind::Blocking));
        assert!("fiber".parse::<WorkerKind>().is_err());
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            cleared(&[
                ("SQS_QUEUE_NAME", Some("billing.fifo")),
                ("SQS_VISIBILITY_TIMEOUT", Some("45")),
                ("SQS_POLL_INTERVAL_SECS", Some("0.5")),
                ("SQS_MAX_WORKERS", Some("8")),
                ("SQS_DELETABLE_ON_ERROR", Some("true")),
                ("SQS_MAX_RETRY_COUNT", Some("3")),
            ]),
            || {
                let config = HandlerConfig::from_env().unwrap();
                assert_eq!(config.queue_name.as_deref(), Some("billing.fifo"));
                assert_eq!(config.visibility_timeout, 45);
                assert_eq!(config.poll_interval, Duration::from_millis(500));
                assert_eq!(config.max_workers, 8);
                assert!(config.deletable_on_error);
                assert_eq!(config.max_retry_count, 3);
            },
        );
    }

    #[test]
    fn test_from_env_requires_queue() {
        temp_env::with_vars(cleared(&[]), || {
            assert_eq!(
                HandlerConfig::from_env().unwrap_err(),
                ConfigError::MissingQueueIdentity
            );
        });
    }

    #[test]
    fn test_from_env_parse_error() {
        temp_env::with_vars(
            cleared(&[
                ("SQS_QUEUE_URL", Some("http://q")),
                ("SQS_MAX_WORKERS", Some("many")),
            ]),
            || {
                let err = HandlerConfig::from_env().unwrap_err();
                assert!(
                    matches!(err, ConfigError::ParseError { ref key, .. } if key == "SQS_MAX_WORKERS")
                );
            },
        );
    }
}
