//! Process configuration from environment variables.
//!
//! `HeraldConfig::from_env()` reads the real environment;
//! `from_lookup` takes any key lookup so tests never touch process state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::QueueName;
use crate::queue::{QueuePolicies, RetryPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS instead of STARTTLS.
    pub secure: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

impl SmtpConfig {
    /// `SMTP_FROM`, falling back to the login user.
    pub fn default_from(&self) -> Option<&str> {
        self.from.as_deref().or(self.user.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Redis { url: String, namespace: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailMode {
    Smtp,
    /// Capture messages in memory; nothing leaves the process.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub email_concurrency: usize,
    pub waitlist_concurrency: usize,
    /// Sleep between claims when a queue is empty.
    pub poll_interval: Duration,
    /// How often stalled active jobs are reclaimed.
    pub reap_interval: Duration,
}

impl WorkerConfig {
    pub fn concurrency(&self, queue: QueueName) -> usize {
        match queue {
            QueueName::Email => self.email_concurrency,
            QueueName::Waitlist => self.waitlist_concurrency,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            email_concurrency: 1,
            waitlist_concurrency: 1,
            poll_interval: Duration::from_millis(1000),
            reap_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeraldConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    pub mail: MailMode,
    pub smtp: SmtpConfig,
    pub policies: QueuePolicies,
    pub worker: WorkerConfig,
    /// JSON seed for the in-memory waitlist directory.
    pub waitlist_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl HeraldConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let smtp = SmtpConfig {
            host: env.string("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port: env.parse("SMTP_PORT")?.unwrap_or(587),
            secure: env.string("SMTP_SECURE").as_deref() == Some("true"),
            user: env.string("SMTP_USER"),
            password: env.string("SMTP_PASS"),
            from: env.string("SMTP_FROM"),
        };

        let mail = match env.string("HERALD_MAIL").as_deref() {
            Some("smtp") => MailMode::Smtp,
            Some("memory") => MailMode::Memory,
            Some(other) => return Err(env.invalid("HERALD_MAIL", other, "expected smtp or memory")),
            None if smtp.user.is_some() => MailMode::Smtp,
            None => MailMode::Memory,
        };

        let store = match env.string("HERALD_STORE").as_deref() {
            Some("memory") => StoreConfig::Memory,
            Some("redis") => env.redis_store()?,
            Some(other) => {
                return Err(env.invalid("HERALD_STORE", other, "expected memory or redis"));
            }
            None if env.string("REDIS_URL").is_some() || env.string("REDIS_HOST").is_some() => {
                env.redis_store()?
            }
            None => StoreConfig::Memory,
        };

        let mut policies = QueuePolicies::default();
        let stalled_after = env.millis("HERALD_STALLED_AFTER_MS")?;
        for queue in QueueName::ALL {
            let prefix = format!("HERALD_{}", queue.as_str().to_uppercase());
            let policy = policies.get_mut(queue);
            if let Some(delay) = env.millis(&format!("{prefix}_RETRY_DELAY_MS"))? {
                policy.retry = RetryPolicy::fixed(delay);
            }
            if let Some(max) = env.parse(&format!("{prefix}_MAX_RETRIES"))? {
                policy.max_retries = max;
            }
            if let Some(keep) = env.parse(&format!("{prefix}_KEEP_SUCCEEDED"))? {
                policy.remove_on_success = keep;
            }
            if let Some(keep) = env.parse(&format!("{prefix}_KEEP_FAILED"))? {
                policy.remove_on_failure = keep;
            }
            if let Some(after) = stalled_after {
                policy.stalled_after = after;
            }
        }

        let defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            email_concurrency: env
                .parse("HERALD_EMAIL_CONCURRENCY")?
                .unwrap_or(defaults.email_concurrency),
            waitlist_concurrency: env
                .parse("HERALD_WAITLIST_CONCURRENCY")?
                .unwrap_or(defaults.waitlist_concurrency),
            poll_interval: env
                .millis("HERALD_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval),
            reap_interval: env
                .millis("HERALD_REAP_INTERVAL_MS")?
                .unwrap_or(defaults.reap_interval),
        };

        let log_format = match env.string("HERALD_LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(env.invalid("HERALD_LOG_FORMAT", other, "expected json or pretty"));
            }
        };

        Ok(Self {
            bind_addr: env
                .parse("HERALD_BIND")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
            store,
            mail,
            smtp,
            policies,
            worker,
            waitlist_file: env.string("HERALD_WAITLIST_FILE").map(PathBuf::from),
            log_format,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Empty values count as unset.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| self.invalid(key, &raw, &e.to_string())),
        }
    }

    fn millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    fn redis_store(&self) -> Result<StoreConfig, ConfigError> {
        let url = match self.string("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = self.string("REDIS_HOST").unwrap_or_else(|| "localhost".to_string());
                let port: u16 = self.parse("REDIS_PORT")?.unwrap_or(6379);
                let db: u32 = self.parse("REDIS_DB")?.unwrap_or(0);
                match self.string("REDIS_PASSWORD") {
                    Some(password) => format!("redis://:{password}@{host}:{port}/{db}"),
                    None => format!("redis://{host}:{port}/{db}"),
                }
            }
        };
        Ok(StoreConfig::Redis {
            url,
            namespace: self
                .string("HERALD_REDIS_NAMESPACE")
                .unwrap_or_else(|| "herald".to_string()),
        })
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<HeraldConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HeraldConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.mail, MailMode::Memory);
        assert_eq!(config.smtp.host, "smtp.gmail.com");
        assert_eq!(config.smtp.port, 587);
        assert!(!config.smtp.secure);
        assert_eq!(config.policies, QueuePolicies::default());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn smtp_user_selects_smtp_and_is_default_sender() {
        let config = config(&[
            ("SMTP_USER", "robot@example.com"),
            ("SMTP_PASS", "pw"),
            ("SMTP_SECURE", "true"),
            ("SMTP_PORT", "465"),
        ])
        .unwrap();

        assert_eq!(config.mail, MailMode::Smtp);
        assert!(config.smtp.secure);
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.default_from(), Some("robot@example.com"));
    }

    #[test]
    fn smtp_from_overrides_user() {
        let config = config(&[("SMTP_USER", "robot@example.com"), ("SMTP_FROM", "hi@aela.app")]).unwrap();
        assert_eq!(config.smtp.default_from(), Some("hi@aela.app"));
    }

    #[test]
    fn redis_url_from_parts() {
        let config = config(&[
            ("REDIS_HOST", "cache"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "pw"),
            ("REDIS_DB", "2"),
        ])
        .unwrap();

        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://:pw@cache:6380/2".into(),
                namespace: "herald".into(),
            }
        );
    }

    #[test]
    fn explicit_memory_store_wins_over_redis_vars() {
        let config = config(&[("HERALD_STORE", "memory"), ("REDIS_URL", "redis://x")]).unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn policy_overrides_are_per_queue() {
        let config = config(&[
            ("HERALD_EMAIL_RETRY_DELAY_MS", "250"),
            ("HERALD_WAITLIST_MAX_RETRIES", "1"),
            ("HERALD_STALLED_AFTER_MS", "5000"),
        ])
        .unwrap();

        assert_eq!(
            config.policies.email.retry.next_delay(1),
            Duration::from_millis(250)
        );
        assert_eq!(config.policies.email.max_retries, 3);
        assert_eq!(config.policies.waitlist.max_retries, 1);
        assert_eq!(config.policies.waitlist.stalled_after, Duration::from_secs(5));
    }

    #[test]
    fn invalid_number_names_the_key() {
        let err = config(&[("SMTP_PORT", "abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == "SMTP_PORT"));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config(&[("SMTP_USER", ""), ("REDIS_HOST", "  ")]).unwrap();
        assert_eq!(config.mail, MailMode::Memory);
        assert_eq!(config.store, StoreConfig::Memory);
    }
}
