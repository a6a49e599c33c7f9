use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_derive::Deserialize;

use crate::error::{Error, Result};

/// What counts as a successful attempt once a response has arrived.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SuccessPolicy {
    /// 4xx and 5xx responses are failures. This is the default.
    NoErrorStatus,
    /// Any response at all is a success; only transport errors fail.
    AnyResponse,
}

impl SuccessPolicy {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            SuccessPolicy::NoErrorStatus => status < 400,
            SuccessPolicy::AnyResponse => true,
        }
    }
}

/// Settings for a latency run
#[derive(Debug, Clone)]
pub struct Config {
    /// Fully-qualified URL; every attempt requests exactly this.
    pub target: String,
    /// Total number of requests to make.
    pub attempts: usize,
    /// Upper bound on requests in flight at once.
    pub workers: usize,
    /// Per-request timeout enforced by the http client. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Optional bound on the whole run. Attempts that haven't started by then are
    /// recorded as cancelled.
    pub deadline: Option<Duration>,
    /// Reuse connections within a worker. Off by default so that every attempt pays
    /// for its own connection setup, which is what a single visitor would see.
    pub keep_alive: bool,
    pub success: SuccessPolicy,
}

impl Config {
    pub fn new(target: impl Into<String>) -> Config {
        Config {
            target: target.into(),
            attempts: 100,
            workers: 10,
            timeout: Some(Duration::from_secs(5)),
            deadline: None,
            keep_alive: false,
            success: SuccessPolicy::NoErrorStatus,
        }
    }

    /// Rejects settings that would make the run meaningless. Called before any network
    /// activity happens.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(Error::InvalidUrl {
                url: self.target.clone(),
                reason: "empty url".into(),
            });
        }
        if self.attempts == 0 {
            return Err(Error::NotPositive("num_tests"));
        }
        if self.workers == 0 {
            return Err(Error::NotPositive("workers"));
        }

        Ok(())
    }

    /// Number of worker threads actually started. Never more than the number of attempts,
    /// since extra workers would only find an empty queue.
    pub fn pool_size(&self) -> usize {
        self.workers.min(self.attempts).max(1)
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(target: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            config: Config::new(target),
        }
    }

    /// Consume the builder and return the inner object
    pub fn build(self) -> Config {
        self.config
    }

    pub fn attempts(mut self, attempts: usize) -> ConfigBuilder {
        self.config.attempts = attempts;
        self
    }

    pub fn workers(mut self, workers: usize) -> ConfigBuilder {
        self.config.workers = workers;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> ConfigBuilder {
        self.config.timeout = timeout;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> ConfigBuilder {
        self.config.deadline = deadline;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> ConfigBuilder {
        self.config.keep_alive = keep_alive;
        self
    }

    pub fn success(mut self, success: SuccessPolicy) -> ConfigBuilder {
        self.config.success = success;
        self
    }
}

/// Defaults loaded from a TOML file. Anything given on the command line wins.
///
/// ```toml
/// num_tests = 500
/// workers = 25
/// timeout = "2s"
/// deadline = "1m"
/// keep_alive = false
/// any_status = false
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub num_tests: Option<usize>,
    pub workers: Option<usize>,
    pub timeout: Option<String>,
    pub deadline: Option<String>,
    pub keep_alive: Option<bool>,
    pub any_status: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<FileConfig> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;

        FileConfig::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<FileConfig> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply(&self, mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
        if let Some(n) = self.num_tests {
            builder = builder.attempts(n);
        }
        if let Some(n) = self.workers {
            builder = builder.workers(n);
        }
        if let Some(timeout) = &self.timeout {
            builder = builder.timeout(parse_duration("timeout", timeout)?);
        }
        if let Some(deadline) = &self.deadline {
            builder = builder.deadline(parse_duration("deadline", deadline)?);
        }
        if let Some(keep_alive) = self.keep_alive {
            builder = builder.keep_alive(keep_alive);
        }
        if let Some(true) = self.any_status {
            builder = builder.success(SuccessPolicy::AnyResponse);
        }

        Ok(builder)
    }
}

/// Parses a human duration such as `5s` or `250ms`. `none` (or `0`) means no limit.
pub fn parse_duration(name: &'static str, value: &str) -> Result<Option<Duration>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") || value == "0" {
        return Ok(None);
    }

    humantime::parse_duration(value)
        .map(Some)
        .map_err(|_| Error::invalid_value(name, value))
}

/// Parses a strictly positive count such as `--num_tests`.
pub fn parse_count(name: &'static str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(Error::NotPositive(name)),
        Ok(n) => Ok(n),
        Err(_) => Err(Error::invalid_value(name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let config = ConfigBuilder::new("https://www.example.com").build();

        assert_eq!(config.attempts, 100);
        assert_eq!(config.workers, 10);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.deadline, None);
        assert!(!config.keep_alive);
        assert_eq!(config.success, SuccessPolicy::NoErrorStatus);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_counts_are_rejected() {
        let config = ConfigBuilder::new("https://www.example.com").attempts(0).build();
        assert!(matches!(config.validate(), Err(Error::NotPositive("num_tests"))));

        let config = ConfigBuilder::new("https://www.example.com").workers(0).build();
        assert!(matches!(config.validate(), Err(Error::NotPositive("workers"))));

        let config = ConfigBuilder::new(" ").build();
        assert!(matches!(config.validate(), Err(Error::InvalidUrl { .. })));
    }

    #[test]
    fn pool_never_exceeds_attempts() {
        let config = ConfigBuilder::new("x").attempts(3).workers(10).build();
        assert_eq!(config.pool_size(), 3);

        let config = ConfigBuilder::new("x").attempts(100).workers(10).build();
        assert_eq!(config.pool_size(), 10);
    }

    #[test]
    fn error_statuses_fail_by_default() {
        assert!(SuccessPolicy::NoErrorStatus.accepts(200));
        assert!(SuccessPolicy::NoErrorStatus.accepts(304));
        assert!(!SuccessPolicy::NoErrorStatus.accepts(404));
        assert!(!SuccessPolicy::NoErrorStatus.accepts(503));
        assert!(SuccessPolicy::AnyResponse.accepts(500));
    }

    #[test]
    fn file_config_overrides_defaults() -> Result<()> {
        let file = FileConfig::parse(
            r#"
            num_tests = 20
            workers = 4
            timeout = "250ms"
            deadline = "none"
            any_status = true
            "#,
        )?;

        let config = file.apply(ConfigBuilder::new("https://www.example.com"))?.build();

        assert_eq!(config.attempts, 20);
        assert_eq!(config.workers, 4);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.deadline, None);
        assert_eq!(config.success, SuccessPolicy::AnyResponse);

        Ok(())
    }

    #[test]
    fn file_config_rejects_unknown_keys() {
        assert!(FileConfig::parse("threads = 4").is_err());
    }

    #[test]
    fn parses_counts_and_durations() {
        assert_eq!(parse_count("workers", "12").ok(), Some(12));
        assert!(matches!(parse_count("workers", "0"), Err(Error::NotPositive(_))));
        assert!(matches!(parse_count("workers", "-3"), Err(Error::InvalidValue { .. })));

        assert_eq!(parse_duration("timeout", "2s").ok(), Some(Some(Duration::from_secs(2))));
        assert_eq!(parse_duration("timeout", "none").ok(), Some(None));
        assert!(parse_duration("timeout", "soon").is_err());
    }
}
