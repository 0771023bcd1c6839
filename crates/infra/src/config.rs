//! Process configuration, read from the environment.
//!
//! A `.env` file in the working directory is loaded first (if present);
//! real environment variables take precedence over it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Stream keys of the five queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub submissions: String,
    pub archive: String,
    pub restore: String,
    pub thaw: String,
    /// Completion notices for external consumers (mailer); not read here.
    pub results_notify: String,
}

/// Bus topics workers publish on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNames {
    pub requests: String,
    pub results: String,
    pub restore: String,
    pub thaw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrataConfig {
    pub database_url: String,
    pub redis_url: String,
    pub results_bucket: String,
    pub results_prefix: String,
    pub vault_name: String,
    pub aws_region: Option<String>,
    pub queues: QueueNames,
    pub topics: TopicNames,
    pub visibility_timeout: Duration,
    pub workspace_root: PathBuf,
    pub runner_program: PathBuf,
    /// Only the runner needs this; see [`StrataConfig::annotator_program`].
    pub annotator_program: Option<PathBuf>,
}

impl StrataConfig {
    /// Load `.env` (if any), then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case in deployment.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let visibility_timeout = match get("STRATA_VISIBILITY_TIMEOUT_SECS") {
            None => Duration::from_secs(30),
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::Invalid {
                        key: "STRATA_VISIBILITY_TIMEOUT_SECS",
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: "STRATA_VISIBILITY_TIMEOUT_SECS",
                        value: raw,
                        reason: "must be at least one second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            results_bucket: required("STRATA_RESULTS_BUCKET")?,
            results_prefix: or("STRATA_RESULTS_PREFIX", "results")
                .trim_matches('/')
                .to_string(),
            vault_name: required("STRATA_VAULT_NAME")?,
            aws_region: get("AWS_REGION"),
            queues: QueueNames {
                submissions: or("STRATA_QUEUE_SUBMISSIONS", "strata:submissions"),
                archive: or("STRATA_QUEUE_ARCHIVE", "strata:archive"),
                restore: or("STRATA_QUEUE_RESTORE", "strata:restore"),
                thaw: or("STRATA_QUEUE_THAW", "strata:thaw"),
                results_notify: or("STRATA_QUEUE_RESULTS_NOTIFY", "strata:results-notify"),
            },
            topics: TopicNames {
                requests: or("STRATA_TOPIC_REQUESTS", "job-requests"),
                results: or("STRATA_TOPIC_RESULTS", "job-results"),
                restore: or("STRATA_TOPIC_RESTORE", "restore-requests"),
                thaw: or("STRATA_TOPIC_THAW", "thaw-requests"),
            },
            visibility_timeout,
            workspace_root: PathBuf::from(or("STRATA_WORKSPACE_ROOT", "./jobs")),
            runner_program: PathBuf::from(or("STRATA_RUNNER_PROGRAM", "strata-runner")),
            annotator_program: get("STRATA_ANNOTATOR_PROGRAM").map(PathBuf::from),
        })
    }

    /// Topic → queue routing every process installs on its bus.
    pub fn routes(&self) -> Vec<(String, String)> {
        vec![
            (self.topics.requests.clone(), self.queues.submissions.clone()),
            (self.topics.results.clone(), self.queues.archive.clone()),
            (self.topics.results.clone(), self.queues.results_notify.clone()),
            (self.topics.restore.clone(), self.queues.restore.clone()),
            (self.topics.thaw.clone(), self.queues.thaw.clone()),
        ]
    }

    pub fn annotator_program(&self) -> Result<&PathBuf, ConfigError> {
        self.annotator_program
            .as_ref()
            .ok_or(ConfigError::Missing("STRATA_ANNOTATOR_PROGRAM"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/strata"),
        ("REDIS_URL", "redis://localhost:6379"),
        ("STRATA_RESULTS_BUCKET", "results-bucket"),
        ("STRATA_VAULT_NAME", "strata-vault"),
    ];

    #[test]
    fn defaults_fill_optional_settings() {
        let config = StrataConfig::from_lookup(env(REQUIRED)).unwrap();
        assert_eq!(config.results_prefix, "results");
        assert_eq!(config.visibility_timeout, Duration::from_secs(30));
        assert_eq!(config.queues.thaw, "strata:thaw");
        assert_eq!(config.topics.results, "job-results");
        assert_eq!(config.runner_program, PathBuf::from("strata-runner"));
        assert!(config.aws_region.is_none());
        assert_eq!(
            config.annotator_program(),
            Err(ConfigError::Missing("STRATA_ANNOTATOR_PROGRAM"))
        );
    }

    #[test]
    fn missing_required_setting_is_named() {
        let partial = &REQUIRED[1..];
        assert_eq!(
            StrataConfig::from_lookup(env(partial)),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STRATA_VAULT_NAME", "  "));
        let lookup = env(&pairs);
        assert_eq!(
            StrataConfig::from_lookup(lookup),
            Err(ConfigError::Missing("STRATA_VAULT_NAME"))
        );
    }

    #[test]
    fn visibility_timeout_is_validated() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STRATA_VISIBILITY_TIMEOUT_SECS", "soon"));
        assert!(matches!(
            StrataConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { key: "STRATA_VISIBILITY_TIMEOUT_SECS", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STRATA_VISIBILITY_TIMEOUT_SECS", "0"));
        assert!(StrataConfig::from_lookup(env(&pairs)).is_err());
    }

    #[test]
    fn results_fan_out_to_archive_and_notify() {
        let config = StrataConfig::from_lookup(env(REQUIRED)).unwrap();
        let results: Vec<_> = config
            .routes()
            .into_iter()
            .filter(|(topic, _)| topic == "job-results")
            .map(|(_, queue)| queue)
            .collect();
        assert_eq!(results, ["strata:archive", "strata:results-notify"]);
    }

    #[test]
    fn prefix_slashes_are_trimmed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STRATA_RESULTS_PREFIX", "/annotated/"));
        let config = StrataConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.results_prefix, "annotated");
    }
}
