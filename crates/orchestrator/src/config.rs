use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker pool and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound on tasks talking to collectors at once.
    pub max_workers: usize,
    /// Deadline for a task without a per-platform override.
    #[serde(rename = "task_timeout_secs", with = "secs")]
    pub task_timeout: Duration,
    #[serde(with = "secs_map")]
    pub platform_timeouts: HashMap<String, Duration>,
    #[serde(rename = "sweep_interval_secs", with = "secs")]
    pub sweep_interval: Duration,
    /// Admitted records between two progress events of a task.
    pub progress_interval: u64,
    /// Launch-wide default for skipping misconfigured arenas.
    pub skip_invalid_arenas: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            task_timeout: Duration::from_secs(30 * 60),
            platform_timeouts: HashMap::new(),
            sweep_interval: Duration::from_secs(30),
            progress_interval: 25,
            skip_invalid_arenas: false,
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_platform_timeout(mut self, platform: impl Into<String>, timeout: Duration) -> Self {
        self.platform_timeouts.insert(platform.into(), timeout);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn timeout_for(&self, platform: &str) -> Duration {
        self.platform_timeouts
            .get(platform)
            .copied()
            .unwrap_or(self.task_timeout)
    }
}

/// Duplicate and near-duplicate thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Words per shingle fed into the similarity fingerprint.
    pub shingle_size: usize,
    /// Recent records of the run compared against each candidate.
    pub window_size: usize,
    /// Distance at or below which a record is flagged as a near-duplicate.
    pub flag_distance: u32,
    /// Distance at or below which a near-duplicate is rejected. Off when unset.
    pub reject_distance: Option<u32>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            shingle_size: 3,
            window_size: 1000,
            flag_distance: 3,
            reject_distance: None,
        }
    }
}

/// Health rules applied to every pooled credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialPolicy {
    /// Consecutive errors after which a credential is deactivated.
    pub max_consecutive_errors: u32,
    /// First cooldown after a rate limit without a retry hint.
    #[serde(rename = "rate_limit_backoff_secs", with = "secs")]
    pub rate_limit_backoff: Duration,
    #[serde(rename = "max_backoff_secs", with = "secs")]
    pub max_backoff: Duration,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 3,
            rate_limit_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(15 * 60),
        }
    }
}

impl CredentialPolicy {
    /// Cooldown after the given number of consecutive rate limits.
    pub fn backoff(&self, consecutive_errors: u32) -> Duration {
        let exponent = consecutive_errors.saturating_sub(1).min(16);
        self.rate_limit_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Durations written as (fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}

mod secs_map {
    use std::collections::HashMap;
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &HashMap<String, Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(value.iter().map(|(k, v)| (k, v.as_secs_f64())))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, Duration>, D::Error> {
        HashMap::<String, f64>::deserialize(deserializer)?
            .into_iter()
            .map(|(platform, secs)| {
                Duration::try_from_secs_f64(secs)
                    .map(|d| (platform, d))
                    .map_err(de::Error::custom)
            })
            .collect()
    }
}
