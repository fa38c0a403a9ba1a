use serde::{Deserialize, Serialize};

/// Marketplace minimum poll interval in seconds.
pub const VAST_MIN_POLL_INTERVAL_SECS: u64 = 60;

/// Poll interval floor: marketplace minimum plus a 500% cushion.
pub const MIN_POLL_INTERVAL_SECS: u64 = VAST_MIN_POLL_INTERVAL_SECS * 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub vast: VastConfig,
    pub collector: CollectorConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VastConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds between poll cycles; never below `MIN_POLL_INTERVAL_SECS`
    pub poll_interval_secs: u64,
    /// Include unverified and deverified hosts in polling
    pub include_unverified: bool,
    /// Extra search filters as a JSON object, shallow-merged into each query
    pub extra_filters_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Minimum snapshots per offer for occupancy rows
    pub min_samples: usize,
    /// Minimum sampled minutes per offer for occupancy rows
    pub min_total_minutes: f64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/vastwatch".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for VastConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloud.vast.ai/api/v0".to_string(),
            api_key: None,
            requests_per_minute: 30,
            timeout_secs: 60,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: MIN_POLL_INTERVAL_SECS,
            include_unverified: true,
            extra_filters_json: None,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            min_samples: 2,
            min_total_minutes: 0.0,
        }
    }
}

impl CollectorConfig {
    /// Returns the effective poll interval, clamped to the marketplace floor.
    ///
    /// A zero setting means "unset" and falls back to the floor.
    #[must_use]
    pub fn effective_poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_is_clamped() {
        let mut config = CollectorConfig::default();
        assert_eq!(config.effective_poll_interval_secs(), 360);

        config.poll_interval_secs = 30;
        assert_eq!(config.effective_poll_interval_secs(), 360);

        config.poll_interval_secs = 0;
        assert_eq!(config.effective_poll_interval_secs(), 360);

        config.poll_interval_secs = 900;
        assert_eq!(config.effective_poll_interval_secs(), 900);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"collector": {"poll_interval_secs": 600}}"#).unwrap();
        assert_eq!(config.collector.poll_interval_secs, 600);
        assert!(config.collector.include_unverified);
        assert_eq!(config.report.min_samples, 2);
        assert_eq!(config.database.max_connections, 10);
    }
}
