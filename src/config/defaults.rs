use super::*;

/// Single endpoint every command is sent to
pub const DEFAULT_BASE_URL: &str = "https://api4.energiinfo.se/";

/// Longest accepted poll interval, one week
pub const MAX_POLL_INTERVAL_SECS: u64 = 7 * 24 * 3600;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/energiinfo.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            meter: MeterConfig::default(),
            period: PeriodRequest::default(),
            logging: LoggingConfig::default(),
            poll_interval_secs: 3600,
        }
    }
}
