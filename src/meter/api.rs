use crate::config::{ApiConfig, Config, MeterConfig};
use crate::error::Result;
use crate::meter::client::MeterClient;
use crate::meter::types::Credentials;
use serde_json::{Map, Value};
use std::time::Duration;

/// Build the HTTP client shared by every `MeterClient` of the process.
///
/// The per-request bound is enforced by `MeterClient`; only the connect
/// phase is limited here.
pub fn build_http_client(cfg: &ApiConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
        .build()?;
    Ok(client)
}

pub fn credentials_from_config(meter: &MeterConfig) -> Credentials {
    Credentials::new(
        meter.username.clone(),
        meter.password.clone(),
        meter.site_id.clone(),
        meter.meter_id.clone(),
    )
}

impl<'a> MeterClient<'a> {
    /// Client configured from the `api`, `meter` and `period` sections
    pub fn from_config(cfg: &Config, http: &'a reqwest::Client) -> Self {
        let client = MeterClient::new(credentials_from_config(&cfg.meter), http)
            .with_base_url(cfg.api.base_url.clone())
            .with_timeout(Duration::from_secs(cfg.api.timeout_secs))
            .with_period_request(cfg.period.clone());
        match cfg.meter.access_token.as_deref() {
            Some(token) => client.with_access_token(token),
            None => client,
        }
    }
}

/// One-line description of a period response for poll logs
pub fn summarize_period_data(data: &Map<String, Value>) -> String {
    if data.is_empty() {
        return "no period data".to_string();
    }
    let mut parts: Vec<String> = Vec::new();
    if let Some(values) = data.get("values").and_then(Value::as_array) {
        parts.push(format!("values={}", values.len()));
    }
    let mut keys: Vec<&str> = data.keys().map(String::as_str).collect();
    keys.sort_unstable();
    parts.push(format!("keys=[{}]", keys.join(",")));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_config_applies_sections() {
        let mut cfg = Config::default();
        cfg.api.base_url = "http://localhost:8080/".to_string();
        cfg.api.timeout_secs = 3;
        cfg.meter.meter_id = "99".to_string();
        cfg.meter.access_token = Some("seeded".to_string());
        cfg.period.period = 202_401;

        let http = build_http_client(&cfg.api).unwrap();
        let client = MeterClient::from_config(&cfg, &http);
        assert_eq!(client.base_url(), "http://localhost:8080/");
        assert_eq!(client.timeout(), Duration::from_secs(3));
        assert_eq!(client.credentials().meter_id, "99");
        assert_eq!(client.cached_access_token(), Some("seeded"));
        assert_eq!(client.period_request().period, 202_401);
    }

    #[test]
    fn test_summarize_period_data() {
        let data = json!({"values": [1, 2, 3], "unit": "kWh"});
        let map = data.as_object().unwrap();
        assert_eq!(summarize_period_data(map), "values=3 keys=[unit,values]");
        assert_eq!(summarize_period_data(&Map::new()), "no period data");
    }
}
