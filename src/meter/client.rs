use crate::config::DEFAULT_BASE_URL;
use crate::error::{EnergiinfoError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::meter::types::{Credentials, PeriodRequest, QueryParams};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};
use std::time::Duration;

pub const LOGIN_COMMAND: &str = "login";
pub const PERIOD_COMMAND: &str = "period";

/// `access_token` value sent with the login request itself
pub const LOGIN_PLACEHOLDER_TOKEN: &str = "none";

/// Default bound on a single request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const CLIENT_USER_AGENT: &str = concat!("energiinfo/", env!("APP_VERSION"));

/// Client for the Energiinfo metering API.
///
/// The HTTP client is borrowed from the caller and shared for the lifetime
/// `'a`; it is never closed or replaced here. The access token is fetched on
/// first use and then kept for the life of this instance, with no expiry or
/// refresh.
pub struct MeterClient<'a> {
    http: &'a reqwest::Client,
    credentials: Credentials,
    base_url: String,
    timeout: Duration,
    period: PeriodRequest,
    access_token: Option<String>,
    logger: StructuredLogger,
}

impl<'a> MeterClient<'a> {
    /// Create a client against the production endpoint
    pub fn new(credentials: Credentials, http: &'a reqwest::Client) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("meter").with_meter_id(credentials.meter_id.clone()),
        );
        Self {
            http,
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            period: PeriodRequest::default(),
            access_token: None,
            logger,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_period_request(mut self, period: PeriodRequest) -> Self {
        self.period = period;
        self
    }

    /// Seed a previously issued token; empty tokens are ignored
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if !token.is_empty() {
            self.access_token = Some(token);
        }
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn period_request(&self) -> &PeriodRequest {
        &self.period
    }

    pub fn set_period_request(&mut self, period: PeriodRequest) {
        self.period = period;
    }

    /// Cached token, if login already succeeded
    pub fn cached_access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Return the cached token or log in to obtain one.
    ///
    /// Failures are logged and yield `None`; nothing is cached, so the next
    /// call tries again.
    pub async fn get_access_token(&mut self) -> Option<String> {
        match self.try_access_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                self.log_failure(LOGIN_COMMAND, &self.login_params(), &e);
                None
            }
        }
    }

    /// Typed variant of [`get_access_token`](Self::get_access_token)
    pub async fn try_access_token(&mut self) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }

        let body = self
            .try_fetch(LOGIN_COMMAND, &self.login_params(), &HeaderMap::new())
            .await?;

        let token = match body.get("access_token") {
            Some(Value::String(token)) => token.clone(),
            Some(other) => {
                return Err(EnergiinfoError::parse(format!(
                    "access_token has unexpected type: {}",
                    json_type_name(other)
                )));
            }
            None => {
                return Err(EnergiinfoError::parse(
                    "login response is missing access_token",
                ));
            }
        };
        if token.is_empty() {
            return Err(EnergiinfoError::auth("login returned an empty access token"));
        }

        self.logger.info("Obtained access token");
        self.access_token = Some(token.clone());
        Ok(token)
    }

    /// Fetch the configured period series; empty map on any failure
    pub async fn fetch_period_data(&mut self) -> Map<String, Value> {
        // Login failures are logged as the login command by get_access_token
        if self.get_access_token().await.is_none() {
            return Map::new();
        }
        match self.try_fetch_period_data().await {
            Ok(data) => data,
            Err(e) => {
                self.log_failure(PERIOD_COMMAND, &self.period.to_params(), &e);
                Map::new()
            }
        }
    }

    /// Typed variant of [`fetch_period_data`](Self::fetch_period_data)
    pub async fn try_fetch_period_data(&mut self) -> Result<Map<String, Value>> {
        self.try_access_token().await?;

        let params = self.period.to_params();
        match self
            .try_fetch(PERIOD_COMMAND, &params, &HeaderMap::new())
            .await?
        {
            Value::Object(data) => {
                self.logger
                    .debug(&format!("Period data received with {} keys", data.len()));
                Ok(data)
            }
            other => Err(EnergiinfoError::parse(format!(
                "period response is a JSON {}, expected an object",
                json_type_name(&other)
            ))),
        }
    }

    /// Send one command; failures are logged and yield `None`
    pub async fn fetch(
        &self,
        command: &str,
        params: &QueryParams,
        headers: &HeaderMap,
    ) -> Option<Value> {
        match self.try_fetch(command, params, headers).await {
            Ok(body) => Some(body),
            Err(e) => {
                self.log_failure(command, params, &e);
                None
            }
        }
    }

    /// Send one command and return the parsed JSON body
    pub async fn try_fetch(
        &self,
        command: &str,
        params: &QueryParams,
        headers: &HeaderMap,
    ) -> Result<Value> {
        let query = self.merged_query(command, params)?;
        let headers = Self::merged_headers(headers);
        self.logger
            .debug(&format!("Sending {} with {}", command, query));

        let request = self
            .http
            .get(&self.base_url)
            .query(&query.to_pairs())
            .headers(headers);

        let exchange = async {
            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(EnergiinfoError::api(format!(
                    "{} answered HTTP {}",
                    command, status
                )));
            }
            let bytes = resp.bytes().await?;
            let body: Value = serde_json::from_slice(&bytes)?;
            Ok::<Value, EnergiinfoError>(body)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(EnergiinfoError::timeout(format!(
                "{} got no response within {:?}",
                command, self.timeout
            ))),
        }
    }

    /// Caller parameters with `access_token` and `meter_id` applied on top
    pub fn merged_query(&self, command: &str, params: &QueryParams) -> Result<QueryParams> {
        let token = if command == LOGIN_COMMAND {
            LOGIN_PLACEHOLDER_TOKEN.to_string()
        } else {
            self.access_token.clone().ok_or_else(|| {
                EnergiinfoError::auth(format!("no access token available for {}", command))
            })?
        };

        let mut query = params.clone();
        query.insert("access_token", token);
        query.insert("meter_id", self.credentials.meter_id.as_str());
        Ok(query)
    }

    /// Fixed JSON content type, overridable by the caller
    pub fn merged_headers(headers: &HeaderMap) -> HeaderMap {
        let mut merged = HeaderMap::new();
        merged.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        merged.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    fn login_params(&self) -> QueryParams {
        QueryParams::new()
            .with("username", self.credentials.username.as_str())
            .with("password", self.credentials.password.as_str())
            .with("site", self.credentials.site_id.as_str())
            .with("type", "permanent")
    }

    fn log_failure(&self, command: &str, params: &QueryParams, err: &EnergiinfoError) {
        let message = match err {
            EnergiinfoError::Timeout { .. } => format!(
                "Timeout error fetching information from energiinfo: {} with {}: {}",
                command, params, err
            ),
            EnergiinfoError::Parse { .. } => format!(
                "Error parsing information from energiinfo: {} with {}: {}",
                command, params, err
            ),
            EnergiinfoError::Transport { .. }
            | EnergiinfoError::Api { .. }
            | EnergiinfoError::Auth { .. } => format!(
                "Error fetching information from energiinfo: {} with {}: {}",
                command, params, err
            ),
            _ => format!(
                "Something really wrong happened! {} with {} - {}",
                command, params, err
            ),
        };
        self.logger.error(&message);
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
