use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use energiinfo::error::EnergiinfoError;
use energiinfo::meter::{Credentials, MeterClient, PeriodRequest, QueryParams};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the stand-in API saw for one request
#[derive(Debug, Clone)]
struct Seen {
    query: HashMap<String, String>,
    content_type: Option<String>,
}

#[derive(Clone)]
struct MockApi {
    seen: Arc<Mutex<Vec<Seen>>>,
    login_status: StatusCode,
    login_body: String,
    data_status: StatusCode,
    data_body: String,
    data_delay: Duration,
}

impl MockApi {
    fn new(login_body: &str, data_body: &str) -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            login_status: StatusCode::OK,
            login_body: login_body.to_string(),
            data_status: StatusCode::OK,
            data_body: data_body.to_string(),
            data_delay: Duration::ZERO,
        }
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn logins(&self) -> usize {
        self.seen()
            .iter()
            .filter(|s| s.query.get("access_token").map(String::as_str) == Some("none"))
            .count()
    }
}

async fn handle(
    State(api): State<MockApi>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let is_login = query.get("access_token").map(String::as_str) == Some("none");
    api.seen.lock().unwrap().push(Seen {
        query,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let (status, body) = if is_login {
        (api.login_status, api.login_body.clone())
    } else {
        if !api.data_delay.is_zero() {
            tokio::time::sleep(api.data_delay).await;
        }
        (api.data_status, api.data_body.clone())
    };
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

/// Serve `api` on an ephemeral port and return its base URL
async fn serve(api: MockApi) -> String {
    let router = axum::Router::new()
        .route("/", get(handle))
        .with_state(api);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/", addr)
}

/// Direct connections only; a proxy from the environment would hide the stand-in
fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("anna", "hunter2", "site-1", "735999")
}

fn q<'s>(seen: &'s Seen, key: &str) -> Option<&'s str> {
    seen.query.get(key).map(String::as_str)
}

/// In-memory sink for formatted log lines
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route this thread's log output into a buffer for the guard's lifetime
fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

/// A port nothing listens on, so connections are refused
async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

#[tokio::test]
async fn login_token_is_cached_and_sent_with_period_requests() {
    let api = MockApi::new(
        r#"{"access_token":"abc123"}"#,
        r#"{"values":[{"time":"2021-08-01 00:00","value":1.25}]}"#,
    );
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(base);

    let data = client.fetch_period_data().await;
    assert_eq!(
        serde_json::Value::Object(data),
        json!({"values":[{"time":"2021-08-01 00:00","value":1.25}]})
    );
    assert_eq!(client.cached_access_token(), Some("abc123"));

    let seen = api.seen();
    assert_eq!(seen.len(), 2);

    let login = &seen[0];
    assert_eq!(q(login, "access_token"), Some("none"));
    assert_eq!(q(login, "username"), Some("anna"));
    assert_eq!(q(login, "password"), Some("hunter2"));
    assert_eq!(q(login, "site"), Some("site-1"));
    assert_eq!(q(login, "type"), Some("permanent"));
    assert_eq!(q(login, "meter_id"), Some("735999"));

    let period = &seen[1];
    assert_eq!(q(period, "access_token"), Some("abc123"));
    assert_eq!(q(period, "meter_id"), Some("735999"));
    assert_eq!(q(period, "period"), Some("202108"));
    assert_eq!(q(period, "signal"), Some("ActiveEnergy"));
    assert_eq!(q(period, "interval"), Some("hour"));
    assert_eq!(q(period, "count"), Some("24"));
    assert_eq!(
        period.content_type.as_deref(),
        Some("application/json; charset=UTF-8")
    );

    // Second poll reuses the token
    let _ = client.fetch_period_data().await;
    assert_eq!(api.seen().len(), 3);
    assert_eq!(api.logins(), 1);
}

#[tokio::test]
async fn token_fetch_is_idempotent() {
    let api = MockApi::new(r#"{"access_token":"abc123"}"#, "{}");
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(base);

    assert_eq!(client.get_access_token().await.as_deref(), Some("abc123"));
    assert_eq!(client.get_access_token().await.as_deref(), Some("abc123"));
    assert_eq!(api.seen().len(), 1);
}

#[tokio::test]
async fn seeded_token_skips_login() {
    let api = MockApi::new(r#"{"access_token":"unused"}"#, r#"{"values":[]}"#);
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http)
        .with_base_url(base)
        .with_access_token("seeded");

    let data = client.try_fetch_period_data().await.unwrap();
    assert_eq!(serde_json::Value::Object(data), json!({"values": []}));
    assert_eq!(api.logins(), 0);
    assert_eq!(q(&api.seen()[0], "access_token"), Some("seeded"));
}

#[tokio::test]
async fn failed_login_is_not_cached_and_retried() {
    let api = MockApi::new(r#"{"error":"invalid credentials"}"#, r#"{"values":[]}"#);
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(base);

    assert!(client.get_access_token().await.is_none());
    assert!(client.cached_access_token().is_none());
    assert!(client.get_access_token().await.is_none());
    assert_eq!(api.logins(), 2);

    // The period request is never sent without a token
    assert!(client.fetch_period_data().await.is_empty());
    let err = client.try_fetch_period_data().await.unwrap_err();
    assert!(matches!(err, EnergiinfoError::Parse { .. }));
    assert_eq!(api.logins(), 4);
    assert_eq!(api.seen().len(), 4);
}

#[tokio::test]
async fn empty_token_is_rejected() {
    let api = MockApi::new(r#"{"access_token":""}"#, "{}");
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(base);

    let err = client.try_access_token().await.unwrap_err();
    assert!(matches!(err, EnergiinfoError::Auth { .. }));
    assert!(client.cached_access_token().is_none());
}

#[tokio::test]
async fn timed_out_period_fetch_returns_empty_map() {
    let mut api = MockApi::new(r#"{"access_token":"abc123"}"#, r#"{"values":[]}"#);
    api.data_delay = Duration::from_millis(800);
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http)
        .with_base_url(base)
        .with_timeout(Duration::from_millis(100));

    let data = client.fetch_period_data().await;
    assert!(data.is_empty());
    // Login itself succeeded before the slow request
    assert_eq!(client.cached_access_token(), Some("abc123"));

    let err = client.try_fetch_period_data().await.unwrap_err();
    assert!(matches!(err, EnergiinfoError::Timeout { .. }));
}

#[tokio::test]
async fn malformed_and_non_object_bodies_are_parse_errors() {
    for body in ["this is not json", "[1,2,3]", "42"] {
        let api = MockApi::new(r#"{"access_token":"abc123"}"#, body);
        let base = serve(api.clone()).await;
        let http = http_client();
        let mut client = MeterClient::new(credentials(), &http).with_base_url(base);

        assert!(client.fetch_period_data().await.is_empty(), "body {body}");
        let err = client.try_fetch_period_data().await.unwrap_err();
        assert!(matches!(err, EnergiinfoError::Parse { .. }), "body {body}: {err}");
    }
}

#[tokio::test]
async fn http_error_status_is_api_error() {
    let mut api = MockApi::new(r#"{"access_token":"abc123"}"#, r#"{"error":"boom"}"#);
    api.data_status = StatusCode::INTERNAL_SERVER_ERROR;
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(base);

    assert!(client.fetch_period_data().await.is_empty());
    let err = client.try_fetch_period_data().await.unwrap_err();
    assert!(matches!(err, EnergiinfoError::Api { .. }));
}

#[tokio::test]
async fn login_http_error_leaves_token_absent() {
    let mut api = MockApi::new(r#"{"access_token":"abc123"}"#, "{}");
    api.login_status = StatusCode::UNAUTHORIZED;
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(base);

    assert!(client.get_access_token().await.is_none());
    assert!(client.cached_access_token().is_none());
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http)
        .with_base_url(closed_port_url().await)
        .with_access_token("abc123");

    assert!(client.fetch_period_data().await.is_empty());
    let err = client.try_fetch_period_data().await.unwrap_err();
    assert!(matches!(err, EnergiinfoError::Transport { .. }), "{err}");
}

#[tokio::test]
async fn fetch_merges_caller_params_with_defaults() {
    let api = MockApi::new(r#"{"access_token":"abc123"}"#, r#"{"ok":true}"#);
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(base);
    client.get_access_token().await.unwrap();

    let params = QueryParams::new()
        .with("period", 202_108)
        .with("signal", "ActiveEnergy")
        .with("meter_id", "someone-else");
    let body = client
        .fetch("period", &params, &HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(body, json!({"ok": true}));

    let seen = api.seen();
    let last = seen.last().unwrap();
    assert_eq!(q(last, "meter_id"), Some("735999"));
    assert_eq!(q(last, "access_token"), Some("abc123"));
    assert_eq!(q(last, "period"), Some("202108"));
    assert_eq!(q(last, "signal"), Some("ActiveEnergy"));
    assert_eq!(last.query.len(), 4);
}

#[tokio::test]
async fn fetch_without_token_sends_nothing() {
    let api = MockApi::new(r#"{"access_token":"abc123"}"#, "{}");
    let base = serve(api.clone()).await;
    let http = http_client();
    let client = MeterClient::new(credentials(), &http).with_base_url(base);

    let result = client
        .fetch("period", &QueryParams::new(), &HeaderMap::new())
        .await;
    assert!(result.is_none());
    assert!(api.seen().is_empty());
}

#[tokio::test]
async fn configured_period_request_is_sent() {
    let api = MockApi::new(r#"{"access_token":"abc123"}"#, r#"{"values":[]}"#);
    let base = serve(api.clone()).await;
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http)
        .with_base_url(base)
        .with_period_request(PeriodRequest {
            period: 20_240_115,
            signal: "ReactiveEnergy".to_string(),
            interval: "day".to_string(),
            count: 7,
        });

    client.try_fetch_period_data().await.unwrap();
    let seen = api.seen();
    let period = seen.last().unwrap();
    assert_eq!(q(period, "period"), Some("20240115"));
    assert_eq!(q(period, "signal"), Some("ReactiveEnergy"));
    assert_eq!(q(period, "interval"), Some("day"));
    assert_eq!(q(period, "count"), Some("7"));
}

#[tokio::test]
async fn transport_errors_do_not_leak_credentials() {
    let (logs, _guard) = capture_logs();
    let base = closed_port_url().await;
    let http = http_client();

    let mut client = MeterClient::new(credentials(), &http).with_base_url(base.clone());
    assert!(client.fetch_period_data().await.is_empty());
    let err = client.try_access_token().await.unwrap_err();
    assert!(matches!(err, EnergiinfoError::Transport { .. }), "{err}");
    assert!(!err.to_string().contains("hunter2"), "{err}");

    let mut seeded = MeterClient::new(credentials(), &http)
        .with_base_url(base)
        .with_access_token("s3cr3t-token");
    assert!(seeded.fetch_period_data().await.is_empty());
    let err = seeded.try_fetch_period_data().await.unwrap_err();
    assert!(!err.to_string().contains("s3cr3t-token"), "{err}");

    let text = logs.text();
    assert!(text.contains("Error fetching information from energiinfo"), "{text}");
    assert!(!text.contains("hunter2"), "{text}");
    assert!(!text.contains("s3cr3t-token"), "{text}");
}

#[tokio::test]
async fn failed_login_is_logged_as_login_command() {
    let (logs, _guard) = capture_logs();
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http).with_base_url(closed_port_url().await);

    assert!(client.fetch_period_data().await.is_empty());

    let text = logs.text();
    assert!(text.contains("energiinfo: login with"), "{text}");
    assert!(!text.contains("energiinfo: period with"), "{text}");
}

#[tokio::test]
async fn invalid_base_url_is_unexpected_error() {
    let (logs, _guard) = capture_logs();
    let http = http_client();
    let mut client = MeterClient::new(credentials(), &http)
        .with_base_url("not a url")
        .with_access_token("abc123");

    assert!(client.fetch_period_data().await.is_empty());
    assert!(
        client
            .fetch("period", &QueryParams::new(), &HeaderMap::new())
            .await
            .is_none()
    );
    let err = client.try_fetch_period_data().await.unwrap_err();
    assert!(matches!(err, EnergiinfoError::Unexpected { .. }), "{err}");
    assert_eq!(err.kind(), "unexpected");

    let text = logs.text();
    assert!(text.contains("Something really wrong happened! period with"), "{text}");
}
