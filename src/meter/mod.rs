//! Energiinfo metering API integration
//!
//! A single endpoint serves every command; the query parameters decide
//! whether a request logs in or returns a period series.

pub mod api;
pub mod client;
pub mod types;

// Re-exports for the public API surface
pub use api::{build_http_client, credentials_from_config, summarize_period_data};
pub use client::{
    DEFAULT_TIMEOUT, LOGIN_COMMAND, LOGIN_PLACEHOLDER_TOKEN, MeterClient, PERIOD_COMMAND,
};
pub use types::{Credentials, ParamValue, PeriodRequest, QueryParams};
