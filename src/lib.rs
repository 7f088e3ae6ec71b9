//! # Energiinfo - polling client for the Energiinfo metering API
//!
//! Logs in once against `https://api4.energiinfo.se/` to obtain an access
//! token, then polls energy-usage time series for one meter.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, defaults and validation
//! - `logging`: Structured logging and tracing
//! - `meter`: The metering API client and its request types
//! - `error`: Error type shared by all of the above
//!
//! Every fallible client operation comes in two forms: a compatibility form
//! that logs failures and returns an empty value, and a `try_*` form that
//! returns a typed [`EnergiinfoError`].

pub mod config;
pub mod error;
pub mod logging;
pub mod meter;

// Re-export commonly used types
pub use config::Config;
pub use error::{EnergiinfoError, Result};
pub use meter::{Credentials, MeterClient, PeriodRequest, QueryParams};
