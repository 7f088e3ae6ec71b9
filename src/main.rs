use anyhow::{Context, Result};
use energiinfo::Config;
use energiinfo::logging::init_logging;
use energiinfo::meter::{MeterClient, build_http_client, summarize_period_data};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // energiinfo [CONFIG] [--once]
    let mut once = false;
    let mut config_path: Option<String> = None;
    for arg in std::env::args().skip(1) {
        if arg == "--once" {
            once = true;
        } else {
            config_path = Some(arg);
        }
    }

    let mut config = match &config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    info!(
        "Energiinfo client {} starting for meter {}",
        env!("APP_VERSION"),
        config.meter.meter_id
    );

    let http = build_http_client(&config.api)?;
    let mut client = MeterClient::from_config(&config, &http);

    if once {
        let data = client.try_fetch_period_data().await?;
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let data = client.fetch_period_data().await;
                if data.is_empty() {
                    warn!("Poll returned no period data");
                } else {
                    info!("Poll complete: {}", summarize_period_data(&data));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
