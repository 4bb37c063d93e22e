use gauntlet::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Configuration from the environment
// ---------------------------------------------------------------------------

/// Builds the server config from `lookup` (normally `std::env::var`).
///
/// Unset or unparsable variables keep their defaults.
fn config_from(lookup: impl Fn(&str) -> Option<String>) -> GauntletConfig {
    let number = |key: &str| {
        let raw = lookup(key)?;
        match raw.trim().parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable setting");
                None
            }
        }
    };

    let mut config = GauntletConfig::default();
    if let Some(port) = number("PORT") {
        config.bind_addr = format!("0.0.0.0:{port}");
    }
    if let Some(ttl) = number("SESSION_TTL_SECS") {
        config.session_ttl_secs = Some(ttl);
    }
    if let Some(secs) = number("DINO_TIMEOUT_SECS") {
        config.dino_timeout_secs = secs;
    }
    if let Some(secs) = number("CAPTCHA_TIMEOUT_SECS") {
        config.captcha_timeout_secs = secs;
    }
    if let Some(secs) = number("TOKEN_TTL_SECS") {
        config.token_ttl_secs = secs;
    }
    if let Some(ms) = number("ADMISSION_INTERVAL_MS") {
        config.admission_interval_ms = ms;
    }
    if let Some(url) = lookup("FISH_IMAGE_BASE_URL") {
        config.fish_image_base_url = url;
    }
    config.validated()
}

#[tokio::main]
async fn main() -> Result<(), GauntletError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config_from(|key| std::env::var(key).ok());
    let server = GauntletServer::builder().config(config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "waiting room open");

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
        }
        shutdown.cancel();
    });

    server.run().await
}
