use serde::Deserialize;
use std::time::Duration;

use crate::lookup_client::LookupClientConfig;

pub const DEFAULT_HUBSPOT_BASE_URL: &str = "https://api.hubapi.com";
pub const DEFAULT_HUBSPOT_AUTHORIZE_URL: &str = "https://app.hubspot.com/oauth/authorize";
pub const DEFAULT_CNPJ_API_BASE_URL: &str = "https://publica.cnpj.ws";
pub const DEFAULT_SCOPES: &str = "crm.objects.companies.read crm.objects.companies.write crm.schemas.companies.read crm.schemas.companies.write";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub hubspot_base_url: String,
    pub hubspot_authorize_url: String,
    pub hubspot_client_id: String,
    pub hubspot_client_secret: String,
    pub hubspot_redirect_uri: String,
    pub hubspot_scopes: String,
    pub cnpj_api_base_url: String,
    pub cnpj_max_requests_per_window: usize,
    pub cnpj_window_secs: u64,
    pub cnpj_min_delay_secs: u64,
    pub cnpj_cache_ttl_secs: u64,
    pub cnpj_request_timeout_secs: u64,
    /// 0 disables the background poller.
    pub poll_interval_secs: u64,
    pub poll_batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            hubspot_base_url: url_var("HUBSPOT_BASE_URL", DEFAULT_HUBSPOT_BASE_URL)?,
            hubspot_authorize_url: url_var("HUBSPOT_AUTHORIZE_URL", DEFAULT_HUBSPOT_AUTHORIZE_URL)?,
            hubspot_client_id: required_var("HUBSPOT_CLIENT_ID")?,
            hubspot_client_secret: required_var("HUBSPOT_CLIENT_SECRET")?,
            hubspot_redirect_uri: std::env::var("HUBSPOT_REDIRECT_URI")
                .map_err(|_| anyhow::anyhow!("HUBSPOT_REDIRECT_URI environment variable required"))
                .and_then(|uri| {
                    if !uri.starts_with("http://") && !uri.starts_with("https://") {
                        anyhow::bail!("HUBSPOT_REDIRECT_URI must start with http:// or https://");
                    }
                    Ok(uri)
                })?,
            hubspot_scopes: std::env::var("HUBSPOT_SCOPES")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCOPES.to_string()),
            cnpj_api_base_url: url_var("CNPJ_API_BASE_URL", DEFAULT_CNPJ_API_BASE_URL)?,
            cnpj_max_requests_per_window: number_var("CNPJ_MAX_REQUESTS_PER_WINDOW", 3)?,
            cnpj_window_secs: number_var("CNPJ_WINDOW_SECS", 60)?,
            cnpj_min_delay_secs: number_var("CNPJ_MIN_DELAY_SECS", 20)?,
            cnpj_cache_ttl_secs: number_var("CNPJ_CACHE_TTL_SECS", 3600)?,
            cnpj_request_timeout_secs: number_var("CNPJ_REQUEST_TIMEOUT_SECS", 15)?,
            poll_interval_secs: number_var("POLL_INTERVAL_SECS", 30)?,
            poll_batch_size: number_var("POLL_BATCH_SIZE", 10)?,
        };

        if config.cnpj_max_requests_per_window == 0 {
            anyhow::bail!("CNPJ_MAX_REQUESTS_PER_WINDOW must be at least 1");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("HubSpot Base URL: {}", config.hubspot_base_url);
        tracing::debug!("HubSpot Redirect URI: {}", config.hubspot_redirect_uri);
        tracing::debug!("CNPJ API Base URL: {}", config.cnpj_api_base_url);
        tracing::debug!(
            "CNPJ rate limit: {} req / {}s, min delay {}s, cache TTL {}s",
            config.cnpj_max_requests_per_window,
            config.cnpj_window_secs,
            config.cnpj_min_delay_secs,
            config.cnpj_cache_ttl_secs
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn lookup_client_config(&self) -> LookupClientConfig {
        LookupClientConfig {
            base_url: self.cnpj_api_base_url.clone(),
            window_duration: Duration::from_secs(self.cnpj_window_secs),
            max_requests_per_window: self.cnpj_max_requests_per_window,
            min_inter_request_delay: Duration::from_secs(self.cnpj_min_delay_secs),
            cache_ttl: Duration::from_secs(self.cnpj_cache_ttl_secs),
            request_timeout: Duration::from_secs(self.cnpj_request_timeout_secs),
        }
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn number_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", name)),
        _ => Ok(default),
    }
}
