//! Rate-limited client for the public CNPJ registry.
//!
//! The registry allows roughly three requests per minute and answers 429 past
//! that. Two throttles guard it: a sliding-window request count and a minimum
//! spacing between consecutive requests. Successful lookups are cached for an
//! hour, and cache hits never touch the throttles.
//!
//! One instance is built at startup and shared behind an `Arc`; every caller
//! (HTTP handlers, the poller, tests) goes through the same history.

use crate::cnpj::Cnpj;
use crate::errors::{AppError, LookupError, UPSTREAM_RATE_LIMIT_WAIT};
use crate::models::CompanyRegistryRecord;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Throttle and cache settings for [`CnpjLookupClient`].
#[derive(Debug, Clone)]
pub struct LookupClientConfig {
    pub base_url: String,
    pub window_duration: Duration,
    pub max_requests_per_window: usize,
    pub min_inter_request_delay: Duration,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl Default for LookupClientConfig {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_CNPJ_API_BASE_URL.to_string(),
            window_duration: Duration::from_secs(60),
            max_requests_per_window: 3,
            min_inter_request_delay: Duration::from_secs(20),
            cache_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Point-in-time view of the throttles, for display and caller backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    pub can_request: bool,
    pub wait_time: Duration,
    pub requests_in_window: usize,
    pub max_requests: usize,
}

/// Timestamps of admitted requests.
#[derive(Debug, Default)]
struct RequestWindow {
    history: VecDeque<Instant>,
    last_request: Option<Instant>,
}

impl RequestWindow {
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admission decision against an already purged history.
    fn check(&self, now: Instant, config: &LookupClientConfig) -> Result<(), LookupError> {
        if self.history.len() >= config.max_requests_per_window {
            let oldest = self.history.front().copied().unwrap_or(now);
            let wait_time = config
                .window_duration
                .saturating_sub(now.saturating_duration_since(oldest));
            return Err(LookupError::QuotaExceeded { wait_time });
        }

        if let Some(last) = self.last_request {
            let since_last = now.saturating_duration_since(last);
            if since_last < config.min_inter_request_delay {
                return Err(LookupError::TooSoon {
                    wait_time: config.min_inter_request_delay - since_last,
                });
            }
        }

        Ok(())
    }

    fn record(&mut self, now: Instant) {
        self.history.push_back(now);
        self.last_request = Some(now);
    }
}

pub struct CnpjLookupClient {
    client: Client,
    config: LookupClientConfig,
    window: Mutex<RequestWindow>,
    cache: Cache<String, CompanyRegistryRecord>,
}

impl CnpjLookupClient {
    /// Creates a new `CnpjLookupClient`.
    ///
    /// # Arguments
    ///
    /// * `config` - Registry base URL, throttle and cache settings.
    pub fn new(config: LookupClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create CNPJ client: {}", e))
            })?;

        let cache = Cache::builder()
            .time_to_live(config.cache_ttl)
            .max_capacity(10_000)
            .build();

        Ok(Self {
            client,
            config,
            window: Mutex::new(RequestWindow::default()),
            cache,
        })
    }

    pub fn config(&self) -> &LookupClientConfig {
        &self.config
    }

    /// Looks up a CNPJ, from cache when possible.
    ///
    /// On a cache miss the request must pass both throttles. An admitted
    /// request consumes budget whatever its outcome, since the registry counts
    /// failed calls against its own limit too.
    ///
    /// Concurrent misses for the same CNPJ share one admission and one
    /// request; every waiter gets the same record or the same error.
    pub async fn fetch(&self, cnpj: &Cnpj) -> Result<CompanyRegistryRecord, LookupError> {
        if let Some(cached) = self.cache.get(cnpj.as_str()).await {
            tracing::debug!("CNPJ cache HIT: {}", cnpj);
            return Ok(cached);
        }

        self.cache
            .try_get_with(cnpj.as_str().to_string(), async {
                self.admit().await?;
                tracing::info!("CNPJ cache MISS - querying registry for {}", cnpj);
                self.request(cnpj).await
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Check-then-record under one lock, so two concurrent callers can never
    /// both be admitted into the last slot.
    async fn admit(&self) -> Result<(), LookupError> {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        window.purge(now, self.config.window_duration);

        if let Err(e) = window.check(now, &self.config) {
            tracing::warn!("CNPJ lookup throttled: {}", e);
            return Err(e);
        }

        window.record(now);
        Ok(())
    }

    async fn request(&self, cnpj: &Cnpj) -> Result<CompanyRegistryRecord, LookupError> {
        let url = format!("{}/cnpj/{}", self.config.base_url, cnpj);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("CNPJ registry request failed for {}: {}", cnpj, e);
                LookupError::Transient(e.to_string())
            })?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!("CNPJ registry returned 429 for {}", cnpj);
                return Err(LookupError::UpstreamRateLimited {
                    suggested_wait: UPSTREAM_RATE_LIMIT_WAIT,
                });
            }
            StatusCode::NOT_FOUND => {
                tracing::info!("CNPJ {} not found in registry", cnpj);
                return Err(LookupError::NotFound);
            }
            s if !s.is_success() => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                tracing::error!("CNPJ registry returned error {}: {}", status, error_text);
                return Err(LookupError::Upstream {
                    status: status.as_u16(),
                    message: error_text,
                });
            }
            _ => {}
        }

        response.json::<CompanyRegistryRecord>().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Transient(e.to_string())
            } else {
                LookupError::Upstream {
                    status: status.as_u16(),
                    message: format!("Failed to parse registry response: {}", e),
                }
            }
        })
    }

    /// Whether a live cache entry exists for `cnpj`.
    pub fn is_cached(&self, cnpj: &Cnpj) -> bool {
        self.cache.contains_key(cnpj.as_str())
    }

    /// Snapshot of the throttles. Does not mutate the history.
    pub async fn status(&self) -> RateLimitStatus {
        let window = self.window.lock().await;
        let now = Instant::now();

        let live: Vec<Instant> = window
            .history
            .iter()
            .copied()
            .filter(|t| now.saturating_duration_since(*t) < self.config.window_duration)
            .collect();

        let snapshot = RequestWindow {
            history: live.into(),
            last_request: window.last_request,
        };

        let wait_time = match snapshot.check(now, &self.config) {
            Ok(()) => Duration::ZERO,
            Err(e) => e.retry_after().unwrap_or(Duration::ZERO),
        };

        RateLimitStatus {
            can_request: wait_time.is_zero(),
            wait_time,
            requests_in_window: snapshot.history.len(),
            max_requests: self.config.max_requests_per_window,
        }
    }

    /// Forget request history and cached records.
    pub async fn clear(&self) {
        let mut window = self.window.lock().await;
        *window = RequestWindow::default();
        self.cache.invalidate_all();
    }
}
