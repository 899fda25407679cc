//! Background scan for companies flagged for enrichment.
//!
//! Each tick resolves the CRM token, searches for `enriquecer_cnpj = yes`, and
//! enriches the hits strictly one at a time so the shared registry budget is
//! spent predictably. The first throttled outcome ends the tick; the flag stays
//! set and the company is picked up again later.

use crate::circuit_breaker::create_poller_circuit_breaker;
use crate::enrichment::CnpjEnricher;
use crate::errors::{AuthError, EnrichmentError};
use crate::field_mapping;
use crate::oauth::{resolve_access_token, OAuthClient, TokenStore};
use failsafe::CircuitBreaker;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, MissedTickBehavior};

/// Upper bound for one `enrich` call, registry timeout plus two CRM round trips.
const ENRICH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub scanned: usize,
    pub enriched: usize,
    pub failed: usize,
    /// The tick stopped early on a throttle.
    pub rate_limited: bool,
}

pub struct Poller {
    enricher: CnpjEnricher,
    tokens: Arc<dyn TokenStore>,
    oauth: OAuthClient,
    interval: Duration,
    batch_size: usize,
}

impl Poller {
    pub fn new(
        enricher: CnpjEnricher,
        tokens: Arc<dyn TokenStore>,
        oauth: OAuthClient,
        interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            enricher,
            tokens,
            oauth,
            interval,
            batch_size,
        }
    }

    /// Runs forever. Spawn it.
    pub async fn run(self) {
        let breaker = create_poller_circuit_breaker();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "CNPJ poller started (every {:?}, batch {})",
            self.interval,
            self.batch_size
        );

        loop {
            ticker.tick().await;

            if !breaker.is_call_permitted() {
                tracing::debug!("Poller circuit open, skipping tick");
                continue;
            }

            let result = match self.tick().await {
                // Not installed yet is not a CRM failure.
                Err(EnrichmentError::Auth(AuthError::NoToken)) => {
                    tracing::debug!("Poller idle: no CRM token yet");
                    Ok(TickSummary::default())
                }
                other => other,
            };

            match breaker.call(|| result) {
                Ok(summary) if summary.scanned > 0 => {
                    tracing::info!(
                        "Poll tick: {} scanned, {} enriched, {} failed{}",
                        summary.scanned,
                        summary.enriched,
                        summary.failed,
                        if summary.rate_limited {
                            ", stopped on rate limit"
                        } else {
                            ""
                        }
                    );
                }
                Ok(_) => {}
                Err(failsafe::Error::Inner(e)) => {
                    tracing::error!("Poll tick failed: {}", e);
                }
                Err(failsafe::Error::Rejected) => {
                    tracing::warn!("Poll tick rejected by circuit breaker");
                }
            }
        }
    }

    /// One scan over the flagged companies.
    pub async fn tick(&self) -> Result<TickSummary, EnrichmentError> {
        let token = resolve_access_token(self.tokens.as_ref(), &self.oauth).await?;

        let companies = self
            .enricher
            .crm()
            .search_flagged_companies(
                &token,
                &field_mapping::managed_property_names(),
                self.batch_size,
            )
            .await?;

        let mut summary = TickSummary {
            scanned: companies.len(),
            ..TickSummary::default()
        };

        for company in companies {
            match timeout(ENRICH_TIMEOUT, self.enricher.enrich(&company.id, &token)).await {
                Ok(Ok(_)) => summary.enriched += 1,
                Ok(Err(e)) if e.is_rate_limited() => {
                    tracing::info!(
                        "Poller pausing at company {}: {} (retry in {:?})",
                        company.id,
                        e,
                        e.retry_after()
                    );
                    summary.rate_limited = true;
                    break;
                }
                Ok(Err(e)) => {
                    tracing::warn!("Poller failed to enrich company {}: {}", company.id, e);
                    summary.failed += 1;
                }
                Err(_) => {
                    tracing::warn!("Poller timed out enriching company {}", company.id);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
