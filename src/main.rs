use axum::{
    routing::{get, post},
    Router,
};
use cnpj_enrichment::config::Config;
use cnpj_enrichment::crm_client::HubSpotClient;
use cnpj_enrichment::enrichment::CnpjEnricher;
use cnpj_enrichment::handlers::{self, AppState};
use cnpj_enrichment::lookup_client::CnpjLookupClient;
use cnpj_enrichment::oauth::{InMemoryTokenStore, OAuthClient, TokenStore};
use cnpj_enrichment::poller::Poller;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - The shared rate-limited CNPJ client and the CRM client.
/// - The in-memory token store and the background poller.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cnpj_enrichment=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // One registry client for the whole process: every caller shares its
    // request history and cache.
    let lookup = Arc::new(
        CnpjLookupClient::new(config.lookup_client_config()).map_err(|e| anyhow::anyhow!(e))?,
    );
    tracing::info!(
        "CNPJ lookup client initialized ({} req / {}s, cache TTL {}s)",
        config.cnpj_max_requests_per_window,
        config.cnpj_window_secs,
        config.cnpj_cache_ttl_secs
    );

    let crm = HubSpotClient::new(config.hubspot_base_url.clone()).map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("✓ HubSpot client initialized: {}", config.hubspot_base_url);

    let oauth = OAuthClient::new(&config)?;
    let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
    let enricher = CnpjEnricher::new(lookup.clone(), crm);

    if config.poll_interval_secs > 0 {
        let poller = Poller::new(
            enricher.clone(),
            tokens.clone(),
            oauth.clone(),
            Duration::from_secs(config.poll_interval_secs),
            config.poll_batch_size,
        );
        tokio::spawn(poller.run());
    } else {
        tracing::info!("Background poller disabled (POLL_INTERVAL_SECS=0)");
    }

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        lookup,
        enricher,
        oauth,
        tokens,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // OAuth install flow
        .route("/oauth/install", get(handlers::oauth_install))
        .route("/oauth/callback", get(handlers::oauth_callback))
        // API endpoints
        .route("/api/v1/setup/properties", post(handlers::setup_properties))
        .route(
            "/api/v1/companies/:id/enrich",
            post(handlers::enrich_company),
        )
        .route("/api/v1/cnpj/:cnpj", get(handlers::get_cnpj))
        .route("/api/v1/rate-limit", get(handlers::rate_limit_status))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
