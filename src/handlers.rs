use crate::config::Config;
use crate::enrichment::{lookup_cnpj, CnpjEnricher};
use crate::errors::{format_wait, AppError, CrmError};
use crate::field_mapping::{self, GROUP_LABEL, GROUP_NAME};
use crate::lookup_client::CnpjLookupClient;
use crate::models::{EnrichmentOutcome, OAuthCallbackParams};
use crate::oauth::{resolve_access_token, OAuthClient, TokenStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The single rate-limited registry client for the process.
    pub lookup: Arc<CnpjLookupClient>,
    /// Enrichment orchestrator (shares `lookup`).
    pub enricher: CnpjEnricher,
    /// OAuth token endpoint client.
    pub oauth: OAuthClient,
    /// Current installation's tokens.
    pub tokens: Arc<dyn TokenStore>,
}

impl AppState {
    async fn access_token(&self) -> Result<String, AppError> {
        Ok(resolve_access_token(self.tokens.as_ref(), &self.oauth).await?)
    }
}

/// Health check endpoint.
///
/// Returns the service status, version, whether the CRM app is installed,
/// and the configured registry and poller limits.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let config = &state.config;
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "cnpj-enrichment",
            "version": env!("CARGO_PKG_VERSION"),
            "installed": state.tokens.get().is_some(),
            "registry": {
                "max_requests_per_window": config.cnpj_max_requests_per_window,
                "window_secs": config.cnpj_window_secs,
                "min_delay_secs": config.cnpj_min_delay_secs,
                "cache_ttl_secs": config.cnpj_cache_ttl_secs,
            },
            "poller": {
                "enabled": config.poll_interval_secs > 0,
                "interval_secs": config.poll_interval_secs,
                "batch_size": config.poll_batch_size,
            },
        })),
    )
}

/// GET /oauth/install
///
/// Redirects the installing user to the CRM consent screen.
pub async fn oauth_install(State(state): State<Arc<AppState>>) -> Result<Redirect, AppError> {
    let url = state.oauth.authorize_url()?;
    Ok(Redirect::temporary(&url))
}

/// GET /oauth/callback
///
/// Exchanges the authorization code and stores the resulting tokens.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OAuthCallbackParams>,
) -> Result<Json<Value>, AppError> {
    if let Some(error) = params.error {
        return Err(AppError::Unauthorized(format!(
            "Authorization denied: {}",
            error
        )));
    }
    let code = params
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;

    let tokens = state.oauth.exchange_code(&code).await?;
    let portal_id = tokens.portal_id;
    let expires_at = tokens.expires_at;
    state.tokens.set(tokens);

    tracing::info!("✓ CRM app installed (portal {:?})", portal_id);
    Ok(Json(json!({
        "status": "installed",
        "portal_id": portal_id,
        "expires_at": expires_at,
    })))
}

/// POST /api/v1/setup/properties
///
/// Creates the property group and every custom property. Existing ones count
/// as success.
pub async fn setup_properties(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let token = state.access_token().await?;
    let crm = state.enricher.crm();

    match crm.create_property_group(&token, GROUP_NAME, GROUP_LABEL).await {
        Ok(()) | Err(CrmError::PropertyConflict(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let mut created = Vec::new();
    let mut existing = Vec::new();
    for definition in field_mapping::property_definitions() {
        match crm.create_property(&token, &definition).await {
            Ok(()) => created.push(definition.name),
            Err(CrmError::PropertyConflict(_)) => existing.push(definition.name),
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(
        "Property setup complete: {} created, {} already existed",
        created.len(),
        existing.len()
    );
    Ok(Json(json!({
        "created": created,
        "existing": existing,
    })))
}

/// POST /api/v1/companies/:id/enrich
pub async fn enrich_company(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<String>,
) -> Result<Json<EnrichmentOutcome>, AppError> {
    tracing::info!("POST /companies/{}/enrich", company_id);
    let token = state.access_token().await?;
    let outcome = state.enricher.enrich(&company_id, &token).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/cnpj/:cnpj
///
/// Direct registry lookup through the shared rate-limited client.
pub async fn get_cnpj(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (cnpj, record) = lookup_cnpj(&state.lookup, &raw).await?;
    Ok(Json(json!({
        "cnpj": cnpj.as_str(),
        "formatted": cnpj.formatted(),
        "data": record,
    })))
}

/// GET /api/v1/rate-limit
pub async fn rate_limit_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.lookup.status().await;
    Json(json!({
        "can_request": status.can_request,
        "wait_time_ms": status.wait_time.as_millis() as u64,
        "wait_time_formatted": format_wait(status.wait_time),
        "requests_in_window": status.requests_in_window,
        "max_requests": status.max_requests,
    }))
}
