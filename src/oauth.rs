//! OAuth authorization-code flow against the CRM and the token store.
//!
//! Tokens live in process memory only; a restart means reinstalling the app.

use crate::config::Config;
use crate::errors::AuthError;
use crate::models::{OAuthTokens, TokenResponse};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;

/// Where the current installation's tokens are kept.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<OAuthTokens>;
    fn set(&self, tokens: OAuthTokens);
    fn clear(&self);
}

/// Process-memory token store. Single installation.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<Option<OAuthTokens>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: OAuthTokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self) -> Option<OAuthTokens> {
        // A poisoned lock still holds the last complete write.
        match self.tokens.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, tokens: OAuthTokens) {
        match self.tokens.write() {
            Ok(mut guard) => *guard = Some(tokens),
            Err(poisoned) => *poisoned.into_inner() = Some(tokens),
        }
    }

    fn clear(&self) {
        match self.tokens.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// Token endpoint client for one OAuth app.
#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
    base_url: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: String,
}

impl OAuthClient {
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AuthError::Exchange(format!("Failed to create OAuth client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.hubspot_base_url.clone(),
            authorize_url: config.hubspot_authorize_url.clone(),
            client_id: config.hubspot_client_id.clone(),
            client_secret: config.hubspot_client_secret.clone(),
            redirect_uri: config.hubspot_redirect_uri.clone(),
            scopes: config.hubspot_scopes.clone(),
        })
    }

    /// URL the installing user is sent to.
    pub fn authorize_url(&self) -> Result<String, AuthError> {
        url::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", self.scopes.as_str()),
            ],
        )
        .map(|u| u.to_string())
        .map_err(|e| AuthError::Exchange(format!("Failed to build authorize URL: {}", e)))
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, AuthError> {
        tracing::info!("Exchanging OAuth authorization code");
        let tokens = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code", code),
            ])
            .await?;

        let portal_id = self.portal_id(&tokens.access_token).await;
        Ok(OAuthTokens { portal_id, ..tokens })
    }

    /// Trades a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens, AuthError> {
        tracing::info!("Refreshing OAuth access token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<OAuthTokens, AuthError> {
        let url = format!("{}/oauth/v1/token", self.base_url);

        let response = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("OAuth token endpoint returned {}: {}", status, error_text);
            return Err(AuthError::Exchange(format!(
                "Token endpoint returned status {}: {}",
                status, error_text
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Failed to parse token response: {}", e)))?;

        Ok(tokens_from_response(body, Utc::now()))
    }

    /// Installation (portal) ID for a token. Best-effort: `None` on any failure.
    async fn portal_id(&self, access_token: &str) -> Option<u64> {
        let url = format!("{}/oauth/v1/access-tokens/{}", self.base_url, access_token);
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            tracing::warn!("Could not resolve portal id: {}", response.status());
            return None;
        }
        let body: Value = response.json().await.ok()?;
        body.get("hub_id").and_then(Value::as_u64)
    }
}

fn tokens_from_response(body: TokenResponse, now: DateTime<Utc>) -> OAuthTokens {
    OAuthTokens {
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        expires_at: now + chrono::Duration::seconds(body.expires_in),
        portal_id: None,
    }
}

/// Returns a usable access token, refreshing it when it has expired.
///
/// Fails fast with `NoToken` when the app was never installed and with
/// `TokenExpired` when the refresh is rejected.
pub async fn resolve_access_token(
    store: &dyn TokenStore,
    oauth: &OAuthClient,
) -> Result<String, AuthError> {
    let tokens = store.get().ok_or(AuthError::NoToken)?;

    if !tokens.is_expired(Utc::now()) {
        return Ok(tokens.access_token);
    }

    match oauth.refresh(&tokens.refresh_token).await {
        Ok(refreshed) => {
            let access_token = refreshed.access_token.clone();
            store.set(OAuthTokens {
                portal_id: tokens.portal_id,
                ..refreshed
            });
            tracing::info!("Access token refreshed");
            Ok(access_token)
        }
        Err(e) => {
            tracing::warn!("Token refresh failed: {}", e);
            Err(AuthError::TokenExpired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tokens(expires_at: DateTime<Utc>) -> OAuthTokens {
        OAuthTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            portal_id: Some(42),
        }
    }

    #[test]
    fn test_in_memory_store_round_trip() {
        let store = InMemoryTokenStore::new();
        assert!(store.get().is_none());

        let t = tokens(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        store.set(t.clone());
        assert_eq!(store.get(), Some(t));

        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_tokens_from_response_computes_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t = tokens_from_response(
            TokenResponse {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                expires_in: 1800,
            },
            now,
        );
        assert_eq!(
            t.expires_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
        );
        assert!(!t.is_expired(now));
        assert!(t.is_expired(now + chrono::Duration::seconds(1750)));
    }
}
