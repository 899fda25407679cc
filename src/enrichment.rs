/// Company enrichment workflow shared by the HTTP handlers and the poller
///
/// This module provides the orchestration for one company:
/// 1. Read the company from the CRM and locate its CNPJ
/// 2. Validate the CNPJ
/// 3. Ask the rate-limited registry client (respecting its wait contract)
/// 4. Map the registry record onto the CRM property schema
/// 5. Write it back and tag the outcome
use crate::cnpj::{self, Cnpj};
use crate::crm_client::HubSpotClient;
use crate::errors::{CrmError, EnrichmentError};
use crate::field_mapping::{self, IDENTIFIER_CANDIDATES};
use crate::lookup_client::CnpjLookupClient;
use crate::models::{CompanyRecord, EnrichmentOutcome, EnrichmentStatus};
use chrono::Utc;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// Enriches CRM companies from the CNPJ registry.
///
/// Cheap to clone; the lookup client (and so its rate-limit history and cache)
/// is shared by every clone.
#[derive(Clone)]
pub struct CnpjEnricher {
    lookup: Arc<CnpjLookupClient>,
    crm: HubSpotClient,
}

impl CnpjEnricher {
    pub fn new(lookup: Arc<CnpjLookupClient>, crm: HubSpotClient) -> Self {
        Self { lookup, crm }
    }

    pub fn lookup(&self) -> &CnpjLookupClient {
        &self.lookup
    }

    pub fn crm(&self) -> &HubSpotClient {
        &self.crm
    }

    /// Enriches one company. Never retries; retry policy belongs to the caller.
    ///
    /// # Arguments
    ///
    /// * `company_id` - The CRM object ID.
    /// * `access_token` - A resolved CRM access token.
    pub async fn enrich(
        &self,
        company_id: &str,
        access_token: &str,
    ) -> Result<EnrichmentOutcome, EnrichmentError> {
        let company = self
            .crm
            .get_company(
                access_token,
                company_id,
                &field_mapping::managed_property_names(),
            )
            .await?;

        // The fallback scan needs every property, not just the managed ones.
        let company = if has_candidate(&company) {
            company
        } else {
            self.get_company_with_all_properties(access_token, company_id)
                .await?
        };

        let Some((property, raw)) = find_identifier(&company) else {
            tracing::warn!("No CNPJ found on company {}", company_id);
            // Clears the flag so the poller stops picking the record up.
            self.tag(access_token, company_id, EnrichmentStatus::Failed)
                .await;
            return Err(EnrichmentError::IdentifierNotFound);
        };
        tracing::info!("Company {}: CNPJ taken from '{}'", company_id, property);

        let cnpj = match cnpj::validate(raw) {
            Ok(cnpj) => cnpj,
            Err(e) => {
                tracing::warn!("Company {} has an invalid CNPJ '{}': {}", company_id, raw, e);
                self.tag(access_token, company_id, EnrichmentStatus::Failed)
                    .await;
                return Err(e.into());
            }
        };

        // A cached record costs nothing, so only gate on the throttles when
        // the lookup would actually go out.
        if !self.lookup.is_cached(&cnpj) {
            let status = self.lookup.status().await;
            if !status.can_request {
                tracing::info!(
                    "Company {}: registry busy ({}/{} in window), retry in {:?}",
                    company_id,
                    status.requests_in_window,
                    status.max_requests,
                    status.wait_time
                );
                return Err(EnrichmentError::RateLimited {
                    wait_time: status.wait_time,
                });
            }
        }

        let record = match self.lookup.fetch(&cnpj).await {
            Ok(record) => record,
            Err(e) => {
                let status = if e.is_rate_limited() {
                    EnrichmentStatus::RateLimited
                } else {
                    EnrichmentStatus::Failed
                };
                tracing::warn!("Company {}: lookup of {} failed: {}", company_id, cnpj, e);
                self.tag(access_token, company_id, status).await;
                return Err(e.into());
            }
        };

        let properties = field_mapping::map_record(&cnpj, &record, Utc::now());
        self.crm
            .update_company(access_token, company_id, &properties)
            .await?;

        tracing::info!(
            "✓ Company {} enriched with CNPJ {} ({} properties)",
            company_id,
            cnpj.formatted(),
            properties.len()
        );

        Ok(EnrichmentOutcome {
            company_id: company_id.to_string(),
            cnpj: cnpj.into_inner(),
            status: EnrichmentStatus::Enriched,
            properties,
        })
    }

    /// Re-reads a company with every property the portal defines.
    async fn get_company_with_all_properties(
        &self,
        access_token: &str,
        company_id: &str,
    ) -> Result<CompanyRecord, CrmError> {
        let mut names = self.crm.list_properties(access_token).await?;
        names.sort();
        names.dedup();
        tracing::debug!(
            "Company {}: no candidate CNPJ property set, scanning {} properties",
            company_id,
            names.len()
        );

        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.crm.get_company(access_token, company_id, &names).await
    }

    /// Best-effort status write. Failures are logged, never returned.
    async fn tag(&self, access_token: &str, company_id: &str, status: EnrichmentStatus) {
        let patch = field_mapping::status_patch(status);
        if let Err(e) = self
            .crm
            .update_company(access_token, company_id, &patch)
            .await
        {
            tracing::warn!(
                "Failed to tag company {} as {}: {}",
                company_id,
                status.as_property_value(),
                e
            );
        }
    }
}

fn has_candidate(company: &CompanyRecord) -> bool {
    IDENTIFIER_CANDIDATES
        .iter()
        .any(|name| company.property_str(name).is_some())
}

/// Locates the CNPJ on a company.
///
/// Known identifier properties are tried in priority order. Failing that,
/// every string property is scanned in name order and the first one that
/// normalizes to 14 digits wins. Returns the property name and its raw value.
pub fn find_identifier(company: &CompanyRecord) -> Option<(&str, &str)> {
    for name in IDENTIFIER_CANDIDATES {
        if let Some(value) = company.property_str(name) {
            return Some((*name, value));
        }
    }

    company
        .properties
        .iter()
        .filter_map(|(name, value)| match value {
            Value::String(s) => Some((name.as_str(), s.as_str())),
            _ => None,
        })
        .find(|(_, value)| cnpj::looks_like_cnpj(value))
}

/// Looks up a raw CNPJ straight through the shared client, without touching the CRM.
pub async fn lookup_cnpj(
    lookup: &CnpjLookupClient,
    raw: &str,
) -> Result<(Cnpj, crate::models::CompanyRegistryRecord), EnrichmentError> {
    let cnpj = cnpj::validate(raw)?;
    let record = lookup.fetch(&cnpj).await?;
    Ok((cnpj, record))
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    // RFC 5322 simplified email regex
    EMAIL_RE
        .get_or_init(|| {
            Regex::new(
                r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
            )
            .ok()
        })
        .as_ref()
}

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Minimum length requirements
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let fake_patterns = ["999999", "111111", "000000", "123456789"];
    if let Some(pattern) = fake_patterns.iter().find(|p| email.contains(*p)) {
        tracing::warn!(
            "❌ Invalid email detected (fake pattern '{}'): {}",
            pattern,
            email
        );
        return false;
    }

    match email_regex() {
        Some(re) if re.is_match(email) => true,
        _ => {
            tracing::warn!("❌ Invalid email format: {}", email);
            false
        }
    }
}

/// Validate and normalize Brazilian phone number
///
/// Parses with the BR region and returns the E.164 form (+554333334444).
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_br_phone(raw: &str) -> (bool, String) {
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("✓ Valid BR phone: {} → {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("❌ Invalid BR phone number: {}", raw);
                (false, "Invalid Brazilian phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse BR phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}
