use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============ Registry (CNPJ lookup) Models ============

/// Registry data for one CNPJ, as returned by the lookup API.
///
/// Field names follow the registry's Portuguese JSON; English aliases are
/// accepted so fixtures and alternative mirrors deserialize too. Cached
/// verbatim, never mutated after the fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRegistryRecord {
    /// Legal name (razão social).
    #[serde(rename = "razao_social", alias = "legal_name", default)]
    pub legal_name: Option<String>,
    /// Registered capital. The registry sends a decimal string, some mirrors a number.
    #[serde(rename = "capital_social", alias = "registered_capital", default)]
    pub registered_capital: Option<Value>,
    /// Size classification (porte).
    #[serde(rename = "porte", alias = "size", default)]
    pub size: Option<Described>,
    /// Establishment-level data (address, contact, status).
    #[serde(rename = "estabelecimento", alias = "establishment", default)]
    pub establishment: Option<Establishment>,
}

/// Registry objects that only carry a human description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Described {
    #[serde(rename = "descricao", alias = "description", default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(rename = "nome", alias = "name", default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(rename = "sigla", alias = "code", default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Establishment {
    #[serde(rename = "nome_fantasia", alias = "trade_name", default)]
    pub trade_name: Option<String>,
    #[serde(rename = "situacao_cadastral", alias = "status", default)]
    pub status: Option<String>,
    #[serde(rename = "atividade_principal", alias = "primary_activity", default)]
    pub primary_activity: Option<Described>,
    #[serde(rename = "tipo_logradouro", alias = "street_type", default)]
    pub street_type: Option<String>,
    #[serde(rename = "logradouro", alias = "street", default)]
    pub street: Option<String>,
    #[serde(rename = "numero", alias = "number", default)]
    pub number: Option<String>,
    #[serde(rename = "complemento", alias = "complement", default)]
    pub complement: Option<String>,
    #[serde(rename = "bairro", alias = "district", default)]
    pub district: Option<String>,
    #[serde(rename = "cep", alias = "zip", default)]
    pub zip: Option<String>,
    #[serde(rename = "cidade", alias = "city", default)]
    pub city: Option<City>,
    #[serde(rename = "estado", alias = "state", default)]
    pub state: Option<State>,
    #[serde(rename = "ddd1", alias = "ddd", default)]
    pub area_code: Option<String>,
    #[serde(rename = "telefone1", alias = "phone", default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CompanyRegistryRecord {
    pub fn trade_name(&self) -> Option<&str> {
        self.establishment.as_ref()?.trade_name.as_deref()
    }

    pub fn registration_status(&self) -> Option<&str> {
        self.establishment.as_ref()?.status.as_deref()
    }

    pub fn size_description(&self) -> Option<&str> {
        self.size.as_ref()?.description.as_deref()
    }

    pub fn primary_activity(&self) -> Option<&str> {
        self.establishment
            .as_ref()?
            .primary_activity
            .as_ref()?
            .description
            .as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.establishment.as_ref()?.email.as_deref()
    }

    /// Area code and number joined, digits only. `None` without a number.
    pub fn phone_digits(&self) -> Option<String> {
        let est = self.establishment.as_ref()?;
        let number = est.phone.as_deref().filter(|p| !p.trim().is_empty())?;
        let joined = format!("{}{}", est.area_code.as_deref().unwrap_or(""), number);
        Some(joined.chars().filter(|c| c.is_ascii_digit()).collect())
    }

    /// Registered capital as a plain decimal string (`"150000.00"`).
    pub fn registered_capital_text(&self) -> Option<String> {
        match self.registered_capital.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Single-line address, e.g. `RUA FLORIANO PEIXOTO, 100, SALA 2 - CENTRO - Londrina/PR - CEP 86010-160`.
    pub fn full_address(&self) -> Option<String> {
        let est = self.establishment.as_ref()?;

        let street_line = [est.street_type.as_deref(), est.street.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let mut first = vec![street_line];
        first.extend(
            [est.number.as_deref(), est.complement.as_deref()]
                .into_iter()
                .flatten()
                .map(|s| s.trim().to_string()),
        );
        let first = first
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        let city = match (
            est.city.as_ref().and_then(|c| c.name.as_deref()),
            est.state.as_ref().and_then(|s| s.code.as_deref()),
        ) {
            (Some(city), Some(uf)) => Some(format!("{}/{}", city, uf)),
            (Some(city), None) => Some(city.to_string()),
            (None, Some(uf)) => Some(uf.to_string()),
            (None, None) => None,
        };

        let zip = est
            .zip
            .as_deref()
            .map(format_cep)
            .filter(|z| !z.is_empty())
            .map(|z| format!("CEP {}", z));

        let parts: Vec<String> = [Some(first), est.district.clone(), city, zip]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" - "))
        }
    }
}

/// `86010160` → `86010-160`; anything not 8 digits is returned digits-only.
fn format_cep(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 8 {
        format!("{}-{}", &digits[..5], &digits[5..])
    } else {
        digits
    }
}

// ============ CRM Models ============

/// A company object as held by the CRM.
///
/// Properties are kept in a `BTreeMap` so iteration is ordered by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl CompanyRecord {
    /// Non-empty string value of a property.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Paged search response from the CRM.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanySearchResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub results: Vec<CompanyRecord>,
}

/// Outcome tag written to the company after each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    Enriched,
    RateLimited,
    Failed,
}

impl EnrichmentStatus {
    /// Value stored in the CRM enumeration property.
    pub fn as_property_value(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "not_processed",
            EnrichmentStatus::Enriched => "enriched",
            EnrichmentStatus::RateLimited => "rate_limited",
            EnrichmentStatus::Failed => "failed",
        }
    }
}

/// Successful `enrich` result.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentOutcome {
    pub company_id: String,
    pub cnpj: String,
    pub status: EnrichmentStatus,
    /// Properties written to the CRM.
    pub properties: BTreeMap<String, String>,
}

// ============ OAuth Models ============

/// Tokens for one CRM installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub portal_id: Option<u64>,
}

impl OAuthTokens {
    /// Expired, or expiring within the next minute.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(60) >= self.expires_at
    }
}

/// Raw body of the CRM token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Query of the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> CompanyRegistryRecord {
        serde_json::from_value(json!({
            "razao_social": "ACME COMERCIO LTDA",
            "capital_social": "150000.00",
            "porte": {"id": "01", "descricao": "Micro Empresa"},
            "estabelecimento": {
                "nome_fantasia": "ACME",
                "situacao_cadastral": "Ativa",
                "atividade_principal": {"descricao": "Comércio varejista"},
                "tipo_logradouro": "RUA",
                "logradouro": "FLORIANO PEIXOTO",
                "numero": "100",
                "complemento": "SALA 2",
                "bairro": "CENTRO",
                "cep": "86010160",
                "cidade": {"nome": "Londrina"},
                "estado": {"sigla": "PR"},
                "ddd1": "43",
                "telefone1": "33334444",
                "email": "contato@acme.com.br"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_registry_record_accessors() {
        let record = sample_record();
        assert_eq!(record.legal_name.as_deref(), Some("ACME COMERCIO LTDA"));
        assert_eq!(record.trade_name(), Some("ACME"));
        assert_eq!(record.registration_status(), Some("Ativa"));
        assert_eq!(record.size_description(), Some("Micro Empresa"));
        assert_eq!(record.primary_activity(), Some("Comércio varejista"));
        assert_eq!(record.phone_digits().as_deref(), Some("4333334444"));
        assert_eq!(record.registered_capital_text().as_deref(), Some("150000.00"));
    }

    #[test]
    fn test_full_address() {
        assert_eq!(
            sample_record().full_address().as_deref(),
            Some("RUA FLORIANO PEIXOTO, 100, SALA 2 - CENTRO - Londrina/PR - CEP 86010-160")
        );
    }

    #[test]
    fn test_english_aliases_and_numeric_capital() {
        let record: CompanyRegistryRecord = serde_json::from_value(json!({
            "legal_name": "ACME LTDA",
            "registered_capital": 5000,
            "establishment": {"trade_name": "ACME"}
        }))
        .unwrap();
        assert_eq!(record.legal_name.as_deref(), Some("ACME LTDA"));
        assert_eq!(record.trade_name(), Some("ACME"));
        assert_eq!(record.registered_capital_text().as_deref(), Some("5000"));
        assert_eq!(record.full_address(), None);
    }

    #[test]
    fn test_status_property_values() {
        assert_eq!(EnrichmentStatus::Pending.as_property_value(), "not_processed");
        assert_eq!(EnrichmentStatus::RateLimited.as_property_value(), "rate_limited");
    }
}
