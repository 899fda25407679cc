use crate::errors::{AppError, CrmError};
use crate::field_mapping::{PropertyDefinition, SHOULD_ENRICH, SHOULD_ENRICH_YES};
use crate::models::{CompanyRecord, CompanySearchResponse};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Client for the HubSpot CRM company endpoints.
///
/// Holds no credentials: the access token is resolved by the caller and passed
/// on every call, so a refreshed token takes effect immediately.
#[derive(Clone)]
pub struct HubSpotClient {
    client: Client,
    base_url: String,
}

impl HubSpotClient {
    /// Creates a new `HubSpotClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the HubSpot API.
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create HubSpot client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Gets a company with the requested properties.
    ///
    /// # Arguments
    ///
    /// * `company_id` - The CRM object ID.
    /// * `properties` - Property names to include in the response.
    pub async fn get_company(
        &self,
        access_token: &str,
        company_id: &str,
        properties: &[&str],
    ) -> Result<CompanyRecord, CrmError> {
        let url = format!("{}/crm/v3/objects/companies/{}", self.base_url, company_id);
        tracing::info!("Fetching company {} from HubSpot", company_id);

        let mut request = self.client.get(&url);
        if !properties.is_empty() {
            request = request.query(&[("properties", properties.join(","))]);
        }
        let response = send(request, access_token).await?;
        let response = check(response, company_id).await?;

        response
            .json::<CompanyRecord>()
            .await
            .map_err(|e| CrmError::Api {
                status: 200,
                message: format!("Failed to parse company response: {}", e),
            })
    }

    /// Merges `properties` into the stored company.
    pub async fn update_company(
        &self,
        access_token: &str,
        company_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), CrmError> {
        let url = format!("{}/crm/v3/objects/companies/{}", self.base_url, company_id);
        tracing::info!(
            "Updating company {} in HubSpot ({} properties)",
            company_id,
            properties.len()
        );

        let request = self
            .client
            .patch(&url)
            .json(&json!({ "properties": properties }));
        let response = send(request, access_token).await?;
        check(response, company_id).await?;

        tracing::info!("Successfully updated company {}", company_id);
        Ok(())
    }

    /// Creates a company and returns its ID.
    pub async fn create_company(
        &self,
        access_token: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<String, CrmError> {
        let url = format!("{}/crm/v3/objects/companies", self.base_url);

        let request = self
            .client
            .post(&url)
            .json(&json!({ "properties": properties }));
        let response = send(request, access_token).await?;
        let response = check(response, "new company").await?;

        let created: CompanyRecord = response.json().await.map_err(|e| CrmError::Api {
            status: 201,
            message: format!("Failed to parse create company response: {}", e),
        })?;

        tracing::info!("✅ Created company in HubSpot: {}", created.id);
        Ok(created.id)
    }

    /// Creates the property group. 409 surfaces as `PropertyConflict`.
    pub async fn create_property_group(
        &self,
        access_token: &str,
        name: &str,
        label: &str,
    ) -> Result<(), CrmError> {
        let url = format!("{}/crm/v3/properties/companies/groups", self.base_url);

        let request = self.client.post(&url).json(&json!({
            "name": name,
            "label": label,
            "displayOrder": -1,
        }));
        let response = send(request, access_token).await?;
        check_create(response, name).await
    }

    /// Creates one custom property. 409 surfaces as `PropertyConflict`.
    pub async fn create_property(
        &self,
        access_token: &str,
        definition: &PropertyDefinition,
    ) -> Result<(), CrmError> {
        let url = format!("{}/crm/v3/properties/companies", self.base_url);

        let request = self.client.post(&url).json(definition);
        let response = send(request, access_token).await?;
        check_create(response, definition.name).await?;

        tracing::info!("Created HubSpot property {}", definition.name);
        Ok(())
    }

    /// Names of all company properties.
    pub async fn list_properties(&self, access_token: &str) -> Result<Vec<String>, CrmError> {
        let url = format!("{}/crm/v3/properties/companies", self.base_url);

        let response = send(self.client.get(&url), access_token).await?;
        let response = check(response, "properties").await?;

        let body: Value = response.json().await.map_err(|e| CrmError::Api {
            status: 200,
            message: format!("Failed to parse properties response: {}", e),
        })?;

        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|p| p.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Companies whose enrichment flag is set to yes.
    pub async fn search_flagged_companies(
        &self,
        access_token: &str,
        properties: &[&str],
        limit: usize,
    ) -> Result<Vec<CompanyRecord>, CrmError> {
        let url = format!("{}/crm/v3/objects/companies/search", self.base_url);

        let payload = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": SHOULD_ENRICH,
                    "operator": "EQ",
                    "value": SHOULD_ENRICH_YES,
                }]
            }],
            "properties": properties,
            "limit": limit,
        });

        let response = send(self.client.post(&url).json(&payload), access_token).await?;
        let response = check(response, "company search").await?;

        let result: CompanySearchResponse = response.json().await.map_err(|e| CrmError::Api {
            status: 200,
            message: format!("Failed to parse search response: {}", e),
        })?;

        tracing::debug!(
            "HubSpot search returned {} of {} flagged companies",
            result.results.len(),
            result.total
        );
        Ok(result.results)
    }
}

async fn send(request: RequestBuilder, access_token: &str) -> Result<Response, CrmError> {
    request
        .bearer_auth(access_token)
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(|e| CrmError::Transport(e.to_string()))
}

/// Maps a non-success response onto the CRM error taxonomy.
async fn check(response: Response, what: &str) -> Result<Response, CrmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::error!("HubSpot returned error {} for {}: {}", status, what, error_text);

    Err(match status {
        StatusCode::UNAUTHORIZED => CrmError::Auth(error_text),
        StatusCode::NOT_FOUND => CrmError::NotFound(what.to_string()),
        StatusCode::CONFLICT => CrmError::PropertyConflict(what.to_string()),
        StatusCode::BAD_REQUEST if is_missing_property(&error_text) => {
            CrmError::Schema(error_text)
        }
        _ => CrmError::Api {
            status: status.as_u16(),
            message: error_text,
        },
    })
}

async fn check_create(response: Response, name: &str) -> Result<(), CrmError> {
    check(response, name).await.map(|_| ())
}

/// HubSpot reports writes to unknown properties as a 400 `VALIDATION_ERROR`
/// whose message names `PROPERTY_DOESNT_EXIST`.
fn is_missing_property(body: &str) -> bool {
    body.contains("PROPERTY_DOESNT_EXIST") || body.contains("does not exist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_property_detection() {
        assert!(is_missing_property(
            r#"{"status":"error","category":"VALIDATION_ERROR","errors":[{"code":"PROPERTY_DOESNT_EXIST"}]}"#
        ));
        assert!(is_missing_property("Property \"razao_social\" does not exist"));
        assert!(!is_missing_property(r#"{"category":"VALIDATION_ERROR"}"#));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HubSpotClient::new("https://api.hubapi.com/".to_string()).unwrap();
        assert_eq!(client.base_url, "https://api.hubapi.com");
    }
}
