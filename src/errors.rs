use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Wait suggested to callers when the registry itself answers 429.
pub const UPSTREAM_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Bad CNPJ input. Not retryable without new input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Normalized input is not 14 digits long.
    WrongLength { found: usize },
    /// All 14 digits are identical (`00000000000000`, `11111111111111`, ...).
    RepeatedDigits,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::WrongLength { found } => {
                write!(f, "CNPJ must have 14 digits, found {}", found)
            }
            ValidationError::RepeatedDigits => {
                write!(f, "CNPJ cannot be a single repeated digit")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failures of the rate-limited registry client.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    /// Sliding-window quota is used up.
    QuotaExceeded { wait_time: Duration },
    /// Minimum spacing since the previous call has not elapsed.
    TooSoon { wait_time: Duration },
    /// The registry answered HTTP 429.
    UpstreamRateLimited { suggested_wait: Duration },
    /// The registry has no record for this CNPJ.
    NotFound,
    /// Timeout or network failure.
    Transient(String),
    /// Any other non-success answer or an undecodable body.
    Upstream { status: u16, message: String },
}

impl LookupError {
    pub fn code(&self) -> &'static str {
        match self {
            LookupError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            LookupError::TooSoon { .. } => "TOO_SOON",
            LookupError::UpstreamRateLimited { .. } => "UPSTREAM_RATE_LIMITED",
            LookupError::NotFound => "CNPJ_NOT_FOUND",
            LookupError::Transient(_) => "TRANSIENT",
            LookupError::Upstream { .. } => "UPSTREAM_ERROR",
        }
    }

    /// How long a caller should wait before retrying, when that is known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LookupError::QuotaExceeded { wait_time } | LookupError::TooSoon { wait_time } => {
                Some(*wait_time)
            }
            LookupError::UpstreamRateLimited { suggested_wait } => Some(*suggested_wait),
            _ => None,
        }
    }

    /// Internal or upstream throttling, as opposed to a hard failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            LookupError::QuotaExceeded { .. }
                | LookupError::TooSoon { .. }
                | LookupError::UpstreamRateLimited { .. }
        )
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::QuotaExceeded { wait_time } => write!(
                f,
                "Registry quota exhausted, retry in {}",
                format_wait(*wait_time)
            ),
            LookupError::TooSoon { wait_time } => write!(
                f,
                "Registry requests too close together, retry in {}",
                format_wait(*wait_time)
            ),
            LookupError::UpstreamRateLimited { suggested_wait } => write!(
                f,
                "Registry API is rate limiting, retry in {}",
                format_wait(*suggested_wait)
            ),
            LookupError::NotFound => write!(f, "CNPJ not found in registry"),
            LookupError::Transient(e) => write!(f, "Registry request failed: {}", e),
            LookupError::Upstream { status, message } => {
                write!(f, "Registry returned status {}: {}", status, message)
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Failures talking to the CRM.
#[derive(Debug, Clone, PartialEq)]
pub enum CrmError {
    /// Token rejected (HTTP 401).
    Auth(String),
    /// A property we write does not exist yet; schema setup has to run first.
    Schema(String),
    /// Creating a property or group that already exists (HTTP 409).
    PropertyConflict(String),
    /// Object not found (HTTP 404).
    NotFound(String),
    /// Any other non-success answer.
    Api { status: u16, message: String },
    /// Request never got an answer.
    Transport(String),
}

impl CrmError {
    pub fn code(&self) -> &'static str {
        match self {
            CrmError::Auth(_) => "CRM_UNAUTHORIZED",
            CrmError::Schema(_) => "SCHEMA_MISSING",
            CrmError::PropertyConflict(_) => "PROPERTY_CONFLICT",
            CrmError::NotFound(_) => "RECORD_NOT_FOUND",
            CrmError::Api { .. } => "CRM_ERROR",
            CrmError::Transport(_) => "CRM_UNREACHABLE",
        }
    }
}

impl fmt::Display for CrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrmError::Auth(msg) => write!(f, "CRM rejected credentials: {}", msg),
            CrmError::Schema(msg) => write!(f, "CRM property schema missing: {}", msg),
            CrmError::PropertyConflict(name) => write!(f, "CRM property already exists: {}", name),
            CrmError::NotFound(msg) => write!(f, "CRM record not found: {}", msg),
            CrmError::Api { status, message } => {
                write!(f, "CRM returned status {}: {}", status, message)
            }
            CrmError::Transport(e) => write!(f, "CRM request failed: {}", e),
        }
    }
}

impl std::error::Error for CrmError {}

/// Missing or unusable CRM credentials. Needs a new OAuth install to recover.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    NoToken,
    TokenExpired,
    Exchange(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NoToken => "NO_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::Exchange(_) => "OAUTH_EXCHANGE_FAILED",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NoToken => write!(f, "No CRM access token, install the app first"),
            AuthError::TokenExpired => {
                write!(f, "CRM access token expired and could not be refreshed")
            }
            AuthError::Exchange(msg) => write!(f, "OAuth token exchange failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Everything `enrich` can report to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentError {
    /// No candidate property holds something that looks like a CNPJ.
    IdentifierNotFound,
    InvalidIdentifier(ValidationError),
    /// Lookup client refused up front; no external call was attempted.
    RateLimited { wait_time: Duration },
    Lookup(LookupError),
    Crm(CrmError),
    Auth(AuthError),
}

impl EnrichmentError {
    pub fn code(&self) -> &'static str {
        match self {
            EnrichmentError::IdentifierNotFound => "IDENTIFIER_NOT_FOUND",
            EnrichmentError::InvalidIdentifier(_) => "INVALID_CNPJ",
            EnrichmentError::RateLimited { .. } => "RATE_LIMITED",
            EnrichmentError::Lookup(e) => e.code(),
            EnrichmentError::Crm(e) => e.code(),
            EnrichmentError::Auth(e) => e.code(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EnrichmentError::RateLimited { wait_time } => Some(*wait_time),
            EnrichmentError::Lookup(e) => e.retry_after(),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            EnrichmentError::RateLimited { .. } => true,
            EnrichmentError::Lookup(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}

impl fmt::Display for EnrichmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentError::IdentifierNotFound => {
                write!(f, "No CNPJ found on the company record")
            }
            EnrichmentError::InvalidIdentifier(e) => write!(f, "Invalid CNPJ: {}", e),
            EnrichmentError::RateLimited { wait_time } => {
                write!(f, "Rate limited, retry in {}", format_wait(*wait_time))
            }
            EnrichmentError::Lookup(e) => write!(f, "{}", e),
            EnrichmentError::Crm(e) => write!(f, "{}", e),
            EnrichmentError::Auth(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EnrichmentError {}

impl From<ValidationError> for EnrichmentError {
    fn from(err: ValidationError) -> Self {
        EnrichmentError::InvalidIdentifier(err)
    }
}

impl From<LookupError> for EnrichmentError {
    fn from(err: LookupError) -> Self {
        EnrichmentError::Lookup(err)
    }
}

impl From<CrmError> for EnrichmentError {
    fn from(err: CrmError) -> Self {
        EnrichmentError::Crm(err)
    }
}

impl From<AuthError> for EnrichmentError {
    fn from(err: AuthError) -> Self {
        EnrichmentError::Auth(err)
    }
}

/// Human-readable wait, e.g. `45s` or `1m 05s`.
pub fn format_wait(wait: Duration) -> String {
    // Round up so "retry in 0s" never shows while a wait is still pending.
    let secs = wait.as_millis().div_ceil(1000) as u64;
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Application-specific error types for the HTTP layer.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Resource not found error.
    NotFound(String),
    /// Unauthorized access error.
    Unauthorized(String),
    /// Error interacting with an external API.
    ExternalApiError(String),
    /// Internal server error.
    InternalError(String),
    /// Structured enrichment failure with code and optional wait.
    Enrichment(EnrichmentError),
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::Enrichment(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Enrichment(e) => match e {
                EnrichmentError::IdentifierNotFound => StatusCode::UNPROCESSABLE_ENTITY,
                EnrichmentError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
                EnrichmentError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                EnrichmentError::Lookup(l) => match l {
                    LookupError::QuotaExceeded { .. }
                    | LookupError::TooSoon { .. }
                    | LookupError::UpstreamRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                    LookupError::NotFound => StatusCode::NOT_FOUND,
                    LookupError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                    LookupError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                },
                EnrichmentError::Crm(c) => match c {
                    CrmError::Auth(_) => StatusCode::UNAUTHORIZED,
                    CrmError::Schema(_) => StatusCode::PRECONDITION_FAILED,
                    CrmError::PropertyConflict(_) => StatusCode::CONFLICT,
                    CrmError::NotFound(_) => StatusCode::NOT_FOUND,
                    CrmError::Api { .. } | CrmError::Transport(_) => StatusCode::BAD_GATEWAY,
                },
                EnrichmentError::Auth(_) => StatusCode::UNAUTHORIZED,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::ExternalApiError(_) => "EXTERNAL_API_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
            AppError::Enrichment(e) => e.code(),
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Every body carries a machine-readable `code` and a `message`; throttling
    /// errors also carry `wait_time_ms`, `wait_time_formatted` and a
    /// `Retry-After` header.
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                "External service error".to_string()
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                msg.clone()
            }
            AppError::Enrichment(e) => {
                if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
                    tracing::error!("Enrichment failed: {}", e);
                }
                e.to_string()
            }
            other => other.to_string(),
        };

        let wait = match &self {
            AppError::Enrichment(e) => e.retry_after(),
            _ => None,
        };

        let mut body = json!({
            "code": self.code(),
            "message": message,
        });
        if let Some(wait) = wait {
            body["wait_time_ms"] = json!(wait.as_millis() as u64);
            body["wait_time_formatted"] = json!(format_wait(wait));
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(wait) = wait {
            let secs = wait.as_millis().div_ceil(1000).to_string();
            if let Ok(value) = HeaderValue::from_str(&secs) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<EnrichmentError> for AppError {
    fn from(err: EnrichmentError) -> Self {
        AppError::Enrichment(err)
    }
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        AppError::Enrichment(EnrichmentError::Lookup(err))
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Enrichment(EnrichmentError::InvalidIdentifier(err))
    }
}

impl From<CrmError> for AppError {
    fn from(err: CrmError) -> Self {
        AppError::Enrichment(EnrichmentError::Crm(err))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Enrichment(EnrichmentError::Auth(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(Duration::from_secs(45)), "45s");
        assert_eq!(format_wait(Duration::from_millis(44_001)), "45s");
        assert_eq!(format_wait(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_wait(Duration::ZERO), "0s");
    }

    #[test]
    fn test_retry_after_for_throttles() {
        let err = EnrichmentError::Lookup(LookupError::UpstreamRateLimited {
            suggested_wait: UPSTREAM_RATE_LIMIT_WAIT,
        });
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
        assert!(err.is_rate_limited());

        let err = EnrichmentError::Lookup(LookupError::NotFound);
        assert_eq!(err.retry_after(), None);
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_rate_limited_response_carries_wait() {
        let err = AppError::from(EnrichmentError::RateLimited {
            wait_time: Duration::from_millis(1500),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            EnrichmentError::InvalidIdentifier(ValidationError::RepeatedDigits).code(),
            "INVALID_CNPJ"
        );
        assert_eq!(
            EnrichmentError::Crm(CrmError::Schema("cnpj".into())).code(),
            "SCHEMA_MISSING"
        );
        assert_eq!(EnrichmentError::Auth(AuthError::NoToken).code(), "NO_TOKEN");
    }
}
