/// Unit tests for enrichment logic
/// Tests CNPJ validation, email/phone normalization and the CRM property mapping
use cnpj_enrichment::enrichment::{is_valid_email, validate_br_phone};

#[cfg(test)]
mod email_validation_tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("contato@acme.com.br"));
        assert!(is_valid_email("financeiro.sp@empresa.com"));
        assert!(is_valid_email("user+tag@example.co.uk"));
        assert!(is_valid_email("a@b.c"));
    }

    #[test]
    fn test_invalid_emails_basic() {
        assert!(!is_valid_email("contatoacme.com.br"));
        assert!(!is_valid_email("contato@acmecombr"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_invalid_emails_fake_patterns() {
        // Registry placeholders for companies without a real mailbox
        assert!(!is_valid_email("000000@empresa.com"));
        assert!(!is_valid_email("contato999999@empresa.com"));
        assert!(!is_valid_email("123456789@empresa.com.br"));
    }

    #[test]
    fn test_invalid_emails_malformed() {
        assert!(!is_valid_email("contato @acme.com"));
        assert!(!is_valid_email("contato@ac me.com"));
    }
}

#[cfg(test)]
mod phone_validation_tests {
    use super::*;

    #[test]
    fn test_registry_landline_digits() {
        // Registry sends area code and number separately, joined digits-only
        let (valid, normalized) = validate_br_phone("4333334444");
        assert!(valid);
        assert_eq!(normalized, "+554333334444");

        let (valid, normalized) = validate_br_phone("1133334444");
        assert!(valid);
        assert_eq!(normalized, "+551133334444");
    }

    #[test]
    fn test_mobile_numbers() {
        let (valid, normalized) = validate_br_phone("11987654321");
        assert!(valid);
        assert_eq!(normalized, "+5511987654321");

        let (valid, normalized) = validate_br_phone("(11) 98765-4321");
        assert!(valid);
        assert_eq!(normalized, "+5511987654321");
    }

    #[test]
    fn test_invalid_phones() {
        let (valid, _) = validate_br_phone("");
        assert!(!valid);

        let (valid, _) = validate_br_phone("3333444");
        assert!(!valid);

        let (valid, _) = validate_br_phone("0187654321");
        assert!(!valid);
    }
}

#[cfg(test)]
mod cnpj_validation_tests {
    use cnpj_enrichment::cnpj::{looks_like_cnpj, normalize, validate};
    use cnpj_enrichment::errors::ValidationError;

    #[test]
    fn test_formatted_and_bare_inputs_agree() {
        let formatted = validate("14.665.903/0001-04").unwrap();
        let bare = validate("14665903000104").unwrap();
        assert_eq!(formatted, bare);
        assert_eq!(bare.as_str(), "14665903000104");
        assert_eq!(bare.formatted(), "14.665.903/0001-04");
    }

    #[test]
    fn test_wrong_length_reports_digit_count() {
        assert_eq!(
            validate("14.665.903/0001"),
            Err(ValidationError::WrongLength { found: 12 })
        );
        assert_eq!(
            validate("146659030001049"),
            Err(ValidationError::WrongLength { found: 15 })
        );
        assert_eq!(validate(""), Err(ValidationError::WrongLength { found: 0 }));
    }

    #[test]
    fn test_repeated_digits_rejected() {
        assert_eq!(
            validate("00.000.000/0000-00"),
            Err(ValidationError::RepeatedDigits)
        );
        assert_eq!(
            validate("99999999999999"),
            Err(ValidationError::RepeatedDigits)
        );
    }

    #[test]
    fn test_looks_like_cnpj_only_counts_digits() {
        assert!(looks_like_cnpj("CNPJ: 14.665.903/0001-04"));
        assert!(!looks_like_cnpj("+55 43 3333-4444"));
        assert_eq!(normalize("CNPJ: 14.665.903/0001-04"), "14665903000104");
    }
}

#[cfg(test)]
mod field_mapping_tests {
    use chrono::{TimeZone, Utc};
    use cnpj_enrichment::cnpj::validate;
    use cnpj_enrichment::field_mapping::{self, map_record, status_patch};
    use cnpj_enrichment::models::{CompanyRegistryRecord, EnrichmentStatus};
    use serde_json::json;

    fn record(value: serde_json::Value) -> CompanyRegistryRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_record_mapping() {
        let cnpj = validate("14665903000104").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let props = map_record(
            &cnpj,
            &record(json!({
                "razao_social": "ACME COMERCIO LTDA",
                "capital_social": 150000,
                "porte": {"descricao": "Micro Empresa"},
                "estabelecimento": {
                    "nome_fantasia": "ACME",
                    "situacao_cadastral": "Ativa",
                    "atividade_principal": {"descricao": "Comércio varejista"},
                    "logradouro": "AV PAULISTA",
                    "numero": "1000",
                    "cidade": {"nome": "São Paulo"},
                    "estado": {"sigla": "SP"},
                    "email": "CONTATO@ACME.COM.BR"
                }
            })),
            now,
        );

        assert_eq!(props[field_mapping::CNPJ], "14.665.903/0001-04");
        assert_eq!(props[field_mapping::LEGAL_NAME], "ACME COMERCIO LTDA");
        assert_eq!(props[field_mapping::SIZE], "Micro Empresa");
        assert_eq!(props[field_mapping::REGISTERED_CAPITAL], "150000");
        assert_eq!(
            props[field_mapping::FULL_ADDRESS],
            "AV PAULISTA, 1000 - São Paulo/SP"
        );
        assert_eq!(props[field_mapping::COMPANY_EMAIL], "contato@acme.com.br");
        assert_eq!(props[field_mapping::LAST_UPDATED], "2024-05-01T12:00:00.000Z");
        assert_eq!(props[field_mapping::ENRICHMENT_STATUS], "enriched");
        assert_eq!(props[field_mapping::SHOULD_ENRICH], "no");
        assert!(!props.contains_key(field_mapping::PHONE));
    }

    #[test]
    fn test_sparse_record_never_blanks_fields() {
        let cnpj = validate("14665903000104").unwrap();
        let props = map_record(
            &cnpj,
            &record(json!({"razao_social": "  ", "estabelecimento": {"nome_fantasia": ""}})),
            Utc::now(),
        );

        assert!(!props.contains_key(field_mapping::LEGAL_NAME));
        assert!(!props.contains_key(field_mapping::TRADE_NAME));
        assert!(!props.contains_key(field_mapping::FULL_ADDRESS));
        assert!(props.contains_key(field_mapping::CNPJ));
    }

    #[test]
    fn test_status_patches() {
        let failed = status_patch(EnrichmentStatus::Failed);
        assert_eq!(failed[field_mapping::ENRICHMENT_STATUS], "failed");
        assert_eq!(failed[field_mapping::SHOULD_ENRICH], "no");

        let limited = status_patch(EnrichmentStatus::RateLimited);
        assert_eq!(limited[field_mapping::ENRICHMENT_STATUS], "rate_limited");
        assert!(!limited.contains_key(field_mapping::SHOULD_ENRICH));
    }
}

#[cfg(test)]
mod error_handling_tests {
    use cnpj_enrichment::errors::{AppError, EnrichmentError, LookupError};
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let error = AppError::ExternalApiError("Connection timeout".to_string());
        let display = format!("{}", error);
        assert!(display.contains("External API error"));
        assert!(display.contains("Connection timeout"));

        let error = AppError::NotFound("Company not found".to_string());
        assert!(format!("{}", error).contains("Company not found"));
    }

    #[test]
    fn test_rate_limit_errors_carry_wait() {
        let quota: EnrichmentError = LookupError::QuotaExceeded {
            wait_time: Duration::from_secs(42),
        }
        .into();
        assert!(quota.is_rate_limited());
        assert_eq!(quota.retry_after(), Some(Duration::from_secs(42)));

        let not_found: EnrichmentError = LookupError::NotFound.into();
        assert!(!not_found.is_rate_limited());
        assert_eq!(not_found.retry_after(), None);
    }
}
