//! Destination property schema and the registry → CRM field mapping.
//!
//! One table drives both schema setup (`POST /crm/v3/properties/companies`)
//! and the mapping performed after a successful lookup, so the two cannot
//! drift apart.

use crate::cnpj::Cnpj;
use crate::enrichment::{is_valid_email, validate_br_phone};
use crate::models::{CompanyRegistryRecord, EnrichmentStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const GROUP_NAME: &str = "cnpj_enrichment";
pub const GROUP_LABEL: &str = "CNPJ Enrichment";

pub const CNPJ: &str = "cnpj";
pub const LEGAL_NAME: &str = "razao_social";
pub const TRADE_NAME: &str = "nome_fantasia";
pub const REGISTRATION_STATUS: &str = "situacao_cadastral";
pub const SIZE: &str = "porte_empresa";
pub const PRIMARY_ACTIVITY: &str = "atividade_principal";
pub const FULL_ADDRESS: &str = "endereco_completo";
pub const REGISTERED_CAPITAL: &str = "capital_social";
pub const LAST_UPDATED: &str = "cnpj_data_atualizacao";
pub const SHOULD_ENRICH: &str = "enriquecer_cnpj";
pub const ENRICHMENT_STATUS: &str = "status_enriquecimento";

/// Built-in CRM properties that also receive registry data.
pub const PHONE: &str = "phone";
pub const COMPANY_EMAIL: &str = "company_email";

pub const SHOULD_ENRICH_YES: &str = "yes";
pub const SHOULD_ENRICH_NO: &str = "no";

/// Properties that may hold the CNPJ, in priority order.
pub const IDENTIFIER_CANDIDATES: &[&str] = &[
    CNPJ,
    "cnpj_number",
    "company_cnpj",
    "tax_id",
    "registration_number",
];

#[derive(Debug, Clone, Serialize)]
pub struct PropertyOption {
    pub label: &'static str,
    pub value: &'static str,
    #[serde(rename = "displayOrder")]
    pub display_order: i32,
}

/// Body of a property-creation call.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyDefinition {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub property_type: &'static str,
    #[serde(rename = "fieldType")]
    pub field_type: &'static str,
    #[serde(rename = "groupName")]
    pub group_name: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PropertyOption>,
}

fn text(name: &'static str, label: &'static str, description: &'static str) -> PropertyDefinition {
    PropertyDefinition {
        name,
        label,
        description,
        property_type: "string",
        field_type: "text",
        group_name: GROUP_NAME,
        options: Vec::new(),
    }
}

fn textarea(
    name: &'static str,
    label: &'static str,
    description: &'static str,
) -> PropertyDefinition {
    PropertyDefinition {
        field_type: "textarea",
        ..text(name, label, description)
    }
}

fn enumeration(
    name: &'static str,
    label: &'static str,
    description: &'static str,
    options: &[(&'static str, &'static str)],
) -> PropertyDefinition {
    PropertyDefinition {
        name,
        label,
        description,
        property_type: "enumeration",
        field_type: "select",
        group_name: GROUP_NAME,
        options: options
            .iter()
            .enumerate()
            .map(|(i, &(value, label))| PropertyOption {
                label,
                value,
                display_order: i as i32,
            })
            .collect(),
    }
}

/// Every custom property the enrichment writes.
pub fn property_definitions() -> Vec<PropertyDefinition> {
    vec![
        text(CNPJ, "CNPJ", "Company registration number (14 digits)"),
        text(LEGAL_NAME, "Razão Social", "Legal name from the CNPJ registry"),
        text(TRADE_NAME, "Nome Fantasia", "Trade name from the CNPJ registry"),
        text(
            REGISTRATION_STATUS,
            "Situação Cadastral",
            "Registration status from the CNPJ registry",
        ),
        text(SIZE, "Porte da Empresa", "Company size classification"),
        textarea(
            PRIMARY_ACTIVITY,
            "Atividade Principal",
            "Primary economic activity",
        ),
        textarea(FULL_ADDRESS, "Endereço Completo", "Registered address"),
        PropertyDefinition {
            property_type: "number",
            field_type: "number",
            ..text(REGISTERED_CAPITAL, "Capital Social", "Registered capital (BRL)")
        },
        PropertyDefinition {
            property_type: "datetime",
            field_type: "date",
            ..text(
                LAST_UPDATED,
                "CNPJ Data de Atualização",
                "When registry data was last written",
            )
        },
        enumeration(
            SHOULD_ENRICH,
            "Enriquecer CNPJ",
            "Set to yes to have the company enriched",
            &[(SHOULD_ENRICH_YES, "Sim"), (SHOULD_ENRICH_NO, "Não")],
        ),
        enumeration(
            ENRICHMENT_STATUS,
            "Status do Enriquecimento",
            "Outcome of the last enrichment attempt",
            &[
                ("enriched", "Enriquecido"),
                ("rate_limited", "Limite de requisições"),
                ("failed", "Falhou"),
                ("not_processed", "Não processado"),
            ],
        ),
    ]
}

/// Names of every property the enrichment reads or writes.
pub fn managed_property_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = IDENTIFIER_CANDIDATES.to_vec();
    names.extend(
        property_definitions()
            .iter()
            .map(|p| p.name)
            .filter(|n| *n != CNPJ),
    );
    names
}

/// Property patch for a successful lookup.
///
/// Empty registry values are left out so they never blank an existing CRM value.
pub fn map_record(
    cnpj: &Cnpj,
    record: &CompanyRegistryRecord,
    now: DateTime<Utc>,
) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let mut put = |name: &str, value: Option<String>| {
        if let Some(v) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            props.insert(name.to_string(), v);
        }
    };

    put(CNPJ, Some(cnpj.formatted()));
    put(LEGAL_NAME, record.legal_name.clone());
    put(TRADE_NAME, record.trade_name().map(str::to_string));
    put(
        REGISTRATION_STATUS,
        record.registration_status().map(str::to_string),
    );
    put(SIZE, record.size_description().map(str::to_string));
    put(
        PRIMARY_ACTIVITY,
        record.primary_activity().map(str::to_string),
    );
    put(FULL_ADDRESS, record.full_address());
    put(REGISTERED_CAPITAL, record.registered_capital_text());

    if let Some(raw) = record.phone_digits() {
        let (valid, normalized) = validate_br_phone(&raw);
        if valid {
            put(PHONE, Some(normalized));
        }
    }
    if let Some(email) = record.email().filter(|e| is_valid_email(e)) {
        put(COMPANY_EMAIL, Some(email.to_lowercase()));
    }

    put(
        LAST_UPDATED,
        Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    put(
        ENRICHMENT_STATUS,
        Some(EnrichmentStatus::Enriched.as_property_value().to_string()),
    );
    put(SHOULD_ENRICH, Some(SHOULD_ENRICH_NO.to_string()));

    props
}

/// Patch that only tags the attempt outcome.
///
/// A failed attempt also clears the flag so the poller does not retry bad
/// data forever; rate-limited attempts keep it set for the next tick.
pub fn status_patch(status: EnrichmentStatus) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    props.insert(
        ENRICHMENT_STATUS.to_string(),
        status.as_property_value().to_string(),
    );
    if status == EnrichmentStatus::Failed {
        props.insert(SHOULD_ENRICH.to_string(), SHOULD_ENRICH_NO.to_string());
    }
    props
}
