//! CNPJ Company Enrichment Library
//!
//! This library provides the core functionality for enriching CRM companies
//! from the public Brazilian company registry, including the rate-limited
//! registry client, CNPJ validation, CRM integration, and HTTP handlers.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `circuit_breaker`: Circuit breaker for the background poller.
//! - `cnpj`: CNPJ normalization and validation.
//! - `config`: Configuration management.
//! - `crm_client`: HubSpot CRM client.
//! - `enrichment`: Company enrichment workflow.
//! - `errors`: Error handling types.
//! - `field_mapping`: Registry record to CRM property mapping.
//! - `handlers`: HTTP request handlers.
//! - `lookup_client`: Rate-limited, cached registry client.
//! - `models`: Core data models.
//! - `oauth`: CRM OAuth install flow and token storage.
//! - `poller`: Background scan for flagged companies.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and the binary
pub mod circuit_breaker;
pub mod cnpj;
pub mod config;
pub mod crm_client;
pub mod enrichment;
pub mod errors;
pub mod field_mapping;
pub mod handlers;
pub mod lookup_client;
pub mod models;
pub mod oauth;
pub mod poller;
