//! # WOUDC API - Extended CSV validation and data registry processes
//!
//! Validates WOUDC Extended CSV submissions against the reference data
//! registry (an Elasticsearch-compatible search service) and exposes the
//! registry's select-distinct and metrics processes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Extended CSV│────▶│   Parser    │────▶│ Check plan  │────▶│ Diagnostics │
//! │ (auto-enc)  │     │  (tables)   │     │ (registry)  │     │  (report)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use woudc_api::{RegistryClient, Settings, ValidateOptions, Validator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let registry = RegistryClient::connect(&settings).await?;
//!     let validator = Validator::new(registry, settings.location.clone());
//!     let outcome = validator.validate_file("submission.csv", ValidateOptions::default()).await?;
//!     println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`config`] - Environment configuration
//! - [`models`] - Cell values, submission record, registry documents
//! - [`parser`] - Extended CSV parsing with encoding detection
//! - [`registry`] - Search backend seam and registry client
//! - [`query`] - Aggregation builder/flattener, distinct and metrics processes
//! - [`validation`] - Check plan, checks and diagnostic report
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Registry access
pub mod query;
pub mod registry;

// Validation
pub mod validation;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ConfigError, ExtCsvError, QueryError, RegistryError, RunError, ServerError};

// =============================================================================
// Re-exports - Configuration and models
// =============================================================================

pub use config::{LocationSettings, Settings};
pub use models::{CellValue, Document, SubmissionRecord};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{decode_content, detect_encoding, parse_bytes_auto, parse_extcsv, parse_extcsv_file, ExtCsv, Table};

// =============================================================================
// Re-exports - Registry and queries
// =============================================================================

pub use query::{DistinctRequest, DistinctResponse, DistinctSpec, MetricsRequest, MetricsResponse};
pub use registry::{ElasticsearchBackend, InMemoryRegistry, ReferenceQuery, RegistryClient, SearchBackend};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    CheckId, CheckStatus, Diagnostic, DiagnosticCode, DiagnosticReport, ValidateOptions, ValidationOutcome,
    ValidationSummary, Validator,
};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
