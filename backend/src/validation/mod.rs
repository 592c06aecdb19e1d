//! Extended CSV metadata validation against the reference registry.
//!
//! A run parses the submission, extracts a [`SubmissionRecord`](crate::models::SubmissionRecord)
//! and executes a fixed plan of checks. Each check reports coded
//! diagnostics; a check whose dependency did not pass is skipped.
//!
//! # Example
//!
//! ```rust,ignore
//! use woudc_api::validation::{ValidateOptions, Validator};
//!
//! let outcome = validator.validate_text(&text, ValidateOptions::default()).await?;
//! let summary = outcome.summary();
//! println!("{}", serde_json::to_string_pretty(&summary)?);
//! ```

pub mod checks;
pub mod graph;
pub mod pipeline;
pub mod report;

#[cfg(test)]
pub(crate) mod fixtures;

pub use checks::{standard_checks, Check, CheckContext};
pub use graph::{CheckId, CheckPlan, CheckStatus, CheckStatuses};
pub use pipeline::{ValidateOptions, ValidationOutcome, Validator};
pub use report::{
    Diagnostic, DiagnosticCode, DiagnosticEntry, DiagnosticReport, Severity, ValidationSummary,
};
