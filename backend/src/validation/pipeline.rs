//! Validation pipeline: parse, extract the metadata record, then run the
//! check plan against the reference registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use woudc_api::{RegistryClient, Settings, ValidateOptions, Validator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let registry = RegistryClient::connect(&settings).await?;
//!     let validator = Validator::new(registry, settings.location.clone());
//!
//!     let outcome = validator
//!         .validate_file("submission.csv", ValidateOptions::default())
//!         .await?;
//!     println!("passed: {}", outcome.passed());
//!     Ok(())
//! }
//! ```

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::checks::{standard_checks, Check, CheckContext};
use super::graph::{CheckId, CheckPlan, CheckStatus, CheckStatuses};
use super::report::{Diagnostic, DiagnosticCode, DiagnosticReport, ValidationSummary};
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::config::LocationSettings;
use crate::error::{ExtCsvError, RunResult};
use crate::models::{MissingMetadata, SubmissionRecord};
use crate::parser::{parse_bytes_auto, parse_extcsv, ExtCsv};
use crate::registry::RegistryClient;

/// Options for one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Run the registry checks after parsing.
    pub check_metadata: bool,

    /// Skip the time-series check.
    pub metadata_only: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            check_metadata: true,
            metadata_only: false,
        }
    }
}

/// Result of one validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub run_id: Uuid,
    #[serde(skip)]
    pub report: DiagnosticReport,
    pub statuses: CheckStatuses,
    /// The record as normalised by the checks; `None` when parsing failed.
    #[serde(skip)]
    pub record: Option<SubmissionRecord>,
}

impl ValidationOutcome {
    fn structural(run_id: Uuid, diagnostic: Diagnostic) -> Self {
        let mut report = DiagnosticReport::new();
        report.add(diagnostic);
        Self {
            run_id,
            report,
            statuses: CheckStatuses::new(),
            record: None,
        }
    }

    /// Zero error diagnostics.
    pub fn passed(&self) -> bool {
        self.report.passed()
    }

    pub fn summary(&self) -> ValidationSummary {
        self.report.summary()
    }

    pub fn status(&self, check: CheckId) -> Option<CheckStatus> {
        self.statuses.get(&check).copied()
    }
}

/// Runs the check plan against a registry.
///
/// Cheap to clone; runs share only the registry client.
#[derive(Clone)]
pub struct Validator {
    registry: RegistryClient,
    settings: LocationSettings,
    plan: CheckPlan,
    checks: Arc<Vec<Box<dyn Check>>>,
}

impl Validator {
    pub fn new(registry: RegistryClient, settings: LocationSettings) -> Self {
        Self {
            registry,
            settings,
            plan: CheckPlan::standard(),
            checks: Arc::new(standard_checks()),
        }
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Validate Extended CSV text.
    pub async fn validate_text(&self, content: &str, options: ValidateOptions) -> RunResult<ValidationOutcome> {
        self.validate_parsed(parse_extcsv(content), options).await
    }

    /// Validate raw bytes, detecting the encoding.
    pub async fn validate_bytes(&self, bytes: &[u8], options: ValidateOptions) -> RunResult<ValidationOutcome> {
        self.validate_parsed(parse_bytes_auto(bytes), options).await
    }

    /// Validate a file on disk. An unreadable file is reported as unparseable.
    pub async fn validate_file<P: AsRef<Path>>(&self, path: P, options: ValidateOptions) -> RunResult<ValidationOutcome> {
        let parsed = tokio::fs::read(path.as_ref())
            .await
            .map_err(ExtCsvError::from)
            .and_then(|bytes| parse_bytes_auto(&bytes));
        self.validate_parsed(parsed, options).await
    }

    async fn validate_parsed(
        &self,
        parsed: Result<ExtCsv, ExtCsvError>,
        options: ValidateOptions,
    ) -> RunResult<ValidationOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("validate", %run_id);
        async move {
            let extcsv = match parsed {
                Ok(extcsv) => extcsv,
                Err(e) => {
                    log_error(format!("Unparseable submission: {}", e));
                    let line = e.line().unwrap_or(0);
                    let diagnostic = Diagnostic::new(DiagnosticCode::Unparseable, line).with("reason", &e);
                    return Ok(ValidationOutcome::structural(run_id, diagnostic));
                }
            };
            log_info(format!("Parsed {} tables ({})", extcsv.tables.len(), extcsv.encoding));

            let record = match SubmissionRecord::from_extcsv(&extcsv) {
                Ok(record) => record,
                Err(missing) => {
                    let diagnostic = structural_diagnostic(&extcsv, missing);
                    log_error(diagnostic.message());
                    return Ok(ValidationOutcome::structural(run_id, diagnostic));
                }
            };

            if !options.check_metadata {
                info!("Metadata checks disabled");
                return Ok(ValidationOutcome {
                    run_id,
                    report: DiagnosticReport::new(),
                    statuses: CheckStatuses::new(),
                    record: Some(record),
                });
            }

            self.run_checks(&extcsv, record, run_id, options).await
        }
        .instrument(span)
        .await
    }

    async fn run_checks(
        &self,
        extcsv: &ExtCsv,
        record: SubmissionRecord,
        run_id: Uuid,
        options: ValidateOptions,
    ) -> RunResult<ValidationOutcome> {
        let mut ctx = CheckContext::new(record, extcsv, &self.registry, &self.settings);
        let mut statuses = CheckStatuses::new();

        for &id in self.plan.order() {
            if options.metadata_only && id == CheckId::TimeSeries {
                info!("Metadata-only run, skipping {}", id);
                statuses.insert(id, CheckStatus::Skipped);
                continue;
            }
            if let Some(dependency) = CheckPlan::blocking_dependency(id, &statuses) {
                warn!(check = %id, dependency = %dependency, "dependency failed, skipping");
                log_warning(format!("Skipping {}: {} did not pass", id, dependency));
                statuses.insert(id, CheckStatus::Skipped);
                continue;
            }
            let Some(check) = self.checks.iter().find(|c| c.id() == id) else {
                statuses.insert(id, CheckStatus::Skipped);
                continue;
            };

            info!("Running {} check", id);
            let success = match check.run(&mut ctx).await {
                Ok(success) => success,
                Err(e) => {
                    log_error(format!("{} check aborted: {}", id, e));
                    return Err(e);
                }
            };
            statuses.insert(id, CheckStatus::from_success(success));
        }

        let outcome = ValidationOutcome {
            run_id,
            report: ctx.report,
            statuses,
            record: Some(ctx.record),
        };
        let summary = outcome.summary();
        if outcome.passed() {
            log_success(format!("Validation passed with {} warnings", summary.warnings.len()));
        } else {
            log_error(format!(
                "Validation failed: {} errors, {} warnings",
                summary.errors.len(),
                summary.warnings.len()
            ));
        }
        Ok(outcome)
    }
}

fn structural_diagnostic(extcsv: &ExtCsv, missing: MissingMetadata) -> Diagnostic {
    match missing {
        MissingMetadata::Table(table) => Diagnostic::new(DiagnosticCode::MissingTable, 0).with("table", table),
        MissingMetadata::Field { table, field } => {
            Diagnostic::new(DiagnosticCode::MissingField, extcsv.value_line(&table))
                .with("table", table)
                .with("field", field)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use crate::models::CellValue;
    use crate::registry::InMemoryRegistry;
    use crate::validation::fixtures;

    fn validator() -> Validator {
        Validator::new(fixtures::registry(), LocationSettings::default())
    }

    async fn validate(text: &str) -> ValidationOutcome {
        validator().validate_text(text, ValidateOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_valid_submission_passes() {
        let outcome = validate(fixtures::VALID_FILE).await;
        assert!(outcome.passed());
        let summary = outcome.summary();
        assert!(summary.response);
        assert!(summary.errors.is_empty());
        assert!(summary.warnings.is_empty());
        assert_eq!(outcome.statuses.len(), CheckId::ORDER.len());
        assert!(outcome.statuses.values().all(|s| *s == CheckStatus::Passed));
        let record = outcome.record.unwrap();
        assert_eq!(record.instrument_id.as_deref(), Some(fixtures::INSTRUMENT_ID));
    }

    #[tokio::test]
    async fn test_unparseable_text() {
        let outcome = validate("just some text\n").await;
        assert!(!outcome.passed());
        assert_eq!(outcome.report.codes(), vec![209]);
        assert_eq!(outcome.report.all()[0].line, 1);
        assert!(outcome.statuses.is_empty());
    }

    #[tokio::test]
    async fn test_missing_table() {
        let text = fixtures::edited_file("#LOCATION", "#LOCATIONS");
        let outcome = validate(&text).await;
        assert_eq!(outcome.report.codes(), vec![101]);
        let diag = &outcome.report.all()[0];
        assert_eq!(diag.params["table"], "LOCATION");
        assert_eq!(diag.line, 0);
        assert!(outcome.statuses.is_empty());
    }

    #[tokio::test]
    async fn test_missing_field() {
        let text = fixtures::edited_file("Name,Model,Number", "Name,Model,Serial");
        let outcome = validate(&text).await;
        assert_eq!(outcome.report.codes(), vec![102]);
        let diag = &outcome.report.all()[0];
        assert_eq!(diag.params["table"], "INSTRUMENT");
        assert_eq!(diag.params["field"], "Number");
        assert_eq!(diag.line, 16);
    }

    #[tokio::test]
    async fn test_parse_only() {
        let text = fixtures::edited_file("STN,077", "STN,999");
        let options = ValidateOptions {
            check_metadata: false,
            metadata_only: false,
        };
        let outcome = validator().validate_text(&text, options).await.unwrap();
        assert!(outcome.passed());
        assert!(outcome.report.is_empty());
        assert!(outcome.statuses.is_empty());
    }

    #[tokio::test]
    async fn test_deployment_skipped_after_contributor_failure() {
        let text = fixtures::edited_file("2023-02-01,MSC", "2023-02-01,NOAA");
        let outcome = validate(&text).await;

        assert_eq!(outcome.status(CheckId::Contributor), Some(CheckStatus::Failed));
        assert_eq!(outcome.status(CheckId::Deployment), Some(CheckStatus::Skipped));
        assert_eq!(outcome.status(CheckId::Instrument), Some(CheckStatus::Skipped));
        assert_eq!(outcome.status(CheckId::Location), Some(CheckStatus::Skipped));
        assert_eq!(outcome.report.codes(), vec![67]);
    }

    #[tokio::test]
    async fn test_location_only_after_instrument() {
        let text = fixtures::edited_file("Brewer,MKII,014", "Brewer,MKII,015")
            .replace("58.74,-94.07,35", "10.0,-94.07,35");
        let outcome = validate(&text).await;

        assert_eq!(outcome.status(CheckId::Instrument), Some(CheckStatus::Failed));
        assert_eq!(outcome.status(CheckId::Location), Some(CheckStatus::Skipped));
        assert_eq!(outcome.report.codes(), vec![87]);
    }

    #[tokio::test]
    async fn test_location_deviation() {
        let text = fixtures::edited_file("58.74,-94.07,35", "60.0,-94.07,35");
        let outcome = validate(&text).await;

        assert_eq!(outcome.status(CheckId::Location), Some(CheckStatus::Failed));
        let diag = outcome.report.find(DiagnosticCode::CoordinateTooFar).unwrap();
        assert_eq!(diag.params["field"], "Latitude");
        assert_eq!(diag.line, 20);
    }

    #[tokio::test]
    async fn test_latitude_out_of_range() {
        let text = fixtures::edited_file("58.74,-94.07,35", "91.0,-94.07,35");
        let outcome = validate(&text).await;
        assert_eq!(outcome.report.codes(), vec![78]);

        let text = fixtures::edited_file("58.74,-94.07,35", "abc,-94.07,35");
        let outcome = validate(&text).await;
        assert_eq!(outcome.report.codes(), vec![76]);
        assert_eq!(outcome.record.unwrap().latitude, None);
    }

    #[tokio::test]
    async fn test_short_station_id() {
        let text = fixtures::edited_file("STN,077", "STN,77");
        let outcome = validate(&text).await;
        assert_eq!(outcome.report.codes(), vec![70]);
        assert_eq!(outcome.status(CheckId::Station), Some(CheckStatus::Failed));
        assert_eq!(outcome.record.unwrap().station_id, "077");
    }

    #[tokio::test]
    async fn test_ship_at_sea() {
        let text = fixtures::edited_file("STN,077,Churchill,CAN,", "SHP,401,Polarstern,IW,")
            .replace("Brewer,MKII,014", "Dobson,Beck,101");
        let outcome = validate(&text).await;

        assert!(outcome.passed(), "{:?}", outcome.report.codes());
        assert_eq!(outcome.report.codes(), vec![75]);
        let record = outcome.record.unwrap();
        assert_eq!(record.country.as_deref(), Some("XY"));
    }

    #[tokio::test]
    async fn test_version_codes() {
        let text = fixtures::edited_file("MSC,1.0,", "MSC,1,");
        assert_eq!(validate(&text).await.report.codes(), vec![65]);

        let text = fixtures::edited_file("MSC,1.0,", "MSC,,");
        assert_eq!(validate(&text).await.report.codes(), vec![63]);

        let text = fixtures::edited_file("MSC,1.0,", "MSC,21.5,");
        assert_eq!(validate(&text).await.report.codes(), vec![64]);
    }

    #[tokio::test]
    async fn test_content_numbers_coerced_with_warnings() {
        let text = fixtures::edited_file("WOUDC,TotalOzone,1.0,1", "WOUDC,TotalOzone,1,1");
        let outcome = validate(&text).await;
        assert!(outcome.passed());
        assert_eq!(outcome.report.codes(), vec![54]);
        let diag = outcome.report.find(DiagnosticCode::LevelCoerced).unwrap();
        assert_eq!(diag.params["oldvalue"], "1");
        assert_eq!(diag.params["newvalue"], "1.0");
        assert_eq!(diag.line, 4);

        let text = fixtures::edited_file("WOUDC,TotalOzone,1.0,1", "WOUDC,TotalOzone,1.0,1.0");
        let outcome = validate(&text).await;
        assert!(outcome.passed());
        assert_eq!(outcome.report.codes(), vec![57]);
        let diag = outcome.report.find(DiagnosticCode::FormCoerced).unwrap();
        assert_eq!(diag.params["oldvalue"], "1.0");
        assert_eq!(diag.params["newvalue"], "1");
        let record = outcome.record.unwrap();
        assert_eq!(record.form, CellValue::Integer(1));
    }

    #[tokio::test]
    async fn test_empty_observation_date_fails() {
        let text = fixtures::edited_file("2023-01-02,9,DS,352", ",9,DS,352");
        let outcome = validate(&text).await;
        assert!(!outcome.passed());
        assert_eq!(outcome.report.codes(), vec![92]);
        assert_eq!(outcome.report.all()[0].line, 29);
    }

    #[tokio::test]
    async fn test_time_series_errors() {
        let text = fixtures::edited_file("2023-01-02,9,DS,352", "2023-05-01,9,DS,352");
        let outcome = validate(&text).await;
        assert_eq!(outcome.report.codes(), vec![92]);
        assert_eq!(outcome.report.all()[0].line, 29);
        assert_eq!(outcome.status(CheckId::TimeSeries), Some(CheckStatus::Failed));
    }

    #[tokio::test]
    async fn test_metadata_only_skips_time_series() {
        let text = fixtures::edited_file("2023-01-02,9,DS,352", "2023-05-01,9,DS,352");
        let options = ValidateOptions {
            check_metadata: true,
            metadata_only: true,
        };
        let outcome = validator().validate_text(&text, options).await.unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.status(CheckId::TimeSeries), Some(CheckStatus::Skipped));
    }

    #[tokio::test]
    async fn test_registry_failure_is_fatal() {
        let registry = RegistryClient::new(Arc::new(InMemoryRegistry::new()), fixtures::PREFIX);
        let validator = Validator::new(registry, LocationSettings::default());
        let err = validator
            .validate_text(fixtures::VALID_FILE, ValidateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Registry(_)));
    }

    #[tokio::test]
    async fn test_validate_file_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submission.csv");
        std::fs::write(&path, fixtures::VALID_FILE).unwrap();

        let outcome = validator().validate_file(&path, ValidateOptions::default()).await.unwrap();
        assert!(outcome.passed());

        let outcome = validator()
            .validate_bytes(fixtures::VALID_FILE.as_bytes(), ValidateOptions::default())
            .await
            .unwrap();
        assert!(outcome.passed());

        let outcome = validator()
            .validate_file(dir.path().join("missing.csv"), ValidateOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.report.codes(), vec![209]);
    }
}
