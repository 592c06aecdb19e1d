//! Check nodes.
//!
//! Each check reads and may rewrite fields of the [`SubmissionRecord`] held
//! by the [`CheckContext`], appends diagnostics to the shared report and
//! returns whether dependents may trust the record. A check that only adds
//! warnings still succeeds.
//!
//! | Module | Checks |
//! |---|---|
//! | [`content`] | project, dataset, content |
//! | [`station`] | contributor, station, deployment |
//! | [`instrument`] | instrument_name_model, instrument, location |
//! | [`generation`] | data_generation, time_series |

pub mod content;
pub mod generation;
pub mod instrument;
pub mod station;

use async_trait::async_trait;

use super::graph::CheckId;
use super::report::{Diagnostic, DiagnosticReport};
use crate::config::LocationSettings;
use crate::error::RunResult;
use crate::models::{Document, SubmissionRecord};
use crate::parser::ExtCsv;
use crate::registry::{ReferenceQuery, RegistryClient};

/// Values treated as "not given" for instrument fields.
pub const PLACEHOLDERS: [&str; 2] = ["na", "n/a"];

/// Sentinel for missing instrument name, model or number.
pub const UNKNOWN: &str = "UNKNOWN";

/// One validation step.
#[async_trait]
pub trait Check: Send + Sync {
    fn id(&self) -> CheckId;

    /// Run the check. `Ok(false)` means dependents must be skipped; `Err`
    /// aborts the whole run.
    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool>;
}

/// Everything a check may read or write during one run.
pub struct CheckContext<'a> {
    pub record: SubmissionRecord,
    pub report: DiagnosticReport,
    pub extcsv: &'a ExtCsv,
    pub registry: &'a RegistryClient,
    pub settings: &'a LocationSettings,
}

impl<'a> CheckContext<'a> {
    pub fn new(
        record: SubmissionRecord,
        extcsv: &'a ExtCsv,
        registry: &'a RegistryClient,
        settings: &'a LocationSettings,
    ) -> Self {
        Self {
            record,
            report: DiagnosticReport::new(),
            extcsv,
            registry,
            settings,
        }
    }

    /// First value line of a table.
    pub fn value_line(&self, table: &str) -> usize {
        self.extcsv.value_line(table)
    }

    /// Append a diagnostic; returns whether it is an error.
    pub fn add(&mut self, diagnostic: Diagnostic) -> bool {
        self.report.add(diagnostic)
    }

    /// Distinct values of a registry field.
    pub async fn distinct(&self, collection: &str, field: &str) -> RunResult<Vec<String>> {
        Ok(self.registry.distinct_values(collection, field).await?)
    }

    /// Registry documents whose `field` equals `value`.
    pub async fn find(&self, collection: &str, field: &str, value: &str) -> RunResult<Vec<Document>> {
        Ok(self.registry.match_field(collection, field, value).await?)
    }

    pub async fn find_where(&self, query: &ReferenceQuery) -> RunResult<Vec<Document>> {
        Ok(self.registry.find(query).await?)
    }
}

/// Whether an instrument field counts as not given.
pub fn is_placeholder(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => true,
        Some(v) => PLACEHOLDERS.contains(&v.to_lowercase().as_str()),
    }
}

/// All checks, in plan order.
pub fn standard_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(content::ProjectCheck),
        Box::new(content::DatasetCheck),
        Box::new(content::ContentCheck),
        Box::new(station::ContributorCheck),
        Box::new(station::StationCheck),
        Box::new(station::DeploymentCheck),
        Box::new(instrument::InstrumentNameModelCheck),
        Box::new(instrument::InstrumentCheck),
        Box::new(instrument::LocationCheck),
        Box::new(generation::DataGenerationCheck),
        Box::new(generation::TimeSeriesCheck),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_checks_follow_order() {
        let ids: Vec<CheckId> = standard_checks().iter().map(|c| c.id()).collect();
        assert_eq!(ids, CheckId::ORDER.to_vec());
    }

    #[test]
    fn test_placeholders() {
        assert!(is_placeholder(None));
        assert!(is_placeholder(Some("")));
        assert!(is_placeholder(Some("N/A")));
        assert!(is_placeholder(Some("na")));
        assert!(!is_placeholder(Some("Brewer")));
    }
}
