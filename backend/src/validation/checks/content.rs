//! `#CONTENT` checks: project, dataset, form and level.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Check, CheckContext};
use crate::error::RunResult;
use crate::models::{format_float, CellValue};
use crate::validation::graph::CheckId;
use crate::validation::report::{Diagnostic, DiagnosticCode};

const TABLE: &str = "CONTENT";

/// Dataset accepted in addition to the registry's identifiers.
pub const LEGACY_UMKEHR: &str = "UmkehrN14";

/// Table whose presence marks a level 2.0 Umkehr file.
const UMKEHR_LEVEL2_TABLE: &str = "C_PROFILE";

/// `#CONTENT.Class` must be a registered project.
pub struct ProjectCheck;

#[async_trait]
impl Check for ProjectCheck {
    fn id(&self) -> CheckId {
        CheckId::Project
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let projects = ctx.distinct("project", "identifier").await?;
        let project = ctx.record.project.clone();
        if projects.contains(&project) {
            return Ok(true);
        }
        let line = ctx.value_line(TABLE);
        Ok(!ctx.add(Diagnostic::new(DiagnosticCode::ProjectNotFound, line).with("value", project)))
    }
}

/// `#CONTENT.Category` must be a registered dataset.
pub struct DatasetCheck;

#[async_trait]
impl Check for DatasetCheck {
    fn id(&self) -> CheckId {
        CheckId::Dataset
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let mut datasets = ctx.distinct("dataset", "identifier").await?;
        datasets.push(LEGACY_UMKEHR.to_string());

        let dataset = ctx.record.dataset.clone();
        if datasets.contains(&dataset) {
            return Ok(true);
        }
        let line = ctx.value_line(TABLE);
        Ok(!ctx.add(Diagnostic::new(DiagnosticCode::DatasetNotFound, line).with("value", dataset)))
    }
}

/// Form and level coercion, Umkehr level normalisation and the accepted
/// levels of the dataset's discovery metadata.
pub struct ContentCheck;

impl ContentCheck {
    fn coerce_form(ctx: &mut CheckContext<'_>, line: usize) -> bool {
        let form = ctx.record.form.clone();
        let coerced = match &form {
            CellValue::Integer(_) => return true,
            CellValue::Float(value) if value.is_finite() => Some(value.trunc() as i64),
            other => other.to_text().and_then(|text| text.trim().parse::<i64>().ok()),
        };
        match coerced {
            Some(value) => {
                ctx.record.form = CellValue::Integer(value);
                !ctx.add(
                    Diagnostic::new(DiagnosticCode::FormCoerced, line)
                        .with("oldvalue", form.to_string())
                        .with("newvalue", value),
                )
            }
            None => !ctx.add(Diagnostic::new(DiagnosticCode::FormNotInteger, line)),
        }
    }

    fn coerce_level(ctx: &mut CheckContext<'_>, line: usize) -> bool {
        let level = ctx.record.level.clone();
        let coerced = match &level {
            CellValue::Float(_) => return true,
            CellValue::Integer(value) => Some(*value as f64),
            other => other
                .to_text()
                .and_then(|text| text.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite()),
        };
        match coerced {
            Some(value) => {
                ctx.record.level = CellValue::Float(value);
                !ctx.add(
                    Diagnostic::new(DiagnosticCode::LevelCoerced, line)
                        .with("oldvalue", level.to_string())
                        .with("newvalue", format_float(value)),
                )
            }
            None => !ctx.add(Diagnostic::new(DiagnosticCode::LevelNotNumeric, line)),
        }
    }

    /// Force the Umkehr level from the file layout and suffix the dataset.
    fn normalise_umkehr(ctx: &mut CheckContext<'_>, line: usize) -> bool {
        let level = if ctx.extcsv.contains(UMKEHR_LEVEL2_TABLE) { 2.0 } else { 1.0 };
        let mut success = true;
        if ctx.record.level != CellValue::Float(level) {
            if ctx.add(Diagnostic::new(DiagnosticCode::LevelCorrected, line).with("value", format_float(level))) {
                success = false;
            }
            ctx.record.level = CellValue::Float(level);
        }
        ctx.record.dataset = format!("{}_{}", LEGACY_UMKEHR, format_float(level));
        success
    }
}

/// Level part of a discovery-metadata label (`"Level 1.0"` -> `"1.0"`).
fn label_level(label: &str) -> String {
    let chars = label.chars().count();
    label.chars().skip(chars.saturating_sub(3)).collect()
}

#[async_trait]
impl Check for ContentCheck {
    fn id(&self) -> CheckId {
        CheckId::Content
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let line = ctx.value_line(TABLE);
        let mut success = Self::coerce_form(ctx, line);
        success &= Self::coerce_level(ctx, line);

        if ctx.record.dataset == LEGACY_UMKEHR {
            success &= Self::normalise_umkehr(ctx, line);
        }

        if !success {
            return Ok(false);
        }

        let dataset = ctx.record.dataset.clone();
        let documents = ctx.find("discovery_metadata", "identifier", &dataset).await?;
        let accepted: Vec<String> = documents
            .first()
            .and_then(|doc| doc.properties.get("levels"))
            .and_then(Value::as_array)
            .map(|levels| {
                levels
                    .iter()
                    .filter_map(|l| l.get("label_en").and_then(Value::as_str))
                    .map(label_level)
                    .collect()
            })
            .unwrap_or_default();

        let level = ctx.record.level.to_text().unwrap_or_default();
        debug!(dataset = %dataset, level = %level, accepted = ?accepted, "checking content level");

        if !accepted.contains(&level)
            && ctx.add(Diagnostic::new(DiagnosticCode::LevelNotAccepted, line).with("dataset", dataset))
        {
            success = false;
        }
        Ok(success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationSettings;
    use crate::parser::parse_extcsv;
    use crate::validation::fixtures;

    #[tokio::test]
    async fn test_project_and_dataset() {
        let extcsv = fixtures::valid_extcsv();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();

        let mut record = fixtures::valid_record();
        record.project = "NDACC".into();
        record.dataset = LEGACY_UMKEHR.into();
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(!ProjectCheck.run(&mut ctx).await.unwrap());
        assert!(DatasetCheck.run(&mut ctx).await.unwrap());
        let diag = ctx.report.find(DiagnosticCode::ProjectNotFound).unwrap();
        assert_eq!(diag.line, 4);
        assert_eq!(diag.params["value"], "NDACC");
        assert_eq!(ctx.report.codes(), vec![51]);
    }

    #[tokio::test]
    async fn test_unknown_dataset() {
        let extcsv = fixtures::valid_extcsv();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();
        let mut record = fixtures::valid_record();
        record.dataset = "Spectral".into();
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(!DatasetCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.report.codes(), vec![52]);
    }

    #[tokio::test]
    async fn test_form_and_level_coercion() {
        let extcsv = fixtures::valid_extcsv();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();
        let mut record = fixtures::valid_record();
        record.form = CellValue::Text("1".into());
        record.level = CellValue::Text("2".into());
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(ContentCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.record.form, CellValue::Integer(1));
        assert_eq!(ctx.record.level, CellValue::Float(2.0));
        assert_eq!(ctx.report.codes(), vec![57, 54]);
        assert!(ctx.report.passed());
        let coerced = ctx.report.find(DiagnosticCode::LevelCoerced).unwrap();
        assert_eq!(coerced.params["newvalue"], "2.0");
    }

    #[tokio::test]
    async fn test_uncoercible_values_stop_before_lookup() {
        let extcsv = fixtures::valid_extcsv();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();
        let mut record = fixtures::valid_record();
        record.form = CellValue::Text("one".into());
        record.level = CellValue::Missing;
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(!ContentCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.report.codes(), vec![58, 55]);
    }

    #[tokio::test]
    async fn test_level_not_accepted() {
        let extcsv = fixtures::valid_extcsv();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();
        let mut record = fixtures::valid_record();
        record.level = CellValue::Float(3.0);
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(!ContentCheck.run(&mut ctx).await.unwrap());
        let diag = ctx.report.find(DiagnosticCode::LevelNotAccepted).unwrap();
        assert_eq!(diag.params["dataset"], "TotalOzone");
    }

    #[tokio::test]
    async fn test_dataset_without_discovery_metadata() {
        let extcsv = fixtures::valid_extcsv();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();
        let mut record = fixtures::valid_record();
        record.dataset = "OzoneSonde".into();
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(!ContentCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.report.codes(), vec![56]);
    }

    #[tokio::test]
    async fn test_umkehr_level_one_without_profile() {
        let extcsv = fixtures::valid_extcsv();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();
        let mut record = fixtures::valid_record();
        record.dataset = LEGACY_UMKEHR.into();
        record.level = CellValue::Text("1".into());
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(ContentCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.record.level, CellValue::Float(1.0));
        assert_eq!(ctx.record.dataset, "UmkehrN14_1.0");
        assert_eq!(ctx.report.error_count(), 0);
        assert!(ctx.report.warnings().count() >= 1);
    }

    #[tokio::test]
    async fn test_umkehr_level_two_with_profile() {
        let text = format!("{}\n#C_PROFILE\nHeight,O3PartialPressure\n1,2\n", fixtures::VALID_FILE);
        let extcsv = parse_extcsv(&text).unwrap();
        let registry = fixtures::registry();
        let settings = LocationSettings::default();
        let mut record = fixtures::valid_record();
        record.dataset = LEGACY_UMKEHR.into();
        record.level = CellValue::Text("1".into());
        let mut ctx = CheckContext::new(record, &extcsv, &registry, &settings);

        assert!(ContentCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.record.level, CellValue::Float(2.0));
        assert_eq!(ctx.record.dataset, "UmkehrN14_2.0");
        assert_eq!(ctx.report.codes(), vec![54, 53]);
        assert!(ctx.report.passed());
        assert_eq!(ctx.report.find(DiagnosticCode::LevelCorrected).unwrap().params["value"], "2.0");
    }

    #[test]
    fn test_label_level() {
        assert_eq!(label_level("Level 1.0"), "1.0");
        assert_eq!(label_level("2.0"), "2.0");
        assert_eq!(label_level("1"), "1");
    }
}
