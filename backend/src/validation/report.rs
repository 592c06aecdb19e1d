//! Diagnostic codes and the per-run report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Every diagnostic the validator can emit.
///
/// The numeric codes are stable: downstream consumers use them to localize
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticCode {
    ProjectNotFound,
    DatasetNotFound,
    LevelCorrected,
    LevelCoerced,
    LevelNotNumeric,
    LevelNotAccepted,
    FormCoerced,
    FormNotInteger,
    GenerationDateMissing,
    VersionNotNumeric,
    VersionOutOfRange,
    VersionWithoutFraction,
    ContributorNotFound,
    StationIdTooShort,
    StationNotFound,
    StationTypeMismatch,
    StationNameMismatch,
    StationCountryMismatch,
    ShipCountryCorrected,
    CoordinateNotNumeric,
    HeightNotNumeric,
    CoordinateOutOfRange,
    HeightOutOfRange,
    CoordinateTooFar,
    HeightTooFar,
    InstrumentNameMissing,
    InstrumentModelMissing,
    InstrumentNameUnknown,
    InstrumentModelUnknown,
    InstrumentNotFound,
    DeploymentNotFound,
    TimestampDateAfterGeneration,
    DateAfterGeneration,
    TimeBeforeTimestamp,
    MissingTable,
    MissingField,
    Unparseable,
}

impl DiagnosticCode {
    pub fn code(self) -> u16 {
        use DiagnosticCode::*;
        match self {
            ProjectNotFound => 51,
            DatasetNotFound => 52,
            LevelCorrected => 53,
            LevelCoerced => 54,
            LevelNotNumeric => 55,
            LevelNotAccepted => 56,
            FormCoerced => 57,
            FormNotInteger => 58,
            GenerationDateMissing => 62,
            VersionNotNumeric => 63,
            VersionOutOfRange => 64,
            VersionWithoutFraction => 65,
            ContributorNotFound => 67,
            StationIdTooShort => 70,
            StationNotFound => 71,
            StationTypeMismatch => 72,
            StationNameMismatch => 73,
            StationCountryMismatch => 74,
            ShipCountryCorrected => 75,
            CoordinateNotNumeric => 76,
            HeightNotNumeric => 77,
            CoordinateOutOfRange => 78,
            HeightOutOfRange => 79,
            CoordinateTooFar => 80,
            HeightTooFar => 81,
            InstrumentNameMissing => 82,
            InstrumentModelMissing => 83,
            InstrumentNameUnknown => 85,
            InstrumentModelUnknown => 86,
            InstrumentNotFound => 87,
            DeploymentNotFound => 88,
            TimestampDateAfterGeneration => 91,
            DateAfterGeneration => 92,
            TimeBeforeTimestamp => 93,
            MissingTable => 101,
            MissingField => 102,
            Unparseable => 209,
        }
    }

    pub fn severity(self) -> Severity {
        use DiagnosticCode::*;
        match self {
            LevelCorrected
            | LevelCoerced
            | FormCoerced
            | ShipCountryCorrected
            | InstrumentNameMissing
            | InstrumentModelMissing
            | InstrumentNameUnknown
            | InstrumentModelUnknown => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Message template; `{name}` placeholders are filled from params.
    pub fn template(self) -> &'static str {
        use DiagnosticCode::*;
        match self {
            ProjectNotFound => "Class {value} not found in registry projects",
            DatasetNotFound => "Category {value} not found in registry datasets",
            LevelCorrected => "Level corrected to {value} for dataset",
            LevelCoerced => "Level {oldvalue} coerced to {newvalue}",
            LevelNotNumeric => "Level is not numeric",
            LevelNotAccepted => "Level not valid for dataset {dataset}",
            FormCoerced => "Form {oldvalue} coerced to {newvalue}",
            FormNotInteger => "Form is not an integer",
            GenerationDateMissing => "Missing generation date",
            VersionNotNumeric => "Version missing or not numeric (default {default})",
            VersionOutOfRange => "Version outside {lower} to {upper}",
            VersionWithoutFraction => "Version must have a fractional part",
            ContributorNotFound => "Agency not registered for the project",
            StationIdTooShort => "Station id shorter than three characters",
            StationNotFound => "Station id not found",
            StationTypeMismatch => "Station type does not match registry",
            StationNameMismatch => "Station name does not match registry",
            StationCountryMismatch => "Station country does not match registry",
            ShipCountryCorrected => "Ship country set to XY",
            CoordinateNotNumeric => "{field} is not numeric",
            HeightNotNumeric => "Height is not numeric",
            CoordinateOutOfRange => "{field} outside {lower} to {upper}",
            HeightOutOfRange => "Height outside {lower} to {upper}",
            CoordinateTooFar => "{field} too far from registered instrument location",
            HeightTooFar => "Height too far from registered instrument height",
            InstrumentNameMissing => "Missing instrument name, set to UNKNOWN",
            InstrumentModelMissing => "Missing instrument model, set to UNKNOWN",
            InstrumentNameUnknown => "Instrument name {value} not found in registry",
            InstrumentModelUnknown => "Instrument model not found in registry",
            InstrumentNotFound => "Instrument not found in registry",
            DeploymentNotFound => "Deployment {ident} not found",
            TimestampDateAfterGeneration | DateAfterGeneration => {
                "{table} date later than generation date or not a date"
            }
            TimeBeforeTimestamp => "Time earlier than the TIMESTAMP time",
            MissingTable => "Missing required table {table}",
            MissingField => "Missing required field {table}.{field}",
            Unparseable => "File could not be parsed as Extended CSV",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One coded error or warning tied to a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    /// 1-based source line, 0 when the problem has no line.
    pub line: usize,
    pub params: BTreeMap<String, String>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, line: usize) -> Self {
        Self {
            code,
            line,
            params: BTreeMap::new(),
        }
    }

    /// Attach a message parameter.
    pub fn with(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    /// Render the message template; unknown placeholders are left as is.
    pub fn message(&self) -> String {
        let mut message = self.code.template().to_string();
        for (name, value) in &self.params {
            message = message.replace(&format!("{{{}}}", name), value);
        }
        message
    }

    pub fn entry(&self) -> DiagnosticEntry {
        DiagnosticEntry {
            code: self.code.code(),
            line: self.line,
            message: self.message(),
            params: self.params.clone(),
        }
    }
}

/// Serialized form of a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub code: u16,
    pub line: usize,
    pub message: String,
    pub params: BTreeMap<String, String>,
}

/// Validation output: pass flag plus ordered errors and warnings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub response: bool,
    pub errors: Vec<DiagnosticEntry>,
    pub warnings: Vec<DiagnosticEntry>,
}

/// Append-only, ordered diagnostics of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticReport {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic; returns whether it is an error.
    pub fn add(&mut self, diagnostic: Diagnostic) -> bool {
        let is_error = diagnostic.is_error();
        self.diagnostics.push(diagnostic);
        is_error
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Pass iff no error was recorded.
    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }

    /// Codes in report order.
    pub fn codes(&self) -> Vec<u16> {
        self.diagnostics.iter().map(|d| d.code.code()).collect()
    }

    /// First diagnostic with a given code.
    pub fn find(&self, code: DiagnosticCode) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.code == code)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            response: self.passed(),
            errors: self.errors().map(Diagnostic::entry).collect(),
            warnings: self.warnings().map(Diagnostic::entry).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_reports_severity() {
        let mut report = DiagnosticReport::new();
        assert!(!report.add(Diagnostic::new(DiagnosticCode::ShipCountryCorrected, 10)));
        assert!(report.passed());
        assert!(report.add(Diagnostic::new(DiagnosticCode::StationNotFound, 10)));
        assert!(!report.passed());
        assert_eq!(report.codes(), vec![75, 71]);
    }

    #[test]
    fn test_warning_codes() {
        for code in [
            DiagnosticCode::LevelCorrected,
            DiagnosticCode::InstrumentNameUnknown,
            DiagnosticCode::InstrumentModelUnknown,
        ] {
            assert_eq!(code.severity(), Severity::Warning);
        }
        assert_eq!(DiagnosticCode::VersionWithoutFraction.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::Unparseable.code(), 209);
    }

    #[test]
    fn test_message_rendering() {
        let diag = Diagnostic::new(DiagnosticCode::CoordinateOutOfRange, 20)
            .with("field", "Latitude")
            .with("lower", -90)
            .with("upper", 90);
        assert_eq!(diag.message(), "Latitude outside -90 to 90");
    }

    #[test]
    fn test_summary_split() {
        let mut report = DiagnosticReport::new();
        report.add(Diagnostic::new(DiagnosticCode::InstrumentNameMissing, 15));
        report.add(Diagnostic::new(DiagnosticCode::DeploymentNotFound, 9).with("ident", "077:MSC:WOUDC"));

        let summary = report.summary();
        assert!(!summary.response);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].code, 88);
        assert_eq!(summary.errors[0].message, "Deployment 077:MSC:WOUDC not found");
        assert_eq!(summary.warnings[0].line, 15);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["errors"][0]["params"]["ident"], "077:MSC:WOUDC");
    }
}
