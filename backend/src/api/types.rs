//! REST API types.
//!
//! Process execution follows the OGC API - Processes shape: clients post
//! `{ "inputs": {...} }` to `/processes/{id}/execution`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::validation::{CheckStatuses, ValidationOutcome, ValidationSummary};

pub const VALIDATE_PROCESS: &str = "woudc-data-registry-validate";
pub const DISTINCT_PROCESS: &str = "woudc-data-registry-select-distinct";
pub const METRICS_PROCESS: &str = "woudc-data-registry-metrics";

/// Request body of a process execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessExecution {
    #[serde(default)]
    pub inputs: Value,
}

/// Inputs of the validate process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateInputs {
    /// Extended CSV text of the submission.
    pub extcsv: String,
    /// Absent means `true`.
    #[serde(default, alias = "check_metadata")]
    pub check_metadata: Option<bool>,
    #[serde(default, alias = "metadata_only")]
    pub metadata_only: Option<bool>,
}

/// Response of a validation, the report summary plus run details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub run_id: String,
    #[serde(flatten)]
    pub summary: ValidationSummary,
    pub checks: CheckStatuses,
}

impl From<ValidationOutcome> for ValidateResponse {
    fn from(outcome: ValidationOutcome) -> Self {
        ValidateResponse {
            run_id: outcome.run_id.to_string(),
            summary: outcome.summary(),
            checks: outcome.statuses,
        }
    }
}

/// One entry of the process list.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessDescription {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// The processes this service executes.
pub fn process_list() -> Vec<ProcessDescription> {
    vec![
        ProcessDescription {
            id: VALIDATE_PROCESS,
            title: "Validate Extended CSV",
            description: "Checks submission metadata against the data registry",
        },
        ProcessDescription {
            id: DISTINCT_PROCESS,
            title: "Select distinct",
            description: "Distinct value groups of registry fields",
        },
        ProcessDescription {
            id: METRICS_PROCESS,
            title: "Submission metrics",
            description: "File and observation counts per year or month",
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub index_prefix: String,
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "requestId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}
