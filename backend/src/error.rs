//! Error types for the registry validation service.
//!
//! One error enum per layer:
//!
//! - [`ExtCsvError`] - Extended CSV reading errors
//! - [`RegistryError`] - Reference registry (search backend) errors
//! - [`QueryError`] - Aggregation flattening and process input errors
//! - [`RunError`] - Fatal conditions for a single validation run
//! - [`ConfigError`] - Environment configuration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Conversions are provided via `From` so `?` works across layers.
//! Field-level problems in a submission are never errors of this kind:
//! they become diagnostics in the validation report.

use thiserror::Error;

// =============================================================================
// Extended CSV Errors
// =============================================================================

/// Errors while reading Extended CSV text into tables.
#[derive(Debug, Error)]
pub enum ExtCsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Input contains no `#TABLE` sections.
    #[error("No tables found")]
    NoTables,

    /// A table header is not followed by a field line.
    #[error("Line {line}: table {table} has no field definitions")]
    MissingFields { table: String, line: usize },

    /// A value line has more values than the table has fields.
    #[error("Line {line}: table {table} has {found} values for {expected} fields")]
    TooManyValues {
        table: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A value line appears outside any table.
    #[error("Line {0}: data outside of a table")]
    DataOutsideTable(usize),

    /// Low-level CSV tokenisation failed.
    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },
}

impl ExtCsvError {
    /// Source line the error points at, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ExtCsvError::MissingFields { line, .. }
            | ExtCsvError::TooManyValues { line, .. }
            | ExtCsvError::Malformed { line, .. } => Some(*line),
            ExtCsvError::DataOutsideTable(line) => Some(*line),
            ExtCsvError::Io(_) | ExtCsvError::NoTables => None,
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the reference registry.
///
/// Any of these aborts the validation run: a lookup that cannot be
/// completed is never interpreted as "no matches".
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backend could not be reached.
    #[error("Cannot connect to registry at {host}: {message}")]
    Connection { host: String, message: String },

    /// The backend answered with a non-success HTTP status.
    #[error("Registry returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The backend version is not supported.
    #[error("Registry version below {minimum} not supported ({found})")]
    UnsupportedVersion { minimum: u32, found: String },

    /// The response did not have the expected shape.
    #[error("Malformed registry response: {0}")]
    MalformedResponse(String),

    /// The in-memory backend does not implement part of a query.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Transport-level failure (timeout, TLS, ...).
    #[error("Registry request failed: {0}")]
    Request(String),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Request(err.to_string())
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors while building, flattening or parameterising registry queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A response lacks an aggregation the query asked for.
    #[error("Response is missing aggregation '{0}'")]
    MissingAggregation(String),

    /// A response node has an unexpected shape.
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// A process input is missing or invalid.
    #[error("Invalid input '{field}': {message}")]
    InvalidInput { field: String, message: String },

    /// Registry error while executing the query.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

// =============================================================================
// Run Errors
// =============================================================================

/// Fatal conditions for one validation run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A reference lookup failed.
    #[error("Reference lookup failed: {0}")]
    Registry(#[from] RegistryError),

    /// A reference response could not be interpreted.
    #[error("Reference query failed: {0}")]
    Query(#[from] QueryError),

    /// The check plan is not in dependency order.
    #[error("Check '{check}' runs before its dependency '{dependency}'")]
    PlanOrder { check: String, dependency: String },
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable has a value that cannot be used.
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Validation run failed.
    #[error("Validation failed: {0}")]
    Run(#[from] RunError),

    /// Query process failed.
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown process identifier.
    #[error("Process not found: {0}")]
    UnknownProcess(String),

    /// IO error (bind, accept).
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for Extended CSV operations.
pub type ExtCsvResult<T> = Result<T, ExtCsvError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for validation runs.
pub type RunResult<T> = Result<T, RunError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // RegistryError -> RunError
        let registry_err = RegistryError::MalformedResponse("no hits".into());
        let run_err: RunError = registry_err.into();
        assert!(run_err.to_string().contains("no hits"));

        // QueryError -> ServerError
        let query_err = QueryError::MissingAggregation("distinct_name".into());
        let server_err: ServerError = query_err.into();
        assert!(server_err.to_string().contains("distinct_name"));
    }

    #[test]
    fn test_extcsv_error_format() {
        let err = ExtCsvError::TooManyValues {
            table: "DAILY".into(),
            line: 42,
            expected: 3,
            found: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("Line 42"));
        assert!(msg.contains("DAILY"));
    }
}
