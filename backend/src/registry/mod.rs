//! Reference registry access.
//!
//! The registry is a read-only search index holding the authoritative
//! metadata documents (stations, instruments, countries, contributors,
//! deployments, datasets, projects, discovery metadata).
//!
//! - [`SearchBackend`] - the one primitive a backend must provide
//! - [`RegistryClient`] - prefixing, typed lookups and aggregation helpers
//! - [`ElasticsearchBackend`] - HTTP backend
//! - [`InMemoryRegistry`] - local backend for tests and development
//!
//! ## Usage
//!
//! ```rust,ignore
//! use woudc_api::registry::{RegistryClient, ReferenceQuery};
//!
//! let client = RegistryClient::connect(&settings).await?;
//! let projects = client.distinct_values("project", "identifier").await?;
//! ```

pub mod elasticsearch;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::config::Settings;
use crate::error::{QueryError, RegistryError, RegistryResult};
use crate::models::Document;
use crate::query::aggregation::{raw_field, unwrap, AggregationTree, MAX_BUCKETS};

pub use elasticsearch::ElasticsearchBackend;
pub use memory::InMemoryRegistry;

/// Name of the single aggregation used by distinct-value lookups.
const DISTINCT_AGGREGATION: &str = "aggregation";

/// A search index the registry client can query.
///
/// Implementations must tolerate concurrent callers.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a search-DSL body against one index and return the raw response.
    async fn search(&self, index: &str, body: &Value) -> RegistryResult<Value>;

    /// Cluster information, including `version.number`.
    async fn info(&self) -> RegistryResult<Value>;
}

/// One distinct value and how many documents carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: Value,
    pub doc_count: u64,
}

impl Bucket {
    /// Key as text (numbers rendered as written).
    pub fn key_text(&self) -> String {
        match &self.key {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// An immutable reference lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceQuery {
    /// Documents whose fields all equal the given values.
    FieldMatch {
        collection: String,
        conditions: Vec<(String, String)>,
    },
    /// Distinct values of one field, ascending, optionally filtered.
    DistinctValues {
        collection: String,
        field: String,
        filters: Vec<(String, String)>,
    },
}

impl ReferenceQuery {
    pub fn field_match(collection: &str, field: &str, value: &str) -> Self {
        ReferenceQuery::FieldMatch {
            collection: collection.to_string(),
            conditions: vec![(field.to_string(), value.to_string())],
        }
    }

    pub fn distinct(collection: &str, field: &str) -> Self {
        ReferenceQuery::DistinctValues {
            collection: collection.to_string(),
            field: field.to_string(),
            filters: Vec::new(),
        }
    }

    /// Add a condition (field match) or filter (distinct values).
    pub fn and(mut self, field: &str, value: &str) -> Self {
        match &mut self {
            ReferenceQuery::FieldMatch { conditions, .. } => {
                conditions.push((field.to_string(), value.to_string()))
            }
            ReferenceQuery::DistinctValues { filters, .. } => {
                filters.push((field.to_string(), value.to_string()))
            }
        }
        self
    }

    pub fn collection(&self) -> &str {
        match self {
            ReferenceQuery::FieldMatch { collection, .. } => collection,
            ReferenceQuery::DistinctValues { collection, .. } => collection,
        }
    }

    /// Render the search body.
    pub fn to_body(&self) -> Value {
        match self {
            ReferenceQuery::FieldMatch { conditions, .. } => {
                json!({ "query": match_conditions(conditions) })
            }
            ReferenceQuery::DistinctValues { field, filters, .. } => {
                let mut body = json!({
                    "size": 0,
                    "aggregations": {
                        DISTINCT_AGGREGATION: {
                            "terms": {
                                "field": raw_field(field),
                                "order": { "_key": "asc" },
                                "size": MAX_BUCKETS
                            }
                        }
                    }
                });
                if !filters.is_empty() {
                    body["query"] = match_conditions(filters);
                }
                body
            }
        }
    }
}

fn match_conditions(conditions: &[(String, String)]) -> Value {
    match conditions {
        [(field, value)] => json!({ "term": { raw_field(field): value } }),
        _ => {
            let must: Vec<Value> = conditions
                .iter()
                .map(|(field, value)| json!({ "match": { raw_field(field): value } }))
                .collect();
            json!({ "bool": { "must": must } })
        }
    }
}

/// Lowest supported backend major version.
pub const MIN_BACKEND_VERSION: u32 = 8;

/// Shared, read-only registry client.
///
/// Cheap to clone; every validation run borrows the same client.
#[derive(Clone)]
pub struct RegistryClient {
    backend: Arc<dyn SearchBackend>,
    index_prefix: String,
}

impl RegistryClient {
    /// Wrap a backend; `index_prefix` is joined to collection names with a dot.
    pub fn new(backend: Arc<dyn SearchBackend>, index_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            index_prefix: index_prefix.into(),
        }
    }

    /// Connect to the configured search backend and check its version.
    pub async fn connect(settings: &Settings) -> RegistryResult<Self> {
        let backend = ElasticsearchBackend::new(settings)?;
        let client = Self::new(Arc::new(backend), settings.index_prefix.clone());
        client.check_version().await?;
        Ok(client)
    }

    /// Fail unless the backend reports a supported major version.
    pub async fn check_version(&self) -> RegistryResult<()> {
        let info = self.backend.info().await?;
        let number = info
            .pointer("/version/number")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistryError::MalformedResponse("info without version.number".into()))?;

        let major: u32 = number
            .split('.')
            .next()
            .and_then(|m| m.parse().ok())
            .ok_or_else(|| RegistryError::MalformedResponse(format!("bad version '{}'", number)))?;

        if major < MIN_BACKEND_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                minimum: MIN_BACKEND_VERSION,
                found: number.to_string(),
            });
        }
        debug!("Registry version {}", number);
        Ok(())
    }

    pub fn index_prefix(&self) -> &str {
        &self.index_prefix
    }

    /// Full index name of a collection.
    pub fn index(&self, collection: &str) -> String {
        if self.index_prefix.is_empty() {
            collection.to_string()
        } else {
            format!("{}.{}", self.index_prefix, collection)
        }
    }

    /// Raw search against a collection.
    pub async fn search(&self, collection: &str, body: &Value) -> RegistryResult<Value> {
        let index = self.index(collection);
        debug!(index = %index, body = %body, "registry search");
        self.backend.search(&index, body).await
    }

    /// Documents matching a field-match query.
    pub async fn find(&self, query: &ReferenceQuery) -> RegistryResult<Vec<Document>> {
        let response = self.search(query.collection(), &query.to_body()).await?;
        let hits = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| RegistryError::MalformedResponse("response without hits.hits".into()))?;

        hits.iter()
            .map(|hit| {
                let source = hit
                    .get("_source")
                    .cloned()
                    .ok_or_else(|| RegistryError::MalformedResponse("hit without _source".into()))?;
                Ok(serde_json::from_value(source)?)
            })
            .collect()
    }

    /// Buckets of a distinct-values query.
    pub async fn buckets(&self, query: &ReferenceQuery) -> RegistryResult<Vec<Bucket>> {
        let response = self.search(query.collection(), &query.to_body()).await?;
        let buckets = response
            .pointer(&format!("/aggregations/{}/buckets", DISTINCT_AGGREGATION))
            .cloned()
            .ok_or_else(|| RegistryError::MalformedResponse("response without buckets".into()))?;
        Ok(serde_json::from_value(buckets)?)
    }

    /// Documents of `collection` whose `field` equals `value`.
    pub async fn match_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> RegistryResult<Vec<Document>> {
        self.find(&ReferenceQuery::field_match(collection, field, value))
            .await
    }

    /// Every distinct value of `field` in `collection`, ascending.
    pub async fn distinct_values(&self, collection: &str, field: &str) -> RegistryResult<Vec<String>> {
        let buckets = self.buckets(&ReferenceQuery::distinct(collection, field)).await?;
        Ok(buckets.iter().map(Bucket::key_text).collect())
    }

    /// Run a grouping aggregation and flatten the response into rows.
    pub async fn group_rows(
        &self,
        collection: &str,
        tree: &AggregationTree,
    ) -> Result<Vec<Value>, QueryError> {
        let body = json!({ "size": 0, "aggregations": tree.to_json() });
        let response = self.search(collection, &body).await?;
        let aggregations = response
            .get("aggregations")
            .ok_or_else(|| QueryError::UnexpectedShape("response without aggregations".into()))?;
        let fields: Vec<String> = tree.fields().into_iter().map(String::from).collect();
        unwrap(aggregations, &fields)
    }
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("index_prefix", &self.index_prefix)
            .finish()
    }
}
