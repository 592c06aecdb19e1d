//! In-memory search backend.
//!
//! Executes the subset of the search DSL this crate emits against JSON
//! documents held in memory. Used by tests and for local development
//! without a cluster.
//!
//! Supported queries: `term`, `match`, `bool.must`, `match_all`.
//! Supported aggregations: `terms`, `top_hits`, `min`, `max`, `sum`,
//! `global`, `filter`, `date_histogram`. Field paths ending in `.raw`
//! resolve to the untokenized property itself.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::SearchBackend;
use crate::error::{RegistryError, RegistryResult};

/// Default `size` of a search without one.
const DEFAULT_SIZE: usize = 10;

/// In-memory registry holding documents per full index name.
#[derive(Debug, Clone)]
pub struct InMemoryRegistry {
    indices: HashMap<String, Vec<Value>>,
    version: String,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            indices: HashMap::new(),
            version: "8.11.0".to_string(),
        }
    }

    /// Add documents to an index (full name, prefix included).
    pub fn with_documents(mut self, index: &str, documents: Vec<Value>) -> Self {
        self.insert(index, documents);
        self
    }

    /// Reported cluster version.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn insert(&mut self, index: &str, documents: Vec<Value>) {
        self.indices
            .entry(index.to_string())
            .or_default()
            .extend(documents);
    }

    /// Number of documents in an index.
    pub fn count(&self, index: &str) -> usize {
        self.indices.get(index).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl SearchBackend for InMemoryRegistry {
    async fn search(&self, index: &str, body: &Value) -> RegistryResult<Value> {
        let all = self.indices.get(index).ok_or_else(|| RegistryError::Http {
            status: 404,
            body: format!("no such index [{}]", index),
        })?;
        let all: Vec<&Value> = all.iter().collect();

        let matched = match body.get("query") {
            Some(query) => filter_docs(&all, query)?,
            None => all.clone(),
        };

        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);

        let hits: Vec<Value> = matched
            .iter()
            .take(size)
            .map(|doc| hit(doc, None))
            .collect();

        let mut response = json!({
            "hits": { "total": { "value": matched.len() }, "hits": hits }
        });

        if let Some(aggs) = aggregations_of(body) {
            response["aggregations"] = run_aggregations(aggs, &matched, &all)?;
        }

        Ok(response)
    }

    async fn info(&self) -> RegistryResult<Value> {
        Ok(json!({ "version": { "number": self.version } }))
    }
}

// =============================================================================
// Queries
// =============================================================================

fn filter_docs<'a>(docs: &[&'a Value], query: &Value) -> RegistryResult<Vec<&'a Value>> {
    let mut out = Vec::new();
    for doc in docs {
        if matches_query(doc, query)? {
            out.push(*doc);
        }
    }
    Ok(out)
}

fn matches_query(doc: &Value, query: &Value) -> RegistryResult<bool> {
    let obj = query
        .as_object()
        .ok_or_else(|| RegistryError::UnsupportedQuery(query.to_string()))?;

    for (kind, clause) in obj {
        let ok = match kind.as_str() {
            "match_all" => true,
            "term" | "match" => {
                let conditions = clause
                    .as_object()
                    .ok_or_else(|| RegistryError::UnsupportedQuery(clause.to_string()))?;
                conditions.iter().all(|(path, expected)| {
                    let expected = expected.get("query").unwrap_or(expected);
                    lookup(doc, path).is_some_and(|actual| same_value(actual, expected))
                })
            }
            "bool" => {
                let must = clause.get("must").cloned().unwrap_or_else(|| json!([]));
                let clauses = match must {
                    Value::Array(list) => list,
                    single => vec![single],
                };
                let mut all = true;
                for c in &clauses {
                    if !matches_query(doc, c)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            other => return Err(RegistryError::UnsupportedQuery(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolve a dotted path; a trailing `.raw` names the property itself.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_suffix(".raw").unwrap_or(path);
    let mut node = doc;
    for part in path.split('.') {
        node = node.get(part)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn same_value(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => text_of(actual) == text_of(expected),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => text_of(a).cmp(&text_of(b)),
    }
}

// =============================================================================
// Aggregations
// =============================================================================

fn aggregations_of(node: &Value) -> Option<&Map<String, Value>> {
    node.get("aggregations")
        .or_else(|| node.get("aggs"))
        .and_then(Value::as_object)
}

/// Run a map of named aggregations over `docs`.
///
/// `all` is the unfiltered index, seen by `global` aggregations.
fn run_aggregations(
    aggs: &Map<String, Value>,
    docs: &[&Value],
    all: &[&Value],
) -> RegistryResult<Value> {
    let mut out = Map::new();
    for (name, spec) in aggs {
        out.insert(name.clone(), run_aggregation(spec, docs, all)?);
    }
    Ok(Value::Object(out))
}

fn run_aggregation(spec: &Value, docs: &[&Value], all: &[&Value]) -> RegistryResult<Value> {
    let sub = aggregations_of(spec);

    if let Some(terms) = spec.get("terms") {
        let field = field_of(terms)?;
        let size = terms
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);

        let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
        for doc in docs {
            let Some(key) = lookup(doc, field) else {
                continue;
            };
            match groups.iter_mut().find(|(k, _)| k == key) {
                Some((_, members)) => members.push(*doc),
                None => groups.push((key.clone(), vec![*doc])),
            }
        }
        groups.sort_by(|a, b| compare_values(&a.0, &b.0));

        let mut buckets = Vec::new();
        for (key, members) in groups.into_iter().take(size) {
            let bucket = json!({ "key": key, "doc_count": members.len() });
            buckets.push(with_sub(bucket, sub, &members, all)?);
        }
        return Ok(json!({ "buckets": buckets }));
    }

    if let Some(top) = spec.get("top_hits") {
        let size = top.get("size").and_then(Value::as_u64).unwrap_or(3) as usize;
        let includes: Option<Vec<&str>> = top
            .pointer("/_source/includes")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect());
        let hits: Vec<Value> = docs
            .iter()
            .take(size)
            .map(|doc| hit(doc, includes.as_deref()))
            .collect();
        return Ok(json!({ "hits": { "total": { "value": docs.len() }, "hits": hits } }));
    }

    if let Some(min) = spec.get("min") {
        return Ok(extreme(docs, field_of(min)?, Ordering::Less));
    }

    if let Some(max) = spec.get("max") {
        return Ok(extreme(docs, field_of(max)?, Ordering::Greater));
    }

    if let Some(sum) = spec.get("sum") {
        let field = field_of(sum)?;
        let total: f64 = docs
            .iter()
            .filter_map(|doc| lookup(doc, field))
            .filter_map(|v| v.as_f64().or_else(|| text_of(v).parse().ok()))
            .sum();
        return Ok(json!({ "value": total }));
    }

    if spec.get("global").is_some() {
        return with_sub(json!({ "doc_count": all.len() }), sub, all, all);
    }

    if let Some(query) = spec.get("filter") {
        let matched = filter_docs(docs, query)?;
        return with_sub(json!({ "doc_count": matched.len() }), sub, &matched, all);
    }

    if let Some(histogram) = spec.get("date_histogram") {
        let field = field_of(histogram)?;
        let interval = histogram
            .get("calendar_interval")
            .and_then(Value::as_str)
            .unwrap_or("1y");
        let monthly = match interval {
            "1y" | "year" => false,
            "1M" | "month" => true,
            other => return Err(RegistryError::UnsupportedQuery(format!("calendar_interval {}", other))),
        };

        let mut groups: Vec<(NaiveDate, Vec<&Value>)> = Vec::new();
        for doc in docs {
            let Some(date) = lookup(doc, field).and_then(parse_date) else {
                continue;
            };
            let start = if monthly {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
            } else {
                NaiveDate::from_ymd_opt(date.year(), 1, 1)
            };
            let Some(start) = start else { continue };
            match groups.iter_mut().find(|(k, _)| *k == start) {
                Some((_, members)) => members.push(*doc),
                None => groups.push((start, vec![*doc])),
            }
        }
        groups.sort_by_key(|(start, _)| *start);

        let mut buckets = Vec::new();
        for (start, members) in groups {
            let label = if monthly {
                start.format("%Y-%m").to_string()
            } else {
                start.format("%Y").to_string()
            };
            let bucket = json!({
                "key_as_string": label,
                "key": epoch_millis(start),
                "doc_count": members.len()
            });
            buckets.push(with_sub(bucket, sub, &members, all)?);
        }
        return Ok(json!({ "buckets": buckets }));
    }

    Err(RegistryError::UnsupportedQuery(spec.to_string()))
}

/// Attach sub-aggregations computed over `scope` to a bucket node.
fn with_sub(
    mut node: Value,
    sub: Option<&Map<String, Value>>,
    scope: &[&Value],
    all: &[&Value],
) -> RegistryResult<Value> {
    if let Some(sub) = sub {
        if let (Some(obj), Value::Object(inner)) = (node.as_object_mut(), run_aggregations(sub, scope, all)?) {
            obj.extend(inner);
        }
    }
    Ok(node)
}

fn field_of(spec: &Value) -> RegistryResult<&str> {
    spec.get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| RegistryError::UnsupportedQuery(format!("aggregation without field: {}", spec)))
}

/// Min (`Less`) or max (`Greater`) of a field, dates rendered as text.
fn extreme(docs: &[&Value], field: &str, want: Ordering) -> Value {
    let best = docs
        .iter()
        .filter_map(|doc| lookup(doc, field))
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if compare_values(v, b) != want => Some(b),
            _ => Some(v),
        });

    match best {
        None => json!({ "value": null }),
        Some(v) => match parse_date(v) {
            Some(date) => json!({ "value": epoch_millis(date), "value_as_string": text_of(v) }),
            None => json!({ "value": v, "value_as_string": text_of(v) }),
        },
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?;
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn epoch_millis(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0)
}

/// A search hit, optionally restricted to `_source` includes.
fn hit(doc: &Value, includes: Option<&[&str]>) -> Value {
    let source = match includes {
        None => doc.clone(),
        Some(paths) => {
            let mut filtered = json!({});
            for path in paths {
                if let Some(value) = doc.pointer(&format!("/{}", path.replace('.', "/"))) {
                    set_path(&mut filtered, path, value.clone());
                }
            }
            filtered
        }
    };
    json!({ "_id": doc.get("id").cloned().unwrap_or(Value::Null), "_source": source })
}

fn set_path(target: &mut Value, path: &str, value: Value) {
    let mut node = target;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let Some(obj) = node.as_object_mut() else {
            return;
        };
        if parts.peek().is_none() {
            obj.insert(part.to_string(), value);
            return;
        }
        node = obj.entry(part.to_string()).or_insert_with(|| json!({}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::aggregation::{build_group_query, unwrap};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn instruments() -> InMemoryRegistry {
        let docs = vec![
            json!({ "id": "a", "properties": { "name": "Brewer", "model": "MKII", "station_id": "077", "start_date": "1990-01-01", "end_date": "2000-12-31" } }),
            json!({ "id": "b", "properties": { "name": "Brewer", "model": "MKII", "station_id": "077", "start_date": "1985-06-01", "end_date": null } }),
            json!({ "id": "c", "properties": { "name": "Brewer", "model": "MKIII", "station_id": "065", "start_date": "2001-01-01", "end_date": "2010-01-01" } }),
            json!({ "id": "d", "properties": { "name": "Dobson", "model": "Beck", "station_id": "077", "start_date": "1970-01-01", "end_date": "1980-01-01" } }),
        ];
        InMemoryRegistry::new().with_documents("instrument", docs)
    }

    async fn group(registry: &InMemoryRegistry, fields: &[&str], source: Option<&[String]>) -> Vec<Value> {
        let fields: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
        let tree = build_group_query(&fields, source);
        let body = json!({ "size": 0, "aggregations": tree.to_json() });
        let response = registry.search("instrument", &body).await.unwrap();
        unwrap(&response["aggregations"], &fields).unwrap()
    }

    #[tokio::test]
    async fn test_group_rows_are_exhaustive_and_unique() {
        let registry = instruments();
        let rows = group(&registry, &["name", "model"], None).await;
        let pairs: Vec<(String, String)> = rows
            .iter()
            .map(|r| {
                (
                    r["properties"]["name"].as_str().unwrap().to_string(),
                    r["properties"]["model"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Brewer".into(), "MKII".into()),
                ("Brewer".into(), "MKIII".into()),
                ("Dobson".into(), "Beck".into()),
            ]
        );
    }

    const GROUP_FIELDS: [&str; 4] = ["name", "model", "station_id", "dataset"];

    proptest! {
        #[test]
        fn prop_group_rows_are_the_distinct_tuples(
            docs in prop::collection::vec(prop::collection::vec("[a-c]", GROUP_FIELDS.len()), 0..12),
            picks in prop::collection::vec(0..GROUP_FIELDS.len(), 0..=4),
        ) {
            let documents: Vec<Value> = docs
                .iter()
                .enumerate()
                .map(|(i, values)| {
                    let properties: Map<String, Value> = GROUP_FIELDS
                        .iter()
                        .zip(values)
                        .map(|(field, value)| (field.to_string(), json!(value)))
                        .collect();
                    json!({ "id": i.to_string(), "properties": properties })
                })
                .collect();
            let registry = InMemoryRegistry::new().with_documents("instrument", documents.clone());
            let fields: Vec<&str> = picks.iter().map(|&i| GROUP_FIELDS[i]).collect();
            let rows = futures::executor::block_on(group(&registry, &fields, None));

            let tuple = |properties: &Value| -> Vec<String> {
                fields
                    .iter()
                    .map(|field| properties[*field].as_str().unwrap_or_default().to_string())
                    .collect()
            };
            let row_tuples: Vec<Vec<String>> = rows.iter().map(|row| tuple(&row["properties"])).collect();
            let unique: BTreeSet<Vec<String>> = row_tuples.iter().cloned().collect();
            let expected: BTreeSet<Vec<String>> = documents.iter().map(|doc| tuple(&doc["properties"])).collect();

            prop_assert_eq!(unique.len(), row_tuples.len());
            prop_assert_eq!(unique, expected);
        }
    }

    #[tokio::test]
    async fn test_field_order_drives_key_assignment() {
        let registry = instruments();
        let rows = group(&registry, &["station_id", "name"], None).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["properties"]["station_id"], "065");
        assert_eq!(rows[0]["properties"]["name"], "Brewer");
        assert_eq!(rows[2]["properties"]["station_id"], "077");
        assert_eq!(rows[2]["properties"]["name"], "Dobson");
    }

    #[tokio::test]
    async fn test_empty_fields_single_row() {
        let registry = instruments();
        let rows = group(&registry, &[], None).await;
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_date_aggregates() {
        let registry = instruments();
        let source = vec!["station_id".to_string(), "start_date".to_string(), "end_date".to_string()];
        let rows = group(&registry, &["model"], Some(&source)).await;

        let mkii = rows.iter().find(|r| r["properties"]["model"] == "MKII").unwrap();
        assert_eq!(mkii["properties"]["start_date"], "1985-06-01");
        assert_eq!(mkii["properties"]["end_date"], "2000-12-31");
        assert_eq!(mkii["properties"]["station_id"], "077");
        assert!(mkii["properties"].get("name").is_none());
    }

    #[tokio::test]
    async fn test_term_query_and_size() {
        let registry = instruments();
        let body = json!({ "query": { "term": { "properties.name.raw": "Brewer" } }, "size": 2 });
        let response = registry.search("instrument", &body).await.unwrap();
        assert_eq!(response["hits"]["total"]["value"], 3);
        assert_eq!(response["hits"]["hits"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_index_is_error() {
        let registry = instruments();
        let result = registry.search("missing", &json!({})).await;
        assert!(matches!(result, Err(RegistryError::Http { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_unsupported_query_is_error() {
        let registry = instruments();
        let body = json!({ "query": { "wildcard": { "properties.name": "B*" } } });
        assert!(matches!(
            registry.search("instrument", &body).await,
            Err(RegistryError::UnsupportedQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_date_histogram_with_sum() {
        let registry = InMemoryRegistry::new().with_documents(
            "data_record",
            vec![
                json!({ "properties": { "timestamp_date": "2020-01-05", "number_of_observations": 10 } }),
                json!({ "properties": { "timestamp_date": "2020-03-01", "number_of_observations": 5 } }),
                json!({ "properties": { "timestamp_date": "2021-07-01", "number_of_observations": 1 } }),
            ],
        );
        let body = json!({
            "size": 0,
            "aggregations": { "yearly": {
                "date_histogram": { "field": "properties.timestamp_date", "calendar_interval": "1y", "format": "yyyy" },
                "aggregations": { "total_obs": { "sum": { "field": "properties.number_of_observations" } } }
            } }
        });
        let response = registry.search("data_record", &body).await.unwrap();
        let buckets = response["aggregations"]["yearly"]["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0]["key_as_string"], "2020");
        assert_eq!(buckets[0]["doc_count"], 2);
        assert_eq!(buckets[0]["total_obs"]["value"], 15.0);
    }
}
