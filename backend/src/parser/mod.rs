//! Extended CSV reader with encoding auto-detection.
//!
//! Splits a WOUDC Extended CSV document into named tables, keeping the line
//! number of every table header and every value line. Only a handful of
//! columns are typed (`Date`, `Time`, `CONTENT.Level`, `CONTENT.Form`);
//! everything else stays text. No WOUDC table-definition checks happen here.
//!
//! ```text
//! #CONTENT                     <- table header (line_num)
//! Class,Category,Level,Form    <- field line
//! WOUDC,TotalOzone,1.0,1       <- first value line (line_num + 2)
//! ```

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::{ExtCsvError, ExtCsvResult};
use crate::models::CellValue;

/// Offset from a table header line to its first value line.
pub const VALUE_LINE_OFFSET: usize = 2;

static TABLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([A-Za-z][A-Za-z0-9_]*)\s*$").expect("static regex"));

/// One value line of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based source line.
    pub line: usize,
    pub values: Vec<CellValue>,
}

/// A named table of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Unique name (`NAME`, `NAME_2`, ... for repeats).
    pub name: String,
    /// 1-based line of the `#NAME` header.
    pub line: usize,
    pub fields: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Index of a field, if the table defines it.
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// Whether the table defines a field.
    pub fn has_field(&self, field: &str) -> bool {
        self.field_index(field).is_some()
    }

    /// All values of a column with their source lines, in row order.
    ///
    /// Empty when the field is not defined.
    pub fn column(&self, field: &str) -> Vec<(usize, &CellValue)> {
        match self.field_index(field) {
            Some(idx) => self
                .rows
                .iter()
                .map(|row| (row.line, row.values.get(idx).unwrap_or(&CellValue::Missing)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// First value of a column (the value of single-row tables).
    pub fn first(&self, field: &str) -> Option<&CellValue> {
        let idx = self.field_index(field)?;
        Some(
            self.rows
                .first()
                .and_then(|row| row.values.get(idx))
                .unwrap_or(&CellValue::Missing),
        )
    }
}

/// A parsed Extended CSV document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtCsv {
    /// Tables in document order.
    pub tables: Vec<Table>,
    /// Detected or used encoding.
    pub encoding: String,
}

impl ExtCsv {
    /// Look up a table by its unique name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Whether a table exists.
    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Header line of a table.
    pub fn line_num(&self, name: &str) -> Option<usize> {
        self.table(name).map(|t| t.line)
    }

    /// First value line of a table, or 0 when the table is unknown.
    pub fn value_line(&self, name: &str) -> usize {
        self.line_num(name).map(|l| l + VALUE_LINE_OFFSET).unwrap_or(0)
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Parse Extended CSV bytes with encoding auto-detection.
pub fn parse_bytes_auto(bytes: &[u8]) -> ExtCsvResult<ExtCsv> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let mut doc = parse_extcsv(&content)?;
    doc.encoding = encoding;
    Ok(doc)
}

/// Parse an Extended CSV file with encoding auto-detection.
pub fn parse_extcsv_file<P: AsRef<Path>>(path: P) -> ExtCsvResult<ExtCsv> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Parse Extended CSV text.
///
/// Lines starting with `*` are comments. A blank line ends the current
/// table. A repeated table name gets a `_N` suffix.
pub fn parse_extcsv(content: &str) -> ExtCsvResult<ExtCsv> {
    let mut tables: Vec<Table> = Vec::new();
    let mut current: Option<Table> = None;
    let mut awaiting_fields = false;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_num = idx + 1;
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.starts_with('*') {
            continue;
        }

        if let Some(caps) = TABLE_HEADER.captures(trimmed) {
            if let Some(table) = current.take() {
                finish_table(table, awaiting_fields, &mut tables)?;
            }
            let base = caps[1].to_uppercase();
            current = Some(Table {
                name: unique_name(&tables, &base),
                line: line_num,
                fields: Vec::new(),
                rows: Vec::new(),
            });
            awaiting_fields = true;
            continue;
        }

        if trimmed.is_empty() || is_blank_record(trimmed) {
            if let Some(table) = current.take() {
                finish_table(table, awaiting_fields, &mut tables)?;
            }
            awaiting_fields = false;
            continue;
        }

        let table = current
            .as_mut()
            .ok_or(ExtCsvError::DataOutsideTable(line_num))?;
        let tokens = split_line(trimmed, line_num)?;

        if awaiting_fields {
            table.fields = tokens;
            awaiting_fields = false;
            continue;
        }

        let expected = table.fields.len();
        let mut tokens = tokens;
        // Trailing empty values beyond the field list are tolerated.
        while tokens.len() > expected && tokens.last().is_some_and(|t| t.is_empty()) {
            tokens.pop();
        }
        if tokens.len() > expected {
            return Err(ExtCsvError::TooManyValues {
                table: table.name.clone(),
                line: line_num,
                expected,
                found: tokens.len(),
            });
        }

        let values = table
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let raw = tokens.get(i).map(String::as_str).unwrap_or("");
                type_value(&table.name, field, raw)
            })
            .collect();
        table.rows.push(Row { line: line_num, values });
    }

    if let Some(table) = current.take() {
        finish_table(table, awaiting_fields, &mut tables)?;
    }

    if tables.is_empty() {
        return Err(ExtCsvError::NoTables);
    }

    Ok(ExtCsv {
        tables,
        encoding: "utf-8".to_string(),
    })
}

fn finish_table(table: Table, awaiting_fields: bool, tables: &mut Vec<Table>) -> ExtCsvResult<()> {
    if awaiting_fields || table.fields.is_empty() {
        return Err(ExtCsvError::MissingFields {
            table: table.name,
            line: table.line,
        });
    }
    tables.push(table);
    Ok(())
}

fn unique_name(tables: &[Table], base: &str) -> String {
    let count = tables
        .iter()
        .filter(|t| t.name == base || t.name.strip_prefix(base).is_some_and(is_repeat_suffix))
        .count();
    if count == 0 {
        base.to_string()
    } else {
        format!("{}_{}", base, count + 1)
    }
}

fn is_repeat_suffix(rest: &str) -> bool {
    rest.strip_prefix('_')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Lines made only of separators count as blank.
fn is_blank_record(line: &str) -> bool {
    line.chars().all(|c| c == ',' || c.is_whitespace())
}

fn split_line(line: &str, line_num: usize) -> ExtCsvResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => Ok(record.iter().map(str::to_string).collect()),
        Some(Err(e)) => Err(ExtCsvError::Malformed {
            line: line_num,
            message: e.to_string(),
        }),
        None => Ok(Vec::new()),
    }
}

/// Type a raw cell according to its table and column.
fn type_value(table: &str, field: &str, raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Missing;
    }

    let base_table = table.split('_').next().unwrap_or(table);
    match (base_table, field) {
        (_, "Date") => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
        (_, "Time") => NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .map(CellValue::Time)
            .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
        ("CONTENT", "Level") | ("CONTENT", "Form") => type_number(raw),
        _ => CellValue::Text(raw.to_string()),
    }
}

/// A number with a decimal point is a float, otherwise an integer.
fn type_number(raw: &str) -> CellValue {
    let typed = if raw.contains('.') {
        raw.parse::<f64>().ok().map(CellValue::Float)
    } else {
        raw.parse::<i64>().ok().map(CellValue::Integer)
    };
    typed.unwrap_or_else(|| CellValue::Text(raw.to_string()))
}
