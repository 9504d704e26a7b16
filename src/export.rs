//! JSON, CSV and text-table rendering for API records.
//!
//! Every record returned by the resource modules serializes to plain JSON
//! (objects, arrays, scalars), so exporters work on `serde_json::Value`:
//!
//! - [`flatten`] turns one record into `dotted.key -> text` cells.
//! - [`to_json`] pretty-prints a record list.
//! - [`to_csv`] writes one flattened row per record under the sorted union
//!   of all keys, quoting per RFC 4180.
//! - [`to_table`] renders a fixed-width table for terminals.
//!
//! JSON and CSV output can be narrowed with a [`FieldFilter`] that keeps or
//! drops top-level record fields before anything is rendered.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use crate::config::{ExportConfig, OutputFormat};
use crate::error::Result;

/// Widest a table cell may get before it is truncated.
const MAX_CELL_WIDTH: usize = 48;

// ── Field selection ──

/// Top-level field selection. An empty `include` keeps every field;
/// `exclude` is applied after `include`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldFilter<'a> {
    /// Only these fields are kept, when non-empty.
    pub include: &'a [String],
    /// These fields are always dropped.
    pub exclude: &'a [String],
}

impl<'a> FieldFilter<'a> {
    /// A filter that keeps everything.
    pub fn all() -> Self {
        FieldFilter::default()
    }

    /// True when the filter keeps every field.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    fn keeps(&self, key: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|f| f == key))
            && !self.exclude.iter().any(|f| f == key)
    }

    /// Applies the filter to one record. Non-object records pass through.
    pub fn apply(&self, record: Value) -> Value {
        match record {
            Value::Object(map) if !self.is_empty() => {
                Value::Object(map.into_iter().filter(|(k, _)| self.keeps(k)).collect())
            }
            other => other,
        }
    }
}

// ── Flattening ──

/// Flattens one record.
///
/// Nested object keys are dot-joined while the nesting depth is at most
/// `max_depth`; deeper objects are kept as compact JSON. Arrays of scalars
/// become `", "`-joined text, other arrays compact JSON. `null` becomes an
/// empty cell, and so does an empty object. A non-object record flattens to
/// a single `value` cell.
pub fn flatten(record: &Value, max_depth: usize) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    match record {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&mut out, key.clone(), value, 1, max_depth);
            }
        }
        other => {
            out.insert("value".to_string(), cell(other));
        }
    }
    out
}

fn flatten_into(out: &mut BTreeMap<String, String>, key: String, value: &Value, depth: usize, max_depth: usize) {
    match value {
        Value::Object(map) if map.is_empty() => {
            out.insert(key, String::new());
        }
        Value::Object(map) if depth <= max_depth => {
            for (child, v) in map {
                flatten_into(out, format!("{key}.{child}"), v, depth + 1, max_depth);
            }
        }
        other => {
            out.insert(key, cell(other));
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(cell)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn to_values<T: Serialize>(records: &[T]) -> Result<Vec<Value>> {
    records
        .iter()
        .map(|r| serde_json::to_value(r).map_err(Into::into))
        .collect()
}

/// Serializes records as a JSON array. `indent` 0 means compact.
pub fn to_json<T: Serialize>(records: &[T], indent: usize, fields: FieldFilter<'_>) -> Result<String> {
    if fields.is_empty() {
        return write_json(records, indent);
    }
    let filtered: Vec<Value> = to_values(records)?.into_iter().map(|v| fields.apply(v)).collect();
    write_json(&filtered, indent)
}

fn write_json<T: Serialize + ?Sized>(value: &T, indent: usize) -> Result<String> {
    if indent == 0 {
        return Ok(serde_json::to_string(value)?);
    }
    let spaces = " ".repeat(indent);
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(spaces.as_bytes()));
    value.serialize(&mut ser)?;
    // serde_json only writes valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Serializes records as CSV with a header row. Field selection happens on
/// top-level fields, before flattening.
pub fn to_csv<T: Serialize>(
    records: &[T],
    delimiter: char,
    max_depth: usize,
    fields: FieldFilter<'_>,
) -> Result<String> {
    let rows: Vec<BTreeMap<String, String>> = to_values(records)?
        .into_iter()
        .map(|v| flatten(&fields.apply(v), max_depth))
        .collect();
    if rows.is_empty() {
        return Ok(String::new());
    }
    let header: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
    let sep = delimiter.to_string();

    let mut out = String::new();
    out.push_str(
        &header
            .iter()
            .map(|h| csv_field(h, delimiter))
            .collect::<Vec<_>>()
            .join(&sep),
    );
    out.push('\n');
    for row in &rows {
        let line = header
            .iter()
            .map(|h| csv_field(row.get(*h).map(String::as_str).unwrap_or(""), delimiter))
            .collect::<Vec<_>>()
            .join(&sep);
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

fn csv_field(value: &str, delimiter: char) -> String {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Renders records as a fixed-width text table.
///
/// `columns` selects and orders flattened keys; when empty, every key is
/// shown in sorted order.
pub fn to_table<T: Serialize>(records: &[T], columns: &[&str]) -> Result<String> {
    let rows: Vec<BTreeMap<String, String>> = to_values(records)?
        .iter()
        .map(|v| flatten(v, 3))
        .collect();
    let columns: Vec<String> = if columns.is_empty() {
        rows.iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        columns.iter().map(|c| c.to_string()).collect()
    };
    if columns.is_empty() {
        return Ok(String::new());
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| truncate(r.get(c).map(String::as_str).unwrap_or("")))
                .collect()
        })
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_row(&mut out, &columns, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &cells {
        push_row(&mut out, row, &widths);
    }
    Ok(out)
}

fn push_row(out: &mut String, row: &[String], widths: &[usize]) {
    let line = row
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell:<w$}", w = *w))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

fn truncate(text: &str) -> String {
    let single_line = text.replace(['\n', '\r'], " ");
    if single_line.chars().count() <= MAX_CELL_WIDTH {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(MAX_CELL_WIDTH - 3).collect();
    cut.push_str("...");
    cut
}

/// Renders records in `format` using the exporter settings.
pub fn render<T: Serialize>(
    records: &[T],
    format: OutputFormat,
    settings: &ExportConfig,
    columns: &[&str],
) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(records, settings.json_indent, settings.field_filter()),
        OutputFormat::Csv => to_csv(
            records,
            settings.csv_delimiter,
            settings.flatten_depth,
            settings.field_filter(),
        ),
        OutputFormat::Table => to_table(records, columns),
    }
}

/// Writes rendered output to `path`.
pub fn write_to(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint() -> Value {
        json!({
            "id": "ep-1",
            "hostname": "WS-001",
            "health": {"overall": "good", "threats": {"status": "good"}},
            "ipv4Addresses": ["10.0.0.1", "10.0.0.2"],
            "assignedProducts": [{"code": "interceptX"}],
            "associatedPerson": null
        })
    }

    #[test]
    fn flatten_dot_joins_nested_keys() {
        let flat = flatten(&endpoint(), 3);
        assert_eq!(flat["health.overall"], "good");
        assert_eq!(flat["health.threats.status"], "good");
        assert_eq!(flat["ipv4Addresses"], "10.0.0.1, 10.0.0.2");
        assert_eq!(flat["assignedProducts"], r#"[{"code":"interceptX"}]"#);
        assert_eq!(flat["associatedPerson"], "");
    }

    #[test]
    fn flatten_stops_at_max_depth() {
        let flat = flatten(&endpoint(), 1);
        assert_eq!(flat["health.overall"], "good");
        assert_eq!(flat["health.threats"], r#"{"status":"good"}"#);

        let top_only = flatten(&endpoint(), 0);
        assert!(top_only["health"].starts_with('{'));
    }

    #[test]
    fn csv_has_sorted_union_header_and_quotes() {
        let records = vec![
            json!({"id": "1", "name": "plain"}),
            json!({"id": "2", "note": "has, comma and \"quote\""}),
        ];
        let csv = to_csv(&records, ',', 3, FieldFilter::all()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("id,name,note"));
        assert_eq!(lines.next(), Some("1,plain,"));
        assert_eq!(lines.next(), Some(r#"2,,"has, comma and ""quote""""#));
    }

    #[test]
    fn csv_of_nothing_is_empty() {
        let empty: Vec<Value> = Vec::new();
        assert_eq!(to_csv(&empty, ',', 3, FieldFilter::all()).unwrap(), "");
    }

    #[test]
    fn json_respects_indent() {
        let records = vec![json!({"a": 1})];
        assert_eq!(to_json(&records, 0, FieldFilter::all()).unwrap(), r#"[{"a":1}]"#);
        assert_eq!(
            to_json(&records, 4, FieldFilter::all()).unwrap(),
            "[\n    {\n        \"a\": 1\n    }\n]"
        );
    }

    #[test]
    fn json_keeps_only_included_fields() {
        let include = vec!["id".to_string(), "hostname".to_string()];
        let fields = FieldFilter {
            include: &include,
            exclude: &[],
        };
        let json = to_json(&[endpoint()], 0, fields).unwrap();
        assert_eq!(json, r#"[{"hostname":"WS-001","id":"ep-1"}]"#);
    }

    #[test]
    fn exclude_wins_over_include() {
        let include = vec!["id".to_string(), "hostname".to_string()];
        let exclude = vec!["hostname".to_string()];
        let fields = FieldFilter {
            include: &include,
            exclude: &exclude,
        };
        assert_eq!(to_json(&[endpoint()], 0, fields).unwrap(), r#"[{"id":"ep-1"}]"#);
    }

    #[test]
    fn csv_drops_excluded_fields_before_flattening() {
        let exclude = vec!["health".to_string(), "assignedProducts".to_string()];
        let fields = FieldFilter {
            include: &[],
            exclude: &exclude,
        };
        let csv = to_csv(&[endpoint()], ',', 3, fields).unwrap();
        assert_eq!(csv.lines().next(), Some("associatedPerson,hostname,id,ipv4Addresses"));
    }

    #[test]
    fn empty_nested_object_keeps_its_column() {
        let records = vec![json!({"id": "1", "x": {}}), json!({"id": "2", "x": {"y": 1}})];
        assert_eq!(flatten(&records[0], 3)["x"], "");

        let csv = to_csv(&records, ',', 3, FieldFilter::all()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["id,x,x.y", "1,,", "2,,1"]);
    }

    #[test]
    fn table_aligns_selected_columns() {
        let records = vec![
            json!({"id": "a", "hostname": "short"}),
            json!({"id": "bbbb", "hostname": "much-longer-name"}),
        ];
        let table = to_table(&records, &["id", "hostname"]).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "id    hostname");
        assert_eq!(lines[1], "----  ----------------");
        assert_eq!(lines[2], "a     short");
        assert_eq!(lines[3], "bbbb  much-longer-name");
    }

    #[test]
    fn write_to_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_to(&path, "id\n1\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id\n1\n");
    }
}
