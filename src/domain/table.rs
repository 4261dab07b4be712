//! A data domain backed by a JSON dataset file.
//!
//! ```json
//! {
//!   "id": "homicides",
//!   "description": "Homicide victims, 2001 to present",
//!   "year_field": "year",
//!   "records": [{"year": 2023, "district": "11", "arrest": true}]
//! }
//! ```
//!
//! The domain exposes one tool, `query_<id>`, that counts matching records
//! and optionally ranks them by a field.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{DataDomain, DomainError, DynDomain};
use crate::tool::{ToolArgs, ToolDefinition};

const DEFAULT_TOP_N: u64 = 10;
const MISSING_KEY: &str = "(missing)";

/// Errors loading a dataset file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("dataset {0} has no id")]
    MissingId(PathBuf),
}

/// Contents of a dataset file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableDataset {
    /// Domain identifier; defaults to the file stem
    #[serde(default)]
    pub id: String,
    /// What the records describe
    #[serde(default)]
    pub description: String,
    /// Field holding the record's year, enabling year-range filters
    #[serde(default)]
    pub year_field: Option<String>,
    /// The rows
    #[serde(default)]
    pub records: Vec<Map<String, Value>>,
}

/// A domain answering count and ranking questions over one dataset.
#[derive(Debug, Clone)]
pub struct TableDomain {
    dataset: TableDataset,
    tool_name: String,
}

impl TableDomain {
    /// Creates a domain over an in-memory dataset.
    pub fn new(dataset: TableDataset) -> Self {
        let tool_name = format!("query_{}", dataset.id);
        Self { dataset, tool_name }
    }

    /// Loads a dataset file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut dataset: TableDataset =
            serde_json::from_str(&text).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        if dataset.id.trim().is_empty() {
            dataset.id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
                .ok_or_else(|| LoadError::MissingId(path.to_path_buf()))?;
        }

        debug!(domain = %dataset.id, records = dataset.records.len(), "loaded dataset");
        Ok(Self::new(dataset))
    }

    /// The name of this domain's query tool.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn query(&self, arguments: &ToolArgs) -> Result<Value, DomainError> {
        let mut filters = Map::new();
        let mut years: (Option<i64>, Option<i64>) = (None, None);
        let mut group_by = None;
        let mut top_n = DEFAULT_TOP_N;

        for (name, value) in arguments {
            match name.as_str() {
                "filters" => {
                    filters = value
                        .as_object()
                        .cloned()
                        .ok_or_else(|| invalid("filters must be an object"))?;
                }
                "start_year" | "end_year" => {
                    if self.dataset.year_field.is_none() {
                        return Err(invalid(format!("{name} is not supported: dataset has no year field")));
                    }
                    let year = value
                        .as_i64()
                        .ok_or_else(|| invalid(format!("{name} must be an integer")))?;
                    if name == "start_year" {
                        years.0 = Some(year);
                    } else {
                        years.1 = Some(year);
                    }
                }
                "group_by" => {
                    let field = value
                        .as_str()
                        .ok_or_else(|| invalid("group_by must be a field name"))?;
                    if !self.dataset.records.iter().any(|r| r.contains_key(field)) {
                        return Err(invalid(format!("unknown field '{field}'")));
                    }
                    group_by = Some(field.to_string());
                }
                "top_n" => {
                    top_n = value
                        .as_u64()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| invalid("top_n must be a positive integer"))?;
                }
                other => return Err(invalid(format!("unknown parameter '{other}'"))),
            }
        }

        if let (Some(start), Some(end)) = years {
            if start > end {
                return Err(invalid(format!("start_year {start} is after end_year {end}")));
            }
        }

        let matching: Vec<&Map<String, Value>> = self
            .dataset
            .records
            .iter()
            .filter(|record| {
                filters
                    .iter()
                    .all(|(field, expected)| record.get(field).is_some_and(|v| same_value(v, expected)))
            })
            .filter(|record| self.in_year_range(record, years))
            .collect();

        let mut result = json!({
            "dataset": self.dataset.id,
            "description": self.dataset.description,
            "total": matching.len(),
            "filters": filters,
        });

        if years.0.is_some() || years.1.is_some() {
            result["year_range"] = json!([years.0, years.1]);
        }

        if let Some(field) = group_by {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for record in &matching {
                let key = record.get(&field).map_or_else(|| MISSING_KEY.to_string(), plain_text);
                *counts.entry(key).or_default() += 1;
            }
            let mut groups: Vec<(String, u64)> = counts.into_iter().collect();
            groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            groups.truncate(usize::try_from(top_n).unwrap_or(usize::MAX));

            result["group_by"] = json!(field);
            result["groups"] = groups
                .into_iter()
                .map(|(key, count)| json!({"key": key, "count": count}))
                .collect();
        }

        Ok(result)
    }

    fn in_year_range(&self, record: &Map<String, Value>, (start, end): (Option<i64>, Option<i64>)) -> bool {
        if start.is_none() && end.is_none() {
            return true;
        }
        let Some(year) = self
            .dataset
            .year_field
            .as_ref()
            .and_then(|field| record.get(field))
            .and_then(year_of)
        else {
            return false;
        };
        start.is_none_or(|s| year >= s) && end.is_none_or(|e| year <= e)
    }
}

fn invalid(message: impl Into<String>) -> DomainError {
    DomainError::InvalidArguments(message.into())
}

fn year_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings without quotes, everything else as JSON.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Filter equality: `"11"` matches `11`, strings compare case-insensitively.
fn same_value(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => plain_text(actual).trim().eq_ignore_ascii_case(plain_text(expected).trim()),
    }
}

#[async_trait]
impl DataDomain for TableDomain {
    fn id(&self) -> &str {
        &self.dataset.id
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let subject = if self.dataset.description.is_empty() {
            format!("the '{}' dataset", self.dataset.id)
        } else {
            self.dataset.description.clone()
        };
        let mut definition = ToolDefinition::new(
            self.tool_name.clone(),
            format!(
                "Count records in {subject}. Filter by field values and rank the matches by a field."
            ),
        )
        .param(
            "filters",
            "object",
            "Field name to required value, e.g. {\"district\": \"11\"}",
        )
        .param(
            "group_by",
            "string",
            "Field to rank by; use for 'which had the most' questions",
        )
        .param("top_n", "integer", "Number of ranked groups to return (default 10)");

        if let Some(field) = &self.dataset.year_field {
            definition = definition
                .param("start_year", "integer", format!("First {field} to include"))
                .param("end_year", "integer", format!("Last {field} to include"));
        }
        vec![definition]
    }

    async fn call_tool(&self, name: &str, arguments: &ToolArgs) -> Result<Value, DomainError> {
        if name != self.tool_name {
            return Err(DomainError::UnsupportedTool(name.to_string()));
        }
        if !self.is_loaded() {
            return Err(DomainError::NotLoaded(self.dataset.id.clone()));
        }
        self.query(arguments)
    }

    fn format_result(&self, result: &Value) -> Result<String, DomainError> {
        let total = result
            .get("total")
            .and_then(Value::as_u64)
            .ok_or_else(|| DomainError::Format("missing total".to_string()))?;
        if result.get("dataset").and_then(Value::as_str) != Some(self.dataset.id.as_str()) {
            return Err(DomainError::Format(format!(
                "result does not belong to dataset '{}'",
                self.dataset.id
            )));
        }

        let mut text = format!("{}: {total} matching record(s)", self.dataset.id);

        if let Some(filters) = result.get("filters").and_then(Value::as_object) {
            if !filters.is_empty() {
                let rendered: Vec<String> = filters
                    .iter()
                    .map(|(k, v)| format!("{k}={}", plain_text(v)))
                    .collect();
                let _ = write!(text, "\nFilters: {}", rendered.join(", "));
            }
        }

        if let Some(range) = result.get("year_range").and_then(Value::as_array) {
            let bound = |i: usize| range.get(i).and_then(Value::as_i64).map_or("*".to_string(), |y| y.to_string());
            let _ = write!(text, "\nYears: {}-{}", bound(0), bound(1));
        }

        if let Some(groups) = result.get("groups").and_then(Value::as_array) {
            let field = result.get("group_by").and_then(Value::as_str).unwrap_or("group");
            let _ = write!(text, "\nTop {} by {field}:", groups.len());
            for (rank, group) in groups.iter().enumerate() {
                let key = group.get("key").map(plain_text).unwrap_or_default();
                let count = group.get("count").and_then(Value::as_u64).unwrap_or(0);
                let _ = write!(text, "\n  {}. {key}: {count}", rank + 1);
            }
        }

        Ok(text)
    }

    fn is_loaded(&self) -> bool {
        !self.dataset.records.is_empty()
    }
}

/// Loads every `*.json` dataset in a directory, in file-name order.
///
/// Files that fail to load are logged and skipped.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<DynDomain>, LoadError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut domains = Vec::new();
    for path in paths {
        match TableDomain::from_json_file(&path) {
            Ok(domain) => domains.push(Arc::new(domain) as DynDomain),
            Err(e) => warn!(error = %e, "skipping dataset"),
        }
    }
    Ok(domains)
}
