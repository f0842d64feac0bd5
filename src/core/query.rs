//! Query-string → filter/sort compilation
//!
//! Only allow-listed fields may be filtered on. Supported forms:
//!
//! ```text
//! GET /food?name=Broccoli                 equality
//! GET /food?name=Broccoli&name=Kale       repeated key → $in
//! GET /food?calories[$gte]=10             bracket operator
//! GET /food?calories={"$gt":10,"$lt":50}  JSON operator object
//! GET /food?sort=-calories,name           sort (leading '-' = descending)
//! GET /food?sort={"calories":"descending"}
//! GET /food?limit=20&page=2               pagination
//! ```
//!
//! Operators are only valid on ordered fields (numbers and dates).

use crate::core::error::{ApiError, ApiResult};
use crate::core::model::{FieldType, ModelSchema, SOFT_DELETE_FIELD};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

/// Query keys that never count as filters
pub const RESERVED_PARAMS: [&str; 3] = ["limit", "page", "sort"];

/// Comparison operators accepted on ordered fields
pub const ORDERED_OPERATORS: [&str; 4] = ["$gt", "$gte", "$lt", "$lte"];

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 500;

static BRACKET_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<field>[A-Za-z0-9_.]+)\[(?P<op>\$[A-Za-z]+)\]$").expect("valid bracket regex")
});

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Ordered list of sort keys
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec(pub Vec<(String, SortDirection)>);

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        SortSpec(vec![(field.into(), SortDirection::Ascending)])
    }

    pub fn descending(field: impl Into<String>) -> Self {
        SortSpec(vec![(field.into(), SortDirection::Descending)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `-a,b` or a JSON object like `{"a": "descending", "b": 1}`
    pub fn parse(raw: &str) -> ApiResult<Self> {
        let raw = raw.trim();
        if raw.starts_with('{') {
            let parsed: IndexMap<String, Value> = serde_json::from_str(raw)
                .map_err(|e| ApiError::invalid_request("Invalid sort").with_detail(e.to_string()))?;
            let keys = parsed
                .into_iter()
                .map(|(field, dir)| {
                    let direction = match &dir {
                        Value::String(s) if matches!(s.as_str(), "descending" | "desc") => {
                            SortDirection::Descending
                        }
                        Value::String(s) if matches!(s.as_str(), "ascending" | "asc") => {
                            SortDirection::Ascending
                        }
                        Value::Number(n) if n.as_i64() == Some(-1) => SortDirection::Descending,
                        Value::Number(n) if n.as_i64() == Some(1) => SortDirection::Ascending,
                        other => {
                            return Err(ApiError::invalid_request(format!(
                                "Invalid sort direction {other} for {field}"
                            )));
                        }
                    };
                    Ok((field, direction))
                })
                .collect::<ApiResult<Vec<_>>>()?;
            return Ok(SortSpec(keys));
        }

        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| match key.strip_prefix('-') {
                Some(field) => (field.to_string(), SortDirection::Descending),
                None => (
                    key.trim_start_matches('+').to_string(),
                    SortDirection::Ascending,
                ),
            })
            .collect();
        Ok(SortSpec(keys))
    }
}

/// Output of [`compile`]
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Store filter (Mongo-style operator object)
    pub filter: Value,
    pub sort: SortSpec,
    pub limit: usize,
    /// Set only when the caller asked for a page, which also requests `total`
    pub page: Option<usize>,
}

impl CompiledQuery {
    pub fn skip(&self) -> usize {
        self.page
            .map_or(0, |page| (page - 1).saturating_mul(self.limit))
    }

    /// AND an additional filter into this query
    pub fn and(mut self, extra: Value) -> Self {
        let is_empty = |v: &Value| v.as_object().is_some_and(Map::is_empty);
        self.filter = match (is_empty(&self.filter), is_empty(&extra)) {
            (_, true) => self.filter,
            (true, false) => extra,
            (false, false) => json!({"$and": [self.filter, extra]}),
        };
        self
    }
}

#[derive(Default)]
struct FieldFilter {
    equals: Vec<Value>,
    operators: Map<String, Value>,
}

impl FieldFilter {
    fn into_value(self) -> Value {
        let mut equals = self.equals;
        if self.operators.is_empty() {
            return match equals.len() {
                1 => equals.remove(0),
                _ => json!({"$in": equals}),
            };
        }
        let mut ops = self.operators;
        match equals.len() {
            0 => {}
            1 => {
                ops.insert("$eq".to_string(), equals.remove(0));
            }
            _ => {
                ops.insert("$in".to_string(), Value::Array(equals));
            }
        }
        Value::Object(ops)
    }
}

/// Compile query parameters against a model and allow-list
pub fn compile(
    params: &[(String, String)],
    model: &ModelSchema,
    allowed_fields: &[String],
    sort_default: Option<&SortSpec>,
) -> ApiResult<CompiledQuery> {
    let mut filters: IndexMap<String, FieldFilter> = IndexMap::new();
    let mut sort = None;
    let mut limit = DEFAULT_LIMIT;
    let mut page = None;

    for (key, raw) in params {
        match key.as_str() {
            "limit" => {
                limit = parse_positive(key, raw)?.min(MAX_LIMIT);
                continue;
            }
            "page" => {
                page = Some(parse_positive(key, raw)?);
                continue;
            }
            "sort" => {
                sort = Some(SortSpec::parse(raw)?);
                continue;
            }
            _ => {}
        }

        let (field, operator) = match BRACKET_KEY.captures(key) {
            Some(caps) => (caps["field"].to_string(), Some(caps["op"].to_string())),
            None => (key.clone(), None),
        };

        if !allowed_fields.iter().any(|f| *f == field) {
            return Err(ApiError::invalid_request(format!(
                "{field} is not allowed as a query param"
            )));
        }

        let field_type = model.field_at_path(&field).cloned().unwrap_or(FieldType::Mixed);
        let entry = filters.entry(field.clone()).or_default();

        match operator {
            Some(op) => {
                let value = field_type.coerce(raw).map_err(|e| bad_value(&field, e))?;
                insert_operator(entry, &field, &field_type, &op, value)?;
            }
            None => match operator_object(raw) {
                Some(ops) => {
                    for (op, value) in ops {
                        let value = field_type
                            .coerce_value(&value)
                            .map_err(|e| bad_value(&field, e))?;
                        insert_operator(entry, &field, &field_type, &op, value)?;
                    }
                }
                None => {
                    let value = field_type.coerce(raw).map_err(|e| bad_value(&field, e))?;
                    entry.equals.push(value);
                }
            },
        }
    }

    let mut filter: Map<String, Value> = filters
        .into_iter()
        .map(|(field, f)| (field, f.into_value()))
        .collect();

    if model.has_soft_delete() && !filter.contains_key(SOFT_DELETE_FIELD) {
        filter.insert(SOFT_DELETE_FIELD.to_string(), json!({"$ne": true}));
    }

    let sort = sort
        .or_else(|| sort_default.cloned())
        .unwrap_or_default();
    for (field, _) in &sort.0 {
        let known = model.field_at_path(field).is_some()
            || matches!(field.as_str(), "_id" | "created" | "updated");
        if !known {
            return Err(ApiError::invalid_request(format!("{field} is not a sortable field")));
        }
    }

    if page.is_some_and(|page| (page - 1).checked_mul(limit).is_none()) {
        return Err(ApiError::invalid_request("page is out of range"));
    }

    Ok(CompiledQuery {
        filter: Value::Object(filter),
        sort,
        limit,
        page,
    })
}

fn parse_positive(key: &str, raw: &str) -> ApiResult<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::invalid_request(format!("{key} must be a positive integer")))
}

fn bad_value(field: &str, reason: String) -> ApiError {
    ApiError::invalid_request(format!("Invalid value for {field}")).with_detail(reason)
}

/// Parse `{"$gt": 1}` style values; plain JSON objects are not operators
fn operator_object(raw: &str) -> Option<Map<String, Value>> {
    if !raw.trim_start().starts_with('{') {
        return None;
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return None;
    };
    (!map.is_empty() && map.keys().all(|k| k.starts_with('$'))).then_some(map)
}

fn insert_operator(
    entry: &mut FieldFilter,
    field: &str,
    field_type: &FieldType,
    op: &str,
    value: Value,
) -> ApiResult<()> {
    if !ORDERED_OPERATORS.contains(&op) {
        return Err(ApiError::invalid_request(format!(
            "{op} is not a supported query operator"
        )));
    }
    if !field_type.element().is_ordered() {
        return Err(ApiError::invalid_request(format!(
            "{op} is not supported for {field}"
        )));
    }
    entry.operators.insert(op.to_string(), value);
    Ok(())
}
