//! Query parsing, matching and record shaping.
//!
//! A query is an open map. Keys starting with `$` are control keys:
//!
//! | key       | meaning                                                  |
//! |-----------|----------------------------------------------------------|
//! | `$limit`  | page size (bounded by the pagination `max`)              |
//! | `$skip`   | offset                                                   |
//! | `$sort`   | `{ field: 1 \| -1 }`, applied in key order               |
//! | `$select` | list of fields to keep (the id field is always kept)     |
//! | `$or`     | list of sub-queries, at least one of which must match    |
//!
//! Every other key is a field criterion. A criterion is either a plain value
//! (equality) or an object of operators: `$in`, `$nin`, `$lt`, `$lte`, `$gt`,
//! `$gte`, `$ne`. Field names may be dotted paths into nested objects.
//! Unknown operators are rejected with `BadRequest`.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::{ServiceError, ServiceResult};
use crate::pagination::{FindResult, Page};
use crate::params::{PaginateConfig, Query};

// ---------------------------------------------------------------------------
// Filters (control keys)
// ---------------------------------------------------------------------------

/// Sort direction for a `$sort` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Control keys extracted from a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Effective page size after applying the pagination policy.
    pub limit: Option<usize>,
    pub skip: usize,
    pub sort: Vec<(String, SortDirection)>,
    pub select: Option<Vec<String>>,
}

fn parse_usize(key: &str, value: &Value) -> ServiceResult<usize> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ServiceError::BadRequest(format!("`{key}` must be a non-negative integer, got {value}"))
    })
}

fn parse_sort(value: &Value) -> ServiceResult<Vec<(String, SortDirection)>> {
    let Value::Object(map) = value else {
        return Err(ServiceError::BadRequest(format!(
            "`$sort` must be an object, got {value}"
        )));
    };
    map.iter()
        .map(|(field, dir)| {
            let direction = match dir {
                Value::Number(n) if n.as_i64() == Some(1) => SortDirection::Asc,
                Value::Number(n) if n.as_i64() == Some(-1) => SortDirection::Desc,
                Value::String(s) if s == "1" || s.eq_ignore_ascii_case("asc") => SortDirection::Asc,
                Value::String(s) if s == "-1" || s.eq_ignore_ascii_case("desc") => {
                    SortDirection::Desc
                }
                other => {
                    return Err(ServiceError::BadRequest(format!(
                        "invalid sort direction {other} for `{field}`"
                    )))
                }
            };
            Ok((field.clone(), direction))
        })
        .collect()
}

fn parse_select(value: &Value) -> ServiceResult<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ServiceError::BadRequest(format!("`$select` entries must be strings, got {item}"))
                })
            })
            .collect(),
        other => Err(ServiceError::BadRequest(format!(
            "`$select` must be a list of field names, got {other}"
        ))),
    }
}

/// Effective page size for a call.
///
/// With pagination active, the requested `$limit` (or the configured default)
/// is capped at the configured `max`. Without pagination the request is used
/// as-is.
#[must_use]
pub fn resolve_limit(requested: Option<usize>, paginate: Option<PaginateConfig>) -> Option<usize> {
    match paginate.and_then(|p| p.default.map(|default| (default, p.max))) {
        Some((default, max)) => {
            let lower = requested.unwrap_or(default);
            let limit = max.map_or(lower, |max| lower.min(max));
            if limit < lower {
                tracing::debug!(requested = lower, max = limit, "clamped $limit to pagination max");
            }
            Some(limit)
        }
        None => requested,
    }
}

// ---------------------------------------------------------------------------
// Criteria (field conditions)
// ---------------------------------------------------------------------------

/// A single condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
}

impl Condition {
    fn parse(field: &str, op: &str, operand: &Value) -> ServiceResult<Self> {
        let list = || match operand {
            Value::Array(items) => Ok(items.clone()),
            other => Err(ServiceError::BadRequest(format!(
                "`{op}` on `{field}` expects a list, got {other}"
            ))),
        };
        Ok(match op {
            "$ne" => Self::Ne(operand.clone()),
            "$in" => Self::In(list()?),
            "$nin" => Self::Nin(list()?),
            "$lt" => Self::Lt(operand.clone()),
            "$lte" => Self::Lte(operand.clone()),
            "$gt" => Self::Gt(operand.clone()),
            "$gte" => Self::Gte(operand.clone()),
            other => {
                return Err(ServiceError::BadRequest(format!(
                    "unknown query operator `{other}` on `{field}`"
                )))
            }
        })
    }

    fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::Eq(expected) => loose_eq(actual, expected),
            Self::Ne(expected) => !loose_eq(actual, expected),
            Self::In(options) => options.iter().any(|o| loose_eq(actual, o)),
            Self::Nin(options) => !options.iter().any(|o| loose_eq(actual, o)),
            Self::Lt(bound) => compare(actual, bound) == Some(Ordering::Less),
            Self::Lte(bound) => matches!(
                compare(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(bound) => compare(actual, bound) == Some(Ordering::Greater),
            Self::Gte(bound) => matches!(
                compare(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Compiled field criteria of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    fields: Vec<(String, Vec<Condition>)>,
    any_of: Vec<Criteria>,
}

impl Criteria {
    /// Compiles the field criteria of `query`, ignoring control keys.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::BadRequest` for unknown operators, unknown
    /// top-level `$` keys, or malformed operands.
    pub fn parse(query: &Query) -> ServiceResult<Self> {
        let mut criteria = Self::default();
        for (key, value) in query {
            match key.as_str() {
                "$limit" | "$skip" | "$sort" | "$select" => {}
                "$or" => {
                    let Value::Array(branches) = value else {
                        return Err(ServiceError::BadRequest(format!(
                            "`$or` expects a list of queries, got {value}"
                        )));
                    };
                    for branch in branches {
                        let Value::Object(sub) = branch else {
                            return Err(ServiceError::BadRequest(format!(
                                "`$or` entries must be objects, got {branch}"
                            )));
                        };
                        criteria.any_of.push(Self::parse(sub)?);
                    }
                }
                other if other.starts_with('$') => {
                    return Err(ServiceError::BadRequest(format!(
                        "unknown query key `{other}`"
                    )))
                }
                field => criteria.fields.push((field.to_string(), Self::conditions(field, value)?)),
            }
        }
        Ok(criteria)
    }

    fn conditions(field: &str, value: &Value) -> ServiceResult<Vec<Condition>> {
        match value {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops
                .iter()
                .map(|(op, operand)| Condition::parse(field, op, operand))
                .collect(),
            other => Ok(vec![Condition::Eq(other.clone())]),
        }
    }

    /// Whether the criteria select nothing, i.e. match every record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.any_of.is_empty()
    }

    /// Whether `record` satisfies every field condition and at least one
    /// `$or` branch (when any are present).
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        let fields_ok = self.fields.iter().all(|(field, conditions)| {
            let actual = lookup(record, field);
            conditions.iter().all(|c| c.matches(actual))
        });
        fields_ok && (self.any_of.is_empty() || self.any_of.iter().any(|c| c.matches(record)))
    }
}

// ---------------------------------------------------------------------------
// ParsedQuery
// ---------------------------------------------------------------------------

/// A query split into control filters and compiled criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub filters: Filters,
    pub criteria: Criteria,
    /// Whether `execute` produces a [`Page`] envelope.
    pub paginated: bool,
}

impl ParsedQuery {
    /// Parses `query` under the effective pagination configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::BadRequest` for malformed control keys or criteria.
    pub fn parse(query: &Query, paginate: Option<PaginateConfig>) -> ServiceResult<Self> {
        let requested = query.get("$limit").map(|v| parse_usize("$limit", v)).transpose()?;
        let skip = query
            .get("$skip")
            .map(|v| parse_usize("$skip", v))
            .transpose()?
            .unwrap_or(0);
        let sort = query.get("$sort").map(parse_sort).transpose()?.unwrap_or_default();
        let select = query.get("$select").map(parse_select).transpose()?;

        let paginate = paginate.filter(PaginateConfig::is_enabled);
        Ok(Self {
            filters: Filters {
                limit: resolve_limit(requested, paginate),
                skip,
                sort,
                select,
            },
            criteria: Criteria::parse(query)?,
            paginated: paginate.is_some(),
        })
    }

    /// Records that match the criteria, sorted, without skip/limit applied.
    #[must_use]
    pub fn matching(&self, records: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut matched: Vec<Value> = records
            .into_iter()
            .filter(|r| self.criteria.matches(r))
            .collect();
        sort_records(&mut matched, &self.filters.sort);
        matched
    }

    /// Runs the query over `records`: match, sort, skip/limit, select.
    #[must_use]
    pub fn execute(&self, records: impl IntoIterator<Item = Value>, id_field: &str) -> FindResult {
        let matched = self.matching(records);
        let select = |record: Value| match &self.filters.select {
            Some(fields) => select_fields(record, fields, id_field),
            None => record,
        };

        if self.paginated {
            let total = matched.len();
            let limit = self.filters.limit.unwrap_or(total);
            Page::from_items(matched, self.filters.skip, limit)
                .map(select)
                .into()
        } else {
            let limit = self.filters.limit.unwrap_or(usize::MAX);
            matched
                .into_iter()
                .skip(self.filters.skip)
                .take(limit)
                .map(select)
                .collect::<Vec<_>>()
                .into()
        }
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

static NULL: Value = Value::Null;

/// Resolves a dotted `path` inside `record`; missing segments yield `null`.
#[must_use]
pub fn lookup<'a>(record: &'a Value, path: &str) -> &'a Value {
    path.split('.')
        .try_fold(record, |current, segment| current.get(segment))
        .unwrap_or(&NULL)
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Integers compare exactly; `f64` is only used when either side is a float.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (integer(x), integer(y)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting: null < bool < number < string < other.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }
    rank(a)
        .cmp(&rank(b))
        .then_with(|| compare(a, b).unwrap_or(Ordering::Equal))
}

/// Stable multi-key sort.
pub fn sort_records(records: &mut [Value], sort: &[(String, SortDirection)]) {
    if sort.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        sort.iter().fold(Ordering::Equal, |acc, (field, direction)| {
            acc.then_with(|| {
                let ord = sort_order(lookup(a, field), lookup(b, field));
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            })
        })
    });
}

/// Keeps only `fields` (and `id_field`) of an object record.
#[must_use]
pub fn select_fields(record: Value, fields: &[String], id_field: &str) -> Value {
    match record {
        Value::Object(mut map) => {
            map.retain(|key, _| key == id_field || fields.iter().any(|f| f == key));
            Value::Object(map)
        }
        other => other,
    }
}
