//! Post-search metadata filtering (spec §4.10).
//!
//! `search`'s optional `filter` is a MongoDB-like expression evaluated
//! against a hydrated noun's metadata object after HNSW candidates are
//! retrieved and before oversampled results are truncated to `k`. This is
//! deliberately richer than strict top-level equality: ranges, set
//! membership, array predicates, and boolean combinators are all allowed,
//! because rerank-time filtering is where those predicates actually get
//! used (the index itself stays equality/range agnostic).

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// A scalar filter operand.
///
/// Only scalars compare; arrays and objects are matched structurally by
/// the array-specific operators ([`FieldOp::Includes`], [`FieldOp::All`],
/// [`FieldOp::Size`]) instead.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonScalar {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value, compared as `f64`.
    Number(f64),
    /// String value.
    String(String),
}

impl JsonScalar {
    fn eq_json(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (JsonScalar::Null, JsonValue::Null) => true,
            (JsonScalar::Bool(a), JsonValue::Bool(b)) => a == b,
            (JsonScalar::Number(a), JsonValue::Number(b)) => b.as_f64().is_some_and(|n| (a - n).abs() < f64::EPSILON),
            (JsonScalar::String(a), JsonValue::String(b)) => a == b,
            _ => false,
        }
    }

    /// Ordering against a JSON value, `None` if the types are not
    /// comparable (e.g. a number against a string).
    fn partial_cmp_json(&self, value: &JsonValue) -> Option<std::cmp::Ordering> {
        match (self, value) {
            (JsonScalar::Number(a), JsonValue::Number(b)) => a.partial_cmp(&b.as_f64()?),
            (JsonScalar::String(a), JsonValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

impl From<bool> for JsonScalar {
    fn from(b: bool) -> Self {
        JsonScalar::Bool(b)
    }
}
impl From<i64> for JsonScalar {
    fn from(n: i64) -> Self {
        JsonScalar::Number(n as f64)
    }
}
impl From<f64> for JsonScalar {
    fn from(n: f64) -> Self {
        JsonScalar::Number(n)
    }
}
impl From<&str> for JsonScalar {
    fn from(s: &str) -> Self {
        JsonScalar::String(s.to_string())
    }
}
impl From<String> for JsonScalar {
    fn from(s: String) -> Self {
        JsonScalar::String(s)
    }
}

/// A single-field predicate, the leaves of [`FilterExpr::Field`].
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// `$eq`
    Eq(JsonScalar),
    /// `$ne`
    Ne(JsonScalar),
    /// `$gt`
    Gt(JsonScalar),
    /// `$gte`
    Gte(JsonScalar),
    /// `$lt`
    Lt(JsonScalar),
    /// `$lte`
    Lte(JsonScalar),
    /// `$in` — field value equals one of the given scalars.
    In(Vec<JsonScalar>),
    /// `$nin` — field value equals none of the given scalars.
    Nin(Vec<JsonScalar>),
    /// `$exists` — field is present (`true`) or absent (`false`).
    Exists(bool),
    /// `$regex` — field is a string matching the pattern.
    Regex(String),
    /// `$includes` — field is an array containing the given scalar.
    Includes(JsonScalar),
    /// `$all` — field is an array containing every given scalar.
    All(Vec<JsonScalar>),
    /// `$size` — field is an array of exactly this length.
    Size(usize),
}

impl FieldOp {
    fn matches(&self, field_value: Option<&JsonValue>) -> bool {
        match self {
            FieldOp::Exists(want) => field_value.is_some() == *want,
            FieldOp::Ne(s) => match field_value {
                Some(v) => !s.eq_json(v),
                None => true,
            },
            _ => {
                let Some(value) = field_value else { return false };
                match self {
                    FieldOp::Eq(s) => s.eq_json(value),
                    FieldOp::Ne(_) => unreachable!("handled above"),
                    FieldOp::Gt(s) => s.partial_cmp_json(value) == Some(std::cmp::Ordering::Less),
                    FieldOp::Gte(s) => matches!(s.partial_cmp_json(value), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
                    FieldOp::Lt(s) => s.partial_cmp_json(value) == Some(std::cmp::Ordering::Greater),
                    FieldOp::Lte(s) => matches!(s.partial_cmp_json(value), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
                    FieldOp::In(set) => set.iter().any(|s| s.eq_json(value)),
                    FieldOp::Nin(set) => !set.iter().any(|s| s.eq_json(value)),
                    FieldOp::Regex(pattern) => {
                        let Some(s) = value.as_str() else { return false };
                        Regex::new(pattern).is_ok_and(|re| re.is_match(s))
                    }
                    FieldOp::Includes(s) => value.as_array().is_some_and(|a| a.iter().any(|v| s.eq_json(v))),
                    FieldOp::All(set) => value.as_array().is_some_and(|a| set.iter().all(|s| a.iter().any(|v| s.eq_json(v)))),
                    FieldOp::Size(n) => value.as_array().is_some_and(|a| a.len() == *n),
                    FieldOp::Exists(_) => unreachable!("handled above"),
                }
            }
        }
    }
}

/// The post-search filter expression tree (spec §4.10).
///
/// Constructed with the builder methods below, or directly as a tree for
/// programmatic construction (e.g. deserializing a client-supplied filter
/// document).
#[derive(Debug, Clone)]
pub enum FilterExpr {
    /// Always matches (empty filter).
    MatchAll,
    /// `$and` — every sub-expression matches.
    And(Vec<FilterExpr>),
    /// `$or` — at least one sub-expression matches.
    Or(Vec<FilterExpr>),
    /// `$not` — the sub-expression does not match.
    Not(Box<FilterExpr>),
    /// A single-field predicate.
    Field(String, FieldOp),
}

impl Default for FilterExpr {
    fn default() -> Self {
        FilterExpr::MatchAll
    }
}

impl FilterExpr {
    /// `$eq`
    pub fn eq(field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Eq(value.into()))
    }
    /// `$ne`
    pub fn ne(field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Ne(value.into()))
    }
    /// `$gt`
    pub fn gt(field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Gt(value.into()))
    }
    /// `$gte`
    pub fn gte(field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Gte(value.into()))
    }
    /// `$lt`
    pub fn lt(field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Lt(value.into()))
    }
    /// `$lte`
    pub fn lte(field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Lte(value.into()))
    }
    /// `$in`
    pub fn in_set(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<JsonScalar>>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::In(values.into_iter().map(Into::into).collect()))
    }
    /// `$nin`
    pub fn nin(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<JsonScalar>>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Nin(values.into_iter().map(Into::into).collect()))
    }
    /// `$exists`
    pub fn exists(field: impl Into<String>, want: bool) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Exists(want))
    }
    /// `$regex`
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Regex(pattern.into()))
    }
    /// `$includes`
    pub fn includes(field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Includes(value.into()))
    }
    /// `$all`
    pub fn all_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<JsonScalar>>) -> Self {
        FilterExpr::Field(field.into(), FieldOp::All(values.into_iter().map(Into::into).collect()))
    }
    /// `$size`
    pub fn size(field: impl Into<String>, n: usize) -> Self {
        FilterExpr::Field(field.into(), FieldOp::Size(n))
    }
    /// `$and`
    pub fn and(exprs: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::And(exprs.into_iter().collect())
    }
    /// `$or`
    pub fn or(exprs: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::Or(exprs.into_iter().collect())
    }
    /// `$not`
    pub fn not(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    /// Whether this is the always-true filter.
    pub fn is_match_all(&self) -> bool {
        matches!(self, FilterExpr::MatchAll)
    }

    /// Evaluate against an arbitrary field lookup. `And`/`Or`/`Not` recurse
    /// through the same lookup; a leaf asks it for one field at a time.
    fn matches_lookup(&self, lookup: &dyn Fn(&str) -> Option<JsonValue>) -> bool {
        match self {
            FilterExpr::MatchAll => true,
            FilterExpr::And(exprs) => exprs.iter().all(|e| e.matches_lookup(lookup)),
            FilterExpr::Or(exprs) => exprs.iter().any(|e| e.matches_lookup(lookup)),
            FilterExpr::Not(inner) => !inner.matches_lookup(lookup),
            FilterExpr::Field(field, op) => op.matches(lookup(field).as_ref()),
        }
    }

    /// Evaluate against a hydrated metadata object directly (no top-level
    /// fields folded in).
    ///
    /// A missing field evaluates every comparison operator (other than
    /// `$exists(false)` and `$ne`) to `false`, matching MongoDB's
    /// field-absent semantics.
    pub fn matches(&self, metadata: &Map<String, JsonValue>) -> bool {
        self.matches_lookup(&|field| metadata.get(field).cloned())
    }

    /// Evaluate against a hydrated noun, with `type` resolved to the
    /// noun's top-level closed-set tag rather than a metadata key (spec §8
    /// seed test 1: `search` with filter `{type:"Thing"}` must match on
    /// the noun's type, which is never duplicated into `metadata`).
    /// Every other field falls back to `metadata`.
    pub fn matches_noun(&self, noun: &crate::noun::Noun) -> bool {
        self.matches_lookup(&|field| {
            if field == "type" {
                Some(JsonValue::String(noun.noun_type.storage_tag().to_string()))
            } else {
                noun.metadata.get(field).cloned()
            }
        })
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::MatchAll => write!(f, "*"),
            FilterExpr::And(exprs) => write!(f, "and({})", exprs.len()),
            FilterExpr::Or(exprs) => write!(f, "or({})", exprs.len()),
            FilterExpr::Not(_) => write!(f, "not(..)"),
            FilterExpr::Field(field, _) => write!(f, "{field}(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: JsonValue) -> Map<String, JsonValue> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn match_all_matches_everything() {
        assert!(FilterExpr::MatchAll.matches(&meta(json!({}))));
    }

    #[test]
    fn eq_and_ne() {
        let m = meta(json!({"category": "Thing"}));
        assert!(FilterExpr::eq("category", "Thing").matches(&m));
        assert!(!FilterExpr::eq("category", "Place").matches(&m));
        assert!(FilterExpr::ne("category", "Place").matches(&m));
    }

    #[test]
    fn range_operators() {
        let m = meta(json!({"year": 2024}));
        assert!(FilterExpr::gt("year", 2000i64).matches(&m));
        assert!(FilterExpr::gte("year", 2024i64).matches(&m));
        assert!(!FilterExpr::lt("year", 2024i64).matches(&m));
        assert!(FilterExpr::lte("year", 2024i64).matches(&m));
    }

    #[test]
    fn string_ordering() {
        let m = meta(json!({"name": "mango"}));
        assert!(FilterExpr::gt("name", "apple").matches(&m));
        assert!(!FilterExpr::gt("name", "zebra").matches(&m));
    }

    #[test]
    fn in_and_nin() {
        let m = meta(json!({"tag": "b"}));
        assert!(FilterExpr::in_set("tag", ["a", "b", "c"]).matches(&m));
        assert!(!FilterExpr::nin("tag", ["a", "b", "c"]).matches(&m));
        assert!(FilterExpr::nin("tag", ["x", "y"]).matches(&m));
    }

    #[test]
    fn exists_true_and_false() {
        let m = meta(json!({"present": 1}));
        assert!(FilterExpr::exists("present", true).matches(&m));
        assert!(!FilterExpr::exists("absent", true).matches(&m));
        assert!(FilterExpr::exists("absent", false).matches(&m));
    }

    #[test]
    fn regex_matches_string_field() {
        let m = meta(json!({"title": "The Great Gatsby"}));
        assert!(FilterExpr::regex("title", "^The").matches(&m));
        assert!(!FilterExpr::regex("title", "^Moby").matches(&m));
    }

    #[test]
    fn array_operators() {
        let m = meta(json!({"tags": ["rust", "db", "vector"]}));
        assert!(FilterExpr::includes("tags", "db").matches(&m));
        assert!(!FilterExpr::includes("tags", "go").matches(&m));
        assert!(FilterExpr::all_of("tags", ["rust", "db"]).matches(&m));
        assert!(!FilterExpr::all_of("tags", ["rust", "go"]).matches(&m));
        assert!(FilterExpr::size("tags", 3).matches(&m));
        assert!(!FilterExpr::size("tags", 2).matches(&m));
    }

    #[test]
    fn and_or_not_combinators() {
        let m = meta(json!({"a": 1, "b": 2}));
        assert!(FilterExpr::and([FilterExpr::eq("a", 1i64), FilterExpr::eq("b", 2i64)]).matches(&m));
        assert!(!FilterExpr::and([FilterExpr::eq("a", 1i64), FilterExpr::eq("b", 3i64)]).matches(&m));
        assert!(FilterExpr::or([FilterExpr::eq("a", 9i64), FilterExpr::eq("b", 2i64)]).matches(&m));
        assert!(FilterExpr::not(FilterExpr::eq("a", 9i64)).matches(&m));
    }

    #[test]
    fn missing_field_fails_comparisons_but_not_ne_or_exists_false() {
        let m = meta(json!({}));
        assert!(!FilterExpr::eq("missing", 1i64).matches(&m));
        assert!(!FilterExpr::gt("missing", 1i64).matches(&m));
        assert!(FilterExpr::exists("missing", false).matches(&m));
    }

    #[test]
    fn matches_noun_resolves_type_against_the_top_level_tag() {
        use crate::noun::Noun;
        use vg_core::{CreatedBy, NounType};

        let noun = Noun::new(NounType::Thing, Some(vec![1.0]), meta(json!({"color": "red"})), CreatedBy { name: "t".into(), version: "0".into() }, "svc");

        assert!(FilterExpr::eq("type", "Thing").matches_noun(&noun));
        assert!(!FilterExpr::eq("type", "Person").matches_noun(&noun));
        // `type` is never a metadata key, so the plain `matches` path
        // (no noun context) can't see it.
        assert!(!FilterExpr::eq("type", "Thing").matches(&noun.metadata));
        // Non-`type` fields still fall back to metadata.
        assert!(FilterExpr::eq("color", "red").matches_noun(&noun));
    }
}
