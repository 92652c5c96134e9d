//! Typed filter expressions and their translation to native predicates.
//!
//! Callers describe selections with the declarative [`Filter`] tree;
//! [`translate`] compiles it into a [`Predicate`] the store evaluates per
//! document. Translation is a pure structural transform: one exhaustive
//! match, no string substitution, regexes compiled exactly once.

use crate::error::{StoreError, StoreResult};
use crate::record::{lookup_path, parse_timestamp, Record};
use serde_json::Value;
use std::cmp::Ordering;

/// A declarative filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All sub-filters match. Empty matches everything.
    And(Vec<Filter>),
    /// Any sub-filter matches. Empty matches nothing.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
    /// Field equals the value.
    Eq(String, Value),
    /// Field is one of the values.
    In(String, Vec<Value>),
    /// Field lies in the inclusive range.
    Between(String, Value, Value),
    /// Field is strictly greater than the value.
    Gt(String, Value),
    /// Field is greater than or equal to the value.
    Gte(String, Value),
    /// Field is strictly less than the value.
    Lt(String, Value),
    /// Field is less than or equal to the value.
    Lte(String, Value),
    /// Field is a string matching the pattern.
    Regex(String, String),
    /// Field presence matches the flag.
    Exists(String, bool),
}

impl Filter {
    /// Convenience constructor for `In` over string values.
    #[must_use]
    pub fn in_strings<S: Into<String>>(field: impl Into<String>, values: Vec<S>) -> Self {
        Filter::In(
            field.into(),
            values.into_iter().map(|v| Value::String(v.into())).collect(),
        )
    }
}

/// A compiled, store-native predicate.
#[derive(Debug)]
pub struct Predicate {
    node: Node,
}

#[derive(Debug)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Eq(String, Value),
    In(String, Vec<Value>),
    Between(String, Value, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Regex(String, regex::Regex),
    Exists(String, bool),
}

impl Predicate {
    /// A predicate matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self {
            node: Node::And(Vec::new()),
        }
    }

    /// Evaluates the predicate against one record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        eval(&self.node, record)
    }
}

/// Compiles a filter expression to a native predicate.
///
/// # Errors
///
/// Returns [`StoreError::InvalidRegex`] if a `Regex` pattern does not
/// compile; translation fails up front rather than at match time.
pub fn translate(filter: &Filter) -> StoreResult<Predicate> {
    Ok(Predicate {
        node: translate_node(filter)?,
    })
}

fn translate_node(filter: &Filter) -> StoreResult<Node> {
    Ok(match filter {
        Filter::And(parts) => Node::And(
            parts
                .iter()
                .map(translate_node)
                .collect::<StoreResult<Vec<_>>>()?,
        ),
        Filter::Or(parts) => Node::Or(
            parts
                .iter()
                .map(translate_node)
                .collect::<StoreResult<Vec<_>>>()?,
        ),
        Filter::Not(inner) => Node::Not(Box::new(translate_node(inner)?)),
        Filter::Eq(field, value) => Node::Eq(field.clone(), value.clone()),
        Filter::In(field, values) => Node::In(field.clone(), values.clone()),
        Filter::Between(field, lo, hi) => Node::Between(field.clone(), lo.clone(), hi.clone()),
        Filter::Gt(field, value) => Node::Gt(field.clone(), value.clone()),
        Filter::Gte(field, value) => Node::Gte(field.clone(), value.clone()),
        Filter::Lt(field, value) => Node::Lt(field.clone(), value.clone()),
        Filter::Lte(field, value) => Node::Lte(field.clone(), value.clone()),
        Filter::Regex(field, pattern) => Node::Regex(
            field.clone(),
            regex::Regex::new(pattern).map_err(|source| StoreError::InvalidRegex {
                field: field.clone(),
                source,
            })?,
        ),
        Filter::Exists(field, expected) => Node::Exists(field.clone(), *expected),
    })
}

fn eval(node: &Node, record: &Record) -> bool {
    match node {
        Node::And(parts) => parts.iter().all(|n| eval(n, record)),
        Node::Or(parts) => parts.iter().any(|n| eval(n, record)),
        Node::Not(inner) => !eval(inner, record),
        Node::Eq(field, value) => field_value(record, field) == Some(value),
        Node::In(field, values) => {
            field_value(record, field).is_some_and(|v| values.contains(v))
        }
        Node::Between(field, lo, hi) => field_value(record, field).is_some_and(|v| {
            compare(v, lo).is_some_and(Ordering::is_ge)
                && compare(v, hi).is_some_and(Ordering::is_le)
        }),
        Node::Gt(field, value) => cmp_is(record, field, value, Ordering::is_gt),
        Node::Gte(field, value) => cmp_is(record, field, value, Ordering::is_ge),
        Node::Lt(field, value) => cmp_is(record, field, value, Ordering::is_lt),
        Node::Lte(field, value) => cmp_is(record, field, value, Ordering::is_le),
        Node::Regex(field, re) => field_value(record, field)
            .and_then(Value::as_str)
            .is_some_and(|s| re.is_match(s)),
        Node::Exists(field, expected) => field_value(record, field).is_some() == *expected,
    }
}

fn field_value<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    lookup_path(record.as_map(), field)
}

fn cmp_is(record: &Record, field: &str, value: &Value, check: fn(Ordering) -> bool) -> bool {
    field_value(record, field).is_some_and(|v| compare(v, value).is_some_and(check))
}

/// Orders two JSON values.
///
/// Values that both parse as timestamps (RFC 3339 strings or integer epoch
/// milliseconds) compare chronologically, so a string bound still orders
/// against a numeric `updatedAt`. Otherwise numbers compare numerically,
/// strings lexically, booleans false-before-true. Mismatched or non-scalar
/// kinds are unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (parse_timestamp(a), parse_timestamp(b)) {
        return Some(x.cmp(&y));
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn matches(filter: &Filter, value: serde_json::Value) -> bool {
        translate(filter).unwrap().matches(&person(value))
    }

    #[test]
    fn equality_and_membership() {
        let eq = Filter::Eq("type".into(), json!("contact"));
        assert!(matches(&eq, json!({"type": "contact"})));
        assert!(!matches(&eq, json!({"type": "case"})));
        assert!(!matches(&eq, json!({})));

        let inq = Filter::in_strings("outbreakId", vec!["ob-1", "ob-2"]);
        assert!(matches(&inq, json!({"outbreakId": "ob-2"})));
        assert!(!matches(&inq, json!({"outbreakId": "ob-3"})));

        // Empty In matches nothing.
        let empty = Filter::In("outbreakId".into(), vec![]);
        assert!(!matches(&empty, json!({"outbreakId": "ob-1"})));
    }

    #[test]
    fn boolean_combinators() {
        let f = Filter::And(vec![
            Filter::Eq("type".into(), json!("case")),
            Filter::Not(Box::new(Filter::Eq("deleted".into(), json!(true)))),
        ]);
        assert!(matches(&f, json!({"type": "case"})));
        assert!(!matches(&f, json!({"type": "case", "deleted": true})));

        // Empty And matches everything; empty Or nothing.
        assert!(matches(&Filter::And(vec![]), json!({})));
        assert!(!matches(&Filter::Or(vec![]), json!({})));
    }

    #[test]
    fn range_over_timestamps() {
        let f = Filter::Gte("updatedAt".into(), json!("2024-05-01T00:00:00Z"));
        assert!(matches(&f, json!({"updatedAt": "2024-05-02T08:00:00Z"})));
        assert!(!matches(&f, json!({"updatedAt": "2024-04-30T23:59:59Z"})));

        let between = Filter::Between("age".into(), json!(18), json!(65));
        assert!(matches(&between, json!({"age": 18})));
        assert!(matches(&between, json!({"age": 65})));
        assert!(!matches(&between, json!({"age": 66})));
        assert!(!matches(&between, json!({"age": "18"})));
    }

    #[test]
    fn range_over_mixed_timestamp_representations() {
        // updatedAt may arrive as epoch milliseconds; a string bound must
        // still order it chronologically.
        let f = Filter::Gte("updatedAt".into(), json!("2024-05-01T00:00:00.000Z"));
        assert!(matches(&f, json!({"updatedAt": 1714636800000i64})));
        assert!(!matches(&f, json!({"updatedAt": 1714521599999i64})));
        assert!(matches(&f, json!({"updatedAt": 1714521600000i64})));

        // Offset spellings of the same instant order chronologically, not
        // lexically.
        assert!(matches(&f, json!({"updatedAt": "2024-05-01T02:00:00+02:00"})));
    }

    #[test]
    fn regex_compiled_at_translate_time() {
        let bad = Filter::Regex("name".into(), "[unclosed".into());
        assert!(matches!(
            translate(&bad),
            Err(StoreError::InvalidRegex { .. })
        ));

        let f = Filter::Regex("name".into(), "^Ada".into());
        assert!(matches(&f, json!({"name": "Ada Lovelace"})));
        assert!(!matches(&f, json!({"name": "Grace"})));
        assert!(!matches(&f, json!({"name": 42})));
    }

    #[test]
    fn existence_checks() {
        let present = Filter::Exists("deletedAt".into(), true);
        assert!(matches(&present, json!({"deletedAt": "2024-01-01T00:00:00Z"})));
        assert!(!matches(&present, json!({})));

        let absent = Filter::Exists("deletedAt".into(), false);
        assert!(matches(&absent, json!({})));
    }

    #[test]
    fn nested_field_paths() {
        let f = Filter::Eq("address.location.id".into(), json!("loc-1"));
        assert!(matches(
            &f,
            json!({"address": {"location": {"id": "loc-1"}}})
        ));
        assert!(!matches(&f, json!({"address": {}})));
    }
}
