//! Attribute conditions attached to rules.
//!
//! A condition is a small tree: comparison leaves (`role eq "owner"`, `age gte 18`,
//! `status in ["open", "draft"]`) combined with `and`, `or` and `not`.
//! Evaluation is total: type mismatches and missing attributes resolve to `false`
//! for the affected leaf, they never raise.

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CodecError, RuleViolation, Subject};

/// Comparison operator of a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Lt,
    Gte,
    Lte,
    Exists,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::In => "in",
            Self::NotIn => "nin",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Exists => "exists",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "in" => Self::In,
            "nin" => Self::NotIn,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            "exists" => Self::Exists,
            other => return Err(CodecError::UnknownOperator(other.to_string())),
        })
    }
}

/// Predicate tree over subject attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireCondition")]
#[serde(into = "WireCondition")]
pub enum Condition {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// `exists` leaves carry no literal, so their value is dropped.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        let value = match op {
            CompareOp::Exists => Value::Null,
            _ => value.into(),
        };
        Condition::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn in_set<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let list = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Self::compare(field, CompareOp::In, Value::Array(list))
    }

    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let list = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Self::compare(field, CompareOp::NotIn, Value::Array(list))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Exists, Value::Null)
    }

    pub fn and(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Or(children.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Condition) -> Self {
        Condition::Not(Box::new(child))
    }

    /// `true` for a tree that matches every subject without reading attributes,
    /// e.g. `and([])` or `not(or([]))`.
    pub fn is_trivial(&self) -> bool {
        self.constant() == Some(true)
    }

    /// Outcome of a tree whose result doesn't depend on attributes, `None` otherwise.
    fn constant(&self) -> Option<bool> {
        match self {
            Condition::Compare { .. } => None,
            Condition::And(children) => {
                let mut outcome = Some(true);
                for child in children {
                    match child.constant() {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => outcome = None,
                    }
                }
                outcome
            }
            Condition::Or(children) => {
                let mut outcome = Some(false);
                for child in children {
                    match child.constant() {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => outcome = None,
                    }
                }
                outcome
            }
            Condition::Not(child) => child.constant().map(|outcome| !outcome),
        }
    }

    /// Structural check used by the compiler.
    pub fn validate(&self) -> Result<(), RuleViolation> {
        match self {
            Condition::Compare { field, op, value } => {
                if field.is_empty() {
                    return Err(RuleViolation::EmptyField { op: *op });
                }
                if matches!(op, CompareOp::In | CompareOp::NotIn) && !value.is_array() {
                    return Err(RuleViolation::ExpectedArray {
                        op: *op,
                        field: field.clone(),
                    });
                }
                if *op == CompareOp::Exists && !value.is_null() {
                    return Err(RuleViolation::UnexpectedValue { field: field.clone() });
                }
                Ok(())
            }
            Condition::And(children) | Condition::Or(children) => {
                children.iter().try_for_each(Condition::validate)
            }
            Condition::Not(child) => child.validate(),
        }
    }

    /// Evaluate against a subject.
    pub fn matches<S: Subject + ?Sized>(&self, subject: &S) -> bool {
        match self {
            Condition::Compare { field, op, value } => {
                compare(*op, resolve(subject, field).as_ref(), value)
            }
            Condition::And(children) => children.iter().all(|c| c.matches(subject)),
            Condition::Or(children) => children.iter().any(|c| c.matches(subject)),
            Condition::Not(child) => !child.matches(subject),
        }
    }
}

/// Reads `field` from the subject. Dotted names walk into nested JSON objects
/// after the first segment. JSON `null` is reported as absent.
fn resolve<S: Subject + ?Sized>(subject: &S, field: &str) -> Option<Value> {
    let mut segments = field.split('.');
    let head = segments.next()?;
    let mut current = subject.attribute(head)?;
    for segment in segments {
        current = match current {
            Value::Object(mut map) => map.remove(segment)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

fn compare(op: CompareOp, attribute: Option<&Value>, literal: &Value) -> bool {
    match op {
        CompareOp::Exists => attribute.is_some(),
        CompareOp::Eq => attribute.is_some_and(|a| values_equal(a, literal)),
        CompareOp::Ne => match attribute {
            Some(a) => !values_equal(a, literal),
            None => !literal.is_null(),
        },
        CompareOp::In => match (attribute, literal.as_array()) {
            (Some(a), Some(list)) => list.iter().any(|v| values_equal(a, v)),
            _ => false,
        },
        CompareOp::NotIn => match (attribute, literal.as_array()) {
            (Some(a), Some(list)) => !list.iter().any(|v| values_equal(a, v)),
            _ => false,
        },
        CompareOp::Gt => ordering(attribute, literal).is_some_and(|o| o == Ordering::Greater),
        CompareOp::Lt => ordering(attribute, literal).is_some_and(|o| o == Ordering::Less),
        CompareOp::Gte => ordering(attribute, literal).is_some_and(|o| o != Ordering::Less),
        CompareOp::Lte => ordering(attribute, literal).is_some_and(|o| o != Ordering::Greater),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            number_ordering(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

/// Only numbers and date-like strings are ordered.
fn ordering(attribute: Option<&Value>, literal: &Value) -> Option<Ordering> {
    match (attribute?, literal) {
        (a @ Value::Number(_), b @ Value::Number(_)) => number_ordering(a, b),
        (Value::String(a), Value::String(b)) => parse_instant(a)?.partial_cmp(&parse_instant(b)?),
        _ => None,
    }
}

fn number_ordering(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return Some(a.cmp(&b));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
        return Some(instant);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset())
}

/// Wire shape of a condition node. `op` selects which of the other keys apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireCondition {
    op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<WireCondition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    child: Option<Box<WireCondition>>,
}

impl TryFrom<WireCondition> for Condition {
    type Error = CodecError;

    fn try_from(node: WireCondition) -> Result<Self, Self::Error> {
        match node.op.as_str() {
            "and" | "or" => {
                let children = node
                    .children
                    .ok_or_else(|| {
                        CodecError::MalformedCondition(format!("`{}` node without `children`", node.op))
                    })?
                    .into_iter()
                    .map(Condition::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if node.op == "and" {
                    Condition::And(children)
                } else {
                    Condition::Or(children)
                })
            }
            "not" => {
                let child = node.child.ok_or_else(|| {
                    CodecError::MalformedCondition("`not` node without `child`".to_string())
                })?;
                Ok(Condition::Not(Box::new(Condition::try_from(*child)?)))
            }
            op => {
                let op = op.parse::<CompareOp>()?;
                let field = node
                    .field
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| CodecError::MalformedCondition(format!("`{op}` leaf without `field`")))?;
                let value = match op {
                    CompareOp::Exists => Value::Null,
                    _ => node.value.unwrap_or(Value::Null),
                };
                let condition = Condition::Compare { field, op, value };
                condition
                    .validate()
                    .map_err(|violation| CodecError::MalformedCondition(violation.to_string()))?;
                Ok(condition)
            }
        }
    }
}

impl From<Condition> for WireCondition {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Compare { field, op, value } => WireCondition {
                op: op.as_str().to_string(),
                field: Some(field),
                value: (op != CompareOp::Exists).then_some(value),
                ..Default::default()
            },
            Condition::And(children) => WireCondition {
                op: "and".to_string(),
                children: Some(children.into_iter().map(Into::into).collect()),
                ..Default::default()
            },
            Condition::Or(children) => WireCondition {
                op: "or".to_string(),
                children: Some(children.into_iter().map(Into::into).collect()),
                ..Default::default()
            },
            Condition::Not(child) => WireCondition {
                op: "not".to_string(),
                child: Some(Box::new((*child).into())),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Record;

    fn member() -> Record {
        Record::new(
            "household",
            json!({
                "role": "member",
                "members": 4,
                "budget": 120.5,
                "created_at": "2024-03-01T10:00:00Z",
                "owner": { "id": 7, "name": "Dana" },
                "archived_at": null,
            }),
        )
    }

    #[test]
    fn test_equality_and_inequality() {
        let subject = member();
        assert!(Condition::eq("role", "member").matches(&subject));
        assert!(!Condition::eq("role", "owner").matches(&subject));
        assert!(Condition::ne("role", "owner").matches(&subject));
        assert!(Condition::eq("members", 4.0).matches(&subject));
    }

    #[test]
    fn test_missing_attribute_is_absent() {
        let subject = member();
        assert!(!Condition::exists("nickname").matches(&subject));
        assert!(!Condition::exists("archived_at").matches(&subject));
        assert!(!Condition::eq("nickname", "x").matches(&subject));
        assert!(Condition::ne("nickname", "x").matches(&subject));
        assert!(!Condition::ne("nickname", Value::Null).matches(&subject));
        assert!(!Condition::in_set("nickname", ["x"]).matches(&subject));
        assert!(!Condition::not_in("nickname", ["x"]).matches(&subject));
        assert!(!Condition::gt("nickname", 1).matches(&subject));
    }

    #[test]
    fn test_set_membership() {
        let subject = member();
        assert!(Condition::in_set("role", ["owner", "member"]).matches(&subject));
        assert!(!Condition::in_set("role", ["owner"]).matches(&subject));
        assert!(Condition::not_in("role", ["owner", "guest"]).matches(&subject));
        assert!(!Condition::not_in("role", ["member"]).matches(&subject));
    }

    #[test]
    fn test_ordering_operators() {
        let subject = member();
        assert!(Condition::gt("members", 3).matches(&subject));
        assert!(!Condition::gt("members", 4).matches(&subject));
        assert!(Condition::gte("members", 4).matches(&subject));
        assert!(Condition::lt("budget", 200).matches(&subject));
        assert!(Condition::lte("budget", 120.5).matches(&subject));

        // Strings that are not dates are not ordered.
        assert!(!Condition::gt("role", "a").matches(&subject));
        assert!(!Condition::lt("role", "z").matches(&subject));
        // Type mismatch
        assert!(!Condition::gt("members", "3").matches(&subject));
    }

    #[test]
    fn test_date_comparison() {
        let subject = member();
        assert!(Condition::gt("created_at", "2024-01-01").matches(&subject));
        assert!(!Condition::lt("created_at", "2024-03-01T10:30:00+01:00").matches(&subject));
        assert!(Condition::lt("created_at", "2024-03-01T12:00:00Z").matches(&subject));
        assert!(Condition::gte("created_at", "2024-03-01T10:00:00Z").matches(&subject));
    }

    #[test]
    fn test_nested_attribute_path() {
        let subject = member();
        assert!(Condition::eq("owner.id", 7).matches(&subject));
        assert!(!Condition::exists("owner.email").matches(&subject));
        assert!(!Condition::exists("role.length").matches(&subject));
    }

    #[test]
    fn test_combinators() {
        let subject = member();
        let owner_or_big = Condition::or([
            Condition::eq("role", "owner"),
            Condition::gte("members", 4),
        ]);
        assert!(owner_or_big.matches(&subject));
        assert!(!Condition::not(owner_or_big.clone()).matches(&subject));
        assert!(!Condition::and([owner_or_big, Condition::eq("role", "owner")]).matches(&subject));

        assert!(Condition::and([]).matches(&subject));
        assert!(!Condition::or([]).matches(&subject));
        assert!(Condition::and([]).is_trivial());
        assert!(!Condition::or([]).is_trivial());
    }

    #[test]
    fn test_constant_trees_are_trivial() {
        assert!(Condition::not(Condition::or([])).is_trivial());
        assert!(Condition::or([Condition::and([]), Condition::eq("role", "owner")]).is_trivial());
        assert!(!Condition::and([Condition::and([]), Condition::eq("role", "owner")]).is_trivial());
        assert!(!Condition::not(Condition::and([])).is_trivial());
        assert!(!Condition::not(Condition::exists("role")).is_trivial());
    }

    #[test]
    fn test_validate() {
        assert!(Condition::eq("role", "owner").validate().is_ok());
        assert!(Condition::eq("", "owner").validate().is_err());
        assert_eq!(
            Condition::compare("role", CompareOp::In, "owner").validate(),
            Err(RuleViolation::ExpectedArray {
                op: CompareOp::In,
                field: "role".to_string(),
            })
        );

        // `compare` drops the literal of an `exists` leaf, a hand-built one is rejected.
        assert_eq!(
            Condition::compare("archived_at", CompareOp::Exists, 5),
            Condition::exists("archived_at")
        );
        let with_value = Condition::Compare {
            field: "archived_at".to_string(),
            op: CompareOp::Exists,
            value: json!(5),
        };
        assert_eq!(
            with_value.validate(),
            Err(RuleViolation::UnexpectedValue {
                field: "archived_at".to_string()
            })
        );
        assert!(
            Condition::not(Condition::and([Condition::compare("role", CompareOp::NotIn, 1)]))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_wire_shape() {
        let condition = Condition::and([
            Condition::eq("role", "owner"),
            Condition::not(Condition::exists("archived_at")),
        ]);
        let wire = serde_json::to_value(&condition).unwrap();
        assert_eq!(
            wire,
            json!({
                "op": "and",
                "children": [
                    { "op": "eq", "field": "role", "value": "owner" },
                    { "op": "not", "child": { "op": "exists", "field": "archived_at" } },
                ]
            })
        );
        let back: Condition = serde_json::from_value(wire).unwrap();
        assert_eq!(back, condition);
    }

    #[test]
    fn test_wire_rejects_unknown_operator() {
        let err = serde_json::from_value::<Condition>(json!({ "op": "regex", "field": "role", "value": ".*" }));
        assert!(err.is_err());
        let err = serde_json::from_value::<Condition>(json!({ "op": "not" }));
        assert!(err.is_err());
    }
}
