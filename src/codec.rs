//! JSON wire format for rule lists.
//!
//! ```json
//! {
//!   "action": "read" | ["read", "update"],
//!   "subject": "household" | ["household", "user"],
//!   "conditions": { "field": "role", "op": "eq", "value": "owner" } | null,
//!   "fields": ["name", "description"] | null,
//!   "inverted": false,
//!   "reason": "string" | null
//! }
//! ```
//!
//! Decoding is lenient per entry: a rule that fails to parse is logged and left
//! out, the rest of the payload still loads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CodecError, Condition, Effect, Rule};

/// `"x"` or `["x", "y"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_set(self) -> BTreeSet<String> {
        match self {
            OneOrMany::One(name) => BTreeSet::from([name]),
            OneOrMany::Many(names) => names.into_iter().collect(),
        }
    }

    fn from_set(set: BTreeSet<String>) -> Self {
        let mut names: Vec<String> = set.into_iter().collect();
        if names.len() == 1 {
            OneOrMany::One(names.remove(0))
        } else {
            OneOrMany::Many(names)
        }
    }
}

/// Rule as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRule {
    #[serde(alias = "actions")]
    action: OneOrMany,
    #[serde(alias = "subjects")]
    subject: OneOrMany,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conditions: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inverted: Option<bool>,
    #[serde(default, skip_serializing)]
    effect: Option<Effect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl TryFrom<WireRule> for Rule {
    type Error = CodecError;

    fn try_from(wire: WireRule) -> Result<Self, Self::Error> {
        let effect = match (wire.effect, wire.inverted) {
            (None, None | Some(false)) => Effect::Allow,
            (None, Some(true)) => Effect::Deny,
            (Some(effect), None) => effect,
            (Some(effect), Some(inverted)) if inverted == (effect == Effect::Deny) => effect,
            (Some(effect), Some(inverted)) => {
                return Err(CodecError::InvalidRule(format!(
                    "`effect: {effect}` contradicts `inverted: {inverted}`"
                )));
            }
        };

        let actions = wire.action.into_set();
        if actions.is_empty() || actions.iter().any(String::is_empty) {
            return Err(CodecError::InvalidRule("empty action list".to_string()));
        }
        let subject_types = wire.subject.into_set();
        if subject_types.is_empty() || subject_types.iter().any(String::is_empty) {
            return Err(CodecError::InvalidRule("empty subject list".to_string()));
        }
        let fields = wire.fields.map(OneOrMany::into_set);
        if fields.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err(CodecError::InvalidRule("empty field list".to_string()));
        }

        // `{}` carries no constraint.
        let condition = match wire.conditions {
            Some(tree) if !tree.is_empty() => {
                Some(serde_json::from_value::<Condition>(Value::Object(tree)).map_err(|e| {
                    CodecError::MalformedCondition(e.to_string())
                })?)
            }
            _ => None,
        };

        Ok(Rule {
            effect,
            actions,
            subject_types,
            condition,
            fields,
            inverted: effect == Effect::Deny,
            reason: wire.reason,
        })
    }
}

impl From<Rule> for WireRule {
    fn from(rule: Rule) -> Self {
        let conditions = rule.condition.and_then(|condition| {
            match serde_json::to_value(condition) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            }
        });
        WireRule {
            action: OneOrMany::from_set(rule.actions),
            subject: OneOrMany::from_set(rule.subject_types),
            conditions,
            fields: rule.fields.map(OneOrMany::from_set),
            inverted: Some(rule.inverted),
            effect: None,
            reason: rule.reason,
        }
    }
}

/// Decode one wire rule.
pub fn decode_rule(value: &Value) -> Result<Rule, CodecError> {
    let wire = WireRule::deserialize(value).map_err(|e| CodecError::InvalidRule(e.to_string()))?;
    Rule::try_from(wire)
}

/// Decode a rule array, skipping (and logging) entries that fail to parse.
pub fn decode(payload: &Value) -> Result<Vec<Rule>, CodecError> {
    let entries = payload.as_array().ok_or(CodecError::NotAnArray)?;
    let mut rules = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match decode_rule(entry) {
            Ok(rule) => rules.push(rule),
            Err(error) => {
                tracing::warn!(index, %error, "Skipping malformed permission rule");
            }
        }
    }
    Ok(rules)
}

pub fn decode_str(payload: &str) -> Result<Vec<Rule>, CodecError> {
    let value: Value = serde_json::from_str(payload)?;
    decode(&value)
}

pub fn encode(rules: &[Rule]) -> Value {
    Value::Array(
        rules
            .iter()
            .cloned()
            .map(|rule| serde_json::to_value(WireRule::from(rule)).unwrap_or(Value::Null))
            .collect(),
    )
}

pub fn encode_string(rules: &[Rule]) -> String {
    encode(rules).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::CodecError;

    #[test]
    fn test_single_and_list_forms() {
        let rule = decode_rule(&json!({ "action": "read", "subject": ["household", "user"] })).unwrap();
        assert_eq!(rule.actions, BTreeSet::from(["read".to_string()]));
        assert_eq!(rule.subject_types.len(), 2);
        assert_eq!(rule.effect, Effect::Allow);
        assert!(rule.condition.is_none());
        assert!(rule.fields.is_none());

        let rule = decode_rule(&json!({ "actions": ["read", "update"], "subjects": "household", "inverted": true }))
            .unwrap();
        assert_eq!(rule.actions.len(), 2);
        assert_eq!(rule.effect, Effect::Deny);
        assert!(rule.inverted);
    }

    #[test]
    fn test_empty_conditions_object_is_unconditional() {
        let rule = decode_rule(&json!({ "action": "read", "subject": "household", "conditions": {} })).unwrap();
        assert!(rule.condition.is_none());
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(matches!(
            decode_rule(&json!({ "action": [], "subject": "household" })),
            Err(CodecError::InvalidRule(_))
        ));
        assert!(matches!(
            decode_rule(&json!({ "action": "read", "subject": [] })),
            Err(CodecError::InvalidRule(_))
        ));
        assert!(matches!(
            decode_rule(&json!({ "action": "read", "subject": "household", "fields": [] })),
            Err(CodecError::InvalidRule(_))
        ));
        assert!(matches!(
            decode_rule(&json!({
                "action": "read",
                "subject": "household",
                "conditions": { "field": "role", "op": "like", "value": "own%" }
            })),
            Err(CodecError::MalformedCondition(_))
        ));
        assert!(matches!(
            decode_rule(&json!({ "action": "read", "subject": "household", "effect": "allow", "inverted": true })),
            Err(CodecError::InvalidRule(_))
        ));
        assert!(decode_rule(&json!("read household")).is_err());
    }

    #[test]
    fn test_effect_spelling() {
        let rule = decode_rule(&json!({ "action": "read", "subject": "household", "effect": "deny" })).unwrap();
        assert_eq!(rule.effect, Effect::Deny);
        assert!(rule.inverted);

        // Encoding settles on the `inverted` spelling.
        let wire = encode(&[rule]);
        assert_eq!(wire, json!([{ "action": "read", "subject": "household", "inverted": true }]));
    }

    #[test]
    fn test_decode_requires_array() {
        assert!(matches!(decode(&json!({ "action": "read" })), Err(CodecError::NotAnArray)));
        assert!(matches!(decode_str("[{"), Err(CodecError::Json(_))));
        assert!(decode_str("[]").unwrap().is_empty());
    }

    #[test]
    fn test_encode_shape() {
        let rule = Rule::deny(["update", "delete"], "household")
            .when(Condition::ne("role", "owner"))
            .on_fields("name")
            .because("Only owners can change the household");
        assert_eq!(
            encode(&[rule]),
            json!([{
                "action": ["delete", "update"],
                "subject": "household",
                "conditions": { "op": "ne", "field": "role", "value": "owner" },
                "fields": "name",
                "inverted": true,
                "reason": "Only owners can change the household",
            }])
        );
    }
}
