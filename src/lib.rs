//! Rust 🦀 ability engine: attribute-based allow/deny rules with crabby🦀🧙 macro help.
//!
//! Library intended to be lightweight and simple as possible.
//!
//! Rules are serializable and deserializable (see [codec] for the JSON shape), so the
//! rule list may come from anywhere: a backend, a config file, a local cache.
//! A rule list is compiled into a [CompiledRuleSet], indexed by `(action, subject type)`,
//! including the `manage` (any action) and `all` (any subject type) wildcards.
//!
//! Precedence is "last declared wins": among rules whose condition matches the subject,
//! the one declared last decides. When nothing matches the check is denied.
//!
//! Subjects implement [Subject], either by hand, through [define_subject!], or by using a
//! dynamic [Record].
//!
//! Example usage:
//!```
//! use abilitycrab::*;
//! use serde_json::json;
//!
//! define_subject! {
//!     #[derive(Debug, Clone)]
//!     pub struct Household: "household" {
//!         pub name: String,
//!         pub role: String,
//!     }
//! }
//!
//! fn test_ability() {
//!    let ability = ReactiveAbility::new();
//!
//!    let home = Household { name: "Home".to_string(), role: "owner".to_string() };
//!
//!    // Nothing installed yet: everything is denied.
//!    assert!(ability.cannot("read", &home));
//!
//!    // Rules as they arrive from the backend.
//!    let rules = codec::decode(&json!([
//!        { "action": "read", "subject": "household" },
//!        { "action": ["update", "delete"], "subject": "household",
//!          "conditions": { "field": "role", "op": "eq", "value": "owner" } },
//!        { "action": "delete", "subject": "household", "inverted": true,
//!          "reason": "Households can't be deleted from the app" },
//!    ])).unwrap();
//!
//!    // Swap rules inside ability (atomically)
//!    ability.update(rules).unwrap();
//!
//!    assert!(ability.can("read", &home));
//!    assert!(ability.can("update", &home));
//!    assert!(ability.cannot("delete", &home));
//!    assert_eq!(
//!        ability.ensure_can("delete", &home, None).unwrap_err().to_string(),
//!        "Households can't be deleted from the app"
//!    );
//!
//!    // Bare subject type: only unconditional rules decide.
//!    assert!(ability.can("read", "household"));
//!    assert!(ability.cannot("update", "household"));
//!
//!    // Sign-out
//!    ability.clear();
//!    assert!(ability.cannot("read", &home));
//! }
//!
//! test_ability();
//!
//!```
use serde_json::{Map, Value};

mod ability;
mod builder;
pub mod codec;
mod compiled;
mod condition;
mod error;
mod example;
mod r#macro;
mod rule;
mod service;

#[doc(hidden)]
pub use serde_json as __serde_json;

pub use ability::{Authorizer, Guarded, READ, UPDATE};
pub use builder::AbilityBuilder;
pub use compiled::{ALL, CompiledRuleSet, MANAGE, RuleSetOptions};
pub use condition::{CompareOp, Condition};
pub use error::{AbilityError, CodecError, ForbiddenError, RuleViolation};
pub use rule::{Effect, IntoNames, Rule};
pub use service::{
    AbilityUpdater, ObserverId, ReactiveAbility, ReactiveAbilityBuilder, Subscription,
};

/// Trait that anything checked against rules must implement.
///
/// `attribute` returns `None` (or JSON `null`) for attributes the subject doesn't have.
pub trait Subject {
    /// Subject type name, matched against rule subject types (e.g. "household").
    fn subject_type(&self) -> &str;

    /// Value of a named attribute, used by rule conditions.
    fn attribute(&self, name: &str) -> Option<Value>;

    /// `false` for a bare subject type that carries no attributes.
    fn is_instance(&self) -> bool {
        true
    }
}

/// A bare subject type, for type-level checks like `can("create", "household")`.
impl Subject for str {
    fn subject_type(&self) -> &str {
        self
    }

    fn attribute(&self, _name: &str) -> Option<Value> {
        None
    }

    fn is_instance(&self) -> bool {
        false
    }
}

impl Subject for String {
    fn subject_type(&self) -> &str {
        self
    }

    fn attribute(&self, _name: &str) -> Option<Value> {
        None
    }

    fn is_instance(&self) -> bool {
        false
    }
}

impl<T: Subject + ?Sized> Subject for &T {
    fn subject_type(&self) -> &str {
        (**self).subject_type()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        (**self).attribute(name)
    }

    fn is_instance(&self) -> bool {
        (**self).is_instance()
    }
}

/// Dynamic subject: a type name and a JSON object of attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub subject_type: String,
    pub attributes: Map<String, Value>,
}

impl Record {
    /// Non-object `attributes` produce a record without attributes.
    pub fn new(subject_type: impl Into<String>, attributes: Value) -> Self {
        Record {
            subject_type: subject_type.into(),
            attributes: match attributes {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl Subject for Record {
    fn subject_type(&self) -> &str {
        &self.subject_type
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }
}
