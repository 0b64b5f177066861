use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{Condition, RuleViolation};

/// One name or a list of names: `"read"`, `["read", "update"]`, `vec![...]`.
pub trait IntoNames {
    fn into_names(self) -> BTreeSet<String>;
}

impl IntoNames for &str {
    fn into_names(self) -> BTreeSet<String> {
        BTreeSet::from([self.to_string()])
    }
}

impl IntoNames for String {
    fn into_names(self) -> BTreeSet<String> {
        BTreeSet::from([self])
    }
}

impl<T: Into<String>, const N: usize> IntoNames for [T; N] {
    fn into_names(self) -> BTreeSet<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String>> IntoNames for Vec<T> {
    fn into_names(self) -> BTreeSet<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl IntoNames for &[&str] {
    fn into_names(self) -> BTreeSet<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl IntoNames for BTreeSet<String> {
    fn into_names(self) -> BTreeSet<String> {
        self
    }
}

/// Outcome a rule grants when it decides a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Deny => f.write_str("deny"),
        }
    }
}

/// Single allow/deny statement.
///
/// `inverted` mirrors `effect == Deny`; both are kept because rule payloads in the
/// wild use either spelling. [`CompiledRuleSet::compile`][crate::CompiledRuleSet::compile]
/// rejects rules where the two disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "crate::codec::WireRule")]
#[serde(into = "crate::codec::WireRule")]
pub struct Rule {
    pub effect: Effect,
    pub actions: BTreeSet<String>,
    pub subject_types: BTreeSet<String>,
    pub condition: Option<Condition>,
    pub fields: Option<BTreeSet<String>>,
    pub inverted: bool,
    pub reason: Option<String>,
}

impl Rule {
    pub fn new(effect: Effect, actions: impl IntoNames, subject_types: impl IntoNames) -> Self {
        Rule {
            effect,
            actions: actions.into_names(),
            subject_types: subject_types.into_names(),
            condition: None,
            fields: None,
            inverted: effect == Effect::Deny,
            reason: None,
        }
    }

    pub fn allow(actions: impl IntoNames, subject_types: impl IntoNames) -> Self {
        Self::new(Effect::Allow, actions, subject_types)
    }

    pub fn deny(actions: impl IntoNames, subject_types: impl IntoNames) -> Self {
        Self::new(Effect::Deny, actions, subject_types)
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn on_fields(mut self, fields: impl IntoNames) -> Self {
        self.fields = Some(fields.into_names());
        self
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_allow(&self) -> bool {
        self.effect == Effect::Allow
    }

    /// `true` when the rule's condition has to read subject attributes.
    pub fn is_conditional(&self) -> bool {
        self.condition.as_ref().is_some_and(|c| !c.is_trivial())
    }

    /// Whether the rule takes part in a check that names `field` (or none).
    ///
    /// Allow rules always take part; their field list is applied to the winner.
    /// A field-scoped deny only blocks the fields it lists.
    pub fn applies_to_field(&self, field: Option<&str>) -> bool {
        match (&self.fields, self.effect) {
            (None, _) | (Some(_), Effect::Allow) => true,
            (Some(fields), Effect::Deny) => field.is_some_and(|f| fields.contains(f)),
        }
    }

    /// Whether an allow rule's field list admits `field`.
    pub fn permits_field(&self, field: Option<&str>) -> bool {
        match (&self.fields, field) {
            (Some(fields), Some(field)) => fields.contains(field),
            _ => true,
        }
    }

    /// Structural invariants checked at compile time.
    pub fn validate(&self) -> Result<(), RuleViolation> {
        if self.actions.is_empty() || self.actions.iter().any(String::is_empty) {
            return Err(RuleViolation::NoActions);
        }
        if self.subject_types.is_empty() || self.subject_types.iter().any(String::is_empty) {
            return Err(RuleViolation::NoSubjectTypes);
        }
        if self.fields.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err(RuleViolation::EmptyFields);
        }
        if self.inverted != (self.effect == Effect::Deny) {
            return Err(RuleViolation::InvertedMismatch {
                inverted: self.inverted,
                effect: self.effect,
            });
        }
        if let Some(condition) = &self.condition {
            condition.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        write!(
            f,
            "{} {{{}}} on {{{}}}",
            self.effect,
            join(&self.actions),
            join(&self.subject_types)
        )?;
        if let Some(fields) = &self.fields {
            write!(f, " fields {{{}}}", join(fields))?;
        }
        if self.condition.is_some() {
            f.write_str(" if <condition>")?;
        }
        Ok(())
    }
}
