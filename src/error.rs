use thiserror::Error;

use crate::{CompareOp, Effect};

/// Errors raised while building or installing a rule set.
#[derive(Debug, Error)]
pub enum AbilityError {
    /// A rule violates a structural invariant (empty action list, bad condition tree, ...).
    #[error("invalid rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: RuleViolation },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Structural problem found by [Rule::validate][crate::Rule::validate] or
/// [Condition::validate][crate::Condition::validate].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("rule must name at least one non-empty action")]
    NoActions,

    #[error("rule must name at least one non-empty subject type")]
    NoSubjectTypes,

    #[error("field restriction must list at least one field")]
    EmptyFields,

    #[error("`inverted: {inverted}` contradicts effect `{effect}`")]
    InvertedMismatch { inverted: bool, effect: Effect },

    #[error("`{op}` leaf has an empty field name")]
    EmptyField { op: CompareOp },

    #[error("`{op}` on `{field}` requires an array literal")]
    ExpectedArray { op: CompareOp, field: String },

    #[error("`exists` on `{field}` takes no value")]
    UnexpectedValue { field: String },
}

/// Errors produced by the wire codec.
///
/// Per-rule variants never escape [`decode`][crate::codec::decode]: a bad entry is
/// logged and skipped. They are returned as-is by [`decode_rule`][crate::codec::decode_rule].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("permission payload must be a JSON array")]
    NotAnArray,

    #[error("malformed permission JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("unknown condition operator `{0}`")]
    UnknownOperator(String),

    #[error("malformed condition: {0}")]
    MalformedCondition(String),
}

/// Returned when an action is not permitted.
///
/// `reason` is taken from the deny rule that decided the check, if it carried one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct ForbiddenError {
    pub action: String,
    pub subject_type: String,
    pub field: Option<String>,
    pub reason: Option<String>,
}

impl ForbiddenError {
    pub fn message(&self) -> String {
        if let Some(reason) = &self.reason {
            return reason.clone();
        }
        match &self.field {
            Some(field) => format!(
                "Cannot execute \"{}\" on \"{}\" field \"{}\"",
                self.action, self.subject_type, field
            ),
            None => format!(
                "Cannot execute \"{}\" on \"{}\"",
                self.action, self.subject_type
            ),
        }
    }
}
