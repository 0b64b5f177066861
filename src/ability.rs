//! Permission checks against a [`CompiledRuleSet`].
//!
//! Precedence: among the rules that apply, the one declared last decides.
//! No applicable rule means deny.

use crate::{CompiledRuleSet, ForbiddenError, Rule, Subject};

impl CompiledRuleSet {
    /// Rule that decides `action` on `subject` (optionally for one `field`).
    ///
    /// `None` means no rule applies and the check is denied by default.
    pub fn relevant_rule_for<S: Subject + ?Sized>(
        &self,
        action: &str,
        subject: &S,
        field: Option<&str>,
    ) -> Option<&Rule> {
        let is_instance = subject.is_instance();
        self.candidates(action, subject.subject_type())
            .into_iter()
            .rev()
            .map(|position| self.rule_at(position))
            .filter(|rule| rule.applies_to_field(field))
            .find(|rule| match &rule.condition {
                None => true,
                // A bare subject type has no attributes to test.
                Some(condition) if !is_instance => condition.is_trivial(),
                Some(condition) => condition.matches(subject),
            })
    }

    fn decide<S: Subject + ?Sized>(&self, action: &str, subject: &S, field: Option<&str>) -> bool {
        let allowed = self
            .relevant_rule_for(action, subject, field)
            .is_some_and(|rule| rule.is_allow() && rule.permits_field(field));
        tracing::trace!(
            action,
            subject_type = subject.subject_type(),
            field,
            allowed,
            "Ability check"
        );
        allowed
    }

    pub fn can<S: Subject + ?Sized>(&self, action: &str, subject: &S) -> bool {
        self.decide(action, subject, None)
    }

    pub fn cannot<S: Subject + ?Sized>(&self, action: &str, subject: &S) -> bool {
        !self.can(action, subject)
    }

    pub fn can_field<S: Subject + ?Sized>(&self, action: &str, subject: &S, field: &str) -> bool {
        self.decide(action, subject, Some(field))
    }

    pub fn cannot_field<S: Subject + ?Sized>(&self, action: &str, subject: &S, field: &str) -> bool {
        !self.can_field(action, subject, field)
    }

    /// Like [`can`][Self::can], but explains a denial.
    pub fn ensure_can<S: Subject + ?Sized>(
        &self,
        action: &str,
        subject: &S,
        field: Option<&str>,
    ) -> Result<(), ForbiddenError> {
        if self.decide(action, subject, field) {
            return Ok(());
        }
        let reason = self
            .relevant_rule_for(action, subject, field)
            .filter(|rule| !rule.is_allow())
            .and_then(|rule| rule.reason.clone());
        Err(ForbiddenError {
            action: action.to_string(),
            subject_type: subject.subject_type().to_string(),
            field: field.map(str::to_string),
            reason,
        })
    }

    /// Subset of `fields` that `action` may touch on `subject`.
    pub fn permitted_fields<'f, S: Subject + ?Sized>(
        &self,
        action: &str,
        subject: &S,
        fields: impl IntoIterator<Item = &'f str>,
    ) -> Vec<&'f str> {
        fields
            .into_iter()
            .filter(|field| self.can_field(action, subject, field))
            .collect()
    }
}

/// Anything that can answer permission checks.
pub trait Authorizer {
    fn authorize(
        &self,
        action: &str,
        subject: &dyn Subject,
        field: Option<&str>,
    ) -> Result<(), ForbiddenError>;

    fn can(&self, action: &str, subject: &dyn Subject) -> bool {
        self.authorize(action, subject, None).is_ok()
    }

    fn cannot(&self, action: &str, subject: &dyn Subject) -> bool {
        !Authorizer::can(self, action, subject)
    }
}

impl Authorizer for CompiledRuleSet {
    fn authorize(
        &self,
        action: &str,
        subject: &dyn Subject,
        field: Option<&str>,
    ) -> Result<(), ForbiddenError> {
        self.ensure_can(action, subject, field)
    }
}

pub const READ: &str = "read";
pub const UPDATE: &str = "update";

/// Subject whose fields are only reachable through permission checks.
///
/// `read` checks the `read` action on the named field, `write` checks `update`.
#[derive(Debug, Clone)]
pub struct Guarded<S> {
    subject: S,
}

impl<S: Subject> Guarded<S> {
    pub fn new(subject: S) -> Self {
        Guarded { subject }
    }

    pub fn read<T>(
        &self,
        ability: &impl Authorizer,
        field: &str,
        accessor: impl FnOnce(&S) -> T,
    ) -> Result<T, ForbiddenError> {
        ability.authorize(READ, &self.subject, Some(field))?;
        Ok(accessor(&self.subject))
    }

    pub fn write<T>(
        &mut self,
        ability: &impl Authorizer,
        field: &str,
        mutator: impl FnOnce(&mut S) -> T,
    ) -> Result<T, ForbiddenError> {
        ability.authorize(UPDATE, &self.subject, Some(field))?;
        Ok(mutator(&mut self.subject))
    }

    /// Bypasses checks. For code that already authorized the whole subject.
    pub fn into_inner(self) -> S {
        self.subject
    }
}
