use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{AbilityError, Rule};

pub const MANAGE: &str = "manage";
pub const ALL: &str = "all";

/// Names of the wildcard action and subject type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSetOptions {
    /// Action that stands for every action. Defaults to `manage`.
    pub any_action: String,
    /// Subject type that stands for every subject type. Defaults to `all`.
    pub any_subject_type: String,
}

impl Default for RuleSetOptions {
    fn default() -> Self {
        RuleSetOptions {
            any_action: MANAGE.to_string(),
            any_subject_type: ALL.to_string(),
        }
    }
}

/// Ordered rule list plus an `(action, subject type)` index over it.
///
/// Buckets hold rule positions in declaration order, so merging a few buckets and
/// sorting by position reproduces the original precedence.
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    rules: Vec<Rule>,
    index: HashMap<(String, String), Vec<usize>>,
    options: RuleSetOptions,
}

impl CompiledRuleSet {
    /// Deny-all set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn empty_with(options: RuleSetOptions) -> Self {
        CompiledRuleSet {
            options,
            ..Default::default()
        }
    }

    pub fn compile(rules: Vec<Rule>) -> Result<Self, AbilityError> {
        Self::compile_with(rules, RuleSetOptions::default())
    }

    pub fn compile_with(rules: Vec<Rule>, options: RuleSetOptions) -> Result<Self, AbilityError> {
        let mut index: HashMap<(String, String), Vec<usize>> = HashMap::new();

        for (position, rule) in rules.iter().enumerate() {
            rule.validate()
                .map_err(|reason| AbilityError::InvalidRule { index: position, reason })?;

            for action in &rule.actions {
                for subject_type in &rule.subject_types {
                    index
                        .entry((action.clone(), subject_type.clone()))
                        .or_default()
                        .push(position);
                }
            }
        }

        tracing::debug!(
            rules = rules.len(),
            buckets = index.len(),
            "Compiled ability rules"
        );

        Ok(CompiledRuleSet {
            rules,
            index,
            options,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    pub fn options(&self) -> &RuleSetOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Positions of every rule that could apply to `(action, subject_type)`,
    /// wildcards included, deduplicated and in declaration order.
    pub(crate) fn candidates(&self, action: &str, subject_type: &str) -> Vec<usize> {
        let any_action = self.options.any_action.as_str();
        let any_subject = self.options.any_subject_type.as_str();
        let keys = [
            (action, subject_type),
            (action, any_subject),
            (any_action, subject_type),
            (any_action, any_subject),
        ];

        let mut positions = Vec::new();
        for (i, (a, s)) in keys.iter().enumerate() {
            // `action` may itself be a wildcard name; skip keys already visited.
            if keys[..i].contains(&(*a, *s)) {
                continue;
            }
            if let Some(bucket) = self.index.get(&(a.to_string(), s.to_string())) {
                positions.extend_from_slice(bucket);
            }
        }
        positions.sort_unstable();
        positions.dedup();
        positions
    }

    pub(crate) fn rule_at(&self, position: usize) -> &Rule {
        &self.rules[position]
    }

    /// Rules that could apply to `(action, subject_type)` before conditions are
    /// evaluated, in declaration order.
    pub fn rules_for(&self, action: &str, subject_type: &str) -> Vec<&Rule> {
        self.candidates(action, subject_type)
            .into_iter()
            .map(|position| self.rule_at(position))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn bucket(&self, action: &str, subject_type: &str) -> Option<&[usize]> {
        self.index
            .get(&(action.to_string(), subject_type.to_string()))
            .map(Vec::as_slice)
    }
}
