use crate::{AbilityError, CompiledRuleSet, Condition, IntoNames, Rule, RuleSetOptions};

/// AbilityBuilder - collects rules with `can` / `cannot` in declaration order.
///
/// `when`, `fields` and `because` refine the rule added last.
///
/// ```
/// use abilitycrab::*;
///
/// let mut builder = AbilityBuilder::new();
/// builder
///     .can("read", "household")
///     .can(["update", "delete"], "household")
///     .when(Condition::eq("role", "owner"))
///     .cannot("delete", "household")
///     .because("Households can't be deleted from the app");
///
/// let rules = builder.build().unwrap();
/// let owner = Record::new("household", serde_json::json!({ "role": "owner" }));
/// assert!(rules.can("update", &owner));
/// assert!(rules.cannot("delete", &owner));
/// ```
#[derive(Debug, Default, Clone)]
pub struct AbilityBuilder {
    rules: Vec<Rule>,
    options: RuleSetOptions,
}

impl AbilityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RuleSetOptions) -> Self {
        AbilityBuilder {
            rules: Vec::new(),
            options,
        }
    }

    pub fn can(&mut self, actions: impl IntoNames, subject_types: impl IntoNames) -> &mut Self {
        self.rules.push(Rule::allow(actions, subject_types));
        self
    }

    pub fn cannot(&mut self, actions: impl IntoNames, subject_types: impl IntoNames) -> &mut Self {
        self.rules.push(Rule::deny(actions, subject_types));
        self
    }

    pub fn when(&mut self, condition: Condition) -> &mut Self {
        self.refine_last(|rule| rule.when(condition))
    }

    pub fn fields(&mut self, fields: impl IntoNames) -> &mut Self {
        self.refine_last(|rule| rule.on_fields(fields))
    }

    pub fn because(&mut self, reason: impl Into<String>) -> &mut Self {
        self.refine_last(|rule| rule.because(reason))
    }

    /// Appends an already built rule.
    pub fn rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    // No-op before the first `can` / `cannot`.
    fn refine_last(&mut self, refine: impl FnOnce(Rule) -> Rule) -> &mut Self {
        if let Some(last) = self.rules.pop() {
            self.rules.push(refine(last));
        }
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    pub fn build(&self) -> Result<CompiledRuleSet, AbilityError> {
        CompiledRuleSet::compile_with(self.rules.clone(), self.options.clone())
    }
}
