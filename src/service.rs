use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    AbilityError, Authorizer, CompiledRuleSet, ForbiddenError, Rule, RuleSetOptions, Subject, codec,
};

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [ReactiveAbility::observe], used to unregister the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// ReactiveAbility - holds the current [CompiledRuleSet] for one signed-in actor and
/// answers permission checks against it with [.can()][ReactiveAbility#method.can].
///
/// The rule set is replaced wholesale by [.update()][ReactiveAbility#method.update] or
/// [.clear()][ReactiveAbility#method.clear]: the new set is compiled and swapped in
/// atomically under the writer lock, then observers are told that something changed.
/// Readers never lock.
pub struct ReactiveAbility {
    current: ArcSwap<CompiledRuleSet>,
    options: RuleSetOptions,
    // Held from compile to swap so updates land in the order they were issued.
    writer: Mutex<()>,
    // Number of installs so far; 0 until the first update or clear.
    installs: watch::Sender<u64>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

/// ReactiveAbilityBuilder - used when you create a [ReactiveAbility] with non-default
/// wildcard names, an initial rule list or observers registered up front.
#[derive(Default)]
pub struct ReactiveAbilityBuilder {
    options: RuleSetOptions,
    initial_rules: Option<Vec<Rule>>,
    observers: Vec<Observer>,
}

impl ReactiveAbilityBuilder {
    pub fn options(&mut self, options: RuleSetOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Rules installed by [build][Self::build]. Without them the ability starts
    /// uninstalled and deny-all.
    pub fn initial_rules(&mut self, rules: Vec<Rule>) -> &mut Self {
        self.initial_rules = Some(rules);
        self
    }

    pub fn observer(&mut self, callback: impl Fn() + Send + Sync + 'static) -> &mut Self {
        self.observers.push(Arc::new(callback));
        self
    }

    pub fn build(&mut self) -> Result<ReactiveAbility, AbilityError> {
        let ability = ReactiveAbility::with_options(self.options.clone());
        for callback in self.observers.drain(..) {
            ability.register(callback);
        }
        if let Some(rules) = self.initial_rules.take() {
            ability.update(rules)?;
        }
        Ok(ability)
    }
}

/// Collects a new rule list and installs it into a [ReactiveAbility] in one step.
pub struct AbilityUpdater {
    rules: Vec<Rule>,
}

impl AbilityUpdater {
    /// Appends one rule. Appended rules take precedence over earlier ones.
    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Appends multiple rules from `Vec<Rule>`
    pub fn load_rules(&mut self, rules: Vec<Rule>) -> &mut Self {
        self.rules.extend(rules);
        self
    }

    /// Drops every collected rule matching `predicate`.
    pub fn remove_where(&mut self, predicate: impl Fn(&Rule) -> bool) -> &mut Self {
        self.rules.retain(|rule| !predicate(rule));
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn update(&self, ability: &ReactiveAbility) -> Result<(), AbilityError> {
        ability.update(self.rules.clone())
    }
}

impl Default for ReactiveAbility {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveAbility {
    /// Empty, deny-all ability with `manage` / `all` wildcards.
    pub fn new() -> Self {
        Self::with_options(RuleSetOptions::default())
    }

    pub fn with_options(options: RuleSetOptions) -> Self {
        let (installs, _) = watch::channel(0);
        ReactiveAbility {
            current: ArcSwap::from_pointee(CompiledRuleSet::empty_with(options.clone())),
            options,
            writer: Mutex::new(()),
            installs,
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
        }
    }

    /// Creates builder ([ReactiveAbilityBuilder]) for [ReactiveAbility]
    pub fn builder() -> ReactiveAbilityBuilder {
        ReactiveAbilityBuilder::default()
    }

    /// Creates clean updater ([AbilityUpdater]) for replacing the rules at runtime.
    pub fn updater_clean(&self) -> AbilityUpdater {
        AbilityUpdater { rules: Vec::new() }
    }

    /// Creates updater ([AbilityUpdater]) holding a copy of the current rules,
    /// handy when only a few rules should be appended or removed.
    pub fn updater_copy(&self) -> AbilityUpdater {
        AbilityUpdater {
            rules: self.current.load().rules().to_vec(),
        }
    }

    /// Compile `rules` and install them in place of the current set.
    ///
    /// On error the current set stays installed and nobody is notified.
    pub fn update(&self, rules: Vec<Rule>) -> Result<(), AbilityError> {
        let writer = self.lock_writer();
        let compiled = CompiledRuleSet::compile_with(rules, self.options.clone())?;
        self.install(writer, compiled);
        Ok(())
    }

    /// Decode a wire payload with [codec::decode] and install the result.
    pub fn update_from_json(&self, payload: &Value) -> Result<(), AbilityError> {
        self.update(codec::decode(payload)?)
    }

    /// Install the empty, deny-all set. Used at sign-out.
    pub fn clear(&self) {
        let writer = self.lock_writer();
        self.install(writer, CompiledRuleSet::empty_with(self.options.clone()));
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn install(&self, writer: MutexGuard<'_, ()>, compiled: CompiledRuleSet) {
        let rules = compiled.len();
        self.current.store(Arc::new(compiled));
        let mut installs = 0;
        self.installs.send_modify(|count| {
            *count += 1;
            installs = *count;
        });
        drop(writer);
        tracing::info!(rules, installs, "Installed ability rules");
        self.notify();
    }

    fn notify(&self) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in observers {
            callback();
        }
    }

    /// Current rule set. Holding the returned `Arc` gives a stable view for a batch of checks.
    pub fn snapshot(&self) -> Arc<CompiledRuleSet> {
        self.current.load_full()
    }

    /// `true` once any rule set (possibly empty) has been installed.
    pub fn is_installed(&self) -> bool {
        *self.installs.borrow() > 0
    }

    pub fn can<S: Subject + ?Sized>(&self, action: &str, subject: &S) -> bool {
        self.current.load().can(action, subject)
    }

    pub fn cannot<S: Subject + ?Sized>(&self, action: &str, subject: &S) -> bool {
        !self.can(action, subject)
    }

    pub fn can_field<S: Subject + ?Sized>(&self, action: &str, subject: &S, field: &str) -> bool {
        self.current.load().can_field(action, subject, field)
    }

    pub fn ensure_can<S: Subject + ?Sized>(
        &self,
        action: &str,
        subject: &S,
        field: Option<&str>,
    ) -> Result<(), ForbiddenError> {
        self.current.load().ensure_can(action, subject, field)
    }

    /// Waits for the first install, then answers like [can][Self::can].
    pub async fn can_async<S: Subject + ?Sized>(&self, action: &str, subject: &S) -> bool {
        self.installed().await;
        self.can(action, subject)
    }

    /// Resolves once a rule set has been installed.
    pub async fn installed(&self) {
        let mut installs = self.installs.subscribe();
        // The sender lives in `self`, so the channel can't close while we wait.
        let _ = installs.wait_for(|installs| *installs > 0).await;
    }

    /// Channel-based change feed. Every install after this call is reported.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            installs: self.installs.subscribe(),
        }
    }

    /// Registers a callback run after every install. Callbacks receive no payload;
    /// they re-query the ability for whatever they care about.
    pub fn observe(&self, callback: impl Fn() + Send + Sync + 'static) -> ObserverId {
        self.register(Arc::new(callback))
    }

    fn register(&self, callback: Observer) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, callback));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        observers.len() != before
    }
}

impl Authorizer for ReactiveAbility {
    fn authorize(
        &self,
        action: &str,
        subject: &dyn Subject,
        field: Option<&str>,
    ) -> Result<(), ForbiddenError> {
        self.ensure_can(action, subject, field)
    }
}

/// Change feed from [ReactiveAbility::subscribe].
pub struct Subscription {
    installs: watch::Receiver<u64>,
}

impl Subscription {
    /// Waits for the next install. Several installs that happen before this is
    /// polled collapse into one notification. Returns `false` once the ability is gone.
    pub async fn changed(&mut self) -> bool {
        self.installs.changed().await.is_ok()
    }

    /// Whether an install happened that this subscription hasn't seen yet.
    pub fn has_changed(&self) -> bool {
        self.installs.has_changed().unwrap_or(false)
    }
}
