//! Rule engine module.
//!
//! Provides `RuleEngine`, the entry point that ties the registry, choice
//! catalog, resolver and evaluator together and caches the evaluation
//! plan until the rule set changes.

use crate::attr_id::AttrId;
use crate::choice::{compile, ChoiceCatalog, ChoiceCategory, ChoiceKey, ChoicePool, EncodedAttributes};
use crate::config::EngineConfig;
use crate::error::RuleError;
use crate::evaluator::Evaluator;
use crate::registry::RuleRegistry;
use crate::resolver::{DependencyResolver, EvaluationPlan};
use crate::rule::{RuleBatch, RuleChain, RuleOp};
use crate::store::AttributeStore;
use crate::validation::{allocation_rules_in, ValidationReporter, Violation};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns a rule set and evaluates attribute stores against it.
///
/// The evaluation plan is built on first use and cached; registering or
/// removing rules or choices invalidates it. A cycle is reported once per
/// build and then returned from the cache until the rule set changes.
///
/// # Examples
///
/// ```rust
/// use sheetrule::*;
/// use sheetrule::choice::ChoiceCategory;
///
/// let mut engine = RuleEngine::new();
/// engine.register_choice(ChoiceCategory::Feats, "Toughness", "Traits=General").unwrap();
/// engine
///     .register_choice(
///         ChoiceCategory::Features,
///         "Toughness",
///         r#"Section=combat Note="+%{level} Hit Points""#,
///     )
///     .unwrap();
///
/// let mut store = AttributeStore::new();
/// store.set("level", 5);
/// store.set("feats.Toughness", 1);
/// engine.evaluate_all(&mut store).unwrap();
///
/// assert_eq!(store.get("sumGeneralFeats"), Some(&Value::from(1)));
/// assert_eq!(store.note("combatNotes.toughness"), Some("+5 Hit Points"));
/// ```
#[derive(Debug, Default)]
pub struct RuleEngine {
    config: EngineConfig,
    registry: RuleRegistry,
    catalog: ChoiceCatalog,

    /// Choice pools whose allocation rules are already registered.
    pools: BTreeSet<ChoicePool>,

    /// Cached plan, or the error the last build failed with.
    plan: Option<Result<Arc<EvaluationPlan>, RuleError>>,
}

impl RuleEngine {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with `config`, rejecting unusable configurations.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sheetrule::{EngineConfig, RuleEngine};
    ///
    /// let config = EngineConfig::from_json(r#"{ "note_separator": ", " }"#).unwrap();
    /// let engine = RuleEngine::with_config(config).unwrap();
    /// assert_eq!(engine.config().note_separator, ", ");
    /// ```
    pub fn with_config(config: EngineConfig) -> Result<Self, RuleError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Add a single unowned rule.
    ///
    /// # Arguments
    ///
    /// * `target` - The attribute the rule contributes to
    /// * `source` - The attribute bound to `source`; empty for constant rules
    /// * `op` - How the value folds into the target
    /// * `expr` - The value expression
    pub fn add_rule(
        &mut self,
        target: impl Into<AttrId>,
        source: &str,
        op: RuleOp,
        expr: &str,
    ) -> Result<(), RuleError> {
        self.registry.add_rule(target, source, op, expr)?;
        self.invalidate();
        Ok(())
    }

    /// Add an unowned chain of rules for one target.
    pub fn add_chain(&mut self, chain: RuleChain) -> Result<(), RuleError> {
        self.registry.add_chain(chain)?;
        self.invalidate();
        Ok(())
    }

    /// Add an unowned batch of chains and notes.
    pub fn add_batch(&mut self, batch: RuleBatch) -> Result<usize, RuleError> {
        let added = self.registry.add_batch(None, batch)?;
        self.invalidate();
        Ok(added)
    }

    /// Register the note template of `attr`.
    pub fn define_note(&mut self, attr: impl Into<AttrId>, template: &str) -> Result<(), RuleError> {
        self.registry.define_note(attr, template)?;
        self.invalidate();
        Ok(())
    }

    /// Register validation that `allocated_expr` stays within the budget
    /// held by `count_attr`.
    ///
    /// See [`crate::validation::valid_allocation_rules`].
    pub fn valid_allocation_rules(
        &mut self,
        pool: &str,
        count_attr: &str,
        allocated_expr: &str,
    ) -> Result<(), RuleError> {
        let batch = allocation_rules_in(
            &self.config.validation_family,
            pool,
            count_attr,
            allocated_expr,
        );
        self.add_batch(batch).map(|_| ())
    }

    /// Compile and register a choice, replacing any earlier registration
    /// of the same name. Returns the number of rules registered.
    ///
    /// On error nothing changes: a previous registration stays in effect.
    pub fn register_choice(
        &mut self,
        category: ChoiceCategory,
        name: &str,
        encoded: &str,
    ) -> Result<usize, RuleError> {
        let key = ChoiceKey::new(category, name);
        let added = self.install(&key, encoded)?;
        self.catalog.insert(&key, encoded);
        Ok(added)
    }

    /// Register a choice as shipped content. A later `register_choice` of
    /// the same name overrides it; `remove_choice` restores it.
    pub fn register_default_choice(
        &mut self,
        category: ChoiceCategory,
        name: &str,
        encoded: &str,
    ) -> Result<usize, RuleError> {
        let added = self.register_choice(category, name, encoded)?;
        self.catalog
            .set_default(&ChoiceKey::new(category, name), encoded);
        Ok(added)
    }

    /// Register many choices of one category.
    ///
    /// Failures are logged and skipped, unless
    /// [`EngineConfig::strict_registration`] is set, in which case the
    /// first failure is returned. Returns the number of choices registered.
    pub fn register_choices<'a>(
        &mut self,
        category: ChoiceCategory,
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<usize, RuleError> {
        let mut registered = 0;
        for (name, encoded) in entries {
            match self.register_choice(category, name, encoded) {
                Ok(_) => registered += 1,
                Err(e) if self.config.strict_registration => return Err(e),
                Err(e) => warn!(category = %category, name, error = %e, "skipping choice"),
            }
        }
        Ok(registered)
    }

    /// Remove a choice and its rules.
    ///
    /// When the choice overrode a default, the default is registered again.
    /// Returns whether the choice was registered.
    pub fn remove_choice(&mut self, category: ChoiceCategory, name: &str) -> bool {
        let key = ChoiceKey::new(category, name);
        let Some(current) = self.catalog.remove(&key) else {
            return false;
        };
        let removed = self.registry.remove_owner(&key);
        self.invalidate();
        debug!(choice = %key, rules = removed, "removed choice");

        if let Some(default) = self.catalog.default_for(&key).map(str::to_string) {
            if default != current {
                match self.install(&key, &default) {
                    Ok(_) => {
                        self.catalog.insert(&key, &default);
                    }
                    Err(e) => warn!(choice = %key, error = %e, "could not restore default"),
                }
                return true;
            }
            self.catalog.remove_default(&key);
        }
        true
    }

    /// `name -> encoded attributes` of every registered choice in `category`.
    pub fn choices(&self, category: ChoiceCategory) -> BTreeMap<String, String> {
        self.catalog.choices(category)
    }

    /// Build (or fetch the cached) evaluation plan.
    pub fn build(&mut self) -> Result<Arc<EvaluationPlan>, RuleError> {
        if let Some(cached) = &self.plan {
            return cached.clone();
        }
        let built = DependencyResolver::resolve(&self.registry).map(Arc::new);
        self.plan = Some(built.clone());
        built
    }

    /// Recompute all derived attributes and notes of `store`.
    pub fn evaluate_all(&mut self, store: &mut AttributeStore) -> Result<(), RuleError> {
        let plan = self.build()?;
        self.evaluator().evaluate_all(&plan, store);
        Ok(())
    }

    /// An evaluator configured like this engine, for use with a shared plan.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(&self.config)
    }

    /// Violations present in an evaluated `store`.
    pub fn validation_report(&self, store: &AttributeStore) -> Vec<Violation> {
        ValidationReporter::new(&self.config).collect(store)
    }

    fn install(&mut self, key: &ChoiceKey, encoded: &str) -> Result<usize, RuleError> {
        let compiled = EncodedAttributes::parse(key.name(), encoded)
            .and_then(|attrs| compile(key, &attrs, &self.config))
            .map_err(|e| {
                warn!(choice = %key, error = %e, "rejecting choice");
                e
            })?;

        let added = self.registry.replace_owned(key, compiled.batch)?;
        for pool in compiled.pools {
            if self.pools.contains(&pool) {
                continue;
            }
            self.registry
                .add_batch(None, pool.allocation_rules(&self.config.validation_family))?;
            self.pools.insert(pool);
        }
        self.invalidate();
        debug!(choice = %key, rules = added, "registered choice");
        Ok(added)
    }

    fn invalidate(&mut self) {
        self.plan = None;
    }
}
