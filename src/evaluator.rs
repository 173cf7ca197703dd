//! Evaluator module.
//!
//! Folds every target's rules into a value, in plan order, then renders
//! note templates.

use crate::attr_id::AttrId;
use crate::config::EngineConfig;
use crate::expr::Scope;
use crate::resolver::{EvaluationPlan, TargetPlan};
use crate::rule::{ChainId, RuleOp};
use crate::store::{AttrTable, AttributeStore};
use crate::value::Value;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Read view used while a target is being folded: the table so far, with
/// the target itself reading as its accumulator.
struct PassScope<'a> {
    table: &'a AttrTable,
    current: Option<(&'a AttrId, &'a Value)>,
}

impl Scope for PassScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some((target, acc)) = self.current {
            if target.as_str() == name {
                return (!acc.is_null()).then(|| acc.clone());
            }
        }
        self.table.get(name).cloned()
    }

    fn matching(&self, pattern: &Regex) -> Vec<Value> {
        self.table
            .iter()
            .filter(|(name, _)| pattern.is_match(name))
            .map(|(name, value)| match self.current {
                Some((target, acc)) if target.as_str() == name => acc.clone(),
                _ => value.clone(),
            })
            .collect()
    }
}

/// Computes derived attributes for a store.
///
/// # Examples
///
/// ```rust
/// use sheetrule::evaluator::Evaluator;
/// use sheetrule::registry::RuleRegistry;
/// use sheetrule::resolver::DependencyResolver;
/// use sheetrule::rule::RuleOp;
/// use sheetrule::store::AttributeStore;
/// use sheetrule::Value;
///
/// let mut registry = RuleRegistry::new();
/// registry.add_rule("hitPoints", "levels.Barbarian", RuleOp::Add, "source * 12").unwrap();
/// registry.add_rule("hitPoints", "ancestry", RuleOp::Add, "source == 'Dwarf' ? 10 : 8").unwrap();
/// let plan = DependencyResolver::resolve(&registry).unwrap();
///
/// let mut store = AttributeStore::new();
/// store.set("levels.Barbarian", 2);
/// store.set("ancestry", "Dwarf");
///
/// Evaluator::default().evaluate_all(&plan, &mut store);
/// assert_eq!(store.get("hitPoints"), Some(&Value::from(34)));
/// ```
#[derive(Debug, Clone)]
pub struct Evaluator {
    separator: String,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Evaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            separator: config.note_separator.clone(),
        }
    }

    /// Recompute every derived attribute and note of `store`.
    ///
    /// The values layer is rebuilt from the raw inputs, so evaluating an
    /// unchanged store again yields the same result.
    pub fn evaluate_all(&self, plan: &EvaluationPlan, store: &mut AttributeStore) {
        store.begin_pass();

        for target in plan.targets() {
            let value = self.fold(target, store.values());
            store.put_value(target.target().as_str(), value);
        }

        let mut rendered = Vec::new();
        {
            let scope = PassScope {
                table: store.values(),
                current: None,
            };
            for note in plan.notes() {
                let Some(value) = store.get(note.attr().as_str()) else {
                    continue;
                };
                match note.template().render(note.attr(), value, &scope) {
                    Ok(text) => rendered.push((note.attr().clone(), text)),
                    Err(e) => debug!(note = %note.attr(), error = %e, "note not rendered"),
                }
            }
        }
        for (attr, text) in rendered {
            store.put_note(attr, text);
        }

        store.finish_pass();
        trace!(targets = plan.targets().len(), "evaluation pass complete");
    }

    /// Fold the rules of one target over `table`.
    fn fold(&self, plan: &TargetPlan, table: &AttrTable) -> Value {
        let target = plan.target();
        let mut acc = table.get(target.as_str()).cloned().unwrap_or(Value::Null);
        let mut closed: HashSet<ChainId> = HashSet::new();

        for rule in plan.rules() {
            if closed.contains(&rule.chain()) {
                continue;
            }

            let scope = PassScope {
                table,
                current: Some((target, &acc)),
            };
            let source = match rule.source() {
                None => Value::Null,
                Some(name) => scope.lookup(name.as_str()).unwrap_or(Value::Null),
            };
            if rule.op() != RuleOp::Gate && rule.source().is_some() && !source.is_truthy() {
                continue;
            }

            let result = match rule.expr().evaluate(&scope, &source) {
                Ok(v) => v,
                Err(e) => {
                    debug!(rule = %rule, error = %e, "rule contributed nothing");
                    Value::Null
                }
            };

            match rule.op() {
                RuleOp::Gate => {
                    if !result.is_truthy() {
                        if rule.is_veto() {
                            return Value::Null;
                        }
                        closed.insert(rule.chain());
                    }
                }
                _ if result.is_null() => {}
                RuleOp::Set => {
                    if acc.is_null() {
                        acc = result;
                    }
                }
                RuleOp::Add => acc = self.add(acc, result),
                RuleOp::Max | RuleOp::Min => match numeric(&result) {
                    Some(n) => {
                        let pick = if rule.op() == RuleOp::Max { f64::max } else { f64::min };
                        acc = extremum(acc, n, pick);
                    }
                    None => debug!(rule = %rule, value = %result, "ignoring non-numeric value"),
                },
            }
        }

        acc
    }

    fn add(&self, acc: Value, value: Value) -> Value {
        if acc.is_null() {
            value
        } else if acc.as_text().is_some() || value.as_text().is_some() {
            Value::Text(format!("{}{}{}", acc, self.separator, value))
        } else {
            Value::Number(acc.to_number() + value.to_number())
        }
    }
}

/// Numeric view for `^` and `v`. Text that is not a number has none, so it
/// contributes nothing, the same as `null`.
fn numeric(value: &Value) -> Option<f64> {
    value.as_number().filter(|n| !n.is_nan())
}

fn extremum(acc: Value, value: f64, pick: fn(f64, f64) -> f64) -> Value {
    match numeric(&acc) {
        Some(current) => Value::Number(pick(current, value)),
        None => Value::Number(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RuleRegistry;
    use crate::resolver::DependencyResolver;
    use crate::rule::RuleChain;

    fn evaluate(registry: &RuleRegistry, store: &mut AttributeStore) {
        let plan = DependencyResolver::resolve(registry).unwrap();
        Evaluator::default().evaluate_all(&plan, store);
    }

    #[test]
    fn test_set_only_when_unset() {
        let mut registry = RuleRegistry::new();
        registry
            .add_chain(
                RuleChain::new("level")
                    .set("experience", "floor(source / 1000) + 1")
                    .set("", "1"),
            )
            .unwrap();

        let mut store = AttributeStore::new();
        evaluate(&registry, &mut store);
        assert_eq!(store.get("level"), Some(&Value::from(1)));

        store.set("experience", 4500);
        evaluate(&registry, &mut store);
        assert_eq!(store.get("level"), Some(&Value::from(5)));

        store.set("level", 9);
        evaluate(&registry, &mut store);
        assert_eq!(store.get("level"), Some(&Value::from(9)));
    }

    #[test]
    fn test_falsy_source_skips_rule() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule("features.Toughness", "feats.Toughness", RuleOp::Add, "1")
            .unwrap();
        let mut store = AttributeStore::new();
        store.set("feats.Toughness", 0);
        evaluate(&registry, &mut store);
        assert_eq!(store.get("features.Toughness"), None);
    }

    #[test]
    fn test_max_and_min() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("rank.Perception", "", RuleOp::Max, "1").unwrap();
        registry.add_rule("rank.Perception", "", RuleOp::Max, "3").unwrap();
        registry.add_rule("rank.Perception", "", RuleOp::Max, "2").unwrap();
        registry.add_rule("speed", "", RuleOp::Min, "25").unwrap();
        registry.add_rule("speed", "", RuleOp::Min, "20").unwrap();

        let mut store = AttributeStore::new();
        evaluate(&registry, &mut store);
        assert_eq!(store.get("rank.Perception"), Some(&Value::from(3)));
        assert_eq!(store.get("speed"), Some(&Value::from(20)));
    }

    #[test]
    fn test_max_and_min_ignore_text() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("rank.Stealth", "", RuleOp::Max, "'Expert'").unwrap();
        registry.add_rule("rank.Stealth", "", RuleOp::Max, "1").unwrap();
        registry.add_rule("speed", "", RuleOp::Min, "'2'").unwrap();
        registry.add_rule("speed", "", RuleOp::Min, "'slow'").unwrap();
        registry.add_rule("bulk", "", RuleOp::Max, "'heavy'").unwrap();

        let mut store = AttributeStore::new();
        store.set("speed", "fast");
        evaluate(&registry, &mut store);
        assert_eq!(store.get("rank.Stealth"), Some(&Value::from(1)));
        assert_eq!(store.get("speed"), Some(&Value::from(2)));
        assert_eq!(store.get("bulk"), None);
    }

    #[test]
    fn test_text_concatenates_with_separator() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule("combatNotes.shield", "features.Shield Block", RuleOp::Add, "'Shield Block'")
            .unwrap();
        registry
            .add_rule("combatNotes.shield", "features.Sturdy Shield", RuleOp::Add, "'Sturdy'")
            .unwrap();
        let mut store = AttributeStore::new();
        store.set("features.Shield Block", 1);
        store.set("features.Sturdy Shield", 1);
        evaluate(&registry, &mut store);
        assert_eq!(
            store.get("combatNotes.shield"),
            Some(&Value::from("Shield Block/Sturdy"))
        );
    }

    #[test]
    fn test_scoped_gate_only_closes_its_chain() {
        let mut registry = RuleRegistry::new();
        registry
            .add_chain(
                RuleChain::new("hitPoints")
                    .gate("", "ancestry == 'Dwarf'")
                    .add("", "10"),
            )
            .unwrap();
        registry.add_rule("hitPoints", "", RuleOp::Add, "6").unwrap();

        let mut store = AttributeStore::new();
        store.set("ancestry", "Elf");
        evaluate(&registry, &mut store);
        assert_eq!(store.get("hitPoints"), Some(&Value::from(6)));

        store.set("ancestry", "Dwarf");
        evaluate(&registry, &mut store);
        assert_eq!(store.get("hitPoints"), Some(&Value::from(16)));
    }

    #[test]
    fn test_veto_gate_suppresses_whole_target() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("combatNotes.rage", "", RuleOp::Set, "2").unwrap();
        registry
            .add_rule("combatNotes.rage", "features.Rage", RuleOp::Gate, "source")
            .unwrap();

        let mut store = AttributeStore::new();
        evaluate(&registry, &mut store);
        assert_eq!(store.get("combatNotes.rage"), None);

        store.set("features.Rage", 1);
        evaluate(&registry, &mut store);
        assert_eq!(store.get("combatNotes.rage"), Some(&Value::from(2)));
    }

    #[test]
    fn test_trigger_reads_accumulator() {
        let mut registry = RuleRegistry::new();
        registry
            .add_chain(
                RuleChain::new("hitPoints")
                    .add("level", "source * 8")
                    .add("hitPoints", "source >= 20 ? 5 : null"),
            )
            .unwrap();
        let mut store = AttributeStore::new();
        store.set("level", 3);
        evaluate(&registry, &mut store);
        assert_eq!(store.get("hitPoints"), Some(&Value::from(29)));
    }

    #[test]
    fn test_runtime_error_contributes_nothing() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("ratio", "", RuleOp::Add, "1 / divisor").unwrap();
        registry.add_rule("ratio", "", RuleOp::Add, "3").unwrap();
        let mut store = AttributeStore::new();
        evaluate(&registry, &mut store);
        assert_eq!(store.get("ratio"), Some(&Value::from(3)));
    }

    #[test]
    fn test_notes_rendered_after_values() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule("combatNotes.toughness", "features.Toughness", RuleOp::Set, "source")
            .unwrap();
        registry
            .define_note("combatNotes.toughness", "+%{level} Hit Points")
            .unwrap();
        registry.add_rule("level", "", RuleOp::Set, "5").unwrap();

        let mut store = AttributeStore::new();
        store.set("features.Toughness", 1);
        evaluate(&registry, &mut store);
        assert_eq!(store.note("combatNotes.toughness"), Some("+5 Hit Points"));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("total", "base", RuleOp::Add, "source").unwrap();
        registry.add_rule("total", "", RuleOp::Add, "1").unwrap();
        let mut store = AttributeStore::new();
        store.set("base", 2);

        evaluate(&registry, &mut store);
        let once = store.clone();
        evaluate(&registry, &mut store);
        assert_eq!(store, once);
        assert_eq!(store.get("total"), Some(&Value::from(3)));
    }
}
