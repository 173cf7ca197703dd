//! Validation reporting.
//!
//! Constraint violations are ordinary derived attributes in two families,
//! hard `validationNotes.*` and soft `sanityNotes.*`. The reporter reads
//! them back out of an evaluated store; it never changes the store.

use crate::attr_id::AttrId;
use crate::config::EngineConfig;
use crate::expr::attr_ref;
use crate::rule::{RuleBatch, RuleChain};
use crate::store::AttributeStore;
use serde::Serialize;
use std::fmt;

/// How serious a violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// The character is in an invalid state.
    Validation,
    /// The content looks like an authoring mistake.
    Sanity,
}

/// A truthy validation or sanity attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub attr: AttrId,
    pub severity: Severity,
    /// The rendered note, or the attribute name when it has no template.
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.attr.member(), self.text)
    }
}

/// Collects violations from evaluated stores.
#[derive(Debug, Clone)]
pub struct ValidationReporter {
    validation_family: String,
    sanity_family: String,
}

impl Default for ValidationReporter {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ValidationReporter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            validation_family: config.validation_family.clone(),
            sanity_family: config.sanity_family.clone(),
        }
    }

    /// Every truthy attribute of the two note families, validation first.
    ///
    /// Template slots (`<note>.1`, `<note>.2`, ...) are inputs to a note's
    /// text, not violations, and are skipped.
    pub fn collect(&self, store: &AttributeStore) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (family, severity) in [
            (&self.validation_family, Severity::Validation),
            (&self.sanity_family, Severity::Sanity),
        ] {
            for (member, value) in store.family(family) {
                if is_slot(member) || !value.is_truthy() {
                    continue;
                }
                let attr = AttrId::member_of(family, member);
                let text = store
                    .note(attr.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| attr.to_string());
                violations.push(Violation {
                    attr,
                    severity,
                    text,
                });
            }
        }
        violations
    }

    /// Whether the store has no hard violations.
    pub fn is_valid(&self, store: &AttributeStore) -> bool {
        self.collect(store)
            .iter()
            .all(|v| v.severity != Severity::Validation)
    }
}

fn is_slot(member: &str) -> bool {
    member
        .rsplit_once('.')
        .map(|(_, suffix)| suffix.len() == 1 && suffix.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Rules flagging an over- or under-spent allocation pool.
///
/// `validationNotes.<pool>Allocation` is truthy exactly when the allocated
/// amount exceeds the budget read from `count_attr`, or is negative. Its
/// note reads `"<available> available vs. <allocated> allocated"`.
///
/// `allocated_expr` is any expression, usually the name of a `+`
/// accumulated attribute.
///
/// # Examples
///
/// ```rust
/// use sheetrule::validation::valid_allocation_rules;
///
/// let batch = valid_allocation_rules("generalFeat", "featCount.General", "sumGeneralFeats");
/// assert_eq!(batch.chains().len(), 3);
/// assert_eq!(batch.notes().len(), 1);
/// ```
pub fn valid_allocation_rules(pool: &str, count_attr: &str, allocated_expr: &str) -> RuleBatch {
    allocation_rules_in(
        &EngineConfig::default().validation_family,
        pool,
        count_attr,
        allocated_expr,
    )
}

/// `valid_allocation_rules` for a configured validation family.
pub fn allocation_rules_in(
    family: &str,
    pool: &str,
    count_attr: &str,
    allocated_expr: &str,
) -> RuleBatch {
    let note = AttrId::member_of(family, &format!("{}Allocation", pool));
    let available = format!("{}.1", note);
    let allocated = format!("{}.2", note);

    let mut batch = RuleBatch::new();
    batch
        .chain(
            RuleChain::new(available.as_str())
                .set(count_attr, "source")
                .set("", "0"),
        )
        .chain(
            RuleChain::new(allocated.as_str())
                .set("", allocated_expr)
                .set("", "0"),
        )
        .chain(RuleChain::new(note.clone()).set(
            "",
            &format!(
                "{a} > {c} || {a} < 0 ? 1 : null",
                a = attr_ref(&allocated),
                c = attr_ref(&available)
            ),
        ))
        .note(note, "%1 available vs. %2 allocated");
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use crate::registry::RuleRegistry;
    use crate::resolver::DependencyResolver;

    fn evaluate(batch: RuleBatch, store: &mut AttributeStore) {
        let mut registry = RuleRegistry::new();
        registry.add_batch(None, batch).unwrap();
        let plan = DependencyResolver::resolve(&registry).unwrap();
        Evaluator::default().evaluate_all(&plan, store);
    }

    #[test]
    fn test_over_allocation_is_reported() {
        let mut store = AttributeStore::new();
        store.set("featCount.General", 1);
        store.set("sumGeneralFeats", 2);
        evaluate(
            valid_allocation_rules("generalFeat", "featCount.General", "sumGeneralFeats"),
            &mut store,
        );

        let violations = ValidationReporter::default().collect(&store);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].attr,
            AttrId::from_str("validationNotes.generalFeatAllocation")
        );
        assert_eq!(violations[0].text, "1 available vs. 2 allocated");
        assert_eq!(violations[0].severity, Severity::Validation);
    }

    #[test]
    fn test_within_budget_is_clean() {
        let mut store = AttributeStore::new();
        store.set("featCount.General", 2);
        store.set("sumGeneralFeats", 2);
        evaluate(
            valid_allocation_rules("generalFeat", "featCount.General", "sumGeneralFeats"),
            &mut store,
        );
        assert!(ValidationReporter::default().is_valid(&store));
    }

    #[test]
    fn test_missing_pool_counts_as_zero() {
        let mut store = AttributeStore::new();
        store.set("sumGeneralFeats", 1);
        evaluate(
            valid_allocation_rules("generalFeat", "featCount.General", "sumGeneralFeats"),
            &mut store,
        );
        assert!(!ValidationReporter::default().is_valid(&store));
        assert_eq!(
            store.note("validationNotes.generalFeatAllocation"),
            Some("0 available vs. 1 allocated")
        );
    }

    #[test]
    fn test_negative_allocation_is_reported() {
        let mut store = AttributeStore::new();
        store.set("abilityBoostCount", 4);
        store.set("abilityBoostsAllocated", -1);
        evaluate(
            valid_allocation_rules("abilityBoost", "abilityBoostCount", "abilityBoostsAllocated"),
            &mut store,
        );
        assert!(!ValidationReporter::default().is_valid(&store));
    }

    #[test]
    fn test_sanity_notes_are_soft() {
        let mut store = AttributeStore::new();
        store.set("sanityNotes.toughnessFeat", 1);
        let reporter = ValidationReporter::default();
        let violations = reporter.collect(&store);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Sanity);
        assert_eq!(violations[0].text, "sanityNotes.toughnessFeat");
        assert!(reporter.is_valid(&store));
    }

    #[test]
    fn test_slots_are_not_violations() {
        assert!(is_slot("generalFeatAllocation.1"));
        assert!(!is_slot("generalFeatAllocation"));
        assert!(!is_slot("weapon.Hand.Axe"));
    }
}
