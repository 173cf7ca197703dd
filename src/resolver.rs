//! Dependency resolver module.
//!
//! Provides `DependencyResolver`, which turns a `RuleRegistry` into an
//! immutable `EvaluationPlan`: the targets in dependency order, each with
//! its rules, plus the note templates to render afterwards.

use crate::attr_id::AttrId;
use crate::error::RuleError;
use crate::expr::Dependency;
use crate::graph::{EdgeKind, RuleGraph};
use crate::registry::{Note, RuleRegistry};
use crate::rule::Rule;
use std::sync::Arc;
use tracing::{debug, error};

/// One target and the rules that compute it, in declaration order.
#[derive(Debug, Clone)]
pub struct TargetPlan {
    pub(crate) target: AttrId,
    pub(crate) rules: Vec<Arc<Rule>>,
}

impl TargetPlan {
    pub fn target(&self) -> &AttrId {
        &self.target
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }
}

/// A resolved, immutable evaluation order.
///
/// Plans hold no per-character state and are `Send + Sync`, so one plan
/// can evaluate many stores, from many threads.
#[derive(Debug, Clone, Default)]
pub struct EvaluationPlan {
    pub(crate) targets: Vec<TargetPlan>,
    pub(crate) notes: Vec<Arc<Note>>,
    pub(crate) trigger_edges: usize,
}

impl EvaluationPlan {
    /// Targets in evaluation order.
    pub fn targets(&self) -> &[TargetPlan] {
        &self.targets
    }

    /// Target names in evaluation order.
    pub fn order(&self) -> Vec<AttrId> {
        self.targets.iter().map(|t| t.target.clone()).collect()
    }

    /// Position of `target` in the evaluation order.
    pub fn position(&self, target: &AttrId) -> Option<usize> {
        self.targets.iter().position(|t| &t.target == target)
    }

    pub fn notes(&self) -> &[Arc<Note>] {
        &self.notes
    }

    /// Number of rules in the plan.
    pub fn rule_count(&self) -> usize {
        self.targets.iter().map(|t| t.rules.len()).sum()
    }

    /// Number of self-dependencies that were exempted from ordering.
    pub fn trigger_edges(&self) -> usize {
        self.trigger_edges
    }
}

/// Builds evaluation plans.
///
/// Data edges come from each rule's source and from every attribute its
/// expression reads. `sum('re')`/`count('re')` patterns depend on every
/// registered target whose name matches. A rule that reads its own target
/// adds a trigger edge, which never counts as a cycle.
///
/// # Examples
///
/// ```rust
/// use sheetrule::registry::RuleRegistry;
/// use sheetrule::resolver::DependencyResolver;
/// use sheetrule::rule::RuleOp;
/// use sheetrule::{AttrId, RuleError};
///
/// let mut registry = RuleRegistry::new();
/// registry.add_rule("hitPoints", "level", RuleOp::Add, "source * 8").unwrap();
/// registry.add_rule("level", "", RuleOp::Set, "1").unwrap();
///
/// let plan = DependencyResolver::resolve(&registry).unwrap();
/// assert_eq!(
///     plan.order(),
///     vec![AttrId::from_str("level"), AttrId::from_str("hitPoints")]
/// );
///
/// registry.add_rule("level", "hitPoints", RuleOp::Add, "1").unwrap();
/// assert!(matches!(
///     DependencyResolver::resolve(&registry),
///     Err(RuleError::Cycle { .. })
/// ));
/// ```
pub struct DependencyResolver;

impl DependencyResolver {
    /// Build the plan for `registry`, or report the first cycle found.
    pub fn resolve(registry: &RuleRegistry) -> Result<EvaluationPlan, RuleError> {
        let graph = Self::build_graph(registry);
        let order = graph.topological_sort().map_err(|e| {
            error!(error = %e, "rule set contains a dependency cycle");
            e
        })?;

        let targets: Vec<TargetPlan> = order
            .into_iter()
            .filter_map(|target| {
                let rules = registry.rules_for(&target);
                (!rules.is_empty()).then(|| TargetPlan {
                    rules: rules.to_vec(),
                    target,
                })
            })
            .collect();

        let plan = EvaluationPlan {
            targets,
            notes: registry.notes(),
            trigger_edges: graph.edge_count(EdgeKind::Trigger),
        };
        debug!(
            targets = plan.targets.len(),
            rules = plan.rule_count(),
            notes = plan.notes.len(),
            triggers = plan.trigger_edges,
            "built evaluation plan"
        );
        Ok(plan)
    }

    /// Build the dependency graph for every registered rule.
    pub fn build_graph(registry: &RuleRegistry) -> RuleGraph {
        let mut graph = RuleGraph::new();

        for target in registry.targets() {
            if let Some(first) = registry.rules_for(target).first() {
                graph.set_rank(target.clone(), first.seq());
            }
        }

        for rule in registry.rules() {
            let target = rule.target();
            if let Some(source) = rule.source() {
                graph.add_edge(target.clone(), source.clone(), EdgeKind::Data);
            }
            for dependency in rule.expr().dependencies() {
                match dependency {
                    Dependency::Attr(id) => graph.add_edge(target.clone(), id, EdgeKind::Data),
                    Dependency::Pattern(pattern) => {
                        for other in registry.targets() {
                            if pattern.is_match(other.as_str()) {
                                graph.add_edge(target.clone(), other.clone(), EdgeKind::Data);
                            }
                        }
                    }
                }
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleChain, RuleOp};

    fn id(name: &str) -> AttrId {
        AttrId::from_str(name)
    }

    #[test]
    fn test_plan_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EvaluationPlan>();
    }

    #[test]
    fn test_expression_reads_are_dependencies() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule("featureNotes.ancestryFeats", "", RuleOp::Set, "floor((level + 3) / 4)")
            .unwrap();
        registry.add_rule("level", "", RuleOp::Set, "1").unwrap();

        let plan = DependencyResolver::resolve(&registry).unwrap();
        assert!(
            plan.position(&id("level")).unwrap()
                < plan.position(&id("featureNotes.ancestryFeats")).unwrap()
        );
    }

    #[test]
    fn test_pattern_dependencies() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule("featTotal", "", RuleOp::Set, "count('^feats\\.')")
            .unwrap();
        registry
            .add_rule("feats.Toughness", "", RuleOp::Set, "1")
            .unwrap();

        let plan = DependencyResolver::resolve(&registry).unwrap();
        assert_eq!(plan.order(), vec![id("feats.Toughness"), id("featTotal")]);
    }

    #[test]
    fn test_independent_targets_keep_declaration_order() {
        let mut registry = RuleRegistry::new();
        for name in ["z", "m", "a"] {
            registry.add_rule(name, "", RuleOp::Set, "1").unwrap();
        }
        let plan = DependencyResolver::resolve(&registry).unwrap();
        assert_eq!(plan.order(), vec![id("z"), id("m"), id("a")]);
    }

    #[test]
    fn test_trigger_rule_is_not_a_cycle() {
        let mut registry = RuleRegistry::new();
        registry
            .add_chain(
                RuleChain::new("hitPoints")
                    .add("level", "source * 8")
                    .add("hitPoints", "source >= 100 ? 10 : null"),
            )
            .unwrap();

        let plan = DependencyResolver::resolve(&registry).unwrap();
        assert_eq!(plan.trigger_edges(), 1);
        assert_eq!(plan.order(), vec![id("hitPoints")]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("A", "B", RuleOp::Set, "source").unwrap();
        registry.add_rule("B", "A", RuleOp::Set, "source").unwrap();

        match DependencyResolver::resolve(&registry) {
            Err(RuleError::Cycle { path }) => {
                assert_eq!(path, vec![id("A"), id("B"), id("A")]);
            }
            other => panic!("Expected cycle, got {:?}", other.map(|p| p.order())),
        }
    }

    #[test]
    fn test_inputs_are_not_planned() {
        let mut registry = RuleRegistry::new();
        registry
            .add_rule("features.Toughness", "feats.Toughness", RuleOp::Add, "source")
            .unwrap();
        let plan = DependencyResolver::resolve(&registry).unwrap();
        assert_eq!(plan.order(), vec![id("features.Toughness")]);
    }
}
