//! Rule registry module.
//!
//! Provides the `RuleRegistry` type, which accumulates rules and note
//! templates in declaration order and tracks which choice owns them.

use crate::attr_id::AttrId;
use crate::choice::ChoiceKey;
use crate::error::RuleError;
use crate::expr::ValueExpr;
use crate::rule::{ChainId, Rule, RuleBatch, RuleChain, RuleOp};
use crate::template::NoteTemplate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A registered note template.
#[derive(Debug, Clone)]
pub struct Note {
    pub(crate) attr: AttrId,
    pub(crate) template: NoteTemplate,
    pub(crate) seq: u64,
    pub(crate) owner: Option<ChoiceKey>,
}

impl Note {
    pub fn attr(&self) -> &AttrId {
        &self.attr
    }

    pub fn template(&self) -> &NoteTemplate {
        &self.template
    }

    pub fn owner(&self) -> Option<&ChoiceKey> {
        self.owner.as_ref()
    }
}

/// Accumulates `(target, source, op, expr)` rules in stable declaration
/// order, grouped by target.
///
/// Expressions are parsed when rules are added, so a registry never holds
/// a rule it cannot evaluate.
///
/// # Examples
///
/// ```rust
/// use sheetrule::registry::RuleRegistry;
/// use sheetrule::rule::RuleOp;
/// use sheetrule::AttrId;
///
/// let mut registry = RuleRegistry::new();
/// registry.add_rule("hitPoints", "levels.Barbarian", RuleOp::Add, "source * 12").unwrap();
/// registry.add_rule("hitPoints", "", RuleOp::Add, "8").unwrap();
///
/// assert_eq!(registry.len(), 2);
/// assert_eq!(registry.rules_for(&AttrId::from_str("hitPoints")).len(), 2);
/// assert!(registry.add_rule("hitPoints", "", RuleOp::Add, "8 +").is_err());
/// ```
#[derive(Debug, Default)]
pub struct RuleRegistry {
    /// All rules, ordered by sequence number.
    rules: Vec<Arc<Rule>>,

    /// Rules per target, each list ordered by sequence number.
    by_target: HashMap<AttrId, Vec<Arc<Rule>>>,

    /// Targets in order of their first declaration.
    target_order: Vec<AttrId>,

    /// Templates per attribute, one per owner, the latest last. The latest
    /// is the one rendered.
    notes: HashMap<AttrId, Vec<Arc<Note>>>,

    next_seq: u64,
    next_chain: u64,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single rule. An empty `source` declares a constant rule.
    pub fn add_rule(
        &mut self,
        target: impl Into<AttrId>,
        source: &str,
        op: RuleOp,
        expr: &str,
    ) -> Result<(), RuleError> {
        self.add_chain(RuleChain::new(target).rule(source, op, expr))
    }

    /// Add all rules of a chain, or none if any expression is malformed.
    pub fn add_chain(&mut self, chain: RuleChain) -> Result<(), RuleError> {
        let mut batch = RuleBatch::new();
        batch.chain(chain);
        self.add_batch(None, batch).map(|_| ())
    }

    /// Register an unowned note template for `attr`, replacing any earlier
    /// unowned one.
    pub fn define_note(&mut self, attr: impl Into<AttrId>, template: &str) -> Result<(), RuleError> {
        let mut batch = RuleBatch::new();
        batch.note(attr, template);
        self.add_batch(None, batch).map(|_| ())
    }

    /// Parse and insert a batch, attributing it to `owner`.
    ///
    /// Every expression and template is parsed before anything is inserted;
    /// on error the registry is unchanged. Returns the number of rules
    /// added.
    pub fn add_batch(
        &mut self,
        owner: Option<ChoiceKey>,
        batch: RuleBatch,
    ) -> Result<usize, RuleError> {
        let parsed = parse_batch(&batch).map_err(|e| {
            warn!(owner = ?owner, error = %e, "rejecting rule batch");
            e
        })?;
        Ok(self.insert_parsed(owner, parsed))
    }

    /// Replace everything owned by `owner` with `batch`.
    ///
    /// The new batch is parsed first, so a malformed batch leaves the
    /// previous registration in place.
    pub fn replace_owned(&mut self, owner: &ChoiceKey, batch: RuleBatch) -> Result<usize, RuleError> {
        let parsed = parse_batch(&batch).map_err(|e| {
            warn!(owner = %owner, error = %e, "rejecting rule batch");
            e
        })?;
        self.remove_owner(owner);
        Ok(self.insert_parsed(Some(owner.clone()), parsed))
    }

    /// Remove all rules and notes owned by `owner`. Returns the number of
    /// rules removed.
    pub fn remove_owner(&mut self, owner: &ChoiceKey) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.owner.as_ref() != Some(owner));
        for rules in self.by_target.values_mut() {
            rules.retain(|r| r.owner.as_ref() != Some(owner));
        }
        self.by_target.retain(|_, rules| !rules.is_empty());
        let by_target = &self.by_target;
        self.target_order.retain(|t| by_target.contains_key(t));
        for notes in self.notes.values_mut() {
            notes.retain(|n| n.owner.as_ref() != Some(owner));
        }
        self.notes.retain(|_, notes| !notes.is_empty());
        before - self.rules.len()
    }

    /// Rules contributing to `target`, in declaration order.
    pub fn rules_for(&self, target: &AttrId) -> &[Arc<Rule>] {
        self.by_target
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All targets, in order of first declaration.
    pub fn targets(&self) -> &[AttrId] {
        &self.target_order
    }

    /// All rules, in declaration order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// The template rendered for `attr`: the most recently registered one.
    pub fn note(&self, attr: &AttrId) -> Option<&Arc<Note>> {
        self.notes.get(attr)?.last()
    }

    /// The rendered template of every attribute, in declaration order.
    pub fn notes(&self) -> Vec<Arc<Note>> {
        let mut notes: Vec<_> = self.notes.values().filter_map(|n| n.last().cloned()).collect();
        notes.sort_by_key(|n| n.seq);
        notes
    }

    /// Number of rules owned by `owner`.
    pub fn owned_by(&self, owner: &ChoiceKey) -> usize {
        self.rules
            .iter()
            .filter(|r| r.owner.as_ref() == Some(owner))
            .count()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn insert_parsed(&mut self, owner: Option<ChoiceKey>, parsed: ParsedBatch) -> usize {
        let mut added = 0;
        for rules in parsed.chains {
            let chain = ChainId(self.next_chain);
            self.next_chain += 1;
            let last = rules.len().saturating_sub(1);
            for (position, (target, source, op, expr)) in rules.into_iter().enumerate() {
                let rule = Rule {
                    target,
                    source,
                    op,
                    expr,
                    seq: self.next_seq,
                    chain,
                    veto: op == RuleOp::Gate && position == last,
                    owner: owner.clone(),
                };
                self.next_seq += 1;
                self.insert(Arc::new(rule));
                added += 1;
            }
        }
        for (attr, template) in parsed.notes {
            let note = Note {
                attr: attr.clone(),
                template,
                seq: self.next_seq,
                owner: owner.clone(),
            };
            self.next_seq += 1;
            let notes = self.notes.entry(attr).or_default();
            notes.retain(|n| n.owner != note.owner);
            notes.push(Arc::new(note));
        }

        debug!(owner = ?owner, rules = added, "registered rule batch");
        added
    }

    fn insert(&mut self, rule: Arc<Rule>) {
        let target = rule.target.clone();
        match self.by_target.get_mut(&target) {
            Some(rules) => rules.push(rule.clone()),
            None => {
                self.by_target.insert(target.clone(), vec![rule.clone()]);
                self.target_order.push(target);
            }
        }
        self.rules.push(rule);
    }
}

type ParsedRule = (AttrId, Option<AttrId>, RuleOp, ValueExpr);

struct ParsedBatch {
    chains: Vec<Vec<ParsedRule>>,
    notes: Vec<(AttrId, NoteTemplate)>,
}

fn parse_batch(batch: &RuleBatch) -> Result<ParsedBatch, RuleError> {
    let chains = batch
        .chains()
        .iter()
        .map(parse_chain)
        .collect::<Result<Vec<_>, _>>()?;
    let notes = batch
        .notes()
        .iter()
        .map(|(attr, text)| {
            NoteTemplate::parse(text)
                .map(|template| (attr.clone(), template))
                .map_err(|e| RuleError::Template {
                    attr: attr.clone(),
                    message: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedBatch { chains, notes })
}

fn parse_chain(chain: &RuleChain) -> Result<Vec<ParsedRule>, RuleError> {
    chain
        .specs()
        .iter()
        .map(|spec| {
            let expr = ValueExpr::parse(&spec.expr).map_err(|source| RuleError::Expr {
                target: chain.target().clone(),
                expr: spec.expr.clone(),
                source,
            })?;
            let source = (!spec.source.is_empty()).then(|| AttrId::from(spec.source.as_str()));
            Ok((chain.target().clone(), source, spec.op, expr))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choice::ChoiceCategory;

    fn toughness() -> ChoiceKey {
        ChoiceKey::new(ChoiceCategory::Feats, "Toughness")
    }

    #[test]
    fn test_rules_grouped_in_declaration_order() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("b", "a", RuleOp::Add, "source").unwrap();
        registry.add_rule("a", "", RuleOp::Set, "1").unwrap();
        registry.add_rule("b", "", RuleOp::Add, "2").unwrap();

        let b = registry.rules_for(&AttrId::from_str("b"));
        assert_eq!(b.len(), 2);
        assert!(b[0].seq() < b[1].seq());
        assert_eq!(
            registry.targets(),
            &[AttrId::from_str("b"), AttrId::from_str("a")]
        );
    }

    #[test]
    fn test_gate_scope() {
        let mut registry = RuleRegistry::new();
        registry
            .add_chain(
                RuleChain::new("ancestryFeatures.Darkvision")
                    .gate("", "ancestry == 'Dwarf'")
                    .set("level", "source >= 1 ? 1 : null"),
            )
            .unwrap();
        registry
            .add_rule("combatNotes.rage", "features.Rage", RuleOp::Gate, "source")
            .unwrap();

        let scoped = &registry.rules_for(&AttrId::from_str("ancestryFeatures.Darkvision"))[0];
        assert!(!scoped.is_veto());
        let veto = &registry.rules_for(&AttrId::from_str("combatNotes.rage"))[0];
        assert!(veto.is_veto());
    }

    #[test]
    fn test_malformed_batch_leaves_registry_unchanged() {
        let mut registry = RuleRegistry::new();
        let mut batch = RuleBatch::new();
        batch
            .rule("features.Toughness", "feats.Toughness", RuleOp::Add, "source")
            .rule("sumGeneralFeats", "feats.Toughness", RuleOp::Add, "(source");
        let err = registry.add_batch(Some(toughness()), batch).unwrap_err();
        assert!(matches!(err, RuleError::Expr { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let mut registry = RuleRegistry::new();
        let err = registry
            .define_note("combatNotes.toughness", "+%{level Hit Points")
            .unwrap_err();
        assert!(matches!(err, RuleError::Template { .. }));
    }

    #[test]
    fn test_replace_owned_is_idempotent() {
        let mut registry = RuleRegistry::new();
        let mut batch = RuleBatch::new();
        batch
            .rule("features.Toughness", "feats.Toughness", RuleOp::Add, "source")
            .note("combatNotes.toughness", "+%{level} Hit Points");

        registry.replace_owned(&toughness(), batch.clone()).unwrap();
        registry.replace_owned(&toughness(), batch).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.owned_by(&toughness()), 1);
        assert_eq!(registry.notes().len(), 1);
    }

    #[test]
    fn test_remove_owner() {
        let mut registry = RuleRegistry::new();
        registry.add_rule("level", "", RuleOp::Set, "1").unwrap();
        let mut batch = RuleBatch::new();
        batch
            .rule("features.Toughness", "feats.Toughness", RuleOp::Add, "source")
            .note("combatNotes.toughness", "+%{level} Hit Points");
        registry.add_batch(Some(toughness()), batch).unwrap();

        assert_eq!(registry.remove_owner(&toughness()), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.targets(), &[AttrId::from_str("level")]);
        assert!(registry
            .note(&AttrId::from_str("combatNotes.toughness"))
            .is_none());
    }

    #[test]
    fn test_removing_a_note_owner_restores_the_previous_template() {
        let fleet = ChoiceKey::new(ChoiceCategory::Feats, "Fleet");
        let attr = AttrId::from_str("combatNotes.toughness");
        let mut first = RuleBatch::new();
        first.note(attr.clone(), "+%{level} Hit Points");
        let mut second = RuleBatch::new();
        second.note(attr.clone(), "+%{level * 2} Hit Points");

        let mut registry = RuleRegistry::new();
        registry.add_batch(Some(toughness()), first).unwrap();
        registry.add_batch(Some(fleet.clone()), second).unwrap();
        assert_eq!(
            registry.note(&attr).unwrap().template().as_str(),
            "+%{level * 2} Hit Points"
        );
        assert_eq!(registry.notes().len(), 1);

        registry.remove_owner(&fleet);
        let restored = registry.note(&attr).unwrap();
        assert_eq!(restored.template().as_str(), "+%{level} Hit Points");
        assert_eq!(restored.owner(), Some(&toughness()));

        registry.remove_owner(&toughness());
        assert!(registry.note(&attr).is_none());
    }
}
