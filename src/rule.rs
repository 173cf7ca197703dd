//! Rule definitions.
//!
//! A rule contributes to one target attribute: `target <op> f(source)`.
//! Rules are declared in chains; a chain is the list of `(source, op,
//! expr)` triples given for one target in a single declaration.

use crate::attr_id::AttrId;
use crate::choice::ChoiceKey;
use crate::error::RuleError;
use crate::expr::ValueExpr;
use std::fmt;
use std::str::FromStr;

/// How a rule folds its value into the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOp {
    /// `=`: set the target if nothing has set it yet.
    Set,
    /// `+`: sum numbers, join text with the note separator.
    Add,
    /// `^`: numeric maximum.
    Max,
    /// `v`: numeric minimum.
    Min,
    /// `?`: gate. A falsy value closes the rules that follow it in its
    /// chain, or the whole target when it is the last rule of its chain.
    Gate,
}

impl FromStr for RuleOp {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" => Ok(RuleOp::Set),
            "+" | "+=" => Ok(RuleOp::Add),
            "^" | "^=" => Ok(RuleOp::Max),
            "v" | "v=" => Ok(RuleOp::Min),
            "?" => Ok(RuleOp::Gate),
            other => Err(RuleError::InvalidOperator(other.to_string())),
        }
    }
}

impl fmt::Display for RuleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleOp::Set => "=",
            RuleOp::Add => "+",
            RuleOp::Max => "^",
            RuleOp::Min => "v",
            RuleOp::Gate => "?",
        })
    }
}

/// Identifies the chain a rule was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub(crate) u64);

/// A registered, parsed rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) target: AttrId,
    pub(crate) source: Option<AttrId>,
    pub(crate) op: RuleOp,
    pub(crate) expr: ValueExpr,
    pub(crate) seq: u64,
    pub(crate) chain: ChainId,
    pub(crate) veto: bool,
    pub(crate) owner: Option<ChoiceKey>,
}

impl Rule {
    pub fn target(&self) -> &AttrId {
        &self.target
    }

    /// The source attribute; `None` for constant rules.
    pub fn source(&self) -> Option<&AttrId> {
        self.source.as_ref()
    }

    pub fn op(&self) -> RuleOp {
        self.op
    }

    pub fn expr(&self) -> &ValueExpr {
        &self.expr
    }

    /// Declaration sequence number, unique across the registry.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Whether this is a gate that governs the whole target.
    pub fn is_veto(&self) -> bool {
        self.veto
    }

    /// The choice that registered this rule, if any.
    pub fn owner(&self) -> Option<&ChoiceKey> {
        self.owner.as_ref()
    }

    /// Whether the rule reads its own target (a trigger rule).
    pub fn is_trigger(&self) -> bool {
        self.source.as_ref() == Some(&self.target)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} <- {}",
            self.target,
            self.op,
            self.expr,
            self.source.as_ref().map(AttrId::as_str).unwrap_or("(const)")
        )
    }
}

/// One unparsed `(source, op, expr)` triple of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub source: String,
    pub op: RuleOp,
    pub expr: String,
}

/// The rules declared for one target in a single declaration.
///
/// # Examples
///
/// ```rust
/// use sheetrule::rule::{RuleChain, RuleOp};
///
/// // level defaults to 1 unless experience says otherwise
/// let chain = RuleChain::new("level")
///     .set("experience", "floor(source / 1000) + 1")
///     .set("", "1");
/// assert_eq!(chain.len(), 2);
/// assert_eq!(chain.specs()[1].op, RuleOp::Set);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RuleChain {
    target: AttrId,
    specs: Vec<RuleSpec>,
}

impl RuleChain {
    pub fn new(target: impl Into<AttrId>) -> Self {
        Self {
            target: target.into(),
            specs: Vec::new(),
        }
    }

    /// Append a rule. An empty `source` declares a constant rule.
    pub fn rule(mut self, source: &str, op: RuleOp, expr: &str) -> Self {
        self.specs.push(RuleSpec {
            source: source.to_string(),
            op,
            expr: expr.to_string(),
        });
        self
    }

    pub fn set(self, source: &str, expr: &str) -> Self {
        self.rule(source, RuleOp::Set, expr)
    }

    pub fn add(self, source: &str, expr: &str) -> Self {
        self.rule(source, RuleOp::Add, expr)
    }

    pub fn max(self, source: &str, expr: &str) -> Self {
        self.rule(source, RuleOp::Max, expr)
    }

    pub fn min(self, source: &str, expr: &str) -> Self {
        self.rule(source, RuleOp::Min, expr)
    }

    pub fn gate(self, source: &str, expr: &str) -> Self {
        self.rule(source, RuleOp::Gate, expr)
    }

    pub fn target(&self) -> &AttrId {
        &self.target
    }

    pub fn specs(&self) -> &[RuleSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// A group of chains and note templates registered together.
///
/// Choices compile into batches; the registry parses a whole batch before
/// inserting any of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleBatch {
    chains: Vec<RuleChain>,
    notes: Vec<(AttrId, String)>,
}

impl RuleBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(&mut self, chain: RuleChain) -> &mut Self {
        if !chain.is_empty() {
            self.chains.push(chain);
        }
        self
    }

    /// Add a one-rule chain.
    pub fn rule(
        &mut self,
        target: impl Into<AttrId>,
        source: &str,
        op: RuleOp,
        expr: &str,
    ) -> &mut Self {
        self.chain(RuleChain::new(target).rule(source, op, expr))
    }

    pub fn note(&mut self, attr: impl Into<AttrId>, template: &str) -> &mut Self {
        self.notes.push((attr.into(), template.to_string()));
        self
    }

    pub fn extend(&mut self, other: RuleBatch) -> &mut Self {
        self.chains.extend(other.chains);
        self.notes.extend(other.notes);
        self
    }

    pub fn chains(&self) -> &[RuleChain] {
        &self.chains
    }

    pub fn notes(&self) -> &[(AttrId, String)] {
        &self.notes
    }

    /// Number of rules across all chains.
    pub fn rule_count(&self) -> usize {
        self.chains.iter().map(RuleChain::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty() && self.notes.is_empty()
    }
}
