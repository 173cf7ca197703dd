//! Choice compilation.
//!
//! Turns the encoded attributes of one choice into the rule batch that
//! implements it. Compilation never touches a registry; the engine
//! registers the batch under the choice's key.

use super::attrs::EncodedAttributes;
use super::phrase::{FeatureEntry, FeaturePhrase, PhraseItem};
use super::{ChoiceCategory, ChoiceKey};
use crate::attr_id::AttrId;
use crate::config::EngineConfig;
use crate::error::RuleError;
use crate::expr::{attr_ref, quote};
use crate::rule::{RuleBatch, RuleChain, RuleOp};
use crate::template::NoteTemplate;
use crate::validation::allocation_rules_in;
use std::collections::BTreeSet;
use tracing::warn;

const FEATURE_KEYS: &[&str] = &["Section", "Note", "Action"];
const FEAT_KEYS: &[&str] = &["Traits", "Trait", "Require", "Imply"];
const ANCESTRY_KEYS: &[&str] = &[
    "Require",
    "Features",
    "Selectables",
    "HitPoints",
    "Languages",
    "Traits",
    "Trait",
];
const CLASS_KEYS: &[&str] = &["Require", "Features", "Selectables", "HitPoints"];

/// Lower camel case form of a display name: `Ancient-Blooded Dwarf`
/// becomes `ancientBloodedDwarf`.
///
/// # Examples
///
/// ```rust
/// use sheetrule::choice::camel;
///
/// assert_eq!(camel("Toughness"), "toughness");
/// assert_eq!(camel("Skill Trained"), "skillTrained");
/// ```
pub fn camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars().filter(|c| c.is_alphanumeric()) {
        if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// A selection pool shared by every choice that grants picks from it.
///
/// Choices grant picks by adding to `choiceCount.<kind>`; the player
/// spends them as raw inputs in the pool's picks family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoicePool {
    kind: String,
    picks: String,
    name: String,
}

impl ChoicePool {
    /// Pool opened by `Choose N from ...` in a phrase of kind `kind`, such
    /// as `Ability Boost` or `Skill Trained`. Picks go in `<kind>Choices`.
    pub fn new(kind: &str) -> Self {
        let kind = camel(kind);
        Self {
            picks: format!("{}Choices", kind),
            name: format!("{}Choice", kind),
            kind,
        }
    }

    /// Languages known. Ancestries grant them and widen the budget by the
    /// same amount; any further `languages.*` entry spends a pick.
    pub fn languages() -> Self {
        Self {
            kind: "language".to_string(),
            picks: "languages".to_string(),
            name: "languages".to_string(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Attribute holding the number of picks granted.
    pub fn count_attr(&self) -> String {
        format!("choiceCount.{}", self.kind)
    }

    /// Family the picks are entered in.
    pub fn picks_family(&self) -> &str {
        &self.picks
    }

    /// Validation that no more picks are spent than granted.
    pub fn allocation_rules(&self, family: &str) -> RuleBatch {
        allocation_rules_in(
            family,
            &self.name,
            &self.count_attr(),
            &format!("sum('^{}\\.')", self.picks),
        )
    }
}

/// The output of compiling one choice.
#[derive(Debug, Clone, Default)]
pub struct CompiledChoice {
    /// Rules and notes owned by the choice.
    pub batch: RuleBatch,
    /// Pools the choice grants picks from. Pool validation is shared by
    /// every choice feeding the pool, so it is not part of `batch`.
    pub pools: BTreeSet<ChoicePool>,
}

/// Compile the choice `key` from its encoded attributes.
///
/// # Examples
///
/// ```rust
/// use sheetrule::choice::{compile, ChoiceCategory, ChoiceKey, EncodedAttributes};
/// use sheetrule::EngineConfig;
///
/// let key = ChoiceKey::new(ChoiceCategory::Feats, "Toughness");
/// let attrs = EncodedAttributes::parse("Toughness", "Traits=General").unwrap();
/// let compiled = compile(&key, &attrs, &EngineConfig::default()).unwrap();
///
/// let targets: Vec<_> = compiled.batch.chains().iter().map(|c| c.target().to_string()).collect();
/// assert_eq!(targets, vec!["features.Toughness", "sumGeneralFeats"]);
/// ```
pub fn compile(
    key: &ChoiceKey,
    attrs: &EncodedAttributes,
    config: &EngineConfig,
) -> Result<CompiledChoice, RuleError> {
    let mut compiler = Compiler {
        key,
        config,
        out: CompiledChoice::default(),
    };
    let known = match key.category() {
        ChoiceCategory::Features => {
            compiler.feature(attrs)?;
            FEATURE_KEYS
        }
        ChoiceCategory::Feats => {
            compiler.feat(attrs);
            FEAT_KEYS
        }
        ChoiceCategory::Ancestries => {
            compiler.ancestry(attrs)?;
            ANCESTRY_KEYS
        }
        ChoiceCategory::Classes => {
            compiler.class(attrs)?;
            CLASS_KEYS
        }
    };
    for unknown in attrs.keys().into_iter().filter(|k| !known.contains(k)) {
        warn!(choice = %key, key = unknown, "ignoring unknown attribute");
    }
    Ok(compiler.out)
}

struct Compiler<'a> {
    key: &'a ChoiceKey,
    config: &'a EngineConfig,
    out: CompiledChoice,
}

impl Compiler<'_> {
    fn name(&self) -> &str {
        self.key.name()
    }

    fn invalid(&self, message: String) -> RuleError {
        RuleError::InvalidChoice {
            name: self.name().to_string(),
            message,
        }
    }

    /// `Section=combat,skill Note="...","..." Action=1,-`: one note per
    /// section, shown while the feature is held. An action labels the note
    /// it lines up with.
    fn feature(&mut self, attrs: &EncodedAttributes) -> Result<(), RuleError> {
        let sections = attrs.values("Section");
        let notes = attrs.values("Note");
        let actions = attrs.values("Action");
        if sections.len() != notes.len() {
            return Err(self.invalid(format!(
                "{} sections for {} notes",
                sections.len(),
                notes.len()
            )));
        }
        if !actions.is_empty() && actions.len() != notes.len() {
            return Err(self.invalid(format!(
                "{} actions for {} notes",
                actions.len(),
                notes.len()
            )));
        }

        let mut grouped: Vec<(&str, Vec<String>, Vec<&str>)> = Vec::new();
        for (i, (section, note)) in sections.into_iter().zip(notes).enumerate() {
            let text = match actions.get(i).and_then(|a| action_label(a)) {
                Some(label) => format!("{} {}", label, note),
                None => note.to_string(),
            };
            match grouped.iter_mut().find(|(s, _, _)| *s == section) {
                Some((_, texts, raw)) => {
                    texts.push(text);
                    raw.push(note);
                }
                None => grouped.push((section, vec![text], vec![note])),
            }
        }

        let source = format!("features.{}", self.name());
        for (section, texts, raw) in grouped {
            let attr = AttrId::member_of(&format!("{}Notes", section), &camel(self.name()));
            let text = texts.join(self.config.note_separator.as_str());
            let template = NoteTemplate::parse(&text).map_err(|e| RuleError::Template {
                attr: attr.clone(),
                message: e.to_string(),
            })?;

            // `%V` notes take their value from other rules; the feature
            // only decides whether the note exists.
            let op = if template.uses_value() {
                RuleOp::Gate
            } else {
                RuleOp::Set
            };
            self.out
                .batch
                .rule(attr.clone(), &source, op, "source")
                .note(attr, &text);

            for text in raw {
                if let Some(phrase) = FeaturePhrase::parse(text) {
                    self.phrase(&source, &phrase);
                }
            }
        }
        Ok(())
    }

    fn feat(&mut self, attrs: &EncodedAttributes) {
        let source = format!("feats.{}", self.name());
        self.out
            .batch
            .rule(format!("features.{}", self.name()), &source, RuleOp::Add, "source");

        let traits = attrs.values("Traits").into_iter().chain(attrs.values("Trait"));
        for name in traits {
            let name: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
            if !name.is_empty() {
                self.out
                    .batch
                    .rule(format!("sum{}Feats", name), &source, RuleOp::Add, "source");
            }
        }

        let config = self.config;
        self.requirements(&attrs.values("Require"), &config.validation_family, "Feat", &source);
        self.requirements(&attrs.values("Imply"), &config.sanity_family, "Feat", &source);
    }

    fn ancestry(&mut self, attrs: &EncodedAttributes) -> Result<(), RuleError> {
        let level_attr = format!("{}Level", camel(self.name()));
        self.level_chain(&level_attr, "ancestry");
        self.hit_points(attrs, &level_attr, false)?;
        let config = self.config;
        self.requirements(&attrs.values("Require"), &config.validation_family, "Ancestry", &level_attr);
        self.feature_list(&attrs.values("Features"), "ancestryFeatures", &level_attr)?;
        self.selectables(
            &attrs.values("Selectables"),
            "ancestryFeatures",
            &level_attr,
            "Heritage",
        )?;
        self.traits(attrs, &level_attr);
        self.languages(&attrs.values("Languages"), &level_attr);
        Ok(())
    }

    fn class(&mut self, attrs: &EncodedAttributes) -> Result<(), RuleError> {
        let level_attr = format!("levels.{}", self.name());
        self.level_chain(&level_attr, "class");
        self.hit_points(attrs, &level_attr, true)?;
        let config = self.config;
        self.requirements(&attrs.values("Require"), &config.validation_family, "Class", &level_attr);
        self.feature_list(&attrs.values("Features"), "classFeatures", &level_attr)?;
        self.selectables(
            &attrs.values("Selectables"),
            "classFeatures",
            &level_attr,
            "Feature",
        )
    }

    /// `traits.<Trait>` while the choice is active.
    fn traits(&mut self, attrs: &EncodedAttributes, source: &str) {
        let traits = attrs.values("Traits").into_iter().chain(attrs.values("Trait"));
        for name in traits.map(str::trim).filter(|t| !t.is_empty()) {
            self.out
                .batch
                .rule(format!("traits.{}", name), source, RuleOp::Set, "1");
        }
    }

    /// Known languages, each also widening the language budget by one, so
    /// only languages picked beyond them count against it.
    fn languages(&mut self, languages: &[&str], source: &str) {
        let languages: Vec<&str> = languages
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        if languages.is_empty() {
            return;
        }
        let pool = ChoicePool::languages();
        for language in &languages {
            self.out.batch.rule(
                format!("{}.{}", pool.picks_family(), language),
                source,
                RuleOp::Set,
                "1",
            );
        }
        self.out.batch.rule(
            pool.count_attr(),
            source,
            RuleOp::Add,
            &languages.len().to_string(),
        );
        self.out.pools.insert(pool);
    }

    /// The character level, while `selector` names this choice.
    fn level_chain(&mut self, level_attr: &str, selector: &str) {
        let gate = format!("{} == {}", selector, quote(self.name()));
        self.out
            .batch
            .chain(RuleChain::new(level_attr).gate("", &gate).set("level", "source"));
    }

    fn hit_points(
        &mut self,
        attrs: &EncodedAttributes,
        level_attr: &str,
        per_level: bool,
    ) -> Result<(), RuleError> {
        let Some(text) = attrs.first("HitPoints") else {
            return Ok(());
        };
        let points: u32 = text
            .trim()
            .parse()
            .map_err(|_| self.invalid(format!("HitPoints is not a number: {}", text)))?;
        let expr = if per_level {
            format!("source * {}", points)
        } else {
            points.to_string()
        };
        self.out
            .batch
            .rule("hitPoints", level_attr, RuleOp::Add, &expr);
        Ok(())
    }

    /// `<family>.<camel><suffix>` is truthy while the choice is active and
    /// any of `exprs` fails.
    fn requirements(&mut self, exprs: &[&str], family: &str, suffix: &str, source: &str) {
        if exprs.is_empty() {
            return;
        }
        let all = exprs
            .iter()
            .map(|e| format!("({})", e))
            .collect::<Vec<_>>()
            .join(" && ");
        let attr = AttrId::member_of(family, &format!("{}{}", camel(self.name()), suffix));
        self.out
            .batch
            .rule(attr, source, RuleOp::Set, &format!("({}) ? null : 1", all));
    }

    fn feature_list(&mut self, entries: &[&str], set: &str, level_attr: &str) -> Result<(), RuleError> {
        for text in entries {
            let entry = FeatureEntry::parse(text)?;
            let target = format!("{}.{}", set, entry.name);
            let mut chain = RuleChain::new(target.as_str());
            if let Some(gate) = &entry.gate {
                chain = chain.gate("", gate);
            }
            chain = chain.set(level_attr, &format!("source >= {} ? 1 : null", entry.level));
            self.out.batch.chain(chain);
            self.grant(&target, &entry.name);
        }
        Ok(())
    }

    /// Exclusive selection groups, one per `(owner, type)`, each with a
    /// budget of one pick.
    fn selectables(
        &mut self,
        entries: &[&str],
        set: &str,
        level_attr: &str,
        default_type: &str,
    ) -> Result<(), RuleError> {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for text in entries {
            let entry = FeatureEntry::parse(text)?;
            let kind = entry.kind.clone().unwrap_or_else(|| default_type.to_string());
            let pick = format!("selectableFeatures.{} - {}", self.name(), entry.name);
            let target = format!("{}.{}", set, entry.name);

            let mut chain = RuleChain::new(target.as_str());
            if let Some(gate) = &entry.gate {
                chain = chain.gate("", gate);
            }
            chain = chain.set(
                &pick,
                &format!("{} >= {} ? 1 : null", attr_ref(level_attr), entry.level),
            );
            self.out.batch.chain(chain);
            self.grant(&target, &entry.name);
            match groups.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, granted)) => granted.push(target),
                None => groups.push((kind, vec![target])),
            }
        }

        // Only picks that took effect count against the budget.
        for (kind, granted) in groups {
            let count_attr = format!("selectableFeatureCount.{} ({})", self.name(), kind);
            self.out
                .batch
                .rule(count_attr.as_str(), level_attr, RuleOp::Set, "1");
            let allocated = granted
                .iter()
                .map(|p| attr_ref(p))
                .collect::<Vec<_>>()
                .join(" + ");
            let pool = camel(&format!("{} {}", self.name(), kind));
            let rules = allocation_rules_in(
                &self.config.validation_family,
                &pool,
                &count_attr,
                &allocated,
            );
            self.out.batch.extend(rules);
        }
        Ok(())
    }

    /// Grant the feature `name` while `source` holds.
    fn grant(&mut self, source: &str, name: &str) {
        self.out
            .batch
            .rule(format!("features.{}", name), source, RuleOp::Add, "source");
        if let Some(phrase) = FeaturePhrase::parse(name) {
            self.phrase(source, &phrase);
        }
    }

    fn phrase(&mut self, source: &str, phrase: &FeaturePhrase) {
        match phrase {
            FeaturePhrase::Boost { flaw, items } => {
                let family = if *flaw { "abilityFlaws" } else { "abilityBoosts" };
                for item in items {
                    match item {
                        PhraseItem::Named(ability) => {
                            self.out.batch.rule(
                                format!("{}.{}", family, ability),
                                source,
                                RuleOp::Add,
                                "1",
                            );
                        }
                        PhraseItem::Choose { count, .. } => self.choose(source, phrase, *count),
                    }
                }
            }
            FeaturePhrase::Rank {
                capability,
                rank,
                items,
            } => {
                let value = rank.value().to_string();
                if items.is_empty() {
                    self.out.batch.rule(
                        format!("rank.{}", capability),
                        source,
                        RuleOp::Max,
                        &value,
                    );
                }
                for item in items {
                    match item {
                        PhraseItem::Named(name) => {
                            self.out
                                .batch
                                .rule(format!("rank.{}", name), source, RuleOp::Max, &value);
                        }
                        PhraseItem::Choose { count, .. } => self.choose(source, phrase, *count),
                    }
                }
            }
        }
    }

    fn choose(&mut self, source: &str, phrase: &FeaturePhrase, count: u32) {
        let pool = ChoicePool::new(&phrase.kind());
        self.out
            .batch
            .rule(pool.count_attr(), source, RuleOp::Add, &count.to_string());
        self.out.pools.insert(pool);
    }
}

/// `(1 action)`, `(2 actions)`, `(reaction)`; `-` or blank is no action.
fn action_label(action: &str) -> Option<String> {
    let action = action.trim();
    match action {
        "" | "-" => None,
        "1" => Some("(1 action)".to_string()),
        n if n.bytes().all(|b| b.is_ascii_digit()) => Some(format!("({} actions)", n)),
        other => Some(format!("({})", other.to_lowercase())),
    }
}
