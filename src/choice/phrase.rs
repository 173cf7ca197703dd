//! Feature list entries and feature phrases.
//!
//! A feature list entry is `[gate ?] [N:]Name[:Type]`. Some feature names
//! and note texts are themselves phrases that grant ranks or ability
//! boosts:
//!
//! ```text
//! phrase   := "Ability" ("Boost" | "Flaw") ["s"] items
//!           | Capability Rank [items]
//! items    := "(" entry (";" entry)* ")"
//! entry    := "Choose" N "from" option ("," option)* | Name
//! ```

use super::grammar::{ChoiceParser, Rule as Syntax};
use crate::error::RuleError;
use pest::iterators::Pair;
use pest::Parser;
use std::fmt;
use std::str::FromStr;

/// One entry of a `Features` or `Selectables` list.
///
/// # Examples
///
/// ```rust
/// use sheetrule::choice::FeatureEntry;
///
/// let entry = FeatureEntry::parse("alignment == 'Lawful Good' ? 1:Paladin:Cause").unwrap();
/// assert_eq!(entry.gate.as_deref(), Some("alignment == 'Lawful Good'"));
/// assert_eq!(entry.level, 1);
/// assert_eq!(entry.name, "Paladin");
/// assert_eq!(entry.kind.as_deref(), Some("Cause"));
///
/// let plain = FeatureEntry::parse("Darkvision").unwrap();
/// assert_eq!((plain.gate, plain.level), (None, 1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEntry {
    /// Expression that must hold for the entry to apply.
    pub gate: Option<String>,
    /// Level from which the entry applies.
    pub level: u32,
    pub name: String,
    /// Selection group of a selectable entry.
    pub kind: Option<String>,
}

impl FeatureEntry {
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let malformed = |message: String| RuleError::MalformedAttributes {
            name: text.to_string(),
            message,
        };
        let entry = ChoiceParser::parse(Syntax::feature_entry, text)
            .map_err(|e| malformed(e.to_string()))?
            .next()
            .ok_or_else(|| malformed("empty feature entry".to_string()))?;

        let mut parsed = FeatureEntry {
            gate: None,
            level: 1,
            name: String::new(),
            kind: None,
        };
        for part in entry.into_inner() {
            match part.as_rule() {
                Syntax::gate => parsed.gate = Some(part.as_str().trim().to_string()),
                Syntax::level => {
                    parsed.level = part
                        .as_str()
                        .parse()
                        .map_err(|e: std::num::ParseIntError| malformed(e.to_string()))?
                }
                Syntax::entry_name => parsed.name = part.as_str().trim().to_string(),
                Syntax::entry_type => parsed.kind = Some(part.as_str().trim().to_string()),
                _ => {}
            }
        }
        if parsed.name.is_empty() {
            return Err(malformed("empty feature name".to_string()));
        }
        Ok(parsed)
    }
}

/// Proficiency ranks, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Untrained = 0,
    Trained = 1,
    Expert = 2,
    Master = 3,
    Legendary = 4,
}

impl Rank {
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl FromStr for Rank {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Untrained" => Ok(Rank::Untrained),
            "Trained" => Ok(Rank::Trained),
            "Expert" => Ok(Rank::Expert),
            "Master" => Ok(Rank::Master),
            "Legendary" => Ok(Rank::Legendary),
            other => Err(RuleError::MalformedAttributes {
                name: other.to_string(),
                message: "unknown rank".to_string(),
            }),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An item inside a phrase's parentheses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhraseItem {
    Named(String),
    /// `Choose N from a, b` (or `from any`).
    Choose { count: u32, from: Vec<String> },
}

/// A rank or ability boost phrase.
///
/// # Examples
///
/// ```rust
/// use sheetrule::choice::{FeaturePhrase, PhraseItem, Rank};
///
/// let phrase = FeaturePhrase::parse("Attack Trained (Simple Weapons; Martial Weapons)").unwrap();
/// assert_eq!(
///     phrase,
///     FeaturePhrase::Rank {
///         capability: "Attack".to_string(),
///         rank: Rank::Trained,
///         items: vec![
///             PhraseItem::Named("Simple Weapons".to_string()),
///             PhraseItem::Named("Martial Weapons".to_string()),
///         ],
///     }
/// );
///
/// assert!(FeaturePhrase::parse("Darkvision").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeaturePhrase {
    Boost { flaw: bool, items: Vec<PhraseItem> },
    Rank {
        capability: String,
        rank: Rank,
        items: Vec<PhraseItem>,
    },
}

impl FeaturePhrase {
    /// Parse `text` as a phrase; `None` when it is an ordinary name.
    pub fn parse(text: &str) -> Option<Self> {
        let phrase = ChoiceParser::parse(Syntax::phrase, text.trim()).ok()?.next()?;
        let body = phrase.into_inner().next()?;
        match body.as_rule() {
            Syntax::boost_phrase => {
                let mut flaw = false;
                let mut items = Vec::new();
                for part in body.into_inner() {
                    match part.as_rule() {
                        Syntax::boost_kind => flaw = part.as_str() == "Flaw",
                        Syntax::item_list => items = parse_items(part)?,
                        _ => {}
                    }
                }
                Some(FeaturePhrase::Boost { flaw, items })
            }
            Syntax::rank_phrase => {
                let mut capability = String::new();
                let mut rank = Rank::Untrained;
                let mut items = Vec::new();
                for part in body.into_inner() {
                    match part.as_rule() {
                        Syntax::capability => capability = part.as_str().to_string(),
                        Syntax::rank => rank = part.as_str().parse().ok()?,
                        Syntax::item_list => items = parse_items(part)?,
                        _ => {}
                    }
                }
                Some(FeaturePhrase::Rank {
                    capability,
                    rank,
                    items,
                })
            }
            _ => None,
        }
    }

    /// Name of the selection pool a `Choose` item draws from, e.g.
    /// `Ability Boost` or `Skill Trained`.
    pub fn kind(&self) -> String {
        match self {
            FeaturePhrase::Boost { flaw: false, .. } => "Ability Boost".to_string(),
            FeaturePhrase::Boost { flaw: true, .. } => "Ability Flaw".to_string(),
            FeaturePhrase::Rank {
                capability, rank, ..
            } => format!("{} {}", capability, rank),
        }
    }

    pub fn items(&self) -> &[PhraseItem] {
        match self {
            FeaturePhrase::Boost { items, .. } | FeaturePhrase::Rank { items, .. } => items,
        }
    }
}

fn parse_items(list: Pair<'_, Syntax>) -> Option<Vec<PhraseItem>> {
    list.into_inner()
        .map(|entry| match entry.as_rule() {
            Syntax::choose => {
                let mut count = 0;
                let mut from = Vec::new();
                for part in entry.into_inner() {
                    match part.as_rule() {
                        Syntax::count => count = part.as_str().parse().ok()?,
                        Syntax::option => from.push(part.as_str().trim().to_string()),
                        _ => {}
                    }
                }
                Some(PhraseItem::Choose { count, from })
            }
            _ => Some(PhraseItem::Named(entry.as_str().trim().to_string())),
        })
        .collect()
}
