//! Choices: named, encoded bundles of rules.
//!
//! A choice is an ancestry, class, feat or feature written as a compact
//! `Key=Value` string. The compiler expands it into rules owned by the
//! choice's [`ChoiceKey`], so re-registering or removing a choice only ever
//! touches its own rules.

mod attrs;
mod compile;
mod phrase;

pub use attrs::EncodedAttributes;
pub use compile::{camel, compile, ChoicePool, CompiledChoice};
pub use phrase::{FeatureEntry, FeaturePhrase, PhraseItem, Rank};

use crate::error::RuleError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod grammar {
    use pest_derive::Parser;

    #[derive(Parser)]
    #[grammar = "choice/choice.pest"]
    pub(crate) struct ChoiceParser;
}

/// The kinds of choice the compiler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChoiceCategory {
    Ancestries,
    Classes,
    Feats,
    Features,
}

impl ChoiceCategory {
    pub const ALL: [ChoiceCategory; 4] = [
        ChoiceCategory::Ancestries,
        ChoiceCategory::Classes,
        ChoiceCategory::Feats,
        ChoiceCategory::Features,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceCategory::Ancestries => "ancestries",
            ChoiceCategory::Classes => "classes",
            ChoiceCategory::Feats => "feats",
            ChoiceCategory::Features => "features",
        }
    }
}

impl FromStr for ChoiceCategory {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChoiceCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| RuleError::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for ChoiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a registered choice: `feats/Toughness`.
///
/// # Examples
///
/// ```rust
/// use sheetrule::choice::{ChoiceCategory, ChoiceKey};
///
/// let key = ChoiceKey::new(ChoiceCategory::Feats, "Toughness");
/// assert_eq!(key.to_string(), "feats/Toughness");
/// assert_eq!(key.name(), "Toughness");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoiceKey {
    category: ChoiceCategory,
    name: Arc<str>,
}

impl ChoiceKey {
    pub fn new(category: ChoiceCategory, name: &str) -> Self {
        Self {
            category,
            name: Arc::from(name),
        }
    }

    pub fn category(&self) -> ChoiceCategory {
        self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ChoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

impl fmt::Debug for ChoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChoiceKey({})", self)
    }
}

/// Encoded attribute strings of registered choices, plus the defaults
/// they may override.
#[derive(Debug, Clone, Default)]
pub struct ChoiceCatalog {
    current: BTreeMap<ChoiceCategory, BTreeMap<String, String>>,
    defaults: BTreeMap<ChoiceCategory, BTreeMap<String, String>>,
}

impl ChoiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current encoding of `key`, returning the previous one.
    pub fn insert(&mut self, key: &ChoiceKey, encoded: &str) -> Option<String> {
        self.current
            .entry(key.category())
            .or_default()
            .insert(key.name().to_string(), encoded.to_string())
    }

    /// Record the default encoding of `key`.
    pub fn set_default(&mut self, key: &ChoiceKey, encoded: &str) {
        self.defaults
            .entry(key.category())
            .or_default()
            .insert(key.name().to_string(), encoded.to_string());
    }

    pub fn get(&self, key: &ChoiceKey) -> Option<&str> {
        self.current
            .get(&key.category())
            .and_then(|names| names.get(key.name()))
            .map(String::as_str)
    }

    pub fn default_for(&self, key: &ChoiceKey) -> Option<&str> {
        self.defaults
            .get(&key.category())
            .and_then(|names| names.get(key.name()))
            .map(String::as_str)
    }

    /// Forget the current encoding of `key`.
    pub fn remove(&mut self, key: &ChoiceKey) -> Option<String> {
        self.current
            .get_mut(&key.category())
            .and_then(|names| names.remove(key.name()))
    }

    /// Forget the default encoding of `key`.
    pub fn remove_default(&mut self, key: &ChoiceKey) -> Option<String> {
        self.defaults
            .get_mut(&key.category())
            .and_then(|names| names.remove(key.name()))
    }

    /// `name -> encoded attributes` for every current choice of `category`.
    pub fn choices(&self, category: ChoiceCategory) -> BTreeMap<String, String> {
        self.current.get(&category).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.current.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
