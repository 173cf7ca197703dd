//! Attribute store module.
//!
//! Provides `AttributeStore`, the per-character bag of raw inputs, derived
//! values and rendered notes.
//!
//! Values are kept in a two-level table, `family -> member -> value`, with
//! scalar attributes in a map of their own, so family enumeration and
//! family sums do not scan unrelated attributes.

use crate::attr_id::AttrId;
use crate::error::RuleError;
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a store's derived values reflect its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreState {
    /// Inputs changed since the last evaluation.
    Stale,
    /// Derived values are up to date.
    Current,
}

/// A `family -> member -> value` table.
///
/// Names without a dot are scalars. `.level` is the member `level` of the
/// empty family and never collides with the scalar `level`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrTable {
    scalars: BTreeMap<String, Value>,
    families: BTreeMap<String, BTreeMap<String, Value>>,
}

impl AttrTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> (Option<&str>, &str) {
        match name.split_once('.') {
            Some((family, member)) => (Some(family), member),
            None => (None, name),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match Self::key(name) {
            (Some(family), member) => self.families.get(family)?.get(member),
            (None, scalar) => self.scalars.get(scalar),
        }
    }

    /// Insert `value`; a `Null` removes the attribute instead.
    pub fn insert(&mut self, name: &str, value: Value) {
        if value.is_null() {
            self.remove(name);
            return;
        }
        match Self::key(name) {
            (Some(family), member) => {
                self.families
                    .entry(family.to_string())
                    .or_default()
                    .insert(member.to_string(), value);
            }
            (None, scalar) => {
                self.scalars.insert(scalar.to_string(), value);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let (family, member) = match Self::key(name) {
            (Some(family), member) => (family, member),
            (None, scalar) => return self.scalars.remove(scalar),
        };
        let members = self.families.get_mut(family)?;
        let removed = members.remove(member);
        if members.is_empty() {
            self.families.remove(family);
        }
        removed
    }

    /// Members of one family, in name order.
    pub fn family(&self, family: &str) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.families
            .get(family)
            .into_iter()
            .flat_map(|members| members.iter().map(|(m, v)| (m.as_str(), v)))
    }

    /// Every attribute as `(full name, value)`: scalars first, then each
    /// family in name order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &Value)> + '_ {
        let scalars = self.scalars.iter().map(|(name, value)| (name.clone(), value));
        let members = self.families.iter().flat_map(|(family, members)| {
            members
                .iter()
                .map(move |(member, value)| (format!("{}.{}", family, member), value))
        });
        scalars.chain(members)
    }

    pub fn len(&self) -> usize {
        self.scalars.len() + self.families.values().map(BTreeMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.families.is_empty()
    }
}

/// Raw and derived attribute values for one character.
///
/// Setting an input never recomputes anything; the store is marked stale
/// until the next evaluation.
///
/// # Examples
///
/// ```rust
/// use sheetrule::store::{AttributeStore, StoreState};
/// use sheetrule::Value;
///
/// let mut store = AttributeStore::new();
/// store.set("feats.Toughness", 1);
/// store.set("feats.Fleet", 1);
/// store.set("level", 5);
///
/// assert_eq!(store.get("level"), Some(&Value::from(5)));
/// assert_eq!(store.family_count("feats"), 2);
/// assert_eq!(store.state(), StoreState::Stale);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeStore {
    inputs: AttrTable,
    values: AttrTable,
    notes: BTreeMap<AttrId, String>,
    state: StoreState,
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeStore {
    pub fn new() -> Self {
        Self {
            inputs: AttrTable::new(),
            values: AttrTable::new(),
            notes: BTreeMap::new(),
            state: StoreState::Stale,
        }
    }

    /// Set a raw input. Any name is legal. Setting `Null` removes it.
    pub fn set(&mut self, name: impl Into<AttrId>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        self.inputs.insert(name.as_str(), value.clone());
        self.values.insert(name.as_str(), value);
        self.state = StoreState::Stale;
    }

    /// Remove a raw input.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.inputs.remove(name);
        if removed.is_some() {
            self.values.remove(name);
            self.state = StoreState::Stale;
        }
        removed
    }

    /// Current value: derived after evaluation, the raw input before.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Raw input only.
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Rendered note text, available after evaluation.
    pub fn note(&self, name: &str) -> Option<&str> {
        self.notes.get(&AttrId::from(name)).map(String::as_str)
    }

    /// All rendered notes.
    pub fn notes(&self) -> &BTreeMap<AttrId, String> {
        &self.notes
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Names of all current attributes matching `pattern`, in name order.
    pub fn all_matching(&self, pattern: &Regex) -> Vec<AttrId> {
        self.values
            .iter()
            .filter(|(name, _)| pattern.is_match(name))
            .map(|(name, _)| AttrId::from(name))
            .collect()
    }

    /// Names of all current attributes starting with `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> Vec<AttrId> {
        self.values
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| AttrId::from(name))
            .collect()
    }

    /// Members of a family as `(member, value)`.
    pub fn family(&self, family: &str) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.values.family(family)
    }

    /// Sum of the numeric members of a family.
    pub fn family_sum(&self, family: &str) -> f64 {
        self.values
            .family(family)
            .filter_map(|(_, v)| v.as_number())
            .filter(|n| !n.is_nan())
            .sum()
    }

    /// Number of truthy members of a family.
    pub fn family_count(&self, family: &str) -> usize {
        self.values
            .family(family)
            .filter(|(_, v)| v.is_truthy())
            .count()
    }

    /// All current values.
    pub fn values(&self) -> &AttrTable {
        &self.values
    }

    /// All raw inputs.
    pub fn inputs(&self) -> &AttrTable {
        &self.inputs
    }

    /// Serialize the raw inputs as a flat JSON object.
    pub fn inputs_json(&self) -> Result<String, RuleError> {
        let flat: BTreeMap<String, &Value> = self.inputs.iter().collect();
        serde_json::to_string(&flat).map_err(|e| RuleError::Config(e.to_string()))
    }

    /// Build a stale store from a flat JSON object of raw inputs.
    pub fn from_inputs_json(json: &str) -> Result<Self, RuleError> {
        let flat: BTreeMap<String, Value> =
            serde_json::from_str(json).map_err(|e| RuleError::Config(e.to_string()))?;
        let mut store = Self::new();
        for (name, value) in flat {
            store.set(name, value);
        }
        Ok(store)
    }

    /// Reset derived state ahead of an evaluation pass.
    pub(crate) fn begin_pass(&mut self) {
        self.values = self.inputs.clone();
        self.notes.clear();
    }

    pub(crate) fn put_value(&mut self, name: &str, value: Value) {
        self.values.insert(name, value);
    }

    pub(crate) fn put_note(&mut self, attr: AttrId, text: String) {
        self.notes.insert(attr, text);
    }

    pub(crate) fn finish_pass(&mut self) {
        self.state = StoreState::Current;
    }
}
