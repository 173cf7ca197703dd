//! Encoded choice attributes.
//!
//! Choices arrive as a whitespace separated `Key=Value` list. Values are
//! comma separated; an item may be double quoted to keep commas, spaces
//! and semicolons: `Trait=General,Skill Note="+%{level} Hit Points"`.

use super::grammar::{ChoiceParser, Rule as Syntax};
use crate::error::RuleError;
use pest::Parser;

/// Parsed `Key=Value` pairs of one choice, in the order written.
///
/// # Examples
///
/// ```rust
/// use sheetrule::choice::EncodedAttributes;
///
/// let attrs = EncodedAttributes::parse(
///     "Dwarf",
///     r#"Features="1:Darkvision","1:Clan Dagger" HitPoints=10"#,
/// ).unwrap();
/// assert_eq!(attrs.values("Features"), vec!["1:Darkvision", "1:Clan Dagger"]);
/// assert_eq!(attrs.first("HitPoints"), Some("10"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedAttributes {
    pairs: Vec<(String, Vec<String>)>,
}

impl EncodedAttributes {
    /// Parse the encoded attributes of the choice `name`.
    pub fn parse(name: &str, text: &str) -> Result<Self, RuleError> {
        let malformed = |message: String| RuleError::MalformedAttributes {
            name: name.to_string(),
            message,
        };
        let mut parsed = ChoiceParser::parse(Syntax::attributes, text)
            .map_err(|e| malformed(e.to_string()))?;
        let attributes = parsed
            .next()
            .ok_or_else(|| malformed("empty attribute string".to_string()))?;

        let mut pairs = Vec::new();
        for pair in attributes.into_inner() {
            if pair.as_rule() != Syntax::pair {
                continue;
            }
            let mut inner = pair.into_inner();
            let key = inner
                .next()
                .ok_or_else(|| malformed("missing key".to_string()))?
                .as_str()
                .to_string();
            let items = inner
                .map(|item| match item.as_rule() {
                    Syntax::quoted => item
                        .into_inner()
                        .next()
                        .map(|q| q.as_str().to_string())
                        .unwrap_or_default(),
                    _ => item.as_str().to_string(),
                })
                .collect();
            pairs.push((key, items));
        }
        Ok(Self { pairs })
    }

    /// All values given for `key`; repeated keys accumulate.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .flat_map(|(_, items)| items.iter().map(String::as_str))
            .collect()
    }

    /// The first value given for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).into_iter().next()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Keys in the order written, without repeats.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.pairs {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
