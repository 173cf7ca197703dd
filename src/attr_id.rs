//! Attribute identifier module.
//!
//! Provides the `AttrId` type, an interned string identifier for
//! attributes. Dotted names (`feats.Toughness`) denote membership in a
//! family; the family is everything before the first dot.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Interned string identifier for attributes.
///
/// Uses `Arc<str>` for memory efficiency and fast comparison. Any string is
/// a legal attribute name.
///
/// # Examples
///
/// ```rust
/// use sheetrule::AttrId;
///
/// let feat = AttrId::from_str("feats.Toughness");
/// assert_eq!(feat.family(), Some("feats"));
/// assert_eq!(feat.member(), "Toughness");
///
/// let level: AttrId = "level".into();
/// assert_eq!(level.family(), None);
/// assert_eq!(level.member(), "level");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttrId(Arc<str>);

impl Serialize for AttrId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttrId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(AttrId::from(s))
    }
}

impl AttrId {
    /// Create a new `AttrId` from a string slice.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Build the id of a family member, `family.member`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sheetrule::AttrId;
    ///
    /// let id = AttrId::member_of("features", "Shield Block");
    /// assert_eq!(id.as_str(), "features.Shield Block");
    /// ```
    pub fn member_of(family: &str, member: &str) -> Self {
        Self::from(format!("{}.{}", family, member))
    }

    /// Get the string representation of this `AttrId`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(family, member)`. Scalars have no family.
    pub fn split(&self) -> (Option<&str>, &str) {
        match self.0.split_once('.') {
            Some((family, member)) => (Some(family), member),
            None => (None, &self.0),
        }
    }

    /// The family this attribute belongs to, if it is dotted.
    pub fn family(&self) -> Option<&str> {
        self.split().0
    }

    /// The member name within the family (the whole name for scalars).
    pub fn member(&self) -> &str {
        self.split().1
    }

    /// Whether this attribute lives in `family`.
    pub fn in_family(&self, family: &str) -> bool {
        self.family() == Some(family)
    }
}

impl From<&str> for AttrId {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for AttrId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&AttrId> for AttrId {
    fn from(id: &AttrId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for AttrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
