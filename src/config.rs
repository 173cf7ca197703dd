//! Engine configuration.

use crate::error::RuleError;
use serde::{Deserialize, Serialize};

fn default_separator() -> String {
    "/".to_string()
}

fn default_validation_family() -> String {
    "validationNotes".to_string()
}

fn default_sanity_family() -> String {
    "sanityNotes".to_string()
}

/// Settings shared by the registry, evaluator and reporter.
///
/// Every field has a default, so a partial JSON object is a valid
/// configuration.
///
/// # Examples
///
/// ```rust
/// use sheetrule::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "note_separator": "; " }"#).unwrap();
/// assert_eq!(config.note_separator, "; ");
/// assert_eq!(config.validation_family, "validationNotes");
/// assert!(!config.strict_registration);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Joins text contributions to one target.
    #[serde(default = "default_separator")]
    pub note_separator: String,

    /// Family of hard constraint violations.
    #[serde(default = "default_validation_family")]
    pub validation_family: String,

    /// Family of likely authoring mistakes.
    #[serde(default = "default_sanity_family")]
    pub sanity_family: String,

    /// Stop bulk choice registration at the first failure instead of
    /// logging it and moving on.
    #[serde(default)]
    pub strict_registration: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            note_separator: default_separator(),
            validation_family: default_validation_family(),
            sanity_family: default_sanity_family(),
            strict_registration: false,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let config: Self = serde_json::from_str(json).map_err(|e| RuleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> Result<(), RuleError> {
        for (field, family) in [
            ("validation_family", &self.validation_family),
            ("sanity_family", &self.sanity_family),
        ] {
            if family.is_empty() || family.contains('.') {
                return Err(RuleError::Config(format!(
                    "{} must be a non-empty name without dots, got {:?}",
                    field, family
                )));
            }
        }
        if self.validation_family == self.sanity_family {
            return Err(RuleError::Config(
                "validation and sanity families must differ".to_string(),
            ));
        }
        Ok(())
    }
}
