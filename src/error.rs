//! Error types for rule registration and resolution.
//!
//! Registration problems and dependency cycles are represented by
//! `RuleError`; problems inside the expression language by `ExprError`.
//! Constraint violations of a character are never errors, they surface as
//! validation notes.

use crate::attr_id::AttrId;
use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[AttrId]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors produced while parsing or evaluating an expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    /// The text does not match the expression grammar.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A call names a function the language does not provide.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("function `{name}` expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A regular expression failed to compile.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Errors that can occur while building or resolving a rule set.
///
/// # Examples
///
/// ```rust
/// use sheetrule::{AttrId, RuleError};
///
/// let err = RuleError::UnknownCategory("spells".to_string());
/// assert_eq!(err.to_string(), "Unknown choice category: spells");
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    /// A dependency cycle was detected in the rule graph.
    ///
    /// The path is closed: `[A, B, A]` means A depends on B depends on A.
    #[error("Cycle detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<AttrId> },

    /// A rule's value expression failed to parse.
    #[error("Invalid expression `{expr}` for {target}: {source}")]
    Expr {
        target: AttrId,
        expr: String,
        #[source]
        source: ExprError,
    },

    /// A note template failed to parse.
    #[error("Invalid note template for {attr}: {message}")]
    Template { attr: AttrId, message: String },

    /// An operator spelling is not one of `=`, `+`, `^`, `v`, `?`.
    #[error("Invalid rule operator: {0}")]
    InvalidOperator(String),

    /// An encoded attribute string is malformed.
    #[error("Malformed attributes for {name}: {message}")]
    MalformedAttributes { name: String, message: String },

    /// A choice was registered under a category the compiler does not know.
    #[error("Unknown choice category: {0}")]
    UnknownCategory(String),

    /// A choice's attributes are well formed but inconsistent.
    #[error("Invalid choice {name}: {message}")]
    InvalidChoice { name: String, message: String },

    /// The engine configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuleError::InvalidOperator("*=".to_string());
        assert!(err.to_string().contains("*="));
    }

    #[test]
    fn test_cycle_error_display() {
        let a = AttrId::from_str("A");
        let b = AttrId::from_str("B");
        let err = RuleError::Cycle {
            path: vec![a.clone(), b.clone(), a.clone()],
        };
        assert_eq!(err.to_string(), "Cycle detected: A -> B -> A");
    }

    #[test]
    fn test_expr_error_chains_source() {
        use std::error::Error as _;

        let err = RuleError::Expr {
            target: AttrId::from_str("armorClass"),
            expr: "floor(".to_string(),
            source: ExprError::Syntax("unexpected end".to_string()),
        };
        assert!(err.to_string().contains("armorClass"));
        assert!(err.source().is_some());
    }
}
