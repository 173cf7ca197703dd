//! Note templates.
//!
//! A note attribute carries a template that turns its computed value into
//! display text. Placeholders:
//!
//! * `%V` the note's value
//! * `%1` to `%9` the value of the sub-attribute `<note>.<n>`
//! * `%N` the note's member name
//! * `%{expr}` an inline expression, with `source` bound to the value

use crate::attr_id::AttrId;
use crate::error::ExprError;
use crate::expr::grammar::{ExprParser, Rule as Syntax};
use crate::expr::{Dependency, Scope, ValueExpr};
use crate::value::Value;
use pest::Parser;

#[derive(Debug, Clone)]
enum Part {
    Text(String),
    Value,
    Name,
    Slot(u8),
    Expr(ValueExpr),
}

/// A parsed note template.
///
/// # Examples
///
/// ```rust
/// use sheetrule::template::NoteTemplate;
/// use sheetrule::expr::Scope;
/// use sheetrule::{AttrId, Value};
/// use regex::Regex;
///
/// struct Empty;
///
/// impl Scope for Empty {
///     fn lookup(&self, _name: &str) -> Option<Value> {
///         None
///     }
///     fn matching(&self, _pattern: &Regex) -> Vec<Value> {
///         Vec::new()
///     }
/// }
///
/// let template = NoteTemplate::parse("+%V Hit Points").unwrap();
/// let attr = AttrId::from_str("featureNotes.toughness");
/// let text = template.render(&attr, &Value::from(5), &Empty).unwrap();
/// assert_eq!(text, "+5 Hit Points");
/// ```
#[derive(Debug, Clone)]
pub struct NoteTemplate {
    text: String,
    parts: Vec<Part>,
}

impl NoteTemplate {
    /// Parse a template string.
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        let mut pairs = ExprParser::parse(Syntax::template, text)
            .map_err(|e| ExprError::Syntax(e.to_string()))?;
        let template = pairs
            .next()
            .ok_or_else(|| ExprError::Syntax("empty template".to_string()))?;

        let mut parts = Vec::new();
        for pair in template.into_inner() {
            match pair.as_rule() {
                Syntax::text => parts.push(Part::Text(pair.as_str().to_string())),
                Syntax::placeholder => {
                    let inner = pair
                        .into_inner()
                        .next()
                        .ok_or_else(|| ExprError::Syntax("empty placeholder".to_string()))?;
                    let part = match inner.as_rule() {
                        Syntax::inline_expr => Part::Expr(ValueExpr::parse(inner.as_str())?),
                        _ => match inner.as_str() {
                            "V" => Part::Value,
                            "N" => Part::Name,
                            digit => Part::Slot(digit.parse().map_err(|_| {
                                ExprError::Syntax(format!("bad placeholder %{}", digit))
                            })?),
                        },
                    };
                    parts.push(part);
                }
                _ => {}
            }
        }

        Ok(Self {
            text: text.to_string(),
            parts,
        })
    }

    /// The template text as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the template shows the note's value (`%V`).
    ///
    /// A note whose text depends on its value is only meaningful while
    /// the feature granting it is present, so the choice compiler gates
    /// such notes instead of setting them.
    pub fn uses_value(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Value))
    }

    /// Sub-attribute slots referenced by `%1` to `%9`.
    pub fn slots(&self) -> Vec<u8> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Slot(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// Attributes read by inline expressions.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Expr(e) => Some(e.dependencies()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Render the note for `attr` holding `value`.
    pub fn render(&self, attr: &AttrId, value: &Value, scope: &dyn Scope) -> Result<String, ExprError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(t) => out.push_str(t),
                Part::Value => out.push_str(&value.to_string()),
                Part::Name => out.push_str(attr.member()),
                Part::Slot(n) => {
                    let sub = format!("{}.{}", attr, n);
                    let v = scope.lookup(&sub).unwrap_or(Value::Null);
                    out.push_str(&v.to_string());
                }
                Part::Expr(e) => out.push_str(&e.evaluate(scope, value)?.to_string()),
            }
        }
        Ok(out)
    }
}

impl std::fmt::Display for NoteTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashMap;

    struct MapScope(HashMap<&'static str, Value>);

    impl Scope for MapScope {
        fn lookup(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }

        fn matching(&self, _pattern: &Regex) -> Vec<Value> {
            Vec::new()
        }
    }

    fn scope() -> MapScope {
        let mut values = HashMap::new();
        values.insert("validationNotes.generalFeatAllocation.1", Value::from(1));
        values.insert("validationNotes.generalFeatAllocation.2", Value::from(2));
        values.insert("level", Value::from(5));
        MapScope(values)
    }

    #[test]
    fn test_slots() {
        let template = NoteTemplate::parse("%1 available vs. %2 allocated").unwrap();
        assert_eq!(template.slots(), vec![1, 2]);
        let attr = AttrId::from_str("validationNotes.generalFeatAllocation");
        let text = template.render(&attr, &Value::from(1), &scope()).unwrap();
        assert_eq!(text, "1 available vs. 2 allocated");
    }

    #[test]
    fn test_inline_expression() {
        let template = NoteTemplate::parse("+%{level} Hit Points").unwrap();
        assert!(!template.uses_value());
        assert_eq!(template.dependencies().len(), 1);
        let attr = AttrId::from_str("featureNotes.toughness");
        let text = template.render(&attr, &Value::from(1), &scope()).unwrap();
        assert_eq!(text, "+5 Hit Points");
    }

    #[test]
    fn test_name_and_value() {
        let template = NoteTemplate::parse("%N x%V").unwrap();
        assert!(template.uses_value());
        let attr = AttrId::from_str("featureNotes.darkvision");
        let text = template.render(&attr, &Value::from(2), &scope()).unwrap();
        assert_eq!(text, "darkvision x2");
    }

    #[test]
    fn test_literal_percent() {
        let template = NoteTemplate::parse("50% cover").unwrap();
        let attr = AttrId::from_str("combatNotes.cover");
        assert_eq!(
            template.render(&attr, &Value::from(1), &scope()).unwrap(),
            "50% cover"
        );
    }

    #[test]
    fn test_unterminated_expression_is_an_error() {
        assert!(NoteTemplate::parse("+%{level Hit Points").is_err());
        assert!(NoteTemplate::parse("%{floor(}").is_err());
    }
}
