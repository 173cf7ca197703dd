//! Rule value expressions.
//!
//! Every rule value and gate condition is written in a small expression
//! language (`source * 2`, `level >= 3 ? 1 : null`,
//! `abilityGeneration =~ '10s.*standard'`). Expressions are parsed once, at
//! registration, into an AST; evaluation walks the AST against a `Scope`.

use crate::attr_id::AttrId;
use crate::error::ExprError;
use crate::value::Value;
use pest::iterators::Pair;
use pest::Parser;
use regex::Regex;
use std::cmp::Ordering;

pub(crate) mod grammar {
    use pest_derive::Parser;

    #[derive(Parser)]
    #[grammar = "expr.pest"]
    pub(crate) struct ExprParser;
}

use grammar::{ExprParser, Rule as Syntax};

/// Read access to attribute values during evaluation.
///
/// The evaluator implements this over the table it is filling; tests and
/// hosts can implement it over anything that maps names to values.
pub trait Scope {
    /// Current value of an attribute, `None` when absent.
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Values of every attribute whose name matches `pattern`.
    fn matching(&self, pattern: &Regex) -> Vec<Value>;
}

/// An attribute an expression reads.
#[derive(Debug, Clone)]
pub enum Dependency {
    /// A single, statically named attribute.
    Attr(AttrId),
    /// Every attribute whose name matches the pattern.
    Pattern(Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Not,
    Neg,
}

/// Short-circuiting operators; the right operand is evaluated lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogicalOp {
    Or,
    And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Floor,
    Ceil,
    Round,
    Abs,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Count,
}

#[derive(Debug, Clone)]
enum Pattern {
    Static(Regex),
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Source,
    Attr(AttrId),
    Lookup(Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Match {
        subject: Box<Expr>,
        pattern: Pattern,
        negated: bool,
    },
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
    Aggregate(Aggregate, Regex),
}

/// A parsed value expression.
///
/// # Examples
///
/// ```rust
/// use sheetrule::expr::{Scope, ValueExpr};
/// use sheetrule::Value;
/// use regex::Regex;
///
/// struct Level(f64);
///
/// impl Scope for Level {
///     fn lookup(&self, name: &str) -> Option<Value> {
///         (name == "level").then(|| Value::from(self.0))
///     }
///     fn matching(&self, _pattern: &Regex) -> Vec<Value> {
///         Vec::new()
///     }
/// }
///
/// let expr = ValueExpr::parse("Math.floor((level + 3) / 4)").unwrap();
/// let value = expr.evaluate(&Level(5.0), &Value::Null).unwrap();
/// assert_eq!(value, Value::from(2));
/// ```
#[derive(Debug, Clone)]
pub struct ValueExpr {
    text: String,
    ast: Expr,
}

impl ValueExpr {
    /// Parse an expression.
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        let mut pairs = ExprParser::parse(Syntax::expression, text)
            .map_err(|e| ExprError::Syntax(e.to_string()))?;
        let expression = pairs
            .next()
            .ok_or_else(|| ExprError::Syntax("empty expression".to_string()))?;
        let inner = expression
            .into_inner()
            .next()
            .ok_or_else(|| ExprError::Syntax("empty expression".to_string()))?;
        Ok(Self {
            text: text.to_string(),
            ast: build_expr(inner)?,
        })
    }

    /// The pass-through expression, `source`.
    pub fn source() -> Self {
        Self {
            text: "source".to_string(),
            ast: Expr::Source,
        }
    }

    /// The text the expression was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the expression is exactly `source`.
    pub fn is_pass_through(&self) -> bool {
        matches!(self.ast, Expr::Source)
    }

    /// Evaluate against `scope`, with `source` bound to `source`.
    pub fn evaluate(&self, scope: &dyn Scope, source: &Value) -> Result<Value, ExprError> {
        eval(&self.ast, scope, source)
    }

    /// Attributes (and attribute patterns) the expression reads.
    ///
    /// Lookups whose key is computed at evaluation time cannot be listed
    /// and are left out.
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut deps = Vec::new();
        collect_dependencies(&self.ast, &mut deps);
        deps
    }
}

impl std::fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Quote `text` as a string literal.
///
/// Double quotes are used unless the text contains one. The grammar has no
/// escapes, so text containing both quote characters cannot be quoted.
pub fn quote(text: &str) -> String {
    if text.contains('"') {
        format!("'{}'", text)
    } else {
        format!("\"{}\"", text)
    }
}

/// Expression text reading the attribute `name`, whatever characters the
/// name contains.
///
/// ```rust
/// use sheetrule::expr::attr_ref;
///
/// assert_eq!(attr_ref("features.Shield Block"), r#"dict["features.Shield Block"]"#);
/// ```
pub fn attr_ref(name: &str) -> String {
    format!("dict[{}]", quote(name))
}

fn compile_pattern(pattern: &str) -> Result<Regex, ExprError> {
    Regex::new(pattern).map_err(|e| ExprError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn syntax(message: &str) -> ExprError {
    ExprError::Syntax(message.to_string())
}

fn build_expr(pair: Pair<'_, Syntax>) -> Result<Expr, ExprError> {
    match pair.as_rule() {
        Syntax::expr => {
            let mut inner = pair.into_inner();
            let condition = build_expr(inner.next().ok_or_else(|| syntax("missing operand"))?)?;
            match (inner.next(), inner.next()) {
                (Some(then), Some(otherwise)) => Ok(Expr::Ternary(
                    Box::new(condition),
                    Box::new(build_expr(then)?),
                    Box::new(build_expr(otherwise)?),
                )),
                _ => Ok(condition),
            }
        }
        Syntax::disjunction
        | Syntax::conjunction
        | Syntax::comparison
        | Syntax::sum
        | Syntax::product => build_binary_chain(pair),
        Syntax::unary => {
            let mut prefixes = Vec::new();
            let mut operand = None;
            for inner in pair.into_inner() {
                if inner.as_rule() == Syntax::prefix_op {
                    prefixes.push(if inner.as_str() == "!" {
                        UnaryOp::Not
                    } else {
                        UnaryOp::Neg
                    });
                } else {
                    operand = Some(build_expr(inner)?);
                }
            }
            let mut expr = operand.ok_or_else(|| syntax("missing operand"))?;
            for op in prefixes.into_iter().rev() {
                expr = Expr::Unary(op, Box::new(expr));
            }
            Ok(expr)
        }
        Syntax::number => pair
            .as_str()
            .parse::<f64>()
            .map(|n| Expr::Literal(Value::Number(n)))
            .map_err(|e| ExprError::Syntax(e.to_string())),
        Syntax::string => Ok(Expr::Literal(Value::Text(string_contents(pair)))),
        Syntax::lookup => {
            let key = pair
                .into_inner()
                .next()
                .ok_or_else(|| syntax("empty lookup"))?;
            match build_expr(key)? {
                Expr::Literal(Value::Text(name)) => Ok(Expr::Attr(AttrId::from(name))),
                dynamic => Ok(Expr::Lookup(Box::new(dynamic))),
            }
        }
        Syntax::call => build_call(pair),
        Syntax::identifier => Ok(match pair.as_str() {
            "source" => Expr::Source,
            "null" | "undefined" => Expr::Literal(Value::Null),
            "true" => Expr::Literal(Value::Bool(true)),
            "false" => Expr::Literal(Value::Bool(false)),
            name => Expr::Attr(AttrId::from(name)),
        }),
        other => Err(ExprError::Syntax(format!("unexpected {:?}", other))),
    }
}

fn string_contents(pair: Pair<'_, Syntax>) -> String {
    pair.into_inner()
        .next()
        .map(|inner| inner.as_str().to_string())
        .unwrap_or_default()
}

fn build_binary_chain(pair: Pair<'_, Syntax>) -> Result<Expr, ExprError> {
    let mut inner = pair.into_inner();
    let mut lhs = build_expr(inner.next().ok_or_else(|| syntax("missing operand"))?)?;
    while let Some(op) = inner.next() {
        let rhs = inner.next().ok_or_else(|| syntax("missing right operand"))?;
        lhs = match op.as_str() {
            "=~" | "!~" => {
                let negated = op.as_str() == "!~";
                let pattern = match build_expr(rhs)? {
                    Expr::Literal(Value::Text(p)) => Pattern::Static(compile_pattern(&p)?),
                    dynamic => Pattern::Dynamic(Box::new(dynamic)),
                };
                Expr::Match {
                    subject: Box::new(lhs),
                    pattern,
                    negated,
                }
            }
            "||" | "&&" => {
                let op = if op.as_str() == "||" {
                    LogicalOp::Or
                } else {
                    LogicalOp::And
                };
                Expr::Logical(op, Box::new(lhs), Box::new(build_expr(rhs)?))
            }
            symbol => {
                let op = match symbol {
                    "==" | "===" => BinaryOp::Eq,
                    "!=" | "!==" => BinaryOp::Ne,
                    "<" => BinaryOp::Lt,
                    "<=" => BinaryOp::Le,
                    ">" => BinaryOp::Gt,
                    ">=" => BinaryOp::Ge,
                    "+" => BinaryOp::Add,
                    "-" => BinaryOp::Sub,
                    "*" => BinaryOp::Mul,
                    "/" => BinaryOp::Div,
                    "%" => BinaryOp::Rem,
                    other => return Err(ExprError::Syntax(format!("unknown operator {}", other))),
                };
                Expr::Binary(op, Box::new(lhs), Box::new(build_expr(rhs)?))
            }
        };
    }
    Ok(lhs)
}

fn build_call(pair: Pair<'_, Syntax>) -> Result<Expr, ExprError> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .ok_or_else(|| syntax("missing function name"))?
        .as_str()
        .to_string();
    let args = inner.map(build_expr).collect::<Result<Vec<_>, _>>()?;
    let short = name.strip_prefix("Math.").unwrap_or(&name).to_ascii_lowercase();

    let arity = |expected: usize| -> Result<(), ExprError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ExprError::Arity {
                name: name.clone(),
                expected,
                found: args.len(),
            })
        }
    };

    match short.as_str() {
        "sum" | "count" => {
            arity(1)?;
            let kind = if short == "sum" {
                Aggregate::Sum
            } else {
                Aggregate::Count
            };
            match &args[0] {
                Expr::Literal(Value::Text(p)) => Ok(Expr::Aggregate(kind, compile_pattern(p)?)),
                _ => Err(ExprError::Syntax(format!(
                    "{} expects a literal pattern",
                    name
                ))),
            }
        }
        "floor" | "ceil" | "round" | "abs" => {
            arity(1)?;
            let function = match short.as_str() {
                "floor" => Function::Floor,
                "ceil" => Function::Ceil,
                "round" => Function::Round,
                _ => Function::Abs,
            };
            Ok(Expr::Call(function, args))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(ExprError::Arity {
                    name,
                    expected: 1,
                    found: 0,
                });
            }
            let function = if short == "min" {
                Function::Min
            } else {
                Function::Max
            };
            Ok(Expr::Call(function, args))
        }
        _ => Err(ExprError::UnknownFunction(name)),
    }
}

fn collect_dependencies(expr: &Expr, deps: &mut Vec<Dependency>) {
    match expr {
        Expr::Literal(_) | Expr::Source => {}
        Expr::Attr(id) => deps.push(Dependency::Attr(id.clone())),
        Expr::Lookup(key) => collect_dependencies(key, deps),
        Expr::Unary(_, operand) => collect_dependencies(operand, deps),
        Expr::Binary(_, lhs, rhs) | Expr::Logical(_, lhs, rhs) => {
            collect_dependencies(lhs, deps);
            collect_dependencies(rhs, deps);
        }
        Expr::Match {
            subject, pattern, ..
        } => {
            collect_dependencies(subject, deps);
            if let Pattern::Dynamic(p) = pattern {
                collect_dependencies(p, deps);
            }
        }
        Expr::Ternary(c, a, b) => {
            collect_dependencies(c, deps);
            collect_dependencies(a, deps);
            collect_dependencies(b, deps);
        }
        Expr::Call(_, args) => args.iter().for_each(|a| collect_dependencies(a, deps)),
        Expr::Aggregate(_, pattern) => deps.push(Dependency::Pattern(pattern.clone())),
    }
}

fn eval(expr: &Expr, scope: &dyn Scope, source: &Value) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Source => Ok(source.clone()),
        Expr::Attr(id) => Ok(scope.lookup(id.as_str()).unwrap_or(Value::Null)),
        Expr::Lookup(key) => {
            let name = eval(key, scope, source)?.to_string();
            Ok(scope.lookup(&name).unwrap_or(Value::Null))
        }
        Expr::Unary(op, operand) => {
            let v = eval(operand, scope, source)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!v.is_truthy()),
                UnaryOp::Neg => Value::Number(-v.to_number()),
            })
        }
        Expr::Logical(op, lhs, rhs) => {
            let l = eval(lhs, scope, source)?;
            match (op, l.is_truthy()) {
                (LogicalOp::Or, true) | (LogicalOp::And, false) => Ok(l),
                _ => eval(rhs, scope, source),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, scope, source)?;
            let r = eval(rhs, scope, source)?;
            apply_binary(*op, &l, &r)
        }
        Expr::Match {
            subject,
            pattern,
            negated,
        } => {
            let text = eval(subject, scope, source)?.to_string();
            let matched = match pattern {
                Pattern::Static(re) => re.is_match(&text),
                Pattern::Dynamic(p) => {
                    let p = eval(p, scope, source)?.to_string();
                    compile_pattern(&p)?.is_match(&text)
                }
            };
            Ok(Value::Bool(matched != *negated))
        }
        Expr::Ternary(condition, then, otherwise) => {
            if eval(condition, scope, source)?.is_truthy() {
                eval(then, scope, source)
            } else {
                eval(otherwise, scope, source)
            }
        }
        Expr::Call(function, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, scope, source).map(|v| v.to_number()))
                .collect::<Result<Vec<_>, _>>()?;
            let result = match function {
                Function::Floor => values[0].floor(),
                Function::Ceil => values[0].ceil(),
                Function::Round => values[0].round(),
                Function::Abs => values[0].abs(),
                Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                Function::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            Ok(Value::Number(result))
        }
        Expr::Aggregate(kind, pattern) => {
            let values = scope.matching(pattern);
            Ok(Value::Number(match kind {
                Aggregate::Sum => values
                    .iter()
                    .filter_map(Value::as_number)
                    .filter(|n| !n.is_nan())
                    .sum(),
                Aggregate::Count => values.iter().filter(|v| v.is_truthy()).count() as f64,
            }))
        }
    }
}

fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    let ordering = || l.compare(r);
    Ok(match op {
        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinaryOp::Lt => Value::Bool(ordering() == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            ordering(),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(ordering() == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            ordering(),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Add => match (l, r) {
            (Value::Text(_), _) | (_, Value::Text(_)) => Value::Text(format!("{}{}", l, r)),
            _ => Value::Number(l.to_number() + r.to_number()),
        },
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div | BinaryOp::Rem => {
            let divisor = r.to_number();
            if divisor == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            if op == BinaryOp::Div {
                Value::Number(l.to_number() / divisor)
            } else {
                Value::Number(l.to_number() % divisor)
            }
        }
    })
}
