//! # sheetrule - Declarative Attribute Rule Engine
//!
//! A rule engine for character-sheet style data, where a small set of raw
//! inputs (choices a player made) determines a large set of derived
//! attributes through declarative rules:
//! - **Declarative** rules of the form `target <op> f(source)`
//! - **Dependency ordered** evaluation with cycle detection
//! - **Idempotent** passes (evaluating twice changes nothing)
//! - **Data driven** content: choices are compact encoded strings that
//!   compile into rules
//!
//! ## Core Concepts
//!
//! ### Rule Pipeline
//!
//! ```text
//! [Choice] → [RuleBatch] → [RuleRegistry] → [EvaluationPlan] → [AttributeStore]
//! ```
//!
//! 1. **Choices** compile into batches of rules and note templates
//! 2. **The registry** keeps rules in declaration order, grouped by target
//! 3. **The resolver** orders targets so every attribute is computed
//!    before anything that reads it
//! 4. **The evaluator** folds each target's rules over the store
//!
//! ### Operators
//!
//! | op  | meaning                                          |
//! |-----|--------------------------------------------------|
//! | `=` | set, unless something already set the target     |
//! | `+` | add numbers, join text                           |
//! | `^` | maximum                                          |
//! | `v` | minimum                                          |
//! | `?` | gate: a falsy value suppresses other rules       |
//!
//! ## Example
//!
//! ```rust
//! use sheetrule::*;
//! use sheetrule::rule::{RuleChain, RuleOp};
//!
//! let mut engine = RuleEngine::new();
//! engine
//!     .add_chain(RuleChain::new("featCount.General").set("level", "source < 3 ? 1 : floor((source + 1) / 4)"))
//!     .unwrap();
//! engine.add_rule("sumGeneralFeats", "feats.Toughness", RuleOp::Add, "source").unwrap();
//! engine.valid_allocation_rules("generalFeat", "featCount.General", "sumGeneralFeats").unwrap();
//!
//! let mut store = AttributeStore::new();
//! store.set("level", 1);
//! store.set("feats.Toughness", 1);
//! engine.evaluate_all(&mut store).unwrap();
//!
//! assert_eq!(store.get("featCount.General"), Some(&Value::from(1)));
//! assert!(engine.validation_report(&store).is_empty());
//! ```
//!
//! ## Modules
//!
//! - [`attr_id`] - Attribute identifier type
//! - [`value`] - Dynamic attribute values
//! - [`expr`] - Value expression language
//! - [`template`] - Note templates
//! - [`rule`] - Rules, chains and batches
//! - [`registry`] - Rule registry
//! - [`graph`] - Dependency graph management
//! - [`resolver`] - Evaluation plans
//! - [`store`] - Attribute store
//! - [`evaluator`] - Rule evaluation
//! - [`validation`] - Validation reporting
//! - [`choice`] - Encoded choices and their compiler
//! - [`engine`] - The engine facade
//! - [`config`] - Engine configuration
//! - [`error`] - Error types

pub mod attr_id;
pub mod choice;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod graph;
pub mod registry;
pub mod resolver;
pub mod rule;
pub mod store;
pub mod template;
pub mod validation;
pub mod value;

// Re-export main types for convenience
pub use attr_id::AttrId;
pub use config::EngineConfig;
pub use engine::RuleEngine;
pub use error::{ExprError, RuleError};
pub use evaluator::Evaluator;
pub use resolver::{DependencyResolver, EvaluationPlan};
pub use store::AttributeStore;
pub use validation::{Severity, ValidationReporter, Violation};
pub use value::Value;
