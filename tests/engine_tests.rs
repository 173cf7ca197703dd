mod common;

use common::*;
use sheetrule::choice::ChoiceCategory;
use sheetrule::rule::{RuleChain, RuleOp};
use sheetrule::*;
use std::sync::Arc;

/// Mutual sourcing without the trigger idiom is a build error.
#[test]
fn test_mutual_dependency_is_a_cycle() {
    let mut engine = RuleEngine::new();
    engine.add_rule("A", "B", RuleOp::Set, "source").unwrap();
    engine.add_rule("B", "A", RuleOp::Set, "source").unwrap();

    match engine.build() {
        Err(RuleError::Cycle { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&AttrId::from_str("A")));
            assert!(path.contains(&AttrId::from_str("B")));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

/// A cycle through expression references is found too.
#[test]
fn test_expression_cycle() {
    let mut engine = RuleEngine::new();
    engine.add_rule("armorClass", "", RuleOp::Add, "dexterityModifier + 10").unwrap();
    engine.add_rule("dexterityModifier", "", RuleOp::Set, "armorClass - 10").unwrap();
    assert!(matches!(engine.build(), Err(RuleError::Cycle { .. })));
}

/// A rule reading its own target only orders, it never cycles.
#[test]
fn test_trigger_rule_is_not_a_cycle() {
    let mut engine = RuleEngine::new();
    engine
        .add_chain(RuleChain::new("speed").set("", "25"))
        .unwrap();
    engine.add_rule("speed", "speed", RuleOp::Add, "source >= 30 ? 5 : null").unwrap();
    engine.add_rule("speed", "features.Fleet", RuleOp::Add, "5").unwrap();

    let plan = engine.build().unwrap();
    assert_eq!(plan.trigger_edges(), 1);

    let mut store = AttributeStore::new();
    store.set("features.Fleet", 1);
    engine.evaluate_all(&mut store).unwrap();
    // 25, then the trigger sees 25, then Fleet
    assert_eq!(store.get("speed"), Some(&Value::from(30)));
}

/// Registered choices are listed per category.
#[test]
fn test_choices_listing() {
    let engine = engine();
    let feats = engine.choices(ChoiceCategory::Feats);
    assert_eq!(
        feats.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["Fleet", "Toughness"]
    );
    assert_eq!(feats["Toughness"], TOUGHNESS_FEAT);
    assert_eq!(engine.choices(ChoiceCategory::Classes).len(), 1);
}

/// Overriding a shipped choice and removing the override restores it.
#[test]
fn test_override_and_restore() {
    let mut engine = engine();
    engine
        .register_choice(ChoiceCategory::Feats, "Toughness", "Trait=Skill")
        .unwrap();

    let mut store = AttributeStore::new();
    store.set("level", 1);
    store.set("feats.Toughness", 1);
    engine.evaluate_all(&mut store).unwrap();
    assert_eq!(store.get("sumGeneralFeats"), None);
    assert_eq!(store.get("sumSkillFeats"), Some(&Value::from(1)));

    assert!(engine.remove_choice(ChoiceCategory::Feats, "Toughness"));
    engine.evaluate_all(&mut store).unwrap();
    assert_eq!(store.get("sumGeneralFeats"), Some(&Value::from(1)));
    assert_eq!(store.get("sumSkillFeats"), None);
}

/// Removing a choice that was never overridden drops it entirely.
#[test]
fn test_remove_shipped_choice() {
    let mut engine = engine();
    assert!(engine.remove_choice(ChoiceCategory::Feats, "Fleet"));
    assert!(!engine.choices(ChoiceCategory::Feats).contains_key("Fleet"));

    let mut store = AttributeStore::new();
    store.set("level", 1);
    store.set("feats.Fleet", 1);
    engine.evaluate_all(&mut store).unwrap();
    assert_eq!(store.get("sumGeneralFeats"), None);
}

/// Unknown keys are tolerated; malformed strings and unknown categories
/// are not.
#[test]
fn test_registration_errors() {
    let mut engine = RuleEngine::new();
    assert!(engine
        .register_choice(ChoiceCategory::Feats, "Fleet", "Trait=General Homebrew=yes")
        .is_ok());
    assert!(matches!(
        engine.register_choice(ChoiceCategory::Feats, "Diehard", "Trait=General Require="),
        Err(RuleError::MalformedAttributes { .. })
    ));
    assert!(matches!(
        engine.register_choice(ChoiceCategory::Feats, "Diehard", r#"Require="level >=""#),
        Err(RuleError::Expr { .. })
    ));
    assert!(matches!(
        "spells".parse::<ChoiceCategory>(),
        Err(RuleError::UnknownCategory(_))
    ));
    assert!(!engine.choices(ChoiceCategory::Feats).contains_key("Diehard"));
}

/// One plan, many characters, many threads.
#[test]
fn test_shared_plan_across_threads() {
    let mut engine = engine();
    let plan: Arc<EvaluationPlan> = engine.build().unwrap();
    let evaluator = engine.evaluator();

    let results: Vec<Option<Value>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=8)
            .map(|level| {
                let plan = Arc::clone(&plan);
                let evaluator = evaluator.clone();
                scope.spawn(move || {
                    let mut store = dwarf_barbarian(level);
                    evaluator.evaluate_all(&plan, &mut store);
                    store.get("hitPoints").cloned()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (level, hit_points) in (1..=8).zip(results) {
        assert_eq!(hit_points, Some(Value::from(10 + 12 * level)));
    }
}

/// Inputs survive a JSON round trip and evaluate the same.
#[test]
fn test_inputs_json_round_trip() {
    let mut engine = engine();
    let mut store = dwarf_barbarian(3);
    store.set("feats.Toughness", 1);
    engine.evaluate_all(&mut store).unwrap();

    let mut restored = AttributeStore::from_inputs_json(&store.inputs_json().unwrap()).unwrap();
    engine.evaluate_all(&mut restored).unwrap();
    assert_eq!(restored.values(), store.values());
    assert_eq!(restored.notes(), store.notes());
}

/// The configured separator joins text contributions.
#[test]
fn test_configured_separator() {
    let config = EngineConfig::from_json(r#"{ "note_separator": ", " }"#).unwrap();
    let mut engine = RuleEngine::with_config(config).unwrap();
    engine.add_rule("languages", "ancestry", RuleOp::Add, "'Common'").unwrap();
    engine.add_rule("languages", "ancestry", RuleOp::Add, "source == 'Dwarf' ? 'Dwarven' : null").unwrap();

    let mut store = AttributeStore::new();
    store.set("ancestry", "Dwarf");
    engine.evaluate_all(&mut store).unwrap();
    assert_eq!(store.get("languages"), Some(&Value::from("Common, Dwarven")));
}

/// Validation and sanity families can be renamed.
#[test]
fn test_configured_families() {
    let config = EngineConfig {
        validation_family: "errors".to_string(),
        sanity_family: "warnings".to_string(),
        ..EngineConfig::default()
    };
    let mut engine = RuleEngine::with_config(config).unwrap();
    engine
        .register_choice(ChoiceCategory::Feats, "Fleet", r#"Require="level >= 2" Imply="speed > 0""#)
        .unwrap();

    let mut store = AttributeStore::new();
    store.set("level", 1);
    store.set("feats.Fleet", 1);
    engine.evaluate_all(&mut store).unwrap();

    let report = engine.validation_report(&store);
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].attr, AttrId::from_str("errors.fleetFeat"));
    assert_eq!(report[0].severity, Severity::Validation);
    assert_eq!(report[1].attr, AttrId::from_str("warnings.fleetFeat"));
    assert_eq!(report[1].severity, Severity::Sanity);

    assert!(RuleEngine::with_config(EngineConfig {
        sanity_family: "errors".to_string(),
        validation_family: "errors".to_string(),
        ..EngineConfig::default()
    })
    .is_err());
}
