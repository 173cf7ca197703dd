//! Character example: building a small character from encoded choices
//!
//! This example demonstrates:
//! - Registering ancestries, classes, feats and features
//! - Budget validation with `valid_allocation_rules`
//! - Evaluating a character and reading notes and violations
//!
//! Run with `RUST_LOG=sheetrule=debug` to see registration and plan builds.

use sheetrule::choice::ChoiceCategory;
use sheetrule::rule::RuleChain;
use sheetrule::*;
use tracing_subscriber::EnvFilter;

const FEATS: &[(&str, &str)] = &[
    ("Toughness", "Trait=General"),
    ("Fleet", "Trait=General"),
    ("Battle Medicine", r#"Traits=General,Skill Require="rank.Medicine >= 1""#),
];

const FEATURES: &[(&str, &str)] = &[
    ("Toughness", r#"Section=combat Note="+%{level} Hit Points""#),
    ("Fleet", r#"Section=ability Note="+5 Speed""#),
    ("Darkvision", r#"Section=feature Note="Has normal vision in darkness""#),
    ("Ancestry Feats", r#"Section=feature Note="%V selections""#),
];

const DWARF: &str = r#"Features="1:Clan Dagger","1:Darkvision","abilityGeneration =~ '10s.*standard' ? 1:Ability Boost (Constitution; Wisdom; Choose 1 from any)"
  HitPoints=10
  Selectables="1:Ancient-Blooded Dwarf:Heritage","1:Rock Dwarf:Heritage""#;

const BARBARIAN: &str = r#"Features="1:Ancestry Feats","1:Perception Expert","1:Skill Trained (Athletics; Choose 3 from any)","3:Deny Advantage"
  HitPoints=12
  Selectables="1:Fury Instinct:Instinct","1:Giant Instinct:Instinct""#;

fn main() -> Result<(), RuleError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut engine = RuleEngine::new();

    // Core rules that are not attached to any choice
    engine.add_chain(
        RuleChain::new("featCount.General").set("level", "source < 3 ? 1 : floor((source + 1) / 4)"),
    )?;
    engine.valid_allocation_rules("generalFeat", "featCount.General", "sumGeneralFeats")?;
    engine.add_chain(RuleChain::new("featureNotes.ancestryFeats").set("level", "floor((source + 3) / 4)"))?;

    // Shipped content
    let feats = engine.register_choices(ChoiceCategory::Feats, FEATS.iter().copied())?;
    let features = engine.register_choices(ChoiceCategory::Features, FEATURES.iter().copied())?;
    engine.register_default_choice(ChoiceCategory::Ancestries, "Dwarf", DWARF)?;
    engine.register_default_choice(ChoiceCategory::Classes, "Barbarian", BARBARIAN)?;
    println!("Registered {} feats and {} features", feats, features);

    let plan = engine.build()?;
    println!(
        "Plan: {} targets, {} rules, {} notes\n",
        plan.targets().len(),
        plan.rule_count(),
        plan.notes().len()
    );

    // A level 1 dwarf barbarian who took one feat too many
    let mut store = AttributeStore::new();
    store.set("level", 1);
    store.set("ancestry", "Dwarf");
    store.set("class", "Barbarian");
    store.set("abilityGeneration", "All 10s; standard ancestry boosts");
    store.set("selectableFeatures.Dwarf - Rock Dwarf", 1);
    store.set("selectableFeatures.Barbarian - Giant Instinct", 1);
    store.set("feats.Toughness", 1);
    store.set("feats.Fleet", 1);

    engine.evaluate_all(&mut store)?;

    println!("=== Attributes ===");
    for name in ["hitPoints", "featCount.General", "sumGeneralFeats", "rank.Perception"] {
        let value = store.get(name).cloned().unwrap_or_default();
        println!("  {:<20} {}", name, value);
    }
    for (member, _) in store.family("features") {
        println!("  feature: {}", member);
    }

    println!("\n=== Notes ===");
    for (attr, text) in store.notes() {
        println!("  {}: {}", attr, text);
    }

    println!("\n=== Validation ===");
    let report = engine.validation_report(&store);
    if report.is_empty() {
        println!("  ✓ Character is valid");
    }
    for violation in &report {
        println!("  ✗ {}", violation);
    }

    println!("\n=== Dropping a feat ===");
    store.remove("feats.Fleet");
    engine.evaluate_all(&mut store)?;
    println!("  valid: {}", engine.validation_report(&store).is_empty());

    Ok(())
}
