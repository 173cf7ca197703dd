//! Shared fixtures: a small slice of the core rulebook.

#![allow(dead_code)]

use sheetrule::choice::ChoiceCategory;
use sheetrule::rule::RuleChain;
use sheetrule::{AttributeStore, RuleEngine};

pub const TOUGHNESS_FEAT: &str = "Trait=General";
pub const FLEET_FEAT: &str = "Trait=General";
pub const TOUGHNESS_FEATURE: &str = r#"Section=combat Note="+%{level} Hit Points""#;
pub const ANCESTRY_FEATS_FEATURE: &str = r#"Section=feature Note="%V selections""#;

pub const DWARF: &str = r#"Features="1:Clan Dagger","1:Darkvision","abilityGeneration =~ '10s.*standard' ? 1:Ability Boost (Constitution; Wisdom; Choose 1 from any)"
  HitPoints=10
  Languages=Common,Dwarven
  Selectables="1:Ancient-Blooded Dwarf:Heritage","1:Rock Dwarf:Heritage"
  Traits=Dwarf,Humanoid"#;

pub const BARBARIAN: &str = r#"Features="1:Ancestry Feats","1:Perception Expert","1:Skill Trained (Athletics; Choose 3 from any)","3:Deny Advantage"
  HitPoints=12
  Selectables="1:Fury Instinct:Instinct","1:Giant Instinct:Instinct""#;

pub const DWARF_BOOST: &str = "Ability Boost (Constitution; Wisdom; Choose 1 from any)";

/// An engine loaded with the fixture rules and choices.
pub fn engine() -> RuleEngine {
    let mut engine = RuleEngine::new();

    engine
        .add_chain(RuleChain::new("featCount.General").set("level", "source < 3 ? 1 : floor((source + 1) / 4)"))
        .unwrap();
    engine
        .valid_allocation_rules("generalFeat", "featCount.General", "sumGeneralFeats")
        .unwrap();
    engine
        .add_chain(RuleChain::new("featureNotes.ancestryFeats").set("level", "floor((source + 3) / 4)"))
        .unwrap();

    engine
        .register_default_choice(ChoiceCategory::Feats, "Toughness", TOUGHNESS_FEAT)
        .unwrap();
    engine
        .register_default_choice(ChoiceCategory::Feats, "Fleet", FLEET_FEAT)
        .unwrap();
    engine
        .register_default_choice(ChoiceCategory::Features, "Toughness", TOUGHNESS_FEATURE)
        .unwrap();
    engine
        .register_default_choice(ChoiceCategory::Features, "Ancestry Feats", ANCESTRY_FEATS_FEATURE)
        .unwrap();
    engine
        .register_default_choice(ChoiceCategory::Ancestries, "Dwarf", DWARF)
        .unwrap();
    engine
        .register_default_choice(ChoiceCategory::Classes, "Barbarian", BARBARIAN)
        .unwrap();
    engine
}

/// A level `level` dwarf barbarian with no feats.
pub fn dwarf_barbarian(level: i32) -> AttributeStore {
    let mut store = AttributeStore::new();
    store.set("level", level);
    store.set("ancestry", "Dwarf");
    store.set("class", "Barbarian");
    store
}
