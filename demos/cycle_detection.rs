//! Cycle detection example: Demonstrating error handling for circular dependencies
//!
//! This example shows:
//! - What happens when rules source each other in a loop
//! - How a rule reading its own target is ordered instead of rejected
//!
//! Run with `RUST_LOG=sheetrule=debug` to see the plan builds.

use sheetrule::rule::{RuleChain, RuleOp};
use sheetrule::*;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut engine = RuleEngine::new();

    println!("=== Setting up circular dependencies ===\n");

    // A <- B <- C <- A
    for (target, source) in [("A", "B"), ("B", "C"), ("C", "A")] {
        if let Err(e) = engine.add_rule(target, source, RuleOp::Add, "source + 1") {
            println!("✗ Could not add rule: {}", e);
            return;
        }
        println!("{} += {} + 1", target, source);
    }

    println!("\n=== Attempting to build (should detect cycle) ===\n");

    let mut store = AttributeStore::new();
    match engine.evaluate_all(&mut store) {
        Err(RuleError::Cycle { path }) => {
            println!("✓ Cycle detected successfully!");
            let names: Vec<_> = path.iter().map(AttrId::as_str).collect();
            println!("\nCycle path:\n{}", names.join(" -> "));
        }
        Err(e) => println!("✗ Unexpected error: {}", e),
        Ok(()) => println!("✗ ERROR: Cycle was not detected! This should not happen."),
    }

    println!("\n=== Trigger rule (no cycle) ===\n");

    let mut engine = RuleEngine::new();
    let setup = engine
        .add_chain(RuleChain::new("speed").set("", "25"))
        .and_then(|_| engine.add_rule("speed", "speed", RuleOp::Add, "source >= 25 ? 5 : null"));
    if let Err(e) = setup {
        println!("✗ Could not add rules: {}", e);
        return;
    }
    println!("speed = 25");
    println!("speed += 5 while speed >= 25 (reads its own target)");

    let mut store = AttributeStore::new();
    match engine.evaluate_all(&mut store) {
        Ok(()) => {
            let speed = store.get("speed").cloned().unwrap_or_default();
            println!("\n✓ Resolved: speed = {}", speed);
        }
        Err(e) => println!("✗ Unexpected error: {}", e),
    }
}
