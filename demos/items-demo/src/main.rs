//! Items Demo
//!
//! Adds several items optimistically against a simulated remote, prints the
//! state while the calls are in flight and again once they all settled.
//! Configure with `OPTIMIST_*` variables, e.g.
//! `OPTIMIST_REMOTE_SUCCESS_RATE=0.5 OPTIMIST_REMOTE_DELAY=1s`.

use std::error::Error;
use std::time::Duration;

use optimist_runtime::{init_tracing, AppState, FormField, FormPatch, ItemsStore, RuntimeConfig};
use tracing::info;

fn print_items(label: &str, state: &AppState) {
    println!("   {label}:");
    for item in state.items() {
        let status = match (item.pending, item.error) {
            (true, _) => "pending",
            (_, true) => "error",
            _ => "ok",
        };
        println!("     - {:<10} {}", item.name, status);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = RuntimeConfig::from_env()?;
    init_tracing(&config.log)?;

    println!("=== Optimist Items Demo ===\n");
    println!("1. Configuration");
    println!("{}", config.to_json()?);

    let store = ItemsStore::new(&config);

    // 2. Optimistic additions, all in flight together
    println!("\n2. Adding items optimistically");
    let handles: Vec<_> = ["apples", "pears", "plums"]
        .into_iter()
        .map(|name| store.spawn_add_item(name))
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    print_items("while in flight", &store.state());
    info!(
        open = store.coordinator().open_transactions().len(),
        "waiting for the remote"
    );

    for handle in handles {
        let settlement = handle.await??;
        println!("   {} settled: committed = {}", settlement.id(), settlement.is_committed());
    }
    print_items("after settling", &store.state());

    // 3. Form update
    println!("\n3. Updating the form");
    let patch = FormPatch {
        name: Some(FormField::new("456".to_string())),
        live: Some(FormField::new(true)),
    };
    let settlement = store.update_form(patch).await?;
    let state = store.state();
    println!(
        "   name = {:?} (error: {}), live = {} ({})",
        state.name.value,
        state.name.error,
        state.live.value,
        if settlement.is_committed() { "committed" } else { "reverted" }
    );

    // 4. The same addition without optimistic metadata
    println!("\n4. Plain addition (no pending semantics)");
    store.add_item_plain("figs").await?;
    print_items("after plain addition", &store.state());

    println!("\n5. Final state");
    println!("{}", serde_json::to_string_pretty(&store.state())?);

    Ok(())
}
