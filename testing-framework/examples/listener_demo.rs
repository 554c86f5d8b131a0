// File: testing-framework/examples/listener_demo.rs
//
// Registers listeners on a simulated network and waits for their deliveries
// with the condition poller instead of fixed sleeps.
//
// Run this example with:
//   RUST_LOG=info cargo run --example listener_demo

use anyhow::Result;
use chainwatch_testing_framework::listeners::BlockListenerOptions;
use chainwatch_testing_framework::network::SimulatedNetworkBuilder;
use chainwatch_testing_framework::prelude::*;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let network = SimulatedNetworkBuilder::new()
        .with_name("mychannel")
        .with_empty_blocks(2)
        .build()?;

    let mut ctx = TestContext::new(HarnessConfig::from_env()?);
    ctx.connect_gateway("org1", network.clone())?;

    ctx.register_event_listener("org1", "created", "marbles", "create")
        .await?;
    ctx.register_block_listener(
        "org1",
        "first_blocks",
        BlockListenerOptions::default()
            .with_start_block(1)
            .with_end_block(4),
    )
    .await?;

    for (id, color) in [("marble1", "blue"), ("marble2", "red")] {
        let tx_id = network.submit_transaction("marbles", "create", json!({ "id": id, "color": color }))?;
        println!("Submitted {} as {}", id, tx_id.short());
        network.commit_block()?;
    }

    ctx.assert_call_count("created", Comparator::Equal, 2).await?;
    ctx.assert_call_count("first_blocks", Comparator::Equal, 4)
        .await?;
    ctx.assert_payloads("first_blocks", &["1", "2", "3", "4"])?;
    ctx.assert_listener_active("first_blocks", false)?;

    for record in ctx.listeners().snapshot() {
        println!(
            "{:<14} {:<12} active={:<5} calls={}",
            record.name(),
            record.kind().to_string(),
            record.is_active(),
            record.call_count()
        );
    }

    let removed = ctx.disconnect_gateway("org1")?;
    println!("Deregistered on disconnect: {:?}", removed);

    Ok(())
}
