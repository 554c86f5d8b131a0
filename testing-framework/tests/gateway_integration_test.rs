// File: testing-framework/tests/gateway_integration_test.rs
//
// Gateway and Transaction Listener Integration Tests

use chainwatch_common::{EventSource, TxStatus};
use chainwatch_testing_framework::listeners::{BlockListenerOptions, ListenerKind, ListenerRecord};
use chainwatch_testing_framework::network::SimulatedNetworkBuilder;
use chainwatch_testing_framework::{
    Comparator, HarnessConfig, HarnessError, PausedClock, TestContext,
};
use serde_json::json;
use std::sync::Arc;

fn paused_context() -> TestContext {
    let _ = env_logger::builder().is_test(true).try_init();
    TestContext::new(HarnessConfig::new()).with_clock(Arc::new(PausedClock::new()))
}

// ============================================================================
// Gateways
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_gateway_is_rejected() {
    let network = SimulatedNetworkBuilder::new().build().unwrap();
    let mut ctx = paused_context();

    ctx.connect_gateway("org1", network.clone()).unwrap();
    let err = ctx.connect_gateway("org1", network.clone()).unwrap_err();
    assert!(matches!(err, HarnessError::DuplicateGateway(ref name) if name == "org1"));

    ctx.connect_gateway("org2", network).unwrap();
    assert_eq!(ctx.gateway_names(), vec!["org1", "org2"]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_gateway_is_reported() {
    let ctx = paused_context();

    let err = ctx
        .register_event_listener("org9", "created", "marbles", "create")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Gateway 'org9' not found");
    assert!(!ctx.listeners().contains("created"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_deregisters_gateway_listeners() {
    let network = SimulatedNetworkBuilder::new().build().unwrap();
    let mut ctx = paused_context();
    ctx.connect_gateway("org1", network.clone()).unwrap();
    ctx.connect_gateway("org2", network.clone()).unwrap();

    ctx.register_event_listener("org1", "created", "marbles", "create")
        .await
        .unwrap();
    ctx.register_block_listener("org1", "blocks", BlockListenerOptions::default())
        .await
        .unwrap();
    ctx.register_block_listener("org2", "other", BlockListenerOptions::default())
        .await
        .unwrap();
    assert_eq!(network.listener_count(), 3);

    let removed = ctx.disconnect_gateway("org1").unwrap();
    assert_eq!(removed, vec!["blocks", "created"]);
    assert_eq!(network.listener_count(), 1);
    assert!(ctx.gateway("org1").is_err());

    ctx.assert_listener_active("created", false).unwrap();
    ctx.assert_listener_active("blocks", false).unwrap();
    ctx.assert_listener_active("other", true).unwrap();

    network.commit_block().unwrap();
    ctx.assert_call_count("other", Comparator::Equal, 1)
        .await
        .unwrap();
    assert_eq!(ctx.call_count("blocks").unwrap(), 0);

    let err = ctx.disconnect_gateway("org1").unwrap_err();
    assert!(matches!(err, HarnessError::GatewayNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_gateways_on_separate_networks() {
    let channel_a = SimulatedNetworkBuilder::new().with_name("a").build().unwrap();
    let channel_b = SimulatedNetworkBuilder::new().with_name("b").build().unwrap();
    let mut ctx = paused_context();
    ctx.connect_gateway("org1", channel_a.clone()).unwrap();
    ctx.connect_gateway("org2", channel_b.clone()).unwrap();

    assert_eq!(ctx.gateway("org2").unwrap().source().name(), "b");

    ctx.register_block_listener("org1", "a_blocks", BlockListenerOptions::default())
        .await
        .unwrap();
    ctx.register_block_listener("org2", "b_blocks", BlockListenerOptions::default())
        .await
        .unwrap();

    channel_a.commit_blocks(2).unwrap();
    channel_b.commit_block().unwrap();

    ctx.assert_call_count("a_blocks", Comparator::Equal, 2)
        .await
        .unwrap();
    ctx.assert_call_count("b_blocks", Comparator::Equal, 1)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shut_down_network_refuses_registration() {
    let network = SimulatedNetworkBuilder::new().build().unwrap();
    let mut ctx = paused_context();
    ctx.connect_gateway("org1", network.clone()).unwrap();

    network.shutdown();
    let err = ctx
        .register_block_listener("org1", "blocks", BlockListenerOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Network(_)));
    assert!(!ctx.listeners().contains("blocks"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_after_shutdown_still_tears_down() {
    let network = SimulatedNetworkBuilder::new().build().unwrap();
    let mut ctx = paused_context();
    ctx.connect_gateway("org1", network.clone()).unwrap();
    ctx.register_event_listener("org1", "a", "marbles", "create")
        .await
        .unwrap();
    ctx.register_block_listener("org1", "b", BlockListenerOptions::default())
        .await
        .unwrap();

    // Shutdown drops the source-side registrations, so each removal fails
    network.shutdown();
    let err = ctx.disconnect_gateway("org1").unwrap_err();
    assert!(matches!(err, HarnessError::Network(_)));

    assert!(ctx.gateway_names().is_empty());
    ctx.assert_listener_active("a", false).unwrap();
    ctx.assert_listener_active("b", false).unwrap();
    assert!(matches!(
        ctx.unregister_listener("a"),
        Err(HarnessError::AlreadyDeregistered(_))
    ));

    let replacement = SimulatedNetworkBuilder::new().build().unwrap();
    ctx.connect_gateway("org1", replacement.clone()).unwrap();
    ctx.register_event_listener("org1", "a", "marbles", "create")
        .await
        .unwrap();
    ctx.assert_listener_active("a", true).unwrap();
    assert_eq!(replacement.listener_count(), 1);
}

// ============================================================================
// Transaction listeners
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transaction_listener_receives_commit() {
    let network = SimulatedNetworkBuilder::new().build().unwrap();
    let mut ctx = paused_context();
    ctx.connect_gateway("org1", network.clone()).unwrap();

    let tx_id = network
        .submit_transaction("marbles", "create", json!({ "id": "m1" }))
        .unwrap();
    ctx.register_transaction_listener("org1", "commit", &tx_id)
        .await
        .unwrap();
    ctx.assert_listener_kind("commit", ListenerKind::Transaction)
        .unwrap();

    // Unrelated blocks are not commits of this transaction
    network
        .submit_transaction("marbles", "transfer", json!({}))
        .unwrap();
    network.commit_block().unwrap();

    ctx.assert_call_count("commit", Comparator::Equal, 1)
        .await
        .unwrap();
    ctx.assert_payloads("commit", &["VALID"]).unwrap();

    match ctx.listener("commit").unwrap() {
        ListenerRecord::Transaction(record) => {
            assert_eq!(record.tx_id, tx_id);
            assert_eq!(record.payloads()[0].block_number, 1);
            assert_eq!(record.payloads()[0].status, TxStatus::Valid);
        }
        other => panic!("Expected a transaction record, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transaction_listener_after_commit() {
    let network = SimulatedNetworkBuilder::new().build().unwrap();
    let mut ctx = paused_context();
    ctx.connect_gateway("org1", network.clone()).unwrap();

    let tx_id = network.submit_invalid_transaction("marbles", 11).unwrap();
    network.commit_block().unwrap();

    ctx.register_transaction_listener("org1", "late", &tx_id)
        .await
        .unwrap();

    ctx.assert_call_count("late", Comparator::Equal, 1)
        .await
        .unwrap();
    ctx.assert_payloads("late", &["INVALID(11)"]).unwrap();
}
