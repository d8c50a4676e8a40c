// End-to-end: SDK client -> control channel -> scheduler -> training host.

use epochctl_core::{ConfigTree, EpochKey, Namespace};
use epochctl_integration_tests::{TestHarness, TestResult};
use epochctl_sdk::{ConfigPayload, ResponseStatus};
use serde_json::{json, Value};

fn params(v: Value) -> ConfigPayload {
    ConfigPayload::new().with(Namespace::Params, ConfigTree::from_value(v).unwrap_or_default())
}

async fn harness() -> TestResult<TestHarness> {
    TestHarness::start(
        json!({"user": "root", "password": "1234"}),
        json!({"lr": 0.001, "batch_size": 32, "epochs": 100}),
        json!({"dropout": 0.1}),
    )
    .await
}

#[tokio::test]
async fn restricted_key_is_reported_and_left_alone() -> TestResult<()> {
    let mut h = harness().await?;
    let mut client = h.client("root:1234").await?;

    let out = client.send_update("next", "very high", params(json!({"batch_size": 1, "epochs": 10000}))).await?;
    assert!(out.accepted);
    assert_eq!(out.status, Some(ResponseStatus::Ok));
    assert!(out.messages.iter().any(|m| m.contains("params->batch_size")), "{:?}", out.messages);
    assert_eq!(out.advisories.len(), 1);

    h.finish_epoch();
    assert_eq!(h.live(Namespace::Params, "batch_size"), Some(&json!(32)));
    assert_eq!(h.live(Namespace::Params, "epochs"), Some(&json!(10000)));
    h.shutdown().await
}

#[tokio::test]
async fn wrong_credentials_change_nothing() -> TestResult<()> {
    let mut h = harness().await?;
    let mut client = h.client(("root", "4321")).await?;

    let out = client.send_update("next", "normal", params(json!({"lr": 0.5}))).await?;
    assert!(!out.accepted);
    assert_eq!(out.status, Some(ResponseStatus::Error));
    assert_eq!(out.messages, vec!["Wrong credentials.".to_string()]);
    assert_eq!(h.updater().scheduler().pending(), 0);

    // a client with the right secret still gets through
    let mut good = h.client("1234").await?;
    assert!(good.send_update("next", "normal", params(json!({"lr": 0.5}))).await?.accepted);
    h.finish_epoch();
    assert_eq!(h.live(Namespace::Params, "lr"), Some(&json!(0.5)));
    h.shutdown().await
}

#[tokio::test]
async fn persistent_and_one_epoch_updates_over_the_wire() -> TestResult<()> {
    let mut h = harness().await?;
    let mut client = h.client("root:1234").await?;

    client.send_one_epoch_update(params(json!({"lr": 0.01}))).await?;
    h.finish_epoch();
    assert_eq!(h.live(Namespace::Params, "lr"), Some(&json!(0.01)));
    h.finish_epoch();
    assert_eq!(h.live(Namespace::Params, "lr"), Some(&json!(0.001)));

    let target = h.epoch() + 2;
    client.send_update(target, "normal", params(json!({"lr": 0.02}))).await?;
    assert_eq!(h.updater().scheduler().pending_for(&EpochKey::Epoch(target)), 1);
    h.finish_epoch();
    assert_eq!(h.live(Namespace::Params, "lr"), Some(&json!(0.001)));
    h.finish_epoch();
    for _ in 0..3 {
        assert_eq!(h.live(Namespace::Params, "lr"), Some(&json!(0.02)));
        h.finish_epoch();
    }
    h.shutdown().await
}

#[tokio::test]
async fn priority_decides_between_clients() -> TestResult<()> {
    let mut h = harness().await?;
    let mut a = h.client("root:1234").await?;
    let mut b = h.client("root:1234").await?;
    let target = h.epoch() + 1;

    b.send_update(target, "very high", params(json!({"lr": 0.9}))).await?;
    a.send_update(target, "normal", params(json!({"lr": 0.1}))).await?;
    h.finish_epoch();
    assert_eq!(h.live(Namespace::Params, "lr"), Some(&json!(0.9)));
    h.shutdown().await
}

#[tokio::test]
async fn batch_schedule_plays_out() -> TestResult<()> {
    let mut h = harness().await?;
    let mut client = h.client("root:1234").await?;

    client.begin_batch();
    client.add_step(1_u64, "update", "normal", params(json!({"lr": 0.05})))?;
    client.add_step(3_u64, "update", "normal", params(json!({"lr": 0.005})))?;
    let out = client.commit_batch().await?;
    assert!(out.accepted);

    let mut seen = Vec::new();
    for _ in 0..4 {
        h.finish_epoch();
        seen.push(h.live(Namespace::Params, "lr").cloned());
    }
    assert_eq!(seen, vec![Some(json!(0.05)), Some(json!(0.05)), Some(json!(0.005)), Some(json!(0.005))]);
    h.shutdown().await
}
