//! Submission, listing and restart scenarios against a full relay node.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::{TestClient, TestHarness};
use serde_json::{json, Value};
use snapshot_relay::relay::unix_now;
use snapshot_relay::store::LOG_FILE;
use snapshot_relay::{ContentId, MessageKind, RelayEvent};
use tokio::io::BufReader;

#[tokio::test]
async fn test_proposal_then_vote() {
    let mut harness = TestHarness::setup().await;
    let author = TestClient::new();
    let now = unix_now();

    let proposal = author.proposal("BAL", "Raise fee", now - 60, now + 3600);
    let pid = harness.submit_ok(&proposal).await;

    let voter = TestClient::new();
    harness.submit_ok(&voter.vote("BAL", &pid, 1)).await;

    let service = harness.relay().service().clone();
    let proposals = service.list_proposals("BAL").await.unwrap();
    let listing = proposals.get(&ContentId::new(pid.clone())).unwrap();
    assert_eq!(listing.address, author.address());
    assert_eq!(listing.sig, proposal.sig);
    assert_eq!(listing.msg.token, "BAL");
    assert_eq!(listing.msg.kind(), MessageKind::Proposal);

    let votes = service.list_votes("BAL", &ContentId::new(pid)).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[voter.address()].address, voter.address());

    // Other tokens are unaffected
    assert!(service.list_proposals("OTHER").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vote_with_missing_field_is_rejected() {
    let mut harness = TestHarness::setup().await;
    let now = unix_now();
    let pid = harness
        .submit_ok(&TestClient::new().proposal("BAL", "P", now, now + 3600))
        .await;

    let envelope = TestClient::new().envelope(
        "BAL",
        "vote",
        json!({ "proposal": pid, "choice": 1 }),
    );
    let response = harness.submit(&envelope).await;
    assert_eq!(response, json!({ "error": "wrong vote format" }));

    let service = harness.relay().service().clone();
    let votes = service.list_votes("BAL", &ContentId::new(pid)).await.unwrap();
    assert!(votes.is_empty());
}

#[tokio::test]
async fn test_vote_on_closed_proposal_is_rejected() {
    let mut harness = TestHarness::setup().await;
    let now = unix_now();
    let pid = harness
        .submit_ok(&TestClient::new().proposal("BAL", "Old", now - 7200, now - 3600))
        .await;

    let response = harness.submit(&TestClient::new().vote("BAL", &pid, 1)).await;
    assert_eq!(response, json!({ "error": "not in voting window" }));
}

#[tokio::test]
async fn test_vote_on_unknown_proposal_is_rejected() {
    let mut harness = TestHarness::setup().await;
    let response = harness
        .submit(&TestClient::new().vote("BAL", "no-such-proposal", 1))
        .await;
    assert_eq!(response, json!({ "error": "unknown proposal" }));
}

#[tokio::test]
async fn test_records_survive_restart() {
    let mut harness = TestHarness::setup().await;
    let now = unix_now();
    let pid = harness
        .submit_ok(&TestClient::new().proposal("BAL", "Durable", now - 10, now + 3600))
        .await;

    assert!(harness.config().store_dir().join(LOG_FILE).exists());

    harness.start().await;
    let mut events = harness.relay().events().unwrap();
    match events.recv().await.unwrap() {
        RelayEvent::CacheWarmed { records } => assert_eq!(records, 1),
        other => panic!("unexpected event {other:?}"),
    }

    let service = harness.relay().service().clone();
    assert!(service
        .list_proposals("BAL")
        .await
        .unwrap()
        .get(&ContentId::new(pid.clone()))
        .is_some());

    // The restarted relay still knows the proposal when validating votes
    harness.submit_ok(&TestClient::new().vote("BAL", &pid, 2)).await;
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let mut harness = TestHarness::setup().await;
    let now = unix_now();
    let envelope = TestClient::new().proposal("BAL", "Twice", now, now + 60);

    let first = harness.submit_ok(&envelope).await;
    let second = harness.submit_ok(&envelope).await;
    assert_eq!(first, second);

    let service = harness.relay().service().clone();
    assert_eq!(service.list_proposals("BAL").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_events_follow_submissions() {
    let mut harness = TestHarness::setup().await;
    let mut events = harness.relay().subscribe_events();
    let now = unix_now();

    let pid = harness
        .submit_ok(&TestClient::new().proposal("BAL", "Evented", now, now + 60))
        .await;
    match events.recv().await.unwrap() {
        RelayEvent::MessageAccepted { token, kind, id } => {
            assert_eq!(token, "BAL");
            assert_eq!(kind, MessageKind::Proposal);
            assert_eq!(id.as_str(), pid);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let mut bad = TestClient::new().proposal("BAL", "Forged", now, now + 60);
    bad.address = TestClient::new().address().to_string();
    harness.submit(&bad).await;
    match events.recv().await.unwrap() {
        RelayEvent::MessageRejected { reason, .. } => assert_eq!(reason, "wrong signature"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_serve_answers_each_line() {
    let mut harness = TestHarness::setup_with(|config| config.network = "mainnet".into()).await;
    let now = unix_now();
    let proposal = TestClient::new().proposal("BAL", "Piped", now, now + 60);

    let mut submit = serde_json::to_value(&proposal).unwrap();
    submit["op"] = json!("submit");
    let input = format!(
        "{}\n\n{}\nnot json\n{}\n",
        json!({ "op": "info" }),
        submit,
        json!({ "op": "proposals", "token": "BAL" }),
    );

    let mut output = Vec::new();
    harness
        .relay()
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(responses.len(), 4, "blank lines get no response");

    assert_eq!(responses[0]["network"], "mainnet");
    let pid = responses[1]["ipfsHash"].as_str().unwrap();
    assert_eq!(responses[2], json!({ "error": "wrong message body" }));
    assert_eq!(responses[3][pid]["authorIpfsHash"], pid);
}

#[tokio::test]
async fn test_missing_key_fails_fast() {
    let harness = TestHarness::setup().await;
    let mut config = harness.config().clone();
    config.relayer_key_file = Some(harness.root().join("absent.key"));

    let result = snapshot_relay::RelayNodeBuilder::new(config).build().await;
    assert!(result.is_err());
}
