//! Tests for the signing coordinator

use super::*;
use crate::crypto::{eip712, signature};
use serde_json::{json, Value};
use std::collections::HashMap;

const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const MERCHANT: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0";

fn challenge(price: &str) -> Challenge {
    Challenge::new(price, "USDC", 8453, MERCHANT).with_nonce(signature::generate_nonce())
}

fn sign(challenge: &Challenge) -> PaymentProof {
    let hash = eip712::challenge_hash(challenge).unwrap();
    PaymentProof::new(
        signature::sign_message_hash(hash, TEST_KEY).unwrap(),
        TEST_ADDRESS,
        challenge.clone(),
    )
}

fn coordinator_with(config: CoordinatorConfig) -> SigningCoordinator {
    SigningCoordinator::new(config.with_port(0))
}

fn coordinator() -> SigningCoordinator {
    coordinator_with(CoordinatorConfig::default().with_timeout(Duration::from_secs(5)))
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame within deadline")
        .expect("queue open");
    match frame {
        Outbound::Text(text) => serde_json::from_str(&text).unwrap(),
        Outbound::Close => json!({"type": "__close__"}),
    }
}

/// Connect a signer and consume its `connected` ack
async fn connect_signer(
    coordinator: &SigningCoordinator,
) -> (String, mpsc::UnboundedReceiver<Outbound>) {
    let (id, mut rx) = coordinator.connect();
    let ack = next_frame(&mut rx).await;
    assert_eq!(ack["type"], "connected");
    (id, rx)
}

fn respond(coordinator: &SigningCoordinator, connection_id: &str, request: &Value) {
    let challenge: Challenge = serde_json::from_value(request["challenge"].clone()).unwrap();
    let response = json!({
        "type": "sign-response",
        "id": request["id"],
        "result": sign(&challenge),
    });
    coordinator.handle_message(connection_id, &response.to_string());
}

async fn wait_for_pending(coordinator: &SigningCoordinator, count: usize) {
    for _ in 0..100 {
        if coordinator.pending_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} pending requests", count);
}

#[tokio::test]
async fn test_no_signer_fails_immediately() {
    let coordinator = coordinator_with(CoordinatorConfig::default());

    let started = std::time::Instant::now();
    let err = coordinator
        .request_signature(&challenge("0.01"))
        .await
        .unwrap_err();

    assert!(matches!(err, X402Error::NoSignerConnected));
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn test_connect_sends_ack() {
    let coordinator = coordinator();
    let (id, mut rx) = coordinator.connect();

    let ack = next_frame(&mut rx).await;
    assert_eq!(ack["type"], "connected");
    assert_eq!(ack["clientId"], id);
    assert_eq!(ack["message"], CONNECTED_MESSAGE);
    assert_eq!(coordinator.client_count(), 1);

    coordinator.disconnect(&id);
    assert_eq!(coordinator.client_count(), 0);
}

#[tokio::test]
async fn test_request_resolved_by_response() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let issued = challenge("0.01");
    let task = {
        let coordinator = coordinator.clone();
        let issued = issued.clone();
        tokio::spawn(async move { coordinator.request_signature(&issued).await })
    };

    let request = next_frame(&mut rx).await;
    assert_eq!(request["type"], "sign-request");
    assert_eq!(request["challenge"]["price"], "0.01");
    assert_eq!(coordinator.pending_count(), 1);

    respond(&coordinator, &conn, &request);

    let proof = task.await.unwrap().unwrap();
    assert_eq!(proof.challenge, issued);
    assert!(crate::verifier::verify_payment(&proof).valid);
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_resolve_out_of_order() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let mut tasks = HashMap::new();
    for price in ["1", "2", "3"] {
        let coordinator = coordinator.clone();
        let issued = challenge(price);
        tasks.insert(
            price.to_string(),
            tokio::spawn(async move { coordinator.request_signature(&issued).await }),
        );
    }

    let mut requests = Vec::new();
    for _ in 0..3 {
        requests.push(next_frame(&mut rx).await);
    }
    assert_eq!(coordinator.pending_count(), 3);

    // Answer in reverse order of arrival
    for request in requests.iter().rev() {
        respond(&coordinator, &conn, request);
    }

    for (price, task) in tasks {
        let proof = task.await.unwrap().unwrap();
        assert_eq!(proof.challenge.price, price);
    }
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn test_timeout_of_one_request_leaves_sibling_intact() {
    let coordinator =
        coordinator_with(CoordinatorConfig::default().with_timeout(Duration::from_millis(300)));
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let spawn_request = |price: &'static str| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge(price)).await })
    };
    let unanswered = spawn_request("1");
    let answered = spawn_request("2");

    let first = next_frame(&mut rx).await;
    let second = next_frame(&mut rx).await;
    assert_ne!(first["id"], second["id"]);
    assert_eq!(coordinator.pending_count(), 2);

    let reply_to = if second["challenge"]["price"] == "2" {
        &second
    } else {
        &first
    };
    respond(&coordinator, &conn, reply_to);

    let proof = answered.await.unwrap().unwrap();
    assert_eq!(proof.challenge.price, "2");
    assert!(matches!(
        unanswered.await.unwrap(),
        Err(X402Error::Timeout { .. })
    ));
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn test_oversized_timeout_is_config_error() {
    // `new` skips validation, so the budget reaches the request path unchecked
    let coordinator = SigningCoordinator::new(
        CoordinatorConfig::default()
            .with_port(0)
            .with_timeout(Duration::MAX),
    );
    let (_conn, mut rx) = connect_signer(&coordinator).await;

    let outcome = coordinator.request_signature(&challenge("0.01")).await;
    assert!(matches!(outcome, Err(X402Error::Config { .. })));
    assert_eq!(coordinator.pending_count(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_error_response_rejects_request() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };

    let request = next_frame(&mut rx).await;
    coordinator.handle_message(
        &conn,
        &json!({"type": "sign-response", "id": request["id"], "error": "User rejected"}).to_string(),
    );

    match task.await.unwrap() {
        Err(X402Error::SignerRejected { message }) => assert_eq!(message, "User rejected"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_frame_with_id_rejects_request() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };

    let request = next_frame(&mut rx).await;
    coordinator.handle_message(
        &conn,
        &json!({"type": "error", "id": request["id"], "error": "wallet locked"}).to_string(),
    );

    assert!(matches!(
        task.await.unwrap(),
        Err(X402Error::SignerRejected { .. })
    ));
}

#[tokio::test]
async fn test_empty_response_is_rejection() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };

    let request = next_frame(&mut rx).await;
    coordinator.handle_message(
        &conn,
        &json!({"type": "sign-response", "id": request["id"]}).to_string(),
    );

    assert!(matches!(
        task.await.unwrap(),
        Err(X402Error::SignerRejected { .. })
    ));
}

#[tokio::test]
async fn test_timeout_discards_request_and_ignores_late_response() {
    let coordinator =
        coordinator_with(CoordinatorConfig::default().with_timeout(Duration::from_millis(100)));
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let started = std::time::Instant::now();
    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    let request = next_frame(&mut rx).await;

    let outcome = task.await.unwrap();
    let elapsed = started.elapsed();
    assert!(matches!(outcome, Err(X402Error::Timeout { .. })));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(coordinator.pending_count(), 0);

    // A late answer is dropped without side effects
    respond(&coordinator, &conn, &request);
    assert_eq!(coordinator.pending_count(), 0);
    assert_eq!(coordinator.client_count(), 1);
}

#[tokio::test]
async fn test_malformed_frame_gets_error_ack_only() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;
    let (_other, mut other_rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    let request = next_frame(&mut rx).await;

    coordinator.handle_message(&conn, "{not json");
    let ack = next_frame(&mut rx).await;
    assert_eq!(ack["type"], "error");
    assert!(ack["error"].as_str().unwrap().starts_with("Invalid message"));
    assert!(other_rx.try_recv().is_err());
    assert_eq!(coordinator.pending_count(), 1);

    respond(&coordinator, &conn, &request);
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_unexpected_frame_type_gets_error_ack() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;

    coordinator.handle_message(
        &conn,
        &json!({"type": "connected", "clientId": "x", "message": "hi"}).to_string(),
    );
    let ack = next_frame(&mut rx).await;
    assert_eq!(ack["type"], "error");
    assert_eq!(ack["error"], "Unexpected message type: connected");

    // Heartbeats are silent
    coordinator.handle_message(&conn, r#"{"type":"pong"}"#);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_response_from_other_connection_ignored() {
    let coordinator = coordinator();
    let (conn, mut rx) = connect_signer(&coordinator).await;
    let (intruder, _intruder_rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    let request = next_frame(&mut rx).await;

    respond(&coordinator, &intruder, &request);
    assert_eq!(coordinator.pending_count(), 1);

    respond(&coordinator, &conn, &request);
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_stop_cancels_in_flight_requests() {
    let coordinator = coordinator();
    let (_conn, mut rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    next_frame(&mut rx).await;

    coordinator.stop().await;

    assert!(matches!(task.await.unwrap(), Err(X402Error::Cancelled)));
    assert_eq!(next_frame(&mut rx).await["type"], "__close__");
    assert_eq!(coordinator.client_count(), 0);
    assert_eq!(coordinator.pending_count(), 0);
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_dropping_request_future_withdraws_it() {
    let coordinator = coordinator();
    let (_conn, mut rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    next_frame(&mut rx).await;
    assert_eq!(coordinator.pending_count(), 1);

    task.abort();
    let _ = task.await;
    wait_for_pending(&coordinator, 0).await;
}

#[tokio::test]
async fn test_first_available_targets_oldest_connection() {
    let coordinator = coordinator();
    let (first, mut first_rx) = connect_signer(&coordinator).await;
    let (_second, mut second_rx) = connect_signer(&coordinator).await;

    for _ in 0..2 {
        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
        };
        let request = next_frame(&mut first_rx).await;
        respond(&coordinator, &first, &request);
        assert!(task.await.unwrap().is_ok());
    }
    assert!(second_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_round_robin_alternates() {
    let coordinator = coordinator_with(
        CoordinatorConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_policy(SelectionPolicy::RoundRobin),
    );
    let mut signers = vec![
        connect_signer(&coordinator).await,
        connect_signer(&coordinator).await,
    ];

    for expected in [0, 1, 0] {
        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
        };
        let (conn, rx) = &mut signers[expected];
        let request = next_frame(rx).await;
        respond(&coordinator, conn, &request);
        assert!(task.await.unwrap().is_ok());
        assert!(signers[1 - expected].1.try_recv().is_err());
    }
}

#[tokio::test]
async fn test_broadcast_first_response_wins() {
    let coordinator = coordinator_with(
        CoordinatorConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_policy(SelectionPolicy::BroadcastFirstWins),
    );
    let (a, mut a_rx) = connect_signer(&coordinator).await;
    let (b, mut b_rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };

    let request_a = next_frame(&mut a_rx).await;
    let request_b = next_frame(&mut b_rx).await;
    assert_eq!(request_a["id"], request_b["id"]);

    coordinator.handle_message(
        &b,
        &json!({"type": "sign-response", "id": request_b["id"], "error": "declined"}).to_string(),
    );
    // The loser's answer is ignored
    respond(&coordinator, &a, &request_a);

    assert!(matches!(
        task.await.unwrap(),
        Err(X402Error::SignerRejected { .. })
    ));
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn test_disconnect_leaves_request_pending_by_default() {
    let coordinator =
        coordinator_with(CoordinatorConfig::default().with_timeout(Duration::from_millis(200)));
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    next_frame(&mut rx).await;

    coordinator.disconnect(&conn);
    assert_eq!(coordinator.pending_count(), 1);
    assert!(matches!(
        task.await.unwrap(),
        Err(X402Error::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_disconnect_fails_fast_when_enabled() {
    let coordinator = coordinator_with(
        CoordinatorConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_cancel_on_disconnect(true),
    );
    let (conn, mut rx) = connect_signer(&coordinator).await;

    let started = std::time::Instant::now();
    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    next_frame(&mut rx).await;

    coordinator.disconnect(&conn);
    assert!(matches!(
        task.await.unwrap(),
        Err(X402Error::SignerDisconnected)
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_broadcast_survives_partial_disconnect() {
    let coordinator = coordinator_with(
        CoordinatorConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_policy(SelectionPolicy::BroadcastFirstWins)
            .with_cancel_on_disconnect(true),
    );
    let (a, mut a_rx) = connect_signer(&coordinator).await;
    let (b, mut b_rx) = connect_signer(&coordinator).await;

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_signature(&challenge("0.01")).await })
    };
    next_frame(&mut a_rx).await;
    let request = next_frame(&mut b_rx).await;

    coordinator.disconnect(&a);
    assert_eq!(coordinator.pending_count(), 1);

    respond(&coordinator, &b, &request);
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_payment_signer_contract() {
    let coordinator = coordinator();
    assert!(!coordinator.is_ready().await);
    assert_eq!(coordinator.address().await, None);

    let (_conn, _rx) = connect_signer(&coordinator).await;
    assert!(coordinator.is_ready().await);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let coordinator = coordinator();
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.local_addr(), None);

    let addr = coordinator.start().await.unwrap();
    assert!(coordinator.is_running());
    assert_ne!(addr.port(), 0);
    assert_eq!(coordinator.start().await.unwrap(), addr);
    assert_eq!(coordinator.local_addr(), Some(addr));

    coordinator.stop().await;
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.local_addr(), None);
}

#[tokio::test]
async fn test_start_rejects_bad_path() {
    let coordinator = coordinator_with(CoordinatorConfig::default().with_path("x402/ws"));
    assert!(matches!(
        coordinator.start().await,
        Err(X402Error::Config { .. })
    ));
}

#[tokio::test]
async fn test_start_rejects_route_parameter_paths() {
    for path in ["/x402/:ws", "/x402/*rest", "/x402/{id}"] {
        let coordinator = coordinator_with(CoordinatorConfig::default().with_path(path));
        assert!(
            matches!(coordinator.start().await, Err(X402Error::Config { .. })),
            "path {} should be rejected",
            path
        );
        assert!(!coordinator.is_running());
        assert_eq!(coordinator.local_addr(), None);
    }

    // A colon inside a segment is a literal, not a parameter
    assert!(CoordinatorConfig::default()
        .with_path("/x402/ws:v1")
        .validate()
        .is_ok());
}

#[test]
fn test_config_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("X402_WS_HOST", "0.0.0.0"),
        ("X402_WS_PORT", "9000"),
        ("X402_WS_PATH", "/sign"),
        ("X402_SIGN_TIMEOUT_SECS", "2.5"),
        ("X402_WS_POLICY", "round_robin"),
    ]
    .into_iter()
    .collect();

    let config =
        CoordinatorConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 9000);
    assert_eq!(config.path, "/sign");
    assert_eq!(config.timeout, Duration::from_millis(2500));
    assert_eq!(config.policy, SelectionPolicy::RoundRobin);
    assert!(!config.cancel_on_disconnect);
}

#[test]
fn test_config_defaults_and_errors() {
    let config = CoordinatorConfig::from_lookup(|_| None).unwrap();
    assert_eq!(config, CoordinatorConfig::default());
    assert_eq!(config.port, 4021);
    assert_eq!(config.path, "/x402/ws");
    assert_eq!(config.timeout, Duration::from_secs(30));

    assert!(CoordinatorConfig::from_lookup(|key| {
        (key == "X402_WS_PORT").then(|| "http".to_string())
    })
    .is_err());
    assert!(CoordinatorConfig::from_lookup(|key| {
        (key == "X402_SIGN_TIMEOUT_SECS").then(|| "0".to_string())
    })
    .is_err());
    assert!(matches!(
        CoordinatorConfig::from_lookup(|key| {
            (key == "X402_SIGN_TIMEOUT_SECS").then(|| "1.8e19".to_string())
        }),
        Err(X402Error::Config { .. })
    ));
}
