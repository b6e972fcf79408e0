mod common;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use engine::{
    Engine, EngineError, GatewayFuture, PaymentGateway, TransactionStatus, VerifiedPayment,
    WebhookOutcome, WebhookReconciler, sign_payload,
};

use common::shared_engine;

const SECRET: &str = "sk_test_secret";

/// Gateway answering from a fixed table, optionally after a delay.
#[derive(Default)]
struct FakeGateway {
    payments: Mutex<HashMap<String, VerifiedPayment>>,
    delay: Option<Duration>,
}

impl FakeGateway {
    fn confirm(&self, reference: &str, status: &str, amount_minor: i64, currency: &str) {
        self.payments.lock().unwrap().insert(
            reference.to_string(),
            VerifiedPayment {
                reference: reference.to_string(),
                status: status.to_string(),
                amount_minor,
                currency: currency.to_string(),
            },
        );
    }
}

impl PaymentGateway for FakeGateway {
    fn verify<'a>(&'a self, reference: &'a str) -> GatewayFuture<'a> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.payments
                .lock()
                .unwrap()
                .get(reference)
                .cloned()
                .ok_or_else(|| EngineError::Gateway(format!("unknown reference {reference}")))
        })
    }
}

fn charge_body(reference: &str, amount_minor: i64, currency: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": amount_minor,
            "currency": currency,
        }
    })
    .to_string()
    .into_bytes()
}

async fn setup(gateway: FakeGateway) -> (Arc<Engine>, Arc<FakeGateway>, WebhookReconciler, String) {
    let engine = shared_engine().await;
    let user = engine.register_user("ada", "password").await.unwrap();
    let gateway = Arc::new(gateway);
    let reconciler = WebhookReconciler::new(engine.clone(), gateway.clone(), SECRET)
        .currency("NGN")
        .verify_timeout(Duration::from_millis(200));
    (engine, gateway, reconciler, user.id)
}

#[tokio::test]
async fn confirmed_charge_credits_once() {
    let (engine, gateway, reconciler, user_id) = setup(FakeGateway::default()).await;
    engine
        .open_deposit(&user_id, 50_000, Some("PSK-1"))
        .await
        .unwrap();
    gateway.confirm("PSK-1", "success", 50_000, "NGN");
    let body = charge_body("PSK-1", 50_000, "NGN");
    let signature = sign_payload(SECRET, &body).unwrap();

    let first = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap();
    let replay = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap();

    assert_eq!(
        first,
        WebhookOutcome::Credited {
            reference: "PSK-1".to_string(),
            user_id: user_id.clone(),
            amount_minor: 50_000,
        }
    );
    assert_eq!(
        replay,
        WebhookOutcome::AlreadyProcessed {
            reference: "PSK-1".to_string()
        }
    );
    assert_eq!(engine.balance(&user_id).await.unwrap(), 50_000);
    let tx = engine
        .transaction_by_reference("PSK-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Success);
    let notifications = engine.notifications_for_user(&user_id).await.unwrap();
    assert_eq!(
        notifications
            .iter()
            .filter(|n| n.title == "Deposit Successful")
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redeliveries_credit_once() {
    let (engine, gateway, reconciler, user_id) = setup(FakeGateway::default()).await;
    engine
        .open_deposit(&user_id, 7_500, Some("PSK-2"))
        .await
        .unwrap();
    gateway.confirm("PSK-2", "success", 7_500, "NGN");
    let body = charge_body("PSK-2", 7_500, "NGN");
    let signature = sign_payload(SECRET, &body).unwrap();
    let reconciler = Arc::new(reconciler);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let reconciler = reconciler.clone();
        let body = body.clone();
        let signature = signature.clone();
        handles.push(tokio::spawn(async move {
            reconciler.handle_callback(Some(&signature), &body).await
        }));
    }
    let mut credited = 0;
    for handle in handles {
        if let WebhookOutcome::Credited { .. } = handle.await.unwrap().unwrap() {
            credited += 1;
        }
    }

    assert_eq!(credited, 1);
    assert_eq!(engine.balance(&user_id).await.unwrap(), 7_500);
}

#[tokio::test]
async fn bad_signature_changes_nothing() {
    let (engine, gateway, reconciler, user_id) = setup(FakeGateway::default()).await;
    engine
        .open_deposit(&user_id, 1_000, Some("PSK-3"))
        .await
        .unwrap();
    gateway.confirm("PSK-3", "success", 1_000, "NGN");
    let body = charge_body("PSK-3", 1_000, "NGN");

    let forged = sign_payload("not-the-secret", &body).unwrap();
    for signature in [Some(forged.as_str()), Some("zz"), None] {
        let err = reconciler
            .handle_callback(signature, &body)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::SignatureInvalid);
    }

    assert_eq!(engine.balance(&user_id).await.unwrap(), 0);
    let tx = engine
        .transaction_by_reference("PSK-3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn amount_mismatch_fails_the_deposit() {
    let (engine, gateway, reconciler, user_id) = setup(FakeGateway::default()).await;
    engine
        .open_deposit(&user_id, 1_000, Some("PSK-4"))
        .await
        .unwrap();
    gateway.confirm("PSK-4", "success", 100, "NGN");
    let body = charge_body("PSK-4", 1_000, "NGN");
    let signature = sign_payload(SECRET, &body).unwrap();

    let err = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AmountMismatch(_)));
    assert_eq!(engine.balance(&user_id).await.unwrap(), 0);
    let tx = engine
        .transaction_by_reference("PSK-4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);

    // A later delivery finds nothing pending.
    let replay = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap();
    assert!(matches!(replay, WebhookOutcome::AlreadyProcessed { .. }));
}

#[tokio::test]
async fn currency_mismatch_fails_the_deposit() {
    let (engine, gateway, reconciler, user_id) = setup(FakeGateway::default()).await;
    engine
        .open_deposit(&user_id, 1_000, Some("PSK-5"))
        .await
        .unwrap();
    gateway.confirm("PSK-5", "success", 1_000, "USD");
    let body = charge_body("PSK-5", 1_000, "USD");
    let signature = sign_payload(SECRET, &body).unwrap();

    let err = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AmountMismatch(_)));
    assert_eq!(engine.balance(&user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn gateway_rejection_marks_failed() {
    let (engine, gateway, reconciler, user_id) = setup(FakeGateway::default()).await;
    engine
        .open_deposit(&user_id, 1_000, Some("PSK-6"))
        .await
        .unwrap();
    gateway.confirm("PSK-6", "abandoned", 1_000, "NGN");
    let body = charge_body("PSK-6", 1_000, "NGN");
    let signature = sign_payload(SECRET, &body).unwrap();

    let outcome = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Failed {
            reference: "PSK-6".to_string()
        }
    );
    assert_eq!(engine.balance(&user_id).await.unwrap(), 0);
    let notifications = engine.notifications_for_user(&user_id).await.unwrap();
    assert!(notifications.iter().any(|n| n.title == "Deposit Failed"));
}

#[tokio::test]
async fn gateway_timeout_keeps_deposit_pending() {
    let slow = FakeGateway {
        delay: Some(Duration::from_secs(2)),
        ..FakeGateway::default()
    };
    let (engine, gateway, reconciler, user_id) = setup(slow).await;
    engine
        .open_deposit(&user_id, 1_000, Some("PSK-7"))
        .await
        .unwrap();
    gateway.confirm("PSK-7", "success", 1_000, "NGN");
    let body = charge_body("PSK-7", 1_000, "NGN");
    let signature = sign_payload(SECRET, &body).unwrap();

    let err = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap_err();

    assert_eq!(err, EngineError::GatewayTimeout);
    assert!(err.is_retryable());
    let tx = engine
        .transaction_by_reference("PSK-7")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(engine.balance(&user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_reference_is_acknowledged() {
    let (engine, gateway, reconciler, user_id) = setup(FakeGateway::default()).await;
    gateway.confirm("PSK-404", "success", 1_000, "NGN");
    let body = charge_body("PSK-404", 1_000, "NGN");
    let signature = sign_payload(SECRET, &body).unwrap();

    let outcome = reconciler
        .handle_callback(Some(&signature), &body)
        .await
        .unwrap();

    assert!(matches!(outcome, WebhookOutcome::AlreadyProcessed { .. }));
    assert_eq!(engine.balance(&user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn other_events_and_bad_payloads() {
    let (_engine, _gateway, reconciler, _user_id) = setup(FakeGateway::default()).await;

    let body = br#"{"event":"transfer.success","data":{}}"#;
    let outcome = reconciler
        .handle_callback(Some(&sign_payload(SECRET, body).unwrap()), body)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event: "transfer.success".to_string()
        }
    );

    let body = b"not json";
    let err = reconciler
        .handle_callback(Some(&sign_payload(SECRET, body).unwrap()), body)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPayload(_)));
}
