mod common;

use engine::{EngineError, TransactionKind, TransactionStatus};

use common::{engine_with_db, shared_engine, user_with_balance};

#[tokio::test]
async fn deposit_payment_then_overdrawn_withdrawal() {
    let (engine, _db) = engine_with_db().await;
    let user = engine.register_user("ada", "password").await.unwrap();

    engine.credit(&user.id, 50_000, Some("TX1")).await.unwrap();
    engine
        .debit(&user.id, 20_000, TransactionKind::Payment)
        .await
        .unwrap();
    let err = engine.withdraw(&user.id, 40_000).await.unwrap_err();

    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert!(err.is_retryable());
    assert_eq!(engine.balance(&user.id).await.unwrap(), 30_000);

    let ledger = engine.transactions_for_user(&user.id).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|tx| tx.status == TransactionStatus::Success));
    assert!(
        ledger
            .iter()
            .all(|tx| tx.kind != TransactionKind::Withdrawal)
    );
}

#[tokio::test]
async fn credit_records_reference() {
    let (engine, _db) = engine_with_db().await;
    let user = engine.register_user("ada", "password").await.unwrap();

    let tx = engine.credit(&user.id, 1_500, Some("ref-1")).await.unwrap();

    assert_eq!(tx.kind, TransactionKind::Deposit);
    assert_eq!(tx.status, TransactionStatus::Success);
    let found = engine.transaction_by_reference("ref-1").await.unwrap();
    assert_eq!(found.map(|tx| tx.id), Some(tx.id));
    assert!(
        engine
            .transaction_by_reference("missing")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn reused_reference_is_rejected_without_effect() {
    let (engine, _db) = engine_with_db().await;
    let user = engine.register_user("ada", "password").await.unwrap();

    engine.credit(&user.id, 1_000, Some("dup")).await.unwrap();
    let err = engine.credit(&user.id, 1_000, Some("dup")).await.unwrap_err();
    assert_eq!(err, EngineError::DuplicateReference("dup".to_string()));

    let err = engine
        .open_deposit(&user.id, 1_000, Some("dup"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::DuplicateReference("dup".to_string()));

    assert_eq!(engine.balance(&user.id).await.unwrap(), 1_000);
    assert_eq!(engine.transactions_for_user(&user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn amounts_must_be_positive() {
    let (engine, _db) = engine_with_db().await;
    let user = user_with_balance(&engine, "ada", 1_000).await;

    for amount in [0, -1] {
        assert!(matches!(
            engine.credit(&user.id, amount, None).await,
            Err(EngineError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.withdraw(&user.id, amount).await,
            Err(EngineError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.open_deposit(&user.id, amount, None).await,
            Err(EngineError::InvalidAmount(_))
        ));
    }
    assert_eq!(engine.balance(&user.id).await.unwrap(), 1_000);
}

#[tokio::test]
async fn debit_rejects_deposit_kind() {
    let (engine, _db) = engine_with_db().await;
    let user = user_with_balance(&engine, "ada", 1_000).await;

    let err = engine
        .debit(&user.id, 100, TransactionKind::Deposit)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(engine.balance(&user.id).await.unwrap(), 1_000);
}

#[tokio::test]
async fn unknown_user_is_reported() {
    let (engine, _db) = engine_with_db().await;

    assert_eq!(
        engine.balance("nobody").await.unwrap_err(),
        EngineError::UserNotFound("nobody".to_string())
    );
    assert_eq!(
        engine.withdraw("nobody", 100).await.unwrap_err(),
        EngineError::UserNotFound("nobody".to_string())
    );
    assert_eq!(
        engine.credit("nobody", 100, None).await.unwrap_err(),
        EngineError::UserNotFound("nobody".to_string())
    );
}

#[tokio::test]
async fn open_deposit_stays_pending_without_balance_change() {
    let (engine, _db) = engine_with_db().await;
    let user = engine.register_user("ada", "password").await.unwrap();

    let generated = engine.open_deposit(&user.id, 5_000, None).await.unwrap();
    let named = engine
        .open_deposit(&user.id, 2_000, Some("PSK-42"))
        .await
        .unwrap();

    assert_eq!(generated.status, TransactionStatus::Pending);
    assert!(
        generated
            .reference
            .as_deref()
            .is_some_and(|reference| reference.starts_with("dep_"))
    );
    assert_eq!(named.reference.as_deref(), Some("PSK-42"));
    assert_eq!(engine.balance(&user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn exact_balance_can_be_spent() {
    let (engine, _db) = engine_with_db().await;
    let user = user_with_balance(&engine, "ada", 700).await;

    engine.withdraw(&user.id, 700).await.unwrap();

    assert_eq!(engine.balance(&user.id).await.unwrap(), 0);
    assert!(matches!(
        engine.withdraw(&user.id, 1).await,
        Err(EngineError::InsufficientFunds(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let engine = shared_engine().await;
    let user = user_with_balance(&engine, "ada", 1_000).await;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let engine = engine.clone();
        let user_id = user.id.clone();
        handles.push(tokio::spawn(async move {
            engine
                .debit(&user_id, 100, TransactionKind::Payment)
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(EngineError::InsufficientFunds(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(engine.balance(&user.id).await.unwrap(), 0);
    let payments = engine
        .transactions_for_user(&user.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.kind == TransactionKind::Payment)
        .count();
    assert_eq!(payments, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_credits_and_debits_balance_out() {
    let engine = shared_engine().await;
    let user = user_with_balance(&engine, "ada", 500).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        let user_id = user.id.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                engine.credit(&user_id, 100, None).await.map(|_| ())
            } else {
                engine.withdraw(&user_id, 100).await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let ledger = engine.transactions_for_user(&user.id).await.unwrap();
    let credited: i64 = ledger
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Deposit)
        .map(|tx| tx.amount_minor)
        .sum();
    let debited: i64 = ledger
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Withdrawal)
        .map(|tx| tx.amount_minor)
        .sum();
    let balance = engine.balance(&user.id).await.unwrap();
    assert!(balance >= 0);
    assert_eq!(balance, credited - debited);
}
