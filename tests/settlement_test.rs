mod common;

use common::{accepted, airtime, data_plan, naira, rejected, TestApp};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use vtu_settlement::database::transaction_repository::{TransactionStatus, TransactionType};
use vtu_settlement::database::repository::AuditLogRepository;
use vtu_settlement::error::ErrorCode;
use vtu_settlement::payments::ProviderError;
use vtu_settlement::services::audit::actions;
use vtu_settlement::services::settlement::refund_reference;
use vtu_settlement::services::{AsyncSettlement, SettlementOutcome};

#[tokio::test]
async fn successful_airtime_purchase_debits_wallet() {
    let app = TestApp::new();
    let session = app.user_with_balance(5000).await;

    let record = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap();

    assert_eq!(record.status, TransactionStatus::Success);
    assert_eq!(record.amount, naira(1000));
    assert_eq!(record.transaction_type, TransactionType::Airtime);
    assert!(record.reference.starts_with("AIR-"));
    assert!(record.wallet_debited());
    assert!(!record.requires_reconciliation());
    assert_eq!(record.details["provider"], "naijadatasub");
    assert_eq!(app.balance(&session).await, naira(4000));
    assert_eq!(app.provider.calls(), 1);
}

#[tokio::test]
async fn provider_rejection_leaves_wallet_untouched() {
    let app = TestApp::new();
    let session = app.user_with_balance(5000).await;
    app.provider.respond_with(Err(rejected()));

    let record = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap();

    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.details["failure_kind"], "provider_rejected");
    assert_eq!(record.details["wallet_debited"], false);
    assert!(record.failure_reason().is_some());
    assert_eq!(app.balance(&session).await, naira(5000));
}

#[tokio::test]
async fn network_failure_is_recorded_as_failed() {
    let app = TestApp::new();
    let session = app.user_with_balance(5000).await;
    app.provider
        .respond_with(Err(ProviderError::network("naijadatasub", "connection reset")));

    let record = app
        .services
        .engine
        .purchase(&session, data_plan("mtn-1gb"), naira(300))
        .await
        .unwrap();

    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.details["failure_kind"], "network_unreachable");
    assert_eq!(record.failure_reason(), Some("connection reset"));
    assert_eq!(app.balance(&session).await, naira(5000));
}

#[tokio::test(start_paused = true)]
async fn provider_timeout_is_a_network_failure_without_debit() {
    let app = TestApp::new();
    let session = app.user_with_balance(5000).await;
    app.provider.stall_for(Duration::from_secs(600));

    let record = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap();

    assert_eq!(app.provider.calls(), 1);
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.details["failure_kind"], "network_unreachable");
    assert_eq!(record.details["wallet_debited"], false);
    assert_eq!(record.failure_reason(), Some("no response within 30 seconds"));
    assert_eq!(app.balance(&session).await, naira(5000));
}

#[tokio::test]
async fn provider_is_sent_the_record_reference() {
    let app = TestApp::new();
    let session = app.user_with_balance(5000).await;
    app.provider.respond_with(Ok(accepted(true)));

    let record = app
        .services
        .engine
        .purchase(&session, data_plan("mtn-1gb"), naira(300))
        .await
        .unwrap();
    assert_eq!(app.provider.references(), vec![record.reference.clone()]);

    // The echoed reference is what a vendor callback settles against
    let settled = app
        .services
        .engine
        .handle_async_settlement(&record.reference, SettlementOutcome::Success, json!({}))
        .await
        .unwrap();
    assert!(matches!(settled, AsyncSettlement::Applied { refund: None, .. }));
}

#[tokio::test]
async fn async_failure_after_sync_success_refunds_once() {
    let app = TestApp::new();
    let session = app.user_with_balance(5000).await;
    app.provider.respond_with(Ok(accepted(true)));

    let record = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap();
    assert_eq!(record.status, TransactionStatus::Pending);
    assert_eq!(app.balance(&session).await, naira(4000));

    let payload = json!({
        "event": "transaction.failed",
        "data": { "reference": record.reference, "reason": "Recipient line barred" }
    });
    let settlement = app
        .services
        .engine
        .handle_async_settlement(&record.reference, SettlementOutcome::Failed, payload.clone())
        .await
        .unwrap();

    let (settled, refund) = match settlement {
        AsyncSettlement::Applied { record, refund } => (record, refund.unwrap()),
        other => panic!("expected applied settlement, got {:?}", other),
    };
    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.failure_reason(), Some("Recipient line barred"));
    assert_eq!(settled.details["refund_reference"], refund.reference.as_str());
    assert_eq!(refund.transaction_type, TransactionType::Refund);
    assert_eq!(refund.status, TransactionStatus::Success);
    assert_eq!(refund.amount, naira(1000));
    assert_eq!(refund.reference, refund_reference(&record.reference));
    assert_eq!(refund.details["original_reference"], record.reference.as_str());
    assert_eq!(app.balance(&session).await, naira(5000));

    let again = app
        .services
        .engine
        .handle_async_settlement(&record.reference, SettlementOutcome::Failed, payload)
        .await
        .unwrap();
    assert!(matches!(again, AsyncSettlement::AlreadySettled(_)));
    assert_eq!(app.balance(&session).await, naira(5000));

    let refunds = app
        .transactions
        .all()
        .await
        .into_iter()
        .filter(|r| r.transaction_type == TransactionType::Refund)
        .count();
    assert_eq!(refunds, 1);
}

#[tokio::test]
async fn async_success_settles_without_refund() {
    let app = TestApp::new();
    let session = app.user_with_balance(2000).await;
    app.provider.respond_with(Ok(accepted(true)));

    let record = app
        .services
        .engine
        .purchase(&session, data_plan("glo-2gb"), naira(500))
        .await
        .unwrap();

    let settlement = app
        .services
        .engine
        .handle_async_settlement(
            &record.reference,
            SettlementOutcome::Success,
            json!({ "event": "transaction.completed", "data": { "reference": record.reference } }),
        )
        .await
        .unwrap();

    match settlement {
        AsyncSettlement::Applied { record, refund } => {
            assert_eq!(record.status, TransactionStatus::Success);
            assert!(record.settled_at.is_some());
            assert!(refund.is_none());
        }
        other => panic!("expected applied settlement, got {:?}", other),
    }
    assert_eq!(app.balance(&session).await, naira(1500));
}

#[tokio::test]
async fn late_failure_for_failed_purchase_is_already_settled() {
    let app = TestApp::new();
    let session = app.user_with_balance(1000).await;
    app.provider.respond_with(Err(rejected()));

    let record = app
        .services
        .engine
        .purchase(&session, airtime(500), naira(500))
        .await
        .unwrap();

    let settlement = app
        .services
        .engine
        .handle_async_settlement(&record.reference, SettlementOutcome::Failed, json!({}))
        .await
        .unwrap();

    assert!(matches!(settlement, AsyncSettlement::AlreadySettled(_)));
    assert_eq!(app.balance(&session).await, naira(1000));
}

#[tokio::test]
async fn insufficient_funds_never_reaches_provider() {
    let app = TestApp::new();
    let session = app.user_with_balance(500).await;

    let err = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::InsufficientFunds);
    assert_eq!(app.provider.calls(), 0);
    assert_eq!(app.balance(&session).await, naira(500));
    assert!(app.transactions.all().await.is_empty());
}

#[tokio::test]
async fn configuration_error_is_surfaced_and_recorded() {
    let app = TestApp::new();
    let session = app.user_with_balance(5000).await;
    app.provider
        .respond_with(Err(ProviderError::configuration("naijadatasub token is not set")));

    let err = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::ConfigurationError);
    assert!(!err.user_message().contains("token"));
    assert_eq!(app.balance(&session).await, naira(5000));

    let records = app.transactions.all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TransactionStatus::Failed);
    assert_eq!(records[0].details["failure_kind"], "configuration_error");
}

#[tokio::test]
async fn debit_failure_after_provider_success_is_flagged_for_reconciliation() {
    let app = TestApp::new();
    let session = app.user_with_balance(1000).await;
    app.provider
        .drain_wallet_on_call(app.users.clone(), session.user_id().unwrap());

    let record = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap();

    assert_eq!(record.status, TransactionStatus::Success);
    assert!(record.requires_reconciliation());
    assert!(!record.wallet_debited());
    assert!(record.details["reconciliation_reason"].is_string());
    assert_eq!(app.balance(&session).await, naira(0));

    let entries = app.audit_log.recent(10).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.action == actions::RECONCILIATION_FLAGGED
            && e.details["reference"] == record.reference.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_get_distinct_references() {
    let app = Arc::new(TestApp::new());
    let mut sessions = Vec::new();
    for _ in 0..100 {
        sessions.push(app.user_with_balance(10_000).await);
    }

    let mut handles = Vec::with_capacity(10_000);
    for i in 0..10_000 {
        let app = app.clone();
        let session = sessions[i % sessions.len()];
        handles.push(tokio::spawn(async move {
            app.services
                .engine
                .purchase(&session, airtime(100), naira(100))
                .await
                .unwrap()
                .reference
        }));
    }

    let mut references = HashSet::new();
    for result in futures::future::join_all(handles).await {
        references.insert(result.unwrap());
    }
    assert_eq!(references.len(), 10_000);
    for session in &sessions {
        assert_eq!(app.balance(session).await, naira(0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_never_overdraw() {
    let app = Arc::new(TestApp::new());
    let session = app.user_with_balance(1000).await;

    let handles: Vec<_> = (0..30)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                app.services
                    .engine
                    .purchase(&session, airtime(100), naira(100))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut refused = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(record) => {
                assert_eq!(record.status, TransactionStatus::Success);
                succeeded += 1;
            }
            Err(e) => {
                assert_eq!(e.error_code(), ErrorCode::InsufficientFunds);
                refused += 1;
            }
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(refused, 20);
    assert_eq!(app.balance(&session).await, naira(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_failure_deliveries_refund_exactly_once() {
    let app = Arc::new(TestApp::new());
    let session = app.user_with_balance(3000).await;
    app.provider.respond_with(Ok(accepted(true)));

    let record = app
        .services
        .engine
        .purchase(&session, airtime(1000), naira(1000))
        .await
        .unwrap();
    assert_eq!(app.balance(&session).await, naira(2000));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let app = app.clone();
            let reference = record.reference.clone();
            tokio::spawn(async move {
                app.services
                    .engine
                    .handle_async_settlement(
                        &reference,
                        SettlementOutcome::Failed,
                        json!({ "event": "transaction.failed" }),
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let applied = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|s| matches!(s, AsyncSettlement::Applied { .. }))
        .count();

    assert_eq!(applied, 1);
    assert_eq!(app.balance(&session).await, naira(3000));
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let app = TestApp::new();

    let err = app
        .services
        .engine
        .handle_async_settlement("AIR-missing", SettlementOutcome::Failed, json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::TransactionNotFound);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn history_is_scoped_to_the_session_user() {
    let app = TestApp::new();
    let alice = app.user_with_balance(1000).await;
    let bob = app.user_with_balance(1000).await;

    app.services
        .engine
        .purchase(&alice, airtime(100), naira(100))
        .await
        .unwrap();
    app.services
        .engine
        .purchase(&alice, airtime(200), naira(200))
        .await
        .unwrap();
    app.services
        .engine
        .purchase(&bob, airtime(300), naira(300))
        .await
        .unwrap();

    let history = app.services.engine.transactions_for(&alice).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].amount, naira(200));
    assert!(history.iter().all(|r| Some(r.user_id) == alice.user_id()));
}
