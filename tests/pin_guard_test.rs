mod common;

use chrono::Duration;
use common::TestApp;
use std::sync::Arc;

use vtu_settlement::error::ErrorCode;

const PIN: &str = "2580";
const WRONG_PIN: &str = "1111";

#[tokio::test]
async fn lockout_after_max_failures_then_cooldown() {
    let app = TestApp::new();
    let session = app.user_with_balance(0).await;
    let guard = &app.services.pin_guard;
    guard.set_pin(&session, PIN, None).await.unwrap();

    for expected_remaining in (1..=4).rev() {
        assert!(!guard.verify_pin(&session, WRONG_PIN).await.unwrap());
        let status = guard.pin_status(&session).await.unwrap();
        assert_eq!(status.remaining_attempts, expected_remaining);
        assert!(!status.is_locked);
    }

    // The fifth mismatch locks the account but still reports a plain mismatch
    assert!(!guard.verify_pin(&session, WRONG_PIN).await.unwrap());
    let status = guard.pin_status(&session).await.unwrap();
    assert!(status.is_locked);
    assert!(status.locked_until.is_some());

    let err = guard.verify_pin(&session, PIN).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::AccountLocked);
    assert_eq!(err.status_code(), 423);

    app.clock.advance(Duration::minutes(15) + Duration::seconds(1));

    assert!(guard.verify_pin(&session, PIN).await.unwrap());
    let status = guard.pin_status(&session).await.unwrap();
    assert!(!status.is_locked);
    assert_eq!(status.remaining_attempts, 5);
}

#[tokio::test]
async fn attempts_while_locked_are_not_counted() {
    let app = TestApp::new();
    let session = app.user_with_balance(0).await;
    let guard = &app.services.pin_guard;
    guard.set_pin(&session, PIN, None).await.unwrap();

    for _ in 0..5 {
        guard.verify_pin(&session, WRONG_PIN).await.unwrap();
    }
    let locked_until = guard.pin_status(&session).await.unwrap().locked_until;

    for _ in 0..10 {
        let err = guard.authorize(&session, WRONG_PIN).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::AccountLocked);
    }
    app.clock.advance(Duration::minutes(5));
    guard.verify_pin(&session, WRONG_PIN).await.unwrap_err();

    // Lock window unchanged by the attempts made during it
    let status = guard.pin_status(&session).await.unwrap();
    assert_eq!(status.locked_until, locked_until);

    app.clock.advance(Duration::minutes(11));
    assert!(!guard.verify_pin(&session, WRONG_PIN).await.unwrap());
    assert_eq!(guard.pin_status(&session).await.unwrap().remaining_attempts, 4);
}

#[tokio::test]
async fn authorize_reports_remaining_attempts() {
    let app = TestApp::new();
    let session = app.user_with_balance(0).await;
    let guard = &app.services.pin_guard;
    guard.set_pin(&session, PIN, None).await.unwrap();

    let err = guard.authorize(&session, WRONG_PIN).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidPin);
    assert!(err.user_message().contains("4 attempt(s) remaining"));

    guard.authorize(&session, PIN).await.unwrap();
    assert_eq!(guard.pin_status(&session).await.unwrap().remaining_attempts, 5);
}

#[tokio::test]
async fn malformed_pins_are_rejected_without_counting() {
    let app = TestApp::new();
    let session = app.user_with_balance(0).await;
    let guard = &app.services.pin_guard;

    for pin in ["123", "1234567", "12a4", " 1234"] {
        let err = guard.set_pin(&session, pin, None).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidPin);
    }
    assert!(!guard.pin_status(&session).await.unwrap().has_pin);

    guard.set_pin(&session, "123456", None).await.unwrap();
    assert!(guard.pin_status(&session).await.unwrap().has_pin);
}

#[tokio::test]
async fn owner_reset_clears_pin_and_lock() {
    let app = TestApp::new();
    let session = app.user_with_balance(0).await;
    let guard = &app.services.pin_guard;
    guard.set_pin(&session, PIN, None).await.unwrap();
    for _ in 0..5 {
        guard.verify_pin(&session, WRONG_PIN).await.unwrap();
    }

    guard.reset_pin(&session).await.unwrap();

    let status = guard.pin_status(&session).await.unwrap();
    assert!(!status.has_pin);
    assert!(!status.is_locked);
    let err = guard.authorize(&session, PIN).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PinNotSet);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wrong_pins_evaluate_at_most_max_attempts() {
    let app = Arc::new(TestApp::new());
    let session = app.user_with_balance(0).await;
    app.services.pin_guard.set_pin(&session, PIN, None).await.unwrap();

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.services.pin_guard.verify_pin(&session, WRONG_PIN).await })
        })
        .collect();

    let mut evaluated = 0;
    let mut refused = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(matched) => {
                assert!(!matched);
                evaluated += 1;
            }
            Err(e) => {
                assert_eq!(e.error_code(), ErrorCode::AccountLocked);
                refused += 1;
            }
        }
    }
    assert_eq!(evaluated, 5);
    assert_eq!(refused, 35);

    let status = app.services.pin_guard.pin_status(&session).await.unwrap();
    assert!(status.is_locked);
    let err = app
        .services
        .pin_guard
        .authorize(&session, PIN)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::AccountLocked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn correct_pin_racing_wrong_guesses_never_unlocks() {
    let app = Arc::new(TestApp::new());
    let session = app.user_with_balance(0).await;
    app.services.pin_guard.set_pin(&session, PIN, None).await.unwrap();
    for _ in 0..5 {
        app.services.pin_guard.verify_pin(&session, WRONG_PIN).await.unwrap();
    }
    let locked_until = app.services.pin_guard.pin_status(&session).await.unwrap().locked_until;

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let app = app.clone();
            let pin = if i % 2 == 0 { PIN } else { WRONG_PIN };
            tokio::spawn(async move { app.services.pin_guard.verify_pin(&session, pin).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        let err = result.unwrap().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::AccountLocked);
    }
    let status = app.services.pin_guard.pin_status(&session).await.unwrap();
    assert!(status.is_locked);
    assert_eq!(status.locked_until, locked_until);
}
