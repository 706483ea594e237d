//! RetryingBackend layered over FakeBackend.

use std::sync::Arc;
use std::time::Duration;

use cronsync_backend::*;
use cronsync_core::RuleState;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        call_timeout: Duration::from_millis(500),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn nightly() -> RuleSpec {
    RuleSpec {
        name: "nightly".to_string(),
        description: Some("nightly cleanup".to_string()),
        schedule_expression: "rate(1 day)".to_string(),
        state: RuleState::Enabled,
    }
}

#[tokio::test]
async fn recovers_from_throttling() {
    let fake = Arc::new(FakeBackend::new("us-east-1"));
    fake.fail_next("PutRule", BackendError::transient("PutRule", "ThrottlingException"));
    fake.fail_next("PutRule", BackendError::transient("PutRule", "ThrottlingException"));

    let backend = RetryingBackend::new(fake.clone(), policy(3));
    let rule_ref = backend.upsert_rule(&nightly()).await.unwrap();

    assert_eq!(rule_ref.name, "nightly");
    assert_eq!(fake.calls_for("PutRule").len(), 3);
    assert_eq!(fake.state().rules.len(), 1);
    assert_eq!(backend.region(), "us-east-1");
}

#[tokio::test]
async fn rejection_surfaces_after_one_call() {
    let fake = Arc::new(FakeBackend::new("us-east-1"));
    fake.fail_always(
        "PutRule",
        BackendError::rejected("PutRule", "ValidationException", "Parameter ScheduleExpression is not valid."),
    );

    let backend = RetryingBackend::new(fake.clone(), policy(3));
    let err = backend.upsert_rule(&nightly()).await.unwrap_err();

    assert!(matches!(err, BackendError::Rejected { .. }));
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn slow_backend_times_out_per_call() {
    let fake = Arc::new(FakeBackend::new("us-east-1").with_latency(Duration::from_millis(200)));
    let backend = RetryingBackend::new(
        fake.clone(),
        RetryPolicy {
            max_attempts: 2,
            call_timeout: Duration::from_millis(20),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        },
    );

    let err = backend.upsert_rule(&nightly()).await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout { op: "PutRule", .. }));
    // Timed-out attempts never reached the state.
    assert!(fake.state().rules.is_empty());
}

#[tokio::test]
async fn repeated_grant_reports_already_exists_without_retrying() {
    let fake = Arc::new(FakeBackend::new("us-east-1"));
    let backend = RetryingBackend::new(fake.clone(), policy(3));
    let grant = InvokeGrant::scheduler(
        "arn:aws:lambda:us-east-1:1:function:foo".to_string(),
        "SID42".to_string(),
        Some("prod".to_string()),
    );

    backend.grant_invoke(&grant).await.unwrap();
    let err = backend.grant_invoke(&grant).await.unwrap_err();

    assert!(err.is_already_exists());
    assert_eq!(fake.calls_for("AddPermission").len(), 2);
    assert_eq!(fake.state().statement_count(), 1);
}

#[tokio::test]
async fn timed_out_attempts_leave_the_in_flight_gauge() {
    let fake = Arc::new(FakeBackend::new("us-east-1").with_latency(Duration::from_millis(50)));
    let backend = RetryingBackend::new(
        fake.clone(),
        RetryPolicy {
            max_attempts: 3,
            call_timeout: Duration::from_millis(5),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        },
    );

    let err = backend.upsert_rule(&nightly()).await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout { .. }));
    // Three sequential attempts, each dropped mid-latency: never more than one at once.
    assert_eq!(fake.max_in_flight(), 1);
}
