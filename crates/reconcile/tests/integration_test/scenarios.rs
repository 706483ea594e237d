//! End-to-end reconciliation scenarios against the fake backend.

use std::sync::Arc;

use cronsync_backend::{BackendError, FakeBackendFactory, InvokeGrant};
use cronsync_core::{permission_statement_id, target_assignment_id, RuleState};
use cronsync_reconcile::{Coordinator, FailureCause, Step};

use crate::support::{arn, event, record, Project};

#[tokio::test]
async fn nightly_rule_is_wired_to_unqualified_function() {
    let project = Project::new();
    project.schedule("foo", "nightly", "rate(1 day)", true);

    let factory = Arc::new(FakeBackendFactory::new());
    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");

    let errors = coordinator
        .run(event(None, &[("us-east-1", vec![record("us-east-1", "foo", "prod")])]))
        .await;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");

    let state = factory.backend("us-east-1").state();
    let rule = &state.rules["nightly"];
    assert_eq!(rule.state, RuleState::Enabled);
    assert_eq!(rule.schedule_expression, "rate(1 day)");
    assert_eq!(rule.description.as_deref(), Some("nightly for foo"));

    let targets = &state.targets["nightly"];
    assert_eq!(targets.len(), 1);
    let expected_id = target_assignment_id(&arn("us-east-1", "foo", "prod"), "nightly");
    assert_eq!(
        targets.get(&expected_id).map(String::as_str),
        Some("arn:aws:lambda:us-east-1:1:function:foo")
    );
}

#[tokio::test]
async fn reconciling_twice_converges_to_the_same_state() {
    let project = Project::new();
    project.schedule("foo", "nightly", "rate(1 day)", true);

    let factory = Arc::new(FakeBackendFactory::new());
    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");
    let deploy = event(None, &[("us-east-1", vec![record("us-east-1", "foo", "prod")])]);

    assert!(coordinator.run(deploy.clone()).await.is_empty());
    let after_first = factory.backend("us-east-1").state();

    assert!(coordinator.run(deploy).await.is_empty());
    let after_second = factory.backend("us-east-1").state();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.rules.len(), 1);
    assert_eq!(after_second.statement_count(), 1);
    assert_eq!(after_second.target_count(), 1);
}

#[tokio::test]
async fn function_without_schedule_makes_no_remote_calls() {
    let project = Project::new();
    project.write_raw("bar", r#"{"name": "bar", "runtime": "nodejs4.3"}"#);

    let factory = Arc::new(FakeBackendFactory::new());
    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");

    let errors = coordinator
        .run(event(
            None,
            &[(
                "us-east-1",
                vec![record("us-east-1", "bar", "prod"), record("us-east-1", "baz", "prod")],
            )],
        ))
        .await;

    assert!(errors.is_empty());
    assert_eq!(factory.connect_count(), 0);
    assert!(factory.backend("us-east-1").calls().is_empty());
}

#[tokio::test]
async fn existing_permission_statement_is_not_an_error() {
    let project = Project::new();
    project.schedule("foo", "nightly", "rate(1 day)", true);

    let factory = Arc::new(FakeBackendFactory::new());
    let function_arn = arn("us-east-1", "foo", "prod");
    factory.backend("us-east-1").seed_statement(InvokeGrant::scheduler(
        "arn:aws:lambda:us-east-1:1:function:foo".to_string(),
        permission_statement_id("nightly", &function_arn),
        Some("prod".to_string()),
    ));

    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");
    let errors = coordinator
        .run(event(None, &[("us-east-1", vec![record("us-east-1", "foo", "prod")])]))
        .await;

    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    let backend = factory.backend("us-east-1");
    assert_eq!(backend.calls_for("AddPermission").len(), 1);
    assert_eq!(backend.calls_for("PutTargets").len(), 1);
    assert_eq!(backend.state().statement_count(), 1);
}

#[tokio::test]
async fn rejected_rule_skips_permission_and_target() {
    let project = Project::new();
    project.schedule("foo", "broken", "every tuesday", true);

    let factory = Arc::new(FakeBackendFactory::new());
    factory.backend("us-east-1").fail_always(
        "PutRule",
        BackendError::rejected("PutRule", "ValidationException", "Parameter ScheduleExpression is not valid."),
    );

    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");
    let errors = coordinator
        .run(event(None, &[("us-east-1", vec![record("us-east-1", "foo", "prod")])]))
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step, Step::EnsureRule);
    assert_eq!(errors[0].binding.as_deref(), Some("broken"));

    let backend = factory.backend("us-east-1");
    assert_eq!(backend.calls_for("PutRule").len(), 1);
    assert!(backend.calls_for("AddPermission").is_empty());
    assert!(backend.calls_for("PutTargets").is_empty());
}

#[tokio::test]
async fn malformed_config_is_reported_and_siblings_proceed() {
    let project = Project::new();
    project.write_raw("bad", r#"{"cronjob": {"schedule": "rate(1 day)"}}"#);
    project.schedule("good", "hourly", "rate(1 hour)", false);

    let factory = Arc::new(FakeBackendFactory::new());
    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");

    let errors = coordinator
        .run(event(
            None,
            &[(
                "us-east-1",
                vec![record("us-east-1", "bad", "prod"), record("us-east-1", "good", "prod")],
            )],
        ))
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step, Step::Resolve);
    assert_eq!(errors[0].function.as_deref(), Some(arn("us-east-1", "bad", "prod").as_str()));
    assert!(matches!(errors[0].cause, FailureCause::Configuration(_)));

    let state = factory.backend("us-east-1").state();
    assert_eq!(state.rules["hourly"].state, RuleState::Disabled);
    assert_eq!(state.target_count(), 1);
}

#[tokio::test]
async fn event_stage_overrides_configured_stage() {
    let project = Project::new();
    project.schedule("foo", "nightly", "rate(1 day)", true);

    let factory = Arc::new(FakeBackendFactory::new());
    let coordinator = Coordinator::new(factory.clone(), project.root(), "dev");

    let errors = coordinator
        .run(event(Some("prod"), &[("us-east-1", vec![record("us-east-1", "foo", "prod")])]))
        .await;
    assert!(errors.is_empty());

    let state = factory.backend("us-east-1").state();
    let key = ("arn:aws:lambda:us-east-1:1:function:foo".to_string(), Some("prod".to_string()));
    assert_eq!(state.statements[&key].len(), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_within_a_binding() {
    let project = Project::new();
    project.schedule("foo", "nightly", "rate(1 day)", true);

    let factory = Arc::new(FakeBackendFactory::new());
    let backend = factory.backend("us-east-1");
    backend.fail_next("PutTargets", BackendError::transient("PutTargets", "ThrottlingException"));

    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod").with_retry(
        cronsync_backend::RetryPolicy {
            max_attempts: 3,
            call_timeout: std::time::Duration::from_secs(1),
            initial_backoff: std::time::Duration::from_millis(1),
            max_backoff: std::time::Duration::from_millis(5),
        },
    );

    let errors = coordinator
        .run(event(None, &[("us-east-1", vec![record("us-east-1", "foo", "prod")])]))
        .await;

    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(backend.calls_for("PutTargets").len(), 2);
    assert_eq!(backend.state().target_count(), 1);
}

#[tokio::test]
async fn blank_event_stage_keeps_configured_stage() {
    let project = Project::new();
    project.schedule("foo", "nightly", "rate(1 day)", true);

    let factory = Arc::new(FakeBackendFactory::new());
    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");

    let errors = coordinator
        .run(event(Some(""), &[("us-east-1", vec![record("us-east-1", "foo", "prod")])]))
        .await;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");

    let state = factory.backend("us-east-1").state();
    let key = ("arn:aws:lambda:us-east-1:1:function:foo".to_string(), Some("prod".to_string()));
    assert_eq!(state.statements[&key].len(), 1);
    assert_eq!(
        state.targets["nightly"].values().next().map(String::as_str),
        Some("arn:aws:lambda:us-east-1:1:function:foo")
    );
}

#[tokio::test]
async fn invalid_record_is_reported_and_siblings_proceed() {
    let project = Project::new();
    project.schedule("foo", "nightly", "rate(1 day)", true);
    project.schedule("bar", "hourly", "rate(1 hour)", true);

    let mut misplaced = record("us-east-1", "bar", "prod");
    misplaced.region = "eu-west-1".to_string();

    let factory = Arc::new(FakeBackendFactory::new());
    let coordinator = Coordinator::new(factory.clone(), project.root(), "prod");

    let errors = coordinator
        .run(event(None, &[("us-east-1", vec![misplaced, record("us-east-1", "foo", "prod")])]))
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step, Step::Resolve);
    assert_eq!(errors[0].region, "us-east-1");
    assert!(matches!(errors[0].cause, FailureCause::InvalidRecord(_)));

    let state = factory.backend("us-east-1").state();
    assert_eq!(state.rules.keys().collect::<Vec<_>>(), vec!["nightly"]);
    assert_eq!(state.target_count(), 1);
}
