//! AWS adapter: EventBridge rules/targets and Lambda resource policies.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_eventbridge::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_eventbridge::types::{RuleState as SdkRuleState, Target};
use aws_types::region::Region;
use tracing::{debug, info};

use cronsync_core::config::AwsConfig;
use cronsync_core::RuleState;

use crate::error::BackendError;
use crate::traits::{BackendFactory, InvokeGrant, RuleRef, RuleSpec, ScheduleBackend, TargetSpec};

/// Service error codes worth retrying.
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "InternalException",
    "InternalFailure",
    "ServiceException",
    "ServiceUnavailable",
    "ConcurrentModificationException",
];

/// Map a service error code to the backend taxonomy.
///
/// Lambda answers a duplicate statement id with `ResourceConflictException`,
/// but uses the same code while a function update is still in progress; only
/// the former is an "already exists".
pub(crate) fn classify_service_code(op: &'static str, code: &str, message: &str) -> BackendError {
    if code == "ResourceConflictException" {
        if message.to_ascii_lowercase().contains("already exists") {
            return BackendError::AlreadyExists {
                op,
                message: message.to_string(),
            };
        }
        return BackendError::transient(op, format!("{code}: {message}"));
    }
    if TRANSIENT_CODES.contains(&code) {
        return BackendError::transient(op, format!("{code}: {message}"));
    }
    BackendError::rejected(op, code, message)
}

fn classify<E, R>(op: &'static str, err: SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service) => {
            let code = service.err().code().unwrap_or("Unknown");
            let message = service.err().message().unwrap_or_default();
            classify_service_code(op, code, message)
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            BackendError::transient(op, DisplayErrorContext(&err).to_string())
        }
        _ => BackendError::rejected(op, "ClientError", DisplayErrorContext(&err).to_string()),
    }
}

fn sdk_state(state: RuleState) -> SdkRuleState {
    match state {
        RuleState::Enabled => SdkRuleState::Enabled,
        RuleState::Disabled => SdkRuleState::Disabled,
    }
}

/// EventBridge + Lambda clients pinned to one region.
pub struct AwsBackend {
    region: String,
    events: aws_sdk_eventbridge::Client,
    lambda: aws_sdk_lambda::Client,
}

impl AwsBackend {
    /// Build both clients for `region`.
    ///
    /// Static credentials are used when configured, otherwise the default
    /// provider chain. SDK retries are disabled because [`crate::RetryingBackend`]
    /// owns the retry policy.
    pub async fn connect(aws: &AwsConfig, region: &str) -> Result<Self, BackendError> {
        if region.trim().is_empty() {
            return Err(BackendError::Config("empty region".into()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::disabled());

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "cronsync-static",
            );
            loader = loader.credentials_provider(creds);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            if !endpoint.is_empty() {
                let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.clone()
                } else {
                    format!("https://{endpoint}")
                };
                loader = loader.endpoint_url(url);
            }
        }

        let sdk_config = loader.load().await;

        info!(
            region,
            static_credentials = aws.has_static_credentials(),
            "AWS schedule backend initialized"
        );

        Ok(Self {
            region: region.to_string(),
            events: aws_sdk_eventbridge::Client::new(&sdk_config),
            lambda: aws_sdk_lambda::Client::new(&sdk_config),
        })
    }
}

#[async_trait]
impl ScheduleBackend for AwsBackend {
    fn region(&self) -> &str {
        &self.region
    }

    async fn upsert_rule(&self, spec: &RuleSpec) -> Result<RuleRef, BackendError> {
        debug!(region = %self.region, rule = %spec.name, state = %spec.state, "PutRule");

        let resp = self
            .events
            .put_rule()
            .name(&spec.name)
            .set_description(spec.description.clone())
            .schedule_expression(&spec.schedule_expression)
            .state(sdk_state(spec.state))
            .send()
            .await
            .map_err(|e| classify("PutRule", e))?;

        Ok(RuleRef {
            name: spec.name.clone(),
            arn: resp.rule_arn().map(str::to_string),
        })
    }

    async fn grant_invoke(&self, grant: &InvokeGrant) -> Result<(), BackendError> {
        debug!(
            region = %self.region,
            function = %grant.function,
            statement_id = %grant.statement_id,
            qualifier = ?grant.qualifier,
            "AddPermission"
        );

        self.lambda
            .add_permission()
            .function_name(&grant.function)
            .statement_id(&grant.statement_id)
            .action(&grant.action)
            .principal(&grant.principal)
            .set_qualifier(grant.qualifier.clone())
            .send()
            .await
            .map_err(|e| classify("AddPermission", e))?;

        Ok(())
    }

    async fn put_target(&self, target: &TargetSpec) -> Result<(), BackendError> {
        debug!(
            region = %self.region,
            rule = %target.rule,
            target_id = %target.target_id,
            "PutTargets"
        );

        let sdk_target = Target::builder()
            .id(&target.target_id)
            .arn(&target.target_arn)
            .build()
            .map_err(|e| BackendError::rejected("PutTargets", "InvalidTarget", e.to_string()))?;

        let resp = self
            .events
            .put_targets()
            .rule(&target.rule)
            .targets(sdk_target)
            .send()
            .await
            .map_err(|e| classify("PutTargets", e))?;

        // PutTargets reports per-target failures in a 200 response.
        if let Some(failed) = resp.failed_entries().first() {
            let code = failed.error_code().unwrap_or("Unknown");
            let message = failed.error_message().unwrap_or_default();
            return Err(classify_service_code("PutTargets", code, message));
        }

        Ok(())
    }
}

/// Connects an [`AwsBackend`] per region with shared credentials.
pub struct AwsBackendFactory {
    aws: AwsConfig,
}

impl AwsBackendFactory {
    pub fn new(aws: AwsConfig) -> Self {
        Self { aws }
    }
}

#[async_trait]
impl BackendFactory for AwsBackendFactory {
    async fn connect(&self, region: &str) -> Result<Arc<dyn ScheduleBackend>, BackendError> {
        let backend = AwsBackend::connect(&self.aws, region).await?;
        Ok(Arc::new(backend))
    }
}
