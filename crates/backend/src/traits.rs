//! Backend trait definition and request types.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cronsync_core::RuleState;

use crate::error::BackendError;

/// Principal allowed to invoke scheduled functions.
pub const SCHEDULER_PRINCIPAL: &str = "events.amazonaws.com";

/// Permission action granted to the scheduler principal.
pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";

/// Desired configuration of a schedule rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub description: Option<String>,
    pub schedule_expression: String,
    pub state: RuleState,
}

/// What the backend reports back after an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub name: String,
    pub arn: Option<String>,
}

/// One invoke-permission statement on a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeGrant {
    /// Function ARN (unqualified form).
    pub function: String,
    pub principal: String,
    pub action: String,
    pub statement_id: String,
    /// Alias or version the statement is scoped to.
    pub qualifier: Option<String>,
}

impl InvokeGrant {
    /// Grant for the scheduler principal with the standard invoke action.
    pub fn scheduler(function: String, statement_id: String, qualifier: Option<String>) -> Self {
        Self {
            function,
            principal: SCHEDULER_PRINCIPAL.to_string(),
            action: INVOKE_ACTION.to_string(),
            statement_id,
            qualifier,
        }
    }
}

/// A function attached as target of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub rule: String,
    pub target_arn: String,
    pub target_id: String,
}

/// Scheduling and invocation-permission operations for a single region.
///
/// Every operation is an upsert from the caller's point of view and must be
/// safe to apply repeatedly.
#[async_trait]
pub trait ScheduleBackend: Send + Sync {
    /// Region this adapter is pinned to.
    fn region(&self) -> &str;

    /// Create or replace the rule named `spec.name`.
    async fn upsert_rule(&self, spec: &RuleSpec) -> Result<RuleRef, BackendError>;

    /// Add an invoke-permission statement.
    ///
    /// Returns [`BackendError::AlreadyExists`] when a statement with the same
    /// id is already on the function; callers decide whether that counts as
    /// success.
    async fn grant_invoke(&self, grant: &InvokeGrant) -> Result<(), BackendError>;

    /// Attach (or re-attach) a target to an existing rule.
    async fn put_target(&self, target: &TargetSpec) -> Result<(), BackendError>;
}

/// Builds one backend adapter per region.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self, region: &str) -> Result<Arc<dyn ScheduleBackend>, BackendError>;
}
