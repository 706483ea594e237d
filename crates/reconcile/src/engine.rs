//! Per-binding convergence: ensure rule, ensure invoke permission, ensure target.
//!
//! The three steps always run in that order. A target attached before its
//! invoke grant exists would fire without being able to invoke the function,
//! so a failed step stops the binding there.

use tracing::{debug, info, warn};

use cronsync_backend::{InvokeGrant, RuleSpec, ScheduleBackend, TargetSpec};
use cronsync_core::{invocation_target, permission_statement_id, ScheduleBinding, TargetAssignment};

use crate::error::{ReconcileError, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    /// The deterministic statement was already on the function.
    AlreadyPresent,
}

/// What a successful reconciliation touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub rule: String,
    pub rule_arn: Option<String>,
    pub permission: PermissionOutcome,
    pub target: TargetAssignment,
}

fn rule_spec(binding: &ScheduleBinding) -> RuleSpec {
    RuleSpec {
        name: binding.name.clone(),
        description: binding.description.clone(),
        schedule_expression: binding.schedule_expression.clone(),
        state: binding.state(),
    }
}

fn invoke_grant(binding: &ScheduleBinding, stage: &str) -> InvokeGrant {
    InvokeGrant::scheduler(
        invocation_target(binding.function_arn(), stage),
        permission_statement_id(&binding.name, binding.function_arn()),
        (!stage.is_empty()).then(|| stage.to_string()),
    )
}

/// Converge the backend onto one binding.
pub async fn reconcile(
    binding: &ScheduleBinding,
    backend: &dyn ScheduleBackend,
    stage: &str,
) -> Result<ReconcileOutcome, ReconcileError> {
    // 1. Rule
    let rule_ref = backend
        .upsert_rule(&rule_spec(binding))
        .await
        .map_err(|e| ReconcileError::for_binding(binding, Step::EnsureRule, e))?;

    debug!(
        region = backend.region(),
        rule = %binding.name,
        state = %binding.state(),
        "Rule upserted"
    );

    // 2. Invoke permission
    let grant = invoke_grant(binding, stage);
    let permission = match backend.grant_invoke(&grant).await {
        Ok(()) => PermissionOutcome::Granted,
        Err(e) if e.is_already_exists() => {
            debug!(
                region = backend.region(),
                rule = %binding.name,
                statement_id = %grant.statement_id,
                "Invoke permission already present"
            );
            PermissionOutcome::AlreadyPresent
        }
        Err(e) => {
            warn!(
                region = backend.region(),
                rule = %binding.name,
                function = %grant.function,
                error = %e,
                "Invoke permission failed, target not attached"
            );
            return Err(ReconcileError::for_binding(binding, Step::EnsurePermission, e));
        }
    };

    // 3. Target
    let assignment = TargetAssignment::for_binding(binding, stage);
    backend
        .put_target(&TargetSpec {
            rule: binding.name.clone(),
            target_arn: assignment.target_arn.clone(),
            target_id: assignment.target_id.clone(),
        })
        .await
        .map_err(|e| ReconcileError::for_binding(binding, Step::EnsureTarget, e))?;

    info!(
        region = backend.region(),
        rule = %binding.name,
        target = %assignment.target_arn,
        target_id = %assignment.target_id,
        "Schedule reconciled"
    );

    Ok(ReconcileOutcome {
        rule: binding.name.clone(),
        rule_arn: rule_ref.arn,
        permission,
        target: assignment,
    })
}
