//! Configuration and reconciliation errors.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use cronsync_backend::BackendError;
use cronsync_core::{CronsyncError, ScheduleBinding};

/// A function's schedule artifact exists but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schedule config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schedule config {} is missing required field `{field}`", .path.display())]
    MissingField { path: PathBuf, field: &'static str },
}

/// Where in the per-region pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Connect,
    Resolve,
    EnsureRule,
    EnsurePermission,
    EnsureTarget,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Connect => "connect",
            Step::Resolve => "resolve",
            Step::EnsureRule => "ensure-rule",
            Step::EnsurePermission => "ensure-permission",
            Step::EnsureTarget => "ensure-target",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    InvalidRecord(#[from] CronsyncError),

    #[error("run cancelled before this binding was started")]
    Cancelled,
}

/// One failed binding (or region), with enough context to diagnose it.
#[derive(Debug, Error)]
#[error("[{region}] {step} failed for {}: {cause}", subject(.binding, .function))]
pub struct ReconcileError {
    pub region: String,
    /// Rule name, when a binding had been resolved.
    pub binding: Option<String>,
    /// Function ARN, when the failure belongs to one function.
    pub function: Option<String>,
    pub step: Step,
    #[source]
    pub cause: FailureCause,
}

impl ReconcileError {
    pub fn for_binding(binding: &ScheduleBinding, step: Step, cause: impl Into<FailureCause>) -> Self {
        Self {
            region: binding.region().to_string(),
            binding: Some(binding.name.clone()),
            function: Some(binding.function_arn().to_string()),
            step,
            cause: cause.into(),
        }
    }

    pub fn for_region(region: &str, step: Step, cause: impl Into<FailureCause>) -> Self {
        Self {
            region: region.to_string(),
            binding: None,
            function: None,
            step,
            cause: cause.into(),
        }
    }

    pub fn cancelled(binding: &ScheduleBinding) -> Self {
        Self {
            region: binding.region().to_string(),
            binding: Some(binding.name.clone()),
            function: Some(binding.function_arn().to_string()),
            step: Step::EnsureRule,
            cause: FailureCause::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FailureCause::Cancelled)
    }
}

fn subject(binding: &Option<String>, function: &Option<String>) -> String {
    match (binding, function) {
        (Some(rule), Some(function)) => format!("rule {rule} ({function})"),
        (None, Some(function)) => function.clone(),
        (Some(rule), None) => format!("rule {rule}"),
        (None, None) => "region".to_string(),
    }
}
