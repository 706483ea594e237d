//! Deployment records, schedule bindings, and the deployment-completed event.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CronsyncError;

/// One deployed function instance, as reported by the deploy pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Stage-qualified function ARN (`...:function:<name>:<stage>`).
    #[serde(alias = "Arn", alias = "arn")]
    pub function_arn: String,
    pub component: String,
    pub module: String,
    #[serde(alias = "function")]
    pub function_name: String,
    #[serde(default)]
    pub region: String,
}

impl DeploymentRecord {
    /// Short label for logs: `component/module/function`.
    pub fn path_label(&self) -> String {
        format!("{}/{}/{}", self.component, self.module, self.function_name)
    }

    /// Check the record can be reconciled as part of `region`.
    pub fn check(&self, region: &str) -> Result<(), CronsyncError> {
        if self.function_arn.is_empty() {
            return Err(CronsyncError::InvalidRecord(format!(
                "{} in {region} has no function ARN",
                self.path_label()
            )));
        }
        if self.region != region {
            return Err(CronsyncError::InvalidRecord(format!(
                "{} listed under {region} but declares region {}",
                self.path_label(),
                self.region
            )));
        }
        Ok(())
    }
}

/// Remote state of a schedule rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleState {
    Enabled,
    Disabled,
}

impl RuleState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            RuleState::Enabled
        } else {
            RuleState::Disabled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleState::Enabled => "ENABLED",
            RuleState::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired schedule for one function. Recomputed on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleBinding {
    /// Rule name; the remote rule identifier within a region.
    pub name: String,
    pub description: Option<String>,
    /// Cron/rate syntax, passed through to the backend unvalidated.
    pub schedule_expression: String,
    pub enabled: bool,
    pub deployment: Arc<DeploymentRecord>,
}

impl ScheduleBinding {
    pub fn state(&self) -> RuleState {
        RuleState::from_enabled(self.enabled)
    }

    pub fn region(&self) -> &str {
        &self.deployment.region
    }

    pub fn function_arn(&self) -> &str {
        &self.deployment.function_arn
    }
}

/// Deployment-completed event: deployed records grouped by region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    /// Deploy stage, overriding the configured one when present.
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub deployed: BTreeMap<String, Vec<DeploymentRecord>>,
}

/// The records of one region, each with `region` filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDeployment {
    pub region: String,
    pub records: Vec<Arc<DeploymentRecord>>,
}

impl DeploymentEvent {
    pub fn from_json_str(s: &str) -> Result<Self, CronsyncError> {
        let event: Self = serde_json::from_str(s)?;
        event.validate()?;
        Ok(event)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CronsyncError> {
        let event: Self = serde_json::from_reader(reader)?;
        event.validate()?;
        Ok(event)
    }

    /// Reject events whose shape cannot be split into regions.
    ///
    /// Individual records are not checked here; see [`DeploymentRecord::check`].
    pub fn validate(&self) -> Result<(), CronsyncError> {
        if self.deployed.keys().any(String::is_empty) {
            return Err(CronsyncError::InvalidRecord("empty region key".into()));
        }
        Ok(())
    }

    /// Split the event into per-region groups, in region-name order.
    ///
    /// Records without a region inherit their group's. A record declaring a
    /// different region keeps it and fails [`DeploymentRecord::check`].
    pub fn into_regions(self) -> Vec<RegionDeployment> {
        self.deployed
            .into_iter()
            .map(|(region, records)| {
                let records = records
                    .into_iter()
                    .map(|mut record| {
                        if record.region.is_empty() {
                            record.region = region.clone();
                        }
                        Arc::new(record)
                    })
                    .collect();
                RegionDeployment { region, records }
            })
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.deployed.values().map(Vec::len).sum()
    }
}
