//! Locates and parses a deployed function's schedule configuration.
//!
//! The artifact lives at `<root>/<component>/<module>/<function>/s-function.json`
//! and carries the schedule under its `cronjob` key:
//!
//! ```json
//! { "cronjob": { "name": "nightly", "schedule": "rate(1 day)", "enabled": true } }
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use cronsync_core::{DeploymentRecord, ScheduleBinding};

use crate::error::ConfigurationError;

pub const CONFIG_FILE_NAME: &str = "s-function.json";
pub const SCHEDULE_SECTION: &str = "cronjob";

#[derive(Debug, Deserialize)]
struct FunctionConfig {
    #[serde(default)]
    cronjob: Option<CronjobSection>,
}

#[derive(Debug, Deserialize)]
struct CronjobSection {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schedule: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
}

/// Path of the schedule artifact for `record` under `config_root`.
pub fn schedule_config_path(record: &DeploymentRecord, config_root: &Path) -> PathBuf {
    config_root
        .join(&record.component)
        .join(&record.module)
        .join(&record.function_name)
        .join(CONFIG_FILE_NAME)
}

fn required(
    value: Option<String>,
    path: &Path,
    field: &'static str,
) -> Result<String, ConfigurationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigurationError::MissingField {
            path: path.to_path_buf(),
            field,
        }),
    }
}

/// Resolve the schedule binding for one deployed function.
///
/// `Ok(None)` when the function has no artifact or no `cronjob` section.
pub fn resolve(
    record: &Arc<DeploymentRecord>,
    config_root: &Path,
) -> Result<Option<ScheduleBinding>, ConfigurationError> {
    let path = schedule_config_path(record, config_root);

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No schedule config");
            return Ok(None);
        }
        Err(source) => return Err(ConfigurationError::Read { path, source }),
    };

    let config: FunctionConfig = serde_json::from_str(&raw).map_err(|source| {
        ConfigurationError::Parse {
            path: path.clone(),
            source,
        }
    })?;

    let Some(section) = config.cronjob else {
        debug!(path = %path.display(), "Config has no {SCHEDULE_SECTION} section");
        return Ok(None);
    };

    let binding = ScheduleBinding {
        name: required(section.name, &path, "name")?,
        description: section.description.filter(|d| !d.is_empty()),
        schedule_expression: required(section.schedule, &path, "schedule")?,
        enabled: section.enabled.unwrap_or(false),
        deployment: Arc::clone(record),
    };

    debug!(
        rule = %binding.name,
        schedule = %binding.schedule_expression,
        enabled = binding.enabled,
        function = %record.path_label(),
        "Resolved schedule binding"
    );

    Ok(Some(binding))
}
