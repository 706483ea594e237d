//! Shared fixtures: project trees and deployment events.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use cronsync_core::{DeploymentEvent, DeploymentRecord};
use cronsync_reconcile::schedule_config_path;

pub fn arn(region: &str, function: &str, stage: &str) -> String {
    format!("arn:aws:lambda:{region}:1:function:{function}:{stage}")
}

pub fn record(region: &str, function: &str, stage: &str) -> DeploymentRecord {
    DeploymentRecord {
        function_arn: arn(region, function, stage),
        component: "api".to_string(),
        module: "jobs".to_string(),
        function_name: function.to_string(),
        region: String::new(),
    }
}

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_raw(&self, function: &str, body: &str) {
        let path = schedule_config_path(&record("us-east-1", function, "x"), self.root());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    pub fn schedule(&self, function: &str, rule: &str, expression: &str, enabled: bool) {
        let body = serde_json::json!({
            "name": function,
            "cronjob": {
                "name": rule,
                "description": format!("{rule} for {function}"),
                "schedule": expression,
                "enabled": enabled,
            }
        });
        self.write_raw(function, &body.to_string());
    }
}

pub fn event(stage: Option<&str>, regions: &[(&str, Vec<DeploymentRecord>)]) -> DeploymentEvent {
    DeploymentEvent {
        stage: stage.map(str::to_string),
        deployed: regions
            .iter()
            .map(|(region, records)| (region.to_string(), records.clone()))
            .collect(),
    }
}
