//! Region fan-out.
//!
//! Every region in a deployment event is processed independently: its own
//! backend adapter, its own bindings, its own errors. Within a region at most
//! `concurrency` bindings are reconciled at once. Failures come back as
//! values and are collected; nothing here aborts sibling work.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use cronsync_backend::{BackendFactory, RetryPolicy, RetryingBackend, ScheduleBackend};
use cronsync_core::config::ReconcileConfig;
use cronsync_core::{DeploymentEvent, RegionDeployment, ScheduleBinding};

use crate::cancel::CancelSignal;
use crate::engine::reconcile;
use crate::error::{ReconcileError, Step};
use crate::resolver::resolve;

pub struct Coordinator {
    factory: Arc<dyn BackendFactory>,
    config_root: PathBuf,
    stage: String,
    concurrency: usize,
    retry: RetryPolicy,
    cancel: CancelSignal,
}

impl Coordinator {
    pub fn new(factory: Arc<dyn BackendFactory>, config_root: impl Into<PathBuf>, stage: impl Into<String>) -> Self {
        let defaults = ReconcileConfig::default();
        Self {
            factory,
            config_root: config_root.into(),
            stage: stage.into(),
            concurrency: defaults.concurrency,
            retry: RetryPolicy::from_config(&defaults),
            cancel: CancelSignal::never(),
        }
    }

    /// Coordinator configured from the `reconcile` config section.
    pub fn from_config(factory: Arc<dyn BackendFactory>, cfg: &ReconcileConfig) -> Self {
        Self::new(factory, cfg.project_path.clone(), cfg.stage.clone())
            .with_concurrency(cfg.concurrency)
            .with_retry(RetryPolicy::from_config(cfg))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Reconcile every binding in `event`. An empty result means full success.
    pub async fn run(&self, event: DeploymentEvent) -> Vec<ReconcileError> {
        let start = Instant::now();
        let stage = event
            .stage
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.stage.clone());
        let regions = event.into_regions();

        info!(
            regions = regions.len(),
            stage = %stage,
            concurrency = self.concurrency,
            "Reconciling schedules"
        );

        let per_region = join_all(regions.into_iter().map(|r| self.run_region(r, &stage))).await;
        let errors: Vec<ReconcileError> = per_region.into_iter().flatten().collect();

        if errors.is_empty() {
            info!(elapsed_ms = start.elapsed().as_millis() as u64, "All schedules reconciled");
        } else {
            warn!(
                failures = errors.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Schedule reconciliation finished with failures"
            );
        }

        errors
    }

    async fn run_region(&self, deployment: RegionDeployment, stage: &str) -> Vec<ReconcileError> {
        let RegionDeployment { region, records } = deployment;
        let mut errors = Vec::new();

        let mut bindings: Vec<ScheduleBinding> = Vec::new();
        for record in &records {
            if let Err(e) = record.check(&region) {
                error!(region = %region, function = %record.path_label(), error = %e, "Invalid deployment record");
                errors.push(ReconcileError {
                    region: region.clone(),
                    binding: None,
                    function: Some(record.function_arn.clone()).filter(|arn| !arn.is_empty()),
                    step: Step::Resolve,
                    cause: e.into(),
                });
                continue;
            }
            match resolve(record, &self.config_root) {
                Ok(Some(binding)) => bindings.push(binding),
                Ok(None) => {}
                Err(e) => {
                    error!(region = %region, function = %record.path_label(), error = %e, "Invalid schedule config");
                    errors.push(ReconcileError {
                        region: region.clone(),
                        binding: None,
                        function: Some(record.function_arn.clone()),
                        step: Step::Resolve,
                        cause: e.into(),
                    });
                }
            }
        }

        if bindings.is_empty() {
            info!(region = %region, records = records.len(), "No schedules to reconcile");
            return errors;
        }

        let backend: Arc<dyn ScheduleBackend> = match self.factory.connect(&region).await {
            Ok(inner) => Arc::new(RetryingBackend::new(inner, self.retry.clone())),
            Err(e) => {
                error!(region = %region, error = %e, "Cannot build backend for region, skipping it");
                errors.push(ReconcileError::for_region(&region, Step::Connect, e));
                return errors;
            }
        };

        info!(region = %region, bindings = bindings.len(), "Reconciling region");

        let results: Vec<Result<_, ReconcileError>> = stream::iter(bindings)
            .map(|binding| {
                let backend = Arc::clone(&backend);
                let cancel = self.cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        warn!(region = backend.region(), rule = %binding.name, "Run cancelled, binding skipped");
                        return Err(ReconcileError::cancelled(&binding));
                    }
                    reconcile(&binding, backend.as_ref(), stage).await
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut reconciled = 0usize;
        for result in results {
            match result {
                Ok(_) => reconciled += 1,
                Err(e) => {
                    if !e.is_cancelled() {
                        error!(
                            region = %e.region,
                            rule = e.binding.as_deref().unwrap_or("-"),
                            step = %e.step,
                            error = %e.cause,
                            "Binding failed"
                        );
                    }
                    errors.push(e);
                }
            }
        }

        info!(region = %region, reconciled, failed = errors.len(), "Region done");
        errors
    }
}
