//! In-memory backend for tests and dry runs.
//!
//! Mirrors the remote semantics that matter for reconciliation: rules are
//! upserted by name, a repeated statement id on the same function and
//! qualifier is refused as already existing, and targets can only be put on
//! an existing rule. Every call is logged, including failed ones.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::traits::{BackendFactory, InvokeGrant, RuleRef, RuleSpec, ScheduleBackend, TargetSpec};

/// One recorded call against a [`FakeBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    UpsertRule(RuleSpec),
    GrantInvoke(InvokeGrant),
    PutTarget(TargetSpec),
}

impl BackendCall {
    pub fn op(&self) -> &'static str {
        match self {
            BackendCall::UpsertRule(_) => "PutRule",
            BackendCall::GrantInvoke(_) => "AddPermission",
            BackendCall::PutTarget(_) => "PutTargets",
        }
    }
}

/// Remote state held by the fake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeState {
    /// Rule name → last applied spec.
    pub rules: BTreeMap<String, RuleSpec>,
    /// (function, qualifier) → statement id → grant.
    pub statements: BTreeMap<(String, Option<String>), BTreeMap<String, InvokeGrant>>,
    /// Rule name → target id → target ARN.
    pub targets: BTreeMap<String, BTreeMap<String, String>>,
}

impl FakeState {
    pub fn statement_count(&self) -> usize {
        self.statements.values().map(BTreeMap::len).sum()
    }

    pub fn target_count(&self) -> usize {
        self.targets.values().map(BTreeMap::len).sum()
    }

    pub fn rule_arn(region: &str, name: &str) -> String {
        format!("arn:aws:events:{region}:000000000000:rule/{name}")
    }
}

/// Calls currently in flight and the highest count seen.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Leaves the gauge on drop, so a call abandoned mid-latency (e.g. by a
/// timeout) is no longer counted.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Inner {
    state: FakeState,
    calls: Vec<BackendCall>,
    /// Op → errors returned by the next calls, in order.
    scripted: HashMap<&'static str, VecDeque<BackendError>>,
    /// Op → error returned by every call.
    broken: HashMap<&'static str, BackendError>,
}

pub struct FakeBackend {
    region: String,
    latency: Option<Duration>,
    inner: Mutex<Inner>,
    in_flight: Arc<InFlight>,
    /// Gauge shared with sibling backends of the same factory.
    shared: Option<Arc<InFlight>>,
}

impl FakeBackend {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            latency: None,
            inner: Mutex::new(Inner::default()),
            in_flight: Arc::default(),
            shared: None,
        }
    }

    /// Delay every call by `latency` before it touches the state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn with_shared_gauge(mut self, gauge: Arc<InFlight>) -> Self {
        self.shared = Some(gauge);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call to `op` fail with `err`. Queued errors are consumed in order.
    pub fn fail_next(&self, op: &'static str, err: BackendError) {
        self.lock().scripted.entry(op).or_default().push_back(err);
    }

    /// Make every call to `op` fail with `err`.
    pub fn fail_always(&self, op: &'static str, err: BackendError) {
        self.lock().broken.insert(op, err);
    }

    /// Seed an invoke statement, as if granted by an earlier run.
    pub fn seed_statement(&self, grant: InvokeGrant) {
        self.lock()
            .state
            .statements
            .entry((grant.function.clone(), grant.qualifier.clone()))
            .or_default()
            .insert(grant.statement_id.clone(), grant);
    }

    pub fn state(&self) -> FakeState {
        self.lock().state.clone()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.peak()
    }

    async fn enter(&self, call: BackendCall) -> Result<(), BackendError> {
        let _local = self.in_flight.enter();
        let _shared = self.shared.as_ref().map(InFlight::enter);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let op = call.op();
        let mut inner = self.lock();
        inner.calls.push(call);
        let scripted = inner.scripted.get_mut(op).and_then(VecDeque::pop_front);
        let fault = scripted.or_else(|| inner.broken.get(op).cloned());
        drop(inner);

        fault.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl ScheduleBackend for FakeBackend {
    fn region(&self) -> &str {
        &self.region
    }

    async fn upsert_rule(&self, spec: &RuleSpec) -> Result<RuleRef, BackendError> {
        self.enter(BackendCall::UpsertRule(spec.clone())).await?;

        self.lock()
            .state
            .rules
            .insert(spec.name.clone(), spec.clone());

        Ok(RuleRef {
            name: spec.name.clone(),
            arn: Some(FakeState::rule_arn(&self.region, &spec.name)),
        })
    }

    async fn grant_invoke(&self, grant: &InvokeGrant) -> Result<(), BackendError> {
        self.enter(BackendCall::GrantInvoke(grant.clone())).await?;

        let mut inner = self.lock();
        let statements = inner
            .state
            .statements
            .entry((grant.function.clone(), grant.qualifier.clone()))
            .or_default();

        if statements.contains_key(&grant.statement_id) {
            return Err(BackendError::AlreadyExists {
                op: "AddPermission",
                message: format!(
                    "The statement id ({}) provided already exists.",
                    grant.statement_id
                ),
            });
        }
        statements.insert(grant.statement_id.clone(), grant.clone());
        Ok(())
    }

    async fn put_target(&self, target: &TargetSpec) -> Result<(), BackendError> {
        self.enter(BackendCall::PutTarget(target.clone())).await?;

        let mut inner = self.lock();
        if !inner.state.rules.contains_key(&target.rule) {
            return Err(BackendError::rejected(
                "PutTargets",
                "ResourceNotFoundException",
                format!("Rule {} does not exist on EventBus default.", target.rule),
            ));
        }
        inner
            .state
            .targets
            .entry(target.rule.clone())
            .or_default()
            .insert(target.target_id.clone(), target.target_arn.clone());
        Ok(())
    }
}

/// Hands out one [`FakeBackend`] per region, reusing it across connects.
#[derive(Default)]
pub struct FakeBackendFactory {
    backends: Mutex<HashMap<String, Arc<FakeBackend>>>,
    unreachable: Mutex<HashSet<String>>,
    latency: Option<Duration>,
    connects: AtomicUsize,
    in_flight: Arc<InFlight>,
}

impl FakeBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backends created from now on get this per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The backend for `region`, created if needed (e.g. to script faults up front).
    pub fn backend(&self, region: &str) -> Arc<FakeBackend> {
        let mut backends = self.backends.lock().unwrap_or_else(PoisonError::into_inner);
        backends
            .entry(region.to_string())
            .or_insert_with(|| {
                let backend = FakeBackend::new(region).with_shared_gauge(Arc::clone(&self.in_flight));
                let backend = match self.latency {
                    Some(latency) => backend.with_latency(latency),
                    None => backend,
                };
                Arc::new(backend)
            })
            .clone()
    }

    /// Refuse to connect to `region`.
    pub fn make_unreachable(&self, region: &str) {
        self.unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(region.to_string());
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Highest number of calls in flight at once across all regions.
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.peak()
    }
}

#[async_trait]
impl BackendFactory for FakeBackendFactory {
    async fn connect(&self, region: &str) -> Result<Arc<dyn ScheduleBackend>, BackendError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(region);
        if unreachable {
            return Err(BackendError::Config(format!("cannot reach region {region}")));
        }

        let backend: Arc<dyn ScheduleBackend> = self.backend(region);
        Ok(backend)
    }
}
