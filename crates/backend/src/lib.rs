//! Remote backend adapters for schedule reconciliation.
//!
//! This crate provides:
//! - `ScheduleBackend` trait covering the three remote resources (rule,
//!   invoke permission, rule target)
//! - `AwsBackend`, backed by EventBridge and Lambda clients pinned to one region
//! - `FakeBackend`, an in-memory implementation with a call log and fault injection
//! - `RetryingBackend`, a decorator adding per-call timeouts and bounded retries

pub mod aws;
pub mod error;
pub mod fake;
pub mod retry;
pub mod traits;

pub use aws::{AwsBackend, AwsBackendFactory};
pub use error::BackendError;
pub use fake::{BackendCall, FakeBackend, FakeBackendFactory, FakeState};
pub use retry::{RetryPolicy, RetryingBackend};
pub use traits::{
    BackendFactory, InvokeGrant, RuleRef, RuleSpec, ScheduleBackend, TargetSpec, INVOKE_ACTION,
    SCHEDULER_PRINCIPAL,
};
