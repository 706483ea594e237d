//! Schedule reconciliation.
//!
//! Resolves each deployed function's `cronjob` section into a
//! [`ScheduleBinding`](cronsync_core::ScheduleBinding) and converges the
//! region's backend onto it: rule, then invoke permission, then target.

pub mod cancel;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod resolver;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use coordinator::Coordinator;
pub use engine::{reconcile, PermissionOutcome, ReconcileOutcome};
pub use error::{ConfigurationError, FailureCause, ReconcileError, Step};
pub use resolver::{resolve, schedule_config_path, CONFIG_FILE_NAME, SCHEDULE_SECTION};
