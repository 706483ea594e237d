use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub reconcile: ReconcileConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CRONSYNC_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CRONSYNC_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            reconcile: ReconcileConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  aws:         static_credentials={}, endpoint={}",
            self.aws.has_static_credentials(),
            self.aws.endpoint_url.as_deref().unwrap_or("(default)")
        );
        tracing::info!(
            "  reconcile:   project_path={}, stage={}, concurrency={}",
            self.reconcile.project_path.display(),
            self.reconcile.stage,
            self.reconcile.concurrency
        );
        tracing::info!(
            "  backend:     timeout={}s, max_attempts={}, backoff={}..{}ms",
            self.reconcile.call_timeout_secs,
            self.reconcile.max_attempts,
            self.reconcile.initial_backoff_ms,
            self.reconcile.max_backoff_ms
        );
    }
}

// ── AWS credentials / endpoint ────────────────────────────────

/// Credentials and endpoint shared by every per-region backend client.
///
/// Regions are not configured here: they come from the deployment event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    /// True when both halves of a static key pair are present. Otherwise the
    /// default provider chain is used.
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── Reconciliation ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Root of the project tree holding `<component>/<module>/<function>/s-function.json`.
    pub project_path: PathBuf,
    /// Deploy stage; also the qualifier stripped from function ARNs.
    pub stage: String,
    /// Max bindings reconciled at once within a region.
    pub concurrency: usize,
    pub call_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            project_path: PathBuf::from("."),
            stage: "dev".to_string(),
            concurrency: 5,
            call_timeout_secs: 10,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
        }
    }
}

impl ReconcileConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            project_path: PathBuf::from(profiled_env_or(p, "PROJECT_PATH", ".")),
            stage: profiled_env_or(p, "STAGE", &defaults.stage),
            concurrency: (profiled_env_u32(p, "RECONCILE_CONCURRENCY", defaults.concurrency as u32)
                as usize)
                .max(1),
            call_timeout_secs: profiled_env_u64(p, "BACKEND_TIMEOUT_SECS", defaults.call_timeout_secs),
            max_attempts: profiled_env_u32(p, "BACKEND_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            initial_backoff_ms: profiled_env_u64(
                p,
                "BACKEND_INITIAL_BACKOFF_MS",
                defaults.initial_backoff_ms,
            ),
            max_backoff_ms: profiled_env_u64(p, "BACKEND_MAX_BACKOFF_MS", defaults.max_backoff_ms),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
