use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gate::TimeWindowPolicy;
use crate::types::ServiceDescriptor;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
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

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_CLUSTER: &str = "minecraft";
pub const DEFAULT_SERVICE: &str = "minecraft-server";
pub const DEFAULT_SUBDOMAIN_PART: &str = "minecraft";

// ── Top-level config ──────────────────────────────────────────

/// Resolved deployment configuration, read once at cold start.
///
/// Every component takes this by reference at construction; nothing reads
/// the environment after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakerConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub region: String,
    pub cluster: String,
    pub service: String,
    /// Hostname the inbound log records must mention. `None` accepts any record.
    pub monitored_hostname: Option<String>,
    pub allowed_hours: TimeWindowPolicy,
    pub retry: RetryConfig,
    /// Hard bound on one trigger invocation, enforced by the host.
    pub invocation_timeout_secs: u64,
}

impl Default for WakerConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            region: DEFAULT_REGION.to_string(),
            cluster: DEFAULT_CLUSTER.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            monitored_hostname: None,
            allowed_hours: TimeWindowPolicy::default(),
            retry: RetryConfig::default(),
            invocation_timeout_secs: 180,
        }
    }
}

impl WakerConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `WAKER_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt("WAKER_PROFILE")
            .map(|s| s.to_uppercase())
            .unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();

        let region = profiled_env_opt(p, "REGION")
            .or_else(|| profiled_env_opt(p, "AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let monitored_hostname = profiled_env_opt(p, "MONITORED_HOSTNAME").or_else(|| {
            profiled_env_opt(p, "DOMAIN_NAME").map(|domain| {
                let sub = profiled_env_or(p, "SUBDOMAIN_PART", DEFAULT_SUBDOMAIN_PART);
                format!("{sub}.{domain}")
            })
        });

        Self {
            profile: p.to_string(),
            region,
            cluster: profiled_env_or(p, "CLUSTER", DEFAULT_CLUSTER),
            service: profiled_env_or(p, "SERVICE", DEFAULT_SERVICE),
            monitored_hostname,
            allowed_hours: TimeWindowPolicy::parse(
                profiled_env_opt(p, "ALLOWED_HOURS").as_deref(),
            ),
            retry: RetryConfig::from_env_profiled(p),
            invocation_timeout_secs: profiled_env_u64(p, "INVOCATION_TIMEOUT_SECONDS", 180),
        }
    }

    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor::new(&self.cluster, &self.service)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  target:   region={}, cluster={}, service={}", self.region, self.cluster, self.service);
        tracing::info!("  hostname: {}", self.monitored_hostname.as_deref().unwrap_or("(any)"));
        tracing::info!("  window:   allowed_hours={}", self.allowed_hours);
        tracing::info!(
            "  retry:    max_attempts={}, base_delay_ms={}, max_delay_ms={}",
            self.retry.max_attempts, self.retry.base_delay_ms, self.retry.max_delay_ms
        );
    }
}

// ── Retry ─────────────────────────────────────────────────────

/// Bounded exponential backoff settings for transient orchestrator faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: profiled_env_u32(p, "RETRY_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            base_delay_ms: profiled_env_u64(p, "RETRY_BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: profiled_env_u64(p, "RETRY_MAX_DELAY_MS", defaults.max_delay_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
