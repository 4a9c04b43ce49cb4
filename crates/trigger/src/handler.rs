//! Activate-on-demand trigger handler.
//!
//! One call of [`TriggerHandler::handle`] walks a single invocation through
//! `Idle → Decoding → Gating → Querying → {NoOp | Activating} → Idle`.
//! Nothing is remembered between invocations: duplicate or concurrent
//! deliveries are absorbed by the orchestrator's desired count, which a
//! racing duplicate observes as already running.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::error::Elapsed;
use tracing::{debug, error, info, warn};

use waker_core::{
    decide, ControlError, DesiredState, ServiceDescriptor, TimeWindowPolicy, WakerConfig,
};
use waker_ecs::{OrchestratorApi, RetryPolicy, ServiceStateClient};

use crate::event::{ActivationEvent, EventError};

/// Source of the current time for the activation gate.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-invocation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Decoding,
    Gating,
    Querying,
    NoOp,
    Activating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Decoding => "decoding",
            Self::Gating => "gating",
            Self::Querying => "querying",
            Self::NoOp => "no-op",
            Self::Activating => "activating",
        };
        f.write_str(name)
    }
}

/// What one invocation did. Returned to the host; never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Activated { service: String },
    NoOp { reason: String },
    GateDenied { reason: String },
    MalformedEvent { error: String },
    Failed { error: String },
}

impl TriggerOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "activated",
            Self::NoOp { .. } => "no_op",
            Self::GateDenied { .. } => "gate_denied",
            Self::MalformedEvent { .. } => "malformed_event",
            Self::Failed { .. } => "failed",
        }
    }

    fn no_op(reason: impl Into<String>) -> Self {
        Self::NoOp {
            reason: reason.into(),
        }
    }
}

/// Starts the managed service when a client tries to reach it.
pub struct TriggerHandler<A, C = SystemClock> {
    client: ServiceStateClient<A>,
    descriptor: ServiceDescriptor,
    policy: TimeWindowPolicy,
    hostname: Option<String>,
    retry: RetryPolicy,
    clock: C,
}

impl<A: OrchestratorApi> TriggerHandler<A, SystemClock> {
    pub fn new(config: &WakerConfig, api: A) -> Self {
        Self {
            client: ServiceStateClient::new(api),
            descriptor: config.descriptor(),
            policy: config.allowed_hours.clone(),
            hostname: config.monitored_hostname.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            clock: SystemClock,
        }
    }
}

impl<A: OrchestratorApi, C: Clock> TriggerHandler<A, C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> TriggerHandler<A, C2> {
        TriggerHandler {
            client: self.client,
            descriptor: self.descriptor,
            policy: self.policy,
            hostname: self.hostname,
            retry: self.retry,
            clock,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handle an already parsed JSON payload.
    pub async fn handle(&self, payload: &Value) -> TriggerOutcome {
        self.enter(Phase::Decoding);
        self.finish(ActivationEvent::from_value(payload)).await
    }

    /// Handle raw invocation bytes.
    pub async fn handle_bytes(&self, raw: &[u8]) -> TriggerOutcome {
        self.enter(Phase::Decoding);
        self.finish(ActivationEvent::from_slice(raw)).await
    }

    /// [`Self::handle_bytes`] bounded by `timeout`. On expiry the invocation
    /// is abandoned and nothing is reported as its outcome.
    pub async fn handle_bytes_within(
        &self,
        raw: &[u8],
        timeout: Duration,
    ) -> Result<TriggerOutcome, Elapsed> {
        let result = tokio::time::timeout(timeout, self.handle_bytes(raw)).await;
        if result.is_err() {
            error!(
                service = %self.descriptor,
                timeout_ms = timeout.as_millis() as u64,
                "Invocation timed out"
            );
        }
        result
    }

    async fn finish(&self, decoded: Result<ActivationEvent, EventError>) -> TriggerOutcome {
        let outcome = self.process(decoded).await;
        self.enter(Phase::Idle);
        log_outcome(&self.descriptor, &outcome);
        outcome
    }

    async fn process(&self, decoded: Result<ActivationEvent, EventError>) -> TriggerOutcome {
        let event = match decoded {
            Ok(event) => event,
            Err(e) => {
                let err = ControlError::MalformedEvent(e.to_string());
                warn!(error = %err, "Malformed activation event, treating as empty batch");
                return TriggerOutcome::MalformedEvent {
                    error: err.to_string(),
                };
            }
        };

        let hostname = self.hostname.as_deref();
        if !event.has_activity(hostname) {
            let reason = match &event {
                ActivationEvent::Logs { records, .. } if !records.is_empty() => {
                    "no log record mentions the monitored hostname"
                }
                _ => "empty event batch",
            };
            return TriggerOutcome::no_op(reason);
        }

        if let ActivationEvent::Logs { log_group, .. } = &event {
            let latest = event.matching_records(hostname).filter_map(|r| r.timestamp_utc()).max();
            debug!(
                log_group = ?log_group,
                matching = event.matching_records(hostname).count(),
                latest = ?latest,
                "Client activity detected"
            );
        }

        self.enter(Phase::Gating);
        let decision = decide(self.clock.now(), &self.policy);
        if !decision.allow {
            return TriggerOutcome::GateDenied {
                reason: decision.reason,
            };
        }
        debug!(reason = %decision.reason, "Activation permitted");

        self.enter(Phase::Querying);
        let current = match self
            .retry
            .run("DescribeServices", || self.client.get_desired_state(&self.descriptor))
            .await
        {
            Ok(state) => state,
            Err(e) => return TriggerOutcome::Failed { error: e.to_string() },
        };

        if current == DesiredState::Running {
            self.enter(Phase::NoOp);
            return TriggerOutcome::no_op("service already running");
        }

        self.enter(Phase::Activating);
        // Raised once an update has gone out, even if its response was lost
        // and a later attempt finds the service already running.
        let update_sent = AtomicBool::new(false);
        match self
            .retry
            .run("UpdateService", || {
                self.client.set_desired_state_tracked(
                    &self.descriptor,
                    DesiredState::Running,
                    &update_sent,
                )
            })
            .await
        {
            Ok(ack) if ack.mutated || update_sent.load(Ordering::SeqCst) => {
                TriggerOutcome::Activated {
                    service: self.descriptor.to_string(),
                }
            }
            Ok(_) => TriggerOutcome::no_op("service activated concurrently"),
            Err(e) => TriggerOutcome::Failed { error: e.to_string() },
        }
    }

    fn enter(&self, phase: Phase) {
        debug!(service = %self.descriptor, phase = %phase, "Trigger phase");
    }
}

fn log_outcome(descriptor: &ServiceDescriptor, outcome: &TriggerOutcome) {
    match outcome {
        TriggerOutcome::Activated { .. } => {
            info!(service = %descriptor, outcome = outcome.name(), "Updated desired count to running")
        }
        TriggerOutcome::NoOp { reason } => {
            info!(service = %descriptor, outcome = outcome.name(), reason = %reason, "No activation needed")
        }
        TriggerOutcome::GateDenied { reason } => {
            info!(service = %descriptor, outcome = outcome.name(), reason = %reason, "Activation denied by time window")
        }
        TriggerOutcome::MalformedEvent { error } => {
            warn!(service = %descriptor, outcome = outcome.name(), error = %error, "Invocation completed as no-op")
        }
        TriggerOutcome::Failed { error } => {
            error!(service = %descriptor, outcome = outcome.name(), error = %error, "Activation failed")
        }
    }
}
