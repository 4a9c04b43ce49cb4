//! Idempotent desired-state control over orchestrator services.
//!
//! [`ServiceStateClient`] holds no state of its own: every read goes to the
//! orchestrator, and a mutation is only issued when it would change the
//! service's run/stop state. The external idle watchdog shares the same
//! [`ServiceStateClient::set_desired_state`] contract for deactivation, so
//! activation and deactivation compose without further coordination.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use waker_core::{
    ControlError, DesiredState, ServiceDescriptor, Transition, TransitionRequest,
};

use crate::api::{service_name_from_arn, OrchestratorApi, ServiceUpdate};

/// Acknowledgement of an applied (or already satisfied) transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionAck {
    pub descriptor: ServiceDescriptor,
    pub transition: Transition,
    /// State observed before the transition; `None` for forced redeploys.
    pub previous: Option<DesiredState>,
    /// Whether a mutating call was issued.
    pub mutated: bool,
}

/// Reads and converges service desired state through an [`OrchestratorApi`].
pub struct ServiceStateClient<A> {
    api: A,
}

impl<A: OrchestratorApi> ServiceStateClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Read the current run/stop state of a service.
    ///
    /// A service the orchestrator does not report, or reports as not
    /// `ACTIVE`, is [`ControlError::ServiceNotFound`].
    pub async fn get_desired_state(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<DesiredState, ControlError> {
        let snapshot = self
            .api
            .describe_service(descriptor)
            .await?
            .filter(|s| s.is_active())
            .ok_or_else(|| ControlError::ServiceNotFound {
                cluster: descriptor.cluster.clone(),
                service: descriptor.service.clone(),
            })?;

        debug!(
            service = %descriptor,
            desired_count = snapshot.desired_count,
            running_count = snapshot.running_count,
            "Read desired count"
        );

        Ok(DesiredState::from_count(snapshot.desired_count))
    }

    /// Converge a service onto `target`.
    ///
    /// Reads the current state fresh and only calls `UpdateService` when it
    /// differs from `target`; otherwise succeeds without mutating.
    pub async fn set_desired_state(
        &self,
        descriptor: &ServiceDescriptor,
        target: DesiredState,
    ) -> Result<TransitionAck, ControlError> {
        self.set_desired_state_tracked(descriptor, target, &AtomicBool::new(false))
            .await
    }

    /// [`Self::set_desired_state`], raising `update_sent` just before the
    /// mutating call goes out.
    ///
    /// The flag is never lowered, so a caller retrying across attempts can
    /// tell an update whose response was lost from one that was never sent.
    pub async fn set_desired_state_tracked(
        &self,
        descriptor: &ServiceDescriptor,
        target: DesiredState,
        update_sent: &AtomicBool,
    ) -> Result<TransitionAck, ControlError> {
        let current = self.get_desired_state(descriptor).await?;
        let transition = Transition::Target(target);

        if current == target {
            debug!(service = %descriptor, state = %current, "Desired state already satisfied");
            return Ok(TransitionAck {
                descriptor: descriptor.clone(),
                transition,
                previous: Some(current),
                mutated: false,
            });
        }

        update_sent.store(true, Ordering::SeqCst);
        self.api
            .update_service(descriptor, ServiceUpdate::desired_count(target.task_count()))
            .await?;

        info!(
            service = %descriptor,
            from = %current,
            to = %target,
            desired_count = target.task_count(),
            "Updated desired count"
        );

        Ok(TransitionAck {
            descriptor: descriptor.clone(),
            transition,
            previous: Some(current),
            mutated: true,
        })
    }

    /// Roll a new deployment unconditionally.
    pub async fn force_redeploy(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<TransitionAck, ControlError> {
        self.api
            .update_service(descriptor, ServiceUpdate::force_new_deployment())
            .await?;

        info!(service = %descriptor, "Forced new deployment");

        Ok(TransitionAck {
            descriptor: descriptor.clone(),
            transition: Transition::ForceRedeploy,
            previous: None,
            mutated: true,
        })
    }

    pub async fn apply(&self, request: &TransitionRequest) -> Result<TransitionAck, ControlError> {
        match request.transition {
            Transition::Target(target) => self.set_desired_state(&request.descriptor, target).await,
            Transition::ForceRedeploy => self.force_redeploy(&request.descriptor).await,
        }
    }

    /// List every service name in `cluster`, following pagination to the end.
    pub async fn list_services(&self, cluster: &str) -> Result<Vec<String>, ControlError> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.api.list_services(cluster, next_token.as_deref()).await?;
            pages += 1;
            names.extend(
                page.service_arns
                    .iter()
                    .map(|arn| service_name_from_arn(arn).to_string()),
            );

            match page.next_token.filter(|t| !t.is_empty()) {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!(cluster, pages, services = names.len(), "Listed services");
        Ok(names)
    }
}
