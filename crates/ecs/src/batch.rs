//! Manual bulk transitions across the services of a cluster.
//!
//! Batch operations bypass the activation gate. Each matching service is
//! transitioned concurrently and independently: one failing service never
//! suppresses the outcome of the others.

use std::time::Instant;

use futures::future::join_all;
use tracing::{error, info};

use waker_core::{BatchCommand, ControlError, ServiceDescriptor, Transition, TransitionRequest};

use crate::api::OrchestratorApi;
use crate::client::{ServiceStateClient, TransitionAck};
use crate::retry::RetryPolicy;

/// Result of one service's transition.
#[derive(Debug)]
pub struct ServiceOutcome {
    pub service: String,
    pub transition: Transition,
    pub result: Result<TransitionAck, ControlError>,
}

impl ServiceOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// All per-service outcomes of one batch run.
#[derive(Debug)]
pub struct BatchReport {
    pub command: BatchCommand,
    pub cluster: String,
    pub outcomes: Vec<ServiceOutcome>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Whether `name` matches `pattern`. Without `*` the match is exact;
/// each `*` matches any run of characters.
pub fn matches_service_pattern(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut remaining) = name.strip_prefix(first) else {
        return false;
    };

    let rest: Vec<&str> = parts.collect();
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };

    for part in middle {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }

    remaining.ends_with(last)
}

/// Applies `up` / `down` / `redeploy` to every matching service in a cluster.
pub struct BatchController<A> {
    client: ServiceStateClient<A>,
    retry: RetryPolicy,
}

impl<A: OrchestratorApi> BatchController<A> {
    pub fn new(client: ServiceStateClient<A>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Validate `command`, then run it.
    ///
    /// An unrecognized command fails with [`ControlError::InvalidArgument`]
    /// before any orchestrator call.
    pub async fn run(
        &self,
        command: &str,
        cluster: &str,
        pattern: &str,
    ) -> Result<BatchReport, ControlError> {
        let command: BatchCommand = command.parse()?;
        self.run_command(command, cluster, pattern).await
    }

    /// Run an already validated command.
    ///
    /// Only a failed service listing is returned as an error; per-service
    /// failures are collected into the report.
    pub async fn run_command(
        &self,
        command: BatchCommand,
        cluster: &str,
        pattern: &str,
    ) -> Result<BatchReport, ControlError> {
        let start = Instant::now();
        let transition = command.transition();

        let services = self
            .retry
            .run("ListServices", || self.client.list_services(cluster))
            .await?;

        let matching: Vec<String> = services
            .into_iter()
            .filter(|name| matches_service_pattern(pattern, name))
            .collect();

        info!(
            command = %command,
            cluster,
            pattern,
            matched = matching.len(),
            services = ?matching,
            "Sending service update commands"
        );

        let futures = matching.into_iter().map(|service| async move {
            let request = TransitionRequest {
                descriptor: ServiceDescriptor::new(cluster, &service),
                transition,
            };
            let result = self
                .retry
                .run("UpdateService", || self.client.apply(&request))
                .await;
            ServiceOutcome {
                service,
                transition,
                result,
            }
        });

        let outcomes = join_all(futures).await;

        for outcome in &outcomes {
            match &outcome.result {
                Ok(ack) => info!(
                    service = %outcome.service,
                    transition = %outcome.transition,
                    mutated = ack.mutated,
                    "Service transition applied"
                ),
                Err(e) => error!(
                    service = %outcome.service,
                    transition = %outcome.transition,
                    error = %e,
                    "Service transition failed"
                ),
            }
        }

        let report = BatchReport {
            command,
            cluster: cluster.to_string(),
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            command = %command,
            succeeded = report.succeeded(),
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Batch complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use waker_core::DesiredState;

    use crate::memory::{ApiOperation, InMemoryOrchestrator};

    fn controller(
        api: InMemoryOrchestrator,
    ) -> (Arc<InMemoryOrchestrator>, BatchController<Arc<InMemoryOrchestrator>>) {
        let api = Arc::new(api);
        let controller =
            BatchController::new(ServiceStateClient::new(api.clone()), RetryPolicy::immediate(3));
        (api, controller)
    }

    fn cluster_with_four() -> InMemoryOrchestrator {
        InMemoryOrchestrator::new()
            .with_service("games", "minecraft-server-a", 0)
            .with_service("games", "minecraft-server-b", 0)
            .with_service("games", "minecraft-server-c", 0)
            .with_service("games", "watchdog", 0)
    }

    #[test]
    fn exact_pattern() {
        assert!(matches_service_pattern("minecraft-server", "minecraft-server"));
        assert!(!matches_service_pattern("minecraft-server", "minecraft-server-2"));
        assert!(!matches_service_pattern("minecraft-server", "minecraft"));
    }

    #[test]
    fn glob_pattern() {
        assert!(matches_service_pattern("*", "anything"));
        assert!(matches_service_pattern("minecraft-*", "minecraft-server"));
        assert!(matches_service_pattern("*-server", "minecraft-server"));
        assert!(matches_service_pattern("mine*serv*", "minecraft-server"));
        assert!(matches_service_pattern("m*t*r", "minecraft-server"));
        assert!(!matches_service_pattern("minecraft-*", "watchdog"));
        assert!(!matches_service_pattern("*-server", "minecraft-server-b"));
        assert!(!matches_service_pattern("a*a", "a"));
    }

    #[tokio::test]
    async fn up_activates_only_matching_services() {
        let (api, controller) = controller(cluster_with_four());

        let report = controller.run("up", "games", "minecraft-server-*").await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(api.update_calls(), 3);

        let mut targeted: Vec<String> =
            api.updates().into_iter().map(|(d, _)| d.service).collect();
        targeted.sort();
        assert_eq!(
            targeted,
            vec!["minecraft-server-a", "minecraft-server-b", "minecraft-server-c"]
        );
        assert!(api
            .updates()
            .iter()
            .all(|(_, u)| u.desired_count == Some(DesiredState::Running.task_count())));
        assert_eq!(
            api.desired_count(&ServiceDescriptor::new("games", "watchdog")),
            Some(0)
        );
    }

    #[tokio::test]
    async fn down_skips_already_stopped_services() {
        let api = InMemoryOrchestrator::new()
            .with_service("games", "a", 1)
            .with_service("games", "b", 0);
        let (api, controller) = controller(api);

        let report = controller.run("down", "games", "*").await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(api.update_calls(), 1);
        assert_eq!(api.desired_count(&ServiceDescriptor::new("games", "a")), Some(0));
    }

    #[tokio::test]
    async fn redeploy_forces_deployment_on_every_match() {
        let (api, controller) = controller(cluster_with_four());

        let report = controller.run("redeploy", "games", "watchdog").await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(api.describe_calls(), 0);
        assert_eq!(api.deployments(&ServiceDescriptor::new("games", "watchdog")), 1);
    }

    #[tokio::test]
    async fn unknown_command_issues_no_calls() {
        let (api, controller) = controller(cluster_with_four());

        let err = controller.run("restart", "games", "*").await.unwrap_err();

        assert!(matches!(err, ControlError::InvalidArgument(_)));
        assert_eq!(api.total_calls(), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_suppress_others() {
        let (api, controller) = controller(cluster_with_four());
        api.fail_service("minecraft-server-b", ControlError::Permission("denied".into()));

        let report = controller.run("up", "games", "minecraft-server-*").await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        let failed = report.outcomes.iter().find(|o| !o.is_success()).unwrap();
        assert_eq!(failed.service, "minecraft-server-b");
        assert!(matches!(failed.result, Err(ControlError::Permission(_))));
        assert_eq!(
            api.desired_count(&ServiceDescriptor::new("games", "minecraft-server-a")),
            Some(1)
        );
    }

    #[tokio::test]
    async fn transient_listing_failure_is_retried() {
        let (api, controller) = controller(cluster_with_four());
        api.inject_fault(ApiOperation::List, ControlError::Transient("throttled".into()));

        let report = controller.run("up", "games", "watchdog").await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(api.list_calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_per_service() {
        let (api, controller) = controller(cluster_with_four());
        api.fail_service("watchdog", ControlError::Transient("throttled".into()));

        let report = controller.run("redeploy", "games", "*").await.unwrap();

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.failed(), 1);
        // 3 successes + 3 attempts on the throttled service.
        assert_eq!(api.update_calls(), 6);
    }

    #[tokio::test]
    async fn no_matches_is_an_empty_report() {
        let (api, controller) = controller(cluster_with_four());

        let report = controller.run("up", "games", "valheim").await.unwrap();

        assert!(report.outcomes.is_empty());
        assert_eq!(api.update_calls(), 0);
    }
}
