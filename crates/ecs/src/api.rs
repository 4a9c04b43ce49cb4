//! The orchestrator operations the controller depends on.
//!
//! [`OrchestratorApi`] is the seam between the control logic and AWS ECS.
//! The production implementation lives in [`crate::aws`]; tests use the
//! in-memory orchestrator.

use std::sync::Arc;

use async_trait::async_trait;

use waker_core::{ControlError, ServiceDescriptor};

/// Maximum page size accepted by ECS `ListServices`.
pub const LIST_PAGE_SIZE: i32 = 100;

/// Service status reported by ECS for a live service.
pub const ACTIVE_STATUS: &str = "ACTIVE";

/// One page of a paginated service listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePage {
    pub service_arns: Vec<String>,
    pub next_token: Option<String>,
}

/// The subset of a described service the controller reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub name: String,
    pub status: String,
    pub desired_count: i32,
    pub running_count: i32,
}

impl ServiceSnapshot {
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }
}

/// Mutation sent through `UpdateService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub desired_count: Option<i32>,
    pub force_new_deployment: bool,
}

impl ServiceUpdate {
    pub fn desired_count(count: i32) -> Self {
        Self {
            desired_count: Some(count),
            force_new_deployment: false,
        }
    }

    pub fn force_new_deployment() -> Self {
        Self {
            desired_count: None,
            force_new_deployment: true,
        }
    }
}

/// Orchestrator service-control API.
///
/// Every method is a single blocking round trip; none of them retry.
#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// Fetch one page of service ARNs in `cluster`.
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<&str>,
    ) -> Result<ServicePage, ControlError>;

    /// Describe one service. Returns `Ok(None)` when the orchestrator
    /// reports no such service.
    async fn describe_service(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Option<ServiceSnapshot>, ControlError>;

    async fn update_service(
        &self,
        descriptor: &ServiceDescriptor,
        update: ServiceUpdate,
    ) -> Result<(), ControlError>;
}

#[async_trait]
impl<T: OrchestratorApi + ?Sized> OrchestratorApi for Arc<T> {
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<&str>,
    ) -> Result<ServicePage, ControlError> {
        (**self).list_services(cluster, next_token).await
    }

    async fn describe_service(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Option<ServiceSnapshot>, ControlError> {
        (**self).describe_service(descriptor).await
    }

    async fn update_service(
        &self,
        descriptor: &ServiceDescriptor,
        update: ServiceUpdate,
    ) -> Result<(), ControlError> {
        (**self).update_service(descriptor, update).await
    }
}

/// Reduce a service ARN (`arn:aws:ecs:region:acct:service/cluster/name`) to
/// its trailing name segment. Plain names pass through unchanged.
pub fn service_name_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}
