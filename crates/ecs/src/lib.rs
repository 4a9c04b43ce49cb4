//! Service state control against AWS ECS.
//!
//! [`ServiceStateClient`] reads and idempotently converges a service's
//! desired task count through the [`OrchestratorApi`] seam.
//! [`BatchController`] fans a manual `up` / `down` / `redeploy` command out
//! across every matching service in a cluster.

pub mod api;
pub mod aws;
pub mod batch;
pub mod client;
pub mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use api::{OrchestratorApi, ServicePage, ServiceSnapshot, ServiceUpdate};
pub use aws::EcsApi;
pub use batch::{matches_service_pattern, BatchController, BatchReport, ServiceOutcome};
pub use client::{ServiceStateClient, TransitionAck};
pub use retry::RetryPolicy;
