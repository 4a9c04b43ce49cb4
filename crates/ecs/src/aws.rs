//! AWS ECS implementation of [`OrchestratorApi`].
//!
//! SDK-level retries are disabled: transient faults are surfaced as
//! [`ControlError::Transient`] and retried by the caller's bounded backoff,
//! so a throttled call is never retried by two layers at once.

use std::fmt;

use async_trait::async_trait;
use aws_config::retry::RetryConfig as SdkRetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_ecs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::{debug, info};

use waker_core::{ControlError, ServiceDescriptor};

use crate::api::{
    service_name_from_arn, OrchestratorApi, ServicePage, ServiceSnapshot, ServiceUpdate,
    LIST_PAGE_SIZE,
};

// ── Error classification ──────────────────────────────────

/// Coarse class of an orchestrator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permission,
    NotFound,
    Rejected,
}

impl ErrorClass {
    /// Classify an ECS error code.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(
                "ThrottlingException"
                | "Throttling"
                | "RequestLimitExceeded"
                | "TooManyRequestsException"
                | "ServerException"
                | "ServiceUnavailable"
                | "InternalFailure",
            ) => Self::Transient,
            Some(
                "AccessDeniedException"
                | "AccessDenied"
                | "UnrecognizedClientException"
                | "InvalidClientTokenId"
                | "ExpiredTokenException"
                | "MissingAuthenticationToken",
            ) => Self::Permission,
            Some(
                "ServiceNotFoundException"
                | "ServiceNotActiveException"
                | "ClusterNotFoundException",
            ) => Self::NotFound,
            _ => Self::Rejected,
        }
    }

    fn into_error(self, detail: String, cluster: &str, service: &str) -> ControlError {
        match self {
            Self::Transient => ControlError::Transient(detail),
            Self::Permission => ControlError::Permission(detail),
            Self::NotFound => ControlError::ServiceNotFound {
                cluster: cluster.to_string(),
                service: service.to_string(),
            },
            Self::Rejected => ControlError::Orchestrator(detail),
        }
    }
}

/// Map an SDK error onto the controller's error taxonomy.
fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>, cluster: &str, service: &str) -> ControlError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    let class = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ErrorClass::Transient
        }
        SdkError::ServiceError(ctx) => ErrorClass::from_code(ctx.err().code()),
        _ => ErrorClass::Rejected,
    };
    let detail = format!("{operation} failed: {}", DisplayErrorContext(&err));
    class.into_error(detail, cluster, service)
}

// ── Client ────────────────────────────────────────────────

/// ECS service-control API backed by the AWS SDK.
pub struct EcsApi {
    client: aws_sdk_ecs::Client,
}

impl EcsApi {
    /// Load AWS configuration for `region` and build the ECS client.
    pub async fn new(region: &str) -> Self {
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_ecs::config::Region::new(region.to_string()))
            .retry_config(SdkRetryConfig::disabled())
            .load()
            .await;

        info!(region = %region, "ECS client initialised");

        Self::from_client(aws_sdk_ecs::Client::new(&aws_cfg))
    }

    pub fn from_client(client: aws_sdk_ecs::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrchestratorApi for EcsApi {
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<&str>,
    ) -> Result<ServicePage, ControlError> {
        let resp = self
            .client
            .list_services()
            .cluster(cluster)
            .max_results(LIST_PAGE_SIZE)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("ListServices", e, cluster, "*"))?;

        Ok(ServicePage {
            service_arns: resp.service_arns().to_vec(),
            next_token: resp.next_token().map(str::to_string),
        })
    }

    async fn describe_service(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Option<ServiceSnapshot>, ControlError> {
        let resp = self
            .client
            .describe_services()
            .cluster(&descriptor.cluster)
            .services(&descriptor.service)
            .send()
            .await
            .map_err(|e| {
                sdk_error("DescribeServices", e, &descriptor.cluster, &descriptor.service)
            })?;

        for failure in resp.failures() {
            debug!(
                service = %descriptor,
                arn = failure.arn().unwrap_or("-"),
                reason = failure.reason().unwrap_or("-"),
                "DescribeServices reported failure"
            );
        }

        let snapshot = resp
            .services()
            .iter()
            .find(|svc| {
                svc.service_name() == Some(descriptor.service.as_str())
                    || svc
                        .service_arn()
                        .is_some_and(|arn| service_name_from_arn(arn) == descriptor.service)
            })
            .map(|svc| ServiceSnapshot {
                name: descriptor.service.clone(),
                status: svc.status().unwrap_or("UNKNOWN").to_string(),
                desired_count: svc.desired_count(),
                running_count: svc.running_count(),
            });

        Ok(snapshot)
    }

    async fn update_service(
        &self,
        descriptor: &ServiceDescriptor,
        update: ServiceUpdate,
    ) -> Result<(), ControlError> {
        let mut req = self
            .client
            .update_service()
            .cluster(&descriptor.cluster)
            .service(&descriptor.service);

        if let Some(count) = update.desired_count {
            req = req.desired_count(count);
        }
        if update.force_new_deployment {
            req = req.force_new_deployment(true);
        }

        req.send()
            .await
            .map_err(|e| sdk_error("UpdateService", e, &descriptor.cluster, &descriptor.service))?;

        Ok(())
    }
}
