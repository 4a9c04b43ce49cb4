//! In-memory orchestrator for tests.
//!
//! Behaves like ECS for the three operations the controller uses, counts
//! every call, and can be told to fail specific operations or services.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use waker_core::{ControlError, ServiceDescriptor};

use crate::api::{OrchestratorApi, ServicePage, ServiceSnapshot, ServiceUpdate, ACTIVE_STATUS};

const ACCOUNT_PREFIX: &str = "arn:aws:ecs:us-east-1:123456789012:service";

/// Orchestrator operation, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    List,
    Describe,
    Update,
}

#[derive(Debug, Clone)]
struct MemoryService {
    status: String,
    desired_count: i32,
    deployments: u32,
}

/// In-memory stand-in for the ECS service-control API.
pub struct InMemoryOrchestrator {
    services: Mutex<BTreeMap<(String, String), MemoryService>>,
    page_size: usize,
    latency: Duration,
    list_calls: AtomicUsize,
    describe_calls: AtomicUsize,
    update_calls: AtomicUsize,
    updates: Mutex<Vec<(ServiceDescriptor, ServiceUpdate)>>,
    /// One-shot faults, consumed in order per operation.
    faults: Mutex<HashMap<ApiOperation, Vec<ControlError>>>,
    /// Persistent update failures keyed by service name.
    failing_services: Mutex<HashMap<String, ControlError>>,
    /// One-shot update faults raised after the update has been applied.
    lost_responses: Mutex<Vec<ControlError>>,
}

impl Default for InMemoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self {
            services: Mutex::new(BTreeMap::new()),
            page_size: 100,
            latency: Duration::ZERO,
            list_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            failing_services: Mutex::new(HashMap::new()),
            lost_responses: Mutex::new(Vec::new()),
        }
    }

    pub fn with_service(self, cluster: &str, service: &str, desired_count: i32) -> Self {
        locked(&self.services).insert(
            (cluster.to_string(), service.to_string()),
            MemoryService {
                status: ACTIVE_STATUS.to_string(),
                desired_count,
                deployments: 0,
            },
        );
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_status(&self, descriptor: &ServiceDescriptor, status: &str) {
        if let Some(svc) = locked(&self.services).get_mut(&key(descriptor)) {
            svc.status = status.to_string();
        }
    }

    /// Fail the next call of `operation` with `error`.
    pub fn inject_fault(&self, operation: ApiOperation, error: ControlError) {
        locked(&self.faults).entry(operation).or_default().push(error);
    }

    /// Fail every update against `service` with `error`.
    pub fn fail_service(&self, service: &str, error: ControlError) {
        locked(&self.failing_services).insert(service.to_string(), error);
    }

    /// Apply the next update, then fail it with `error` as if the response
    /// never arrived.
    pub fn inject_lost_response(&self, error: ControlError) {
        locked(&self.lost_responses).push(error);
    }

    pub fn desired_count(&self, descriptor: &ServiceDescriptor) -> Option<i32> {
        locked(&self.services).get(&key(descriptor)).map(|s| s.desired_count)
    }

    pub fn deployments(&self, descriptor: &ServiceDescriptor) -> u32 {
        locked(&self.services)
            .get(&key(descriptor))
            .map_or(0, |s| s.deployments)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Every call of any kind, failed or not.
    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.describe_calls() + self.update_calls()
    }

    /// Successfully applied updates, in order.
    pub fn updates(&self) -> Vec<(ServiceDescriptor, ServiceUpdate)> {
        locked(&self.updates).clone()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn take_fault(&self, operation: ApiOperation) -> Option<ControlError> {
        let mut faults = locked(&self.faults);
        let queue = faults.get_mut(&operation)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }
}

fn key(descriptor: &ServiceDescriptor) -> (String, String) {
    (descriptor.cluster.clone(), descriptor.service.clone())
}

#[async_trait]
impl OrchestratorApi for InMemoryOrchestrator {
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<&str>,
    ) -> Result<ServicePage, ControlError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if let Some(err) = self.take_fault(ApiOperation::List) {
            return Err(err);
        }

        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ControlError::Orchestrator(format!("invalid next token '{token}'")))?,
            None => 0,
        };

        let arns: Vec<String> = locked(&self.services)
            .keys()
            .filter(|(c, _)| c == cluster)
            .map(|(c, s)| format!("{ACCOUNT_PREFIX}/{c}/{s}"))
            .collect();

        let end = (offset + self.page_size).min(arns.len());
        let page = arns.get(offset..end).map(<[String]>::to_vec).unwrap_or_default();
        let next_token = (end < arns.len()).then(|| end.to_string());

        Ok(ServicePage {
            service_arns: page,
            next_token,
        })
    }

    async fn describe_service(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Option<ServiceSnapshot>, ControlError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if let Some(err) = self.take_fault(ApiOperation::Describe) {
            return Err(err);
        }

        Ok(locked(&self.services)
            .get(&key(descriptor))
            .map(|svc| ServiceSnapshot {
                name: descriptor.service.clone(),
                status: svc.status.clone(),
                desired_count: svc.desired_count,
                running_count: svc.desired_count,
            }))
    }

    async fn update_service(
        &self,
        descriptor: &ServiceDescriptor,
        update: ServiceUpdate,
    ) -> Result<(), ControlError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if let Some(err) = self.take_fault(ApiOperation::Update) {
            return Err(err);
        }
        if let Some(err) = locked(&self.failing_services).get(&descriptor.service) {
            return Err(err.clone());
        }

        {
            let mut services = locked(&self.services);
            let svc = services
                .get_mut(&key(descriptor))
                .ok_or_else(|| ControlError::ServiceNotFound {
                    cluster: descriptor.cluster.clone(),
                    service: descriptor.service.clone(),
                })?;
            if let Some(count) = update.desired_count {
                svc.desired_count = count;
            }
            if update.force_new_deployment {
                svc.deployments += 1;
            }
        }

        locked(&self.updates).push((descriptor.clone(), update));

        let mut lost = locked(&self.lost_responses);
        if lost.is_empty() {
            Ok(())
        } else {
            Err(lost.remove(0))
        }
    }
}
