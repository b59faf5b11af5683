// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Kernel context
//!
//! Wires every kernel component once per process and hands them out as
//! explicit objects. Tests build as many isolated kernels as they like.

use std::sync::Arc;

use thiserror::Error;

use crate::application::identity::IdentityService;
use crate::application::job_queue::JobQueue;
use crate::application::state_manager::StateManager;
use crate::domain::config::{ConfigError, KernelConfig};
use crate::domain::repository::{JobRepository, LogRepository, StateRepository};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::logger::Logger;
use crate::infrastructure::registry::{RegistryError, ServiceRegistry};
use crate::infrastructure::repositories::{
    InMemoryJobRepository, InMemoryLogRepository, InMemoryStateRepository,
};
use crate::infrastructure::rpc_client::RpcClient;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Clone)]
pub struct Kernel {
    pub config: Arc<KernelConfig>,
    pub registry: Arc<ServiceRegistry>,
    pub logger: Logger,
    pub identity: Arc<IdentityService>,
    pub events: EventBus,
    pub jobs: JobQueue,
    pub state: StateManager,
    pub rpc: RpcClient,
}

impl Kernel {
    /// Kernel with in-memory storage and the registry selected by the config
    /// (`KERNEL_REGISTRY_FILE`, else the built-in table).
    pub fn new(config: KernelConfig) -> Result<Self, KernelError> {
        Self::builder(config).build()
    }

    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder {
            config,
            registry: None,
            log_repository: None,
            job_repository: None,
            state_repository: None,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

pub struct KernelBuilder {
    config: KernelConfig,
    registry: Option<ServiceRegistry>,
    log_repository: Option<Arc<dyn LogRepository>>,
    job_repository: Option<Arc<dyn JobRepository>>,
    state_repository: Option<Arc<dyn StateRepository>>,
}

impl KernelBuilder {
    pub fn registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn log_repository(mut self, repository: Arc<dyn LogRepository>) -> Self {
        self.log_repository = Some(repository);
        self
    }

    pub fn job_repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.job_repository = Some(repository);
        self
    }

    pub fn state_repository(mut self, repository: Arc<dyn StateRepository>) -> Self {
        self.state_repository = Some(repository);
        self
    }

    pub fn build(self) -> Result<Kernel, KernelError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let registry = match (self.registry, &config.registry_file) {
            (Some(registry), _) => registry,
            (None, Some(path)) => ServiceRegistry::from_yaml_file(path)?,
            (None, None) => ServiceRegistry::builtin(),
        };
        let registry = Arc::new(registry);

        let log_repository = self
            .log_repository
            .unwrap_or_else(|| Arc::new(InMemoryLogRepository::new(config.log_capacity)));
        let logger = Logger::with_repository(config.service_name.clone(), log_repository)
            .with_min_level(config.log_level()?);

        let identity = Arc::new(IdentityService::new(
            config.clone(),
            registry.clone(),
            logger.clone(),
        )?);
        let events = EventBus::new(config.service_name.clone(), logger.clone());
        let jobs = JobQueue::with_repository(
            self.job_repository
                .unwrap_or_else(|| Arc::new(InMemoryJobRepository::new())),
            logger.clone(),
        );
        let state = StateManager::with_repository(
            self.state_repository
                .unwrap_or_else(|| Arc::new(InMemoryStateRepository::new())),
            logger.clone(),
        );
        let rpc = RpcClient::new(registry.clone(), config.clone(), logger.clone());

        logger.info(
            format!(
                "Kernel initialized for {} ({}, {})",
                config.service_name, config.service_role, config.environment
            ),
            serde_json::json!({ "port": config.port(), "services": registry.services().len() }),
        );

        Ok(Kernel {
            config,
            registry,
            logger,
            identity,
            events,
            jobs,
            state,
            rpc,
        })
    }
}
