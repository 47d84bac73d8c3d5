// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Service lifecycle — install, uninstall, start and stop catalog services
//!
//! Every operation checks catalog membership before touching the network,
//! then reconciles and checks the current state. The presence check is an
//! early fail, not a lock: Portainer's own duplicate-name rejection is what
//! actually keeps two installs from both succeeding.

pub mod mounts;

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{ServiceCatalog, ServiceDefinition};
use crate::config::PortainerSettings;
use crate::error::{Result, ServiceError};
use crate::portainer::{AuthSession, OrchestrationClient, RemoteStack, Transport};
use crate::reconcile::{Reconciler, ServiceStatusView, StackSnapshot};

/// Outcome of a successful mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub message: String,
    pub status_hint: u16,
}

impl OperationReport {
    fn ok(message: String) -> Self {
        Self { message, status_hint: 200 }
    }

    fn created(message: String) -> Self {
        Self { message, status_hint: 201 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableService {
    pub key: String,
    pub display_name: String,
    pub description: String,
    pub installed: bool,
}

/// A status row enriched with catalog display metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescription {
    #[serde(flatten)]
    pub status: ServiceStatusView,
    pub display_name: String,
    pub description: String,
}

pub struct LifecycleController {
    catalog: Arc<ServiceCatalog>,
    client: Arc<OrchestrationClient>,
    reconciler: Reconciler,
}

impl LifecycleController {
    pub fn new(catalog: Arc<ServiceCatalog>, client: Arc<OrchestrationClient>) -> Self {
        let reconciler = Reconciler::new(catalog.clone(), client.clone());
        Self { catalog, client, reconciler }
    }

    /// Build the session, client and controller, logging in once up front so
    /// an unreachable Portainer fails construction.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        settings: &PortainerSettings,
        catalog: Arc<ServiceCatalog>,
    ) -> Result<Self> {
        let auth = Arc::new(AuthSession::new(
            transport.clone(),
            &settings.username,
            &settings.password,
            settings.token_validity,
            settings.token_margin,
        )?);
        auth.current_credential().await?;
        let client = Arc::new(OrchestrationClient::new(transport, auth, settings.environment_id));
        info!("Service manager connected to Portainer environment {}", settings.environment_id);
        Ok(Self::new(catalog, client))
    }

    fn lookup(&self, key: &str) -> Result<ServiceDefinition> {
        self.catalog.lookup(key).cloned()
    }

    /// The deployed stack for `def`, or why it can't be found
    fn require_stack(def: &ServiceDefinition, snapshot: &StackSnapshot) -> Result<RemoteStack> {
        if let Some(stack) = snapshot.find(&def.stack_name) {
            return Ok(stack.clone());
        }
        if let Some(failure) = snapshot.failure() {
            return Err(failure.clone());
        }
        Err(ServiceError::NotFound(format!(
            "Service '{}' ({}) not found as a stack.", def.key, def.stack_name
        )))
    }

    pub async fn install(&self, key: &str) -> Result<OperationReport> {
        let def = self.lookup(key)?;
        let snapshot = self.reconciler.snapshot().await;
        if snapshot.find(&def.stack_name).is_some() {
            return Err(ServiceError::Conflict(format!(
                "Service '{}' ({}) is already installed.", def.key, def.stack_name
            )));
        }
        if let Some(failure) = snapshot.failure() {
            warn!("Installing '{}' without a presence check: {}", def.key, failure);
        }

        info!("📦 Installing service '{}' as stack '{}'", def.key, def.stack_name);
        self.client.create_stack(&def.stack_name, &def.manifest_body).await?;

        let paths = mounts::bind_mount_sources(&def.manifest_body);
        if !paths.is_empty() {
            let key = def.key.clone();
            let fixup = tokio::task::spawn_blocking(move || {
                for path in paths {
                    if let Err(e) = mounts::prepare_host_dir(&path) {
                        warn!("Post-install fix-up for '{}' failed: {}", key, e);
                    }
                }
            });
            if let Err(e) = fixup.await {
                warn!("Post-install fix-up for '{}' did not complete: {}", def.key, e);
            }
        }

        info!("✅ Service '{}' deployed", def.key);
        Ok(OperationReport::created(format!(
            "Service '{}' ({}) deployment initiated.", def.key, def.stack_name
        )))
    }

    pub async fn uninstall(&self, key: &str) -> Result<OperationReport> {
        let def = self.lookup(key)?;
        let stack = Self::require_stack(&def, &self.reconciler.snapshot().await)?;
        info!("🗑️ Uninstalling service '{}' (stack {})", def.key, stack.id);
        self.client.delete_stack(stack.id).await?;
        Ok(OperationReport::ok(format!("Service '{}' ({}) removed.", def.key, def.stack_name)))
    }

    pub async fn start(&self, key: &str) -> Result<OperationReport> {
        self.set_running(key, true).await
    }

    pub async fn stop(&self, key: &str) -> Result<OperationReport> {
        self.set_running(key, false).await
    }

    async fn set_running(&self, key: &str, running: bool) -> Result<OperationReport> {
        let def = self.lookup(key)?;
        let stack = Self::require_stack(&def, &self.reconciler.snapshot().await)?;
        let verb = if running { "started" } else { "stopped" };
        info!("Service '{}' (stack {}) {} requested", def.key, stack.id, verb);
        self.client.set_stack_running(stack.id, running).await?;
        Ok(OperationReport::ok(format!("Service '{}' ({}) {}.", def.key, def.stack_name, verb)))
    }

    /// Every catalog service with its live status; never fails as a whole
    pub async fn describe_all(&self) -> Vec<ServiceDescription> {
        let views = self.reconciler.status_of_all().await;
        self.catalog.definitions().iter().zip(views)
            .map(|(def, status)| ServiceDescription {
                status,
                display_name: def.display_name.clone(),
                description: def.description.clone(),
            })
            .collect()
    }

    /// Live status of a single catalog service
    pub async fn describe(&self, key: &str) -> Result<ServiceDescription> {
        let def = self.lookup(key)?;
        let status = self.reconciler.status_of(&def).await;
        Ok(ServiceDescription {
            status,
            display_name: def.display_name,
            description: def.description,
        })
    }

    /// Catalog entries with their installed flag. Fails if Portainer could not
    /// be listed, since every flag would read `false`.
    pub async fn list_available(&self) -> Result<Vec<AvailableService>> {
        let snapshot = self.reconciler.snapshot().await;
        if let Some(failure) = snapshot.failure() {
            return Err(failure.clone());
        }
        Ok(self.catalog.definitions().iter()
            .map(|def| AvailableService {
                key: def.key.clone(),
                display_name: def.display_name.clone(),
                description: def.description.clone(),
                installed: snapshot.find(&def.stack_name).is_some(),
            })
            .collect())
    }
}
