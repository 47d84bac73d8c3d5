// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Reconciliation — catalog intent vs. what Portainer reports right now
//!
//! Nothing is cached: every call re-reads the stack listing and derives the
//! per-service state from scratch.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{ServiceCatalog, ServiceDefinition};
use crate::error::ServiceError;
use crate::portainer::{OrchestrationClient, RemoteContainer, RemoteStack};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    NotInstalled,
    Running,
    Stopped,
    /// Stack exists but reports no containers
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatusView {
    pub key: String,
    pub stack_name: String,
    pub stack_id: Option<u64>,
    pub state: ServiceState,
    pub running_count: usize,
    pub total_count: usize,
    pub access_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Stacks seen by one `list_stacks` call, indexed by name
#[derive(Debug, Clone)]
pub struct StackSnapshot {
    by_name: HashMap<String, RemoteStack>,
    failure: Option<ServiceError>,
}

impl StackSnapshot {
    pub fn find(&self, stack_name: &str) -> Option<&RemoteStack> {
        self.by_name.get(stack_name)
    }

    /// Why the snapshot is empty, if the listing failed
    pub fn failure(&self) -> Option<&ServiceError> {
        self.failure.as_ref()
    }
}

/// Pure state derivation from container counts
pub fn derive_state(running: usize, total: usize) -> ServiceState {
    match (total, running) {
        (0, _) => ServiceState::Degraded,
        (_, 0) => ServiceState::Stopped,
        _ => ServiceState::Running,
    }
}

/// Status of one definition given what was observed for it
pub fn status_from(
    def: &ServiceDefinition,
    stack: Option<&RemoteStack>,
    containers: &[RemoteContainer],
    diagnostic: Option<String>,
) -> ServiceStatusView {
    let (stack_id, state, running_count, total_count) = match stack {
        None => (None, ServiceState::NotInstalled, 0, 0),
        Some(stack) => {
            let mine: Vec<&RemoteContainer> = containers.iter().filter(|c| c.stack_id == stack.id).collect();
            let running = mine.iter().filter(|c| c.state.is_active()).count();
            (Some(stack.id), derive_state(running, mine.len()), running, mine.len())
        }
    };

    ServiceStatusView {
        key: def.key.clone(),
        stack_name: def.stack_name.clone(),
        stack_id,
        state,
        running_count,
        total_count,
        access_port: def.access_port,
        diagnostic,
    }
}

pub struct Reconciler {
    catalog: Arc<ServiceCatalog>,
    client: Arc<OrchestrationClient>,
}

impl Reconciler {
    pub fn new(catalog: Arc<ServiceCatalog>, client: Arc<OrchestrationClient>) -> Self {
        Self { catalog, client }
    }

    pub async fn snapshot(&self) -> StackSnapshot {
        let listing = self.client.list_stacks().await;
        StackSnapshot {
            by_name: listing.items.into_iter().map(|s| (s.name.clone(), s)).collect(),
            failure: listing.failure,
        }
    }

    async fn status_in(&self, def: &ServiceDefinition, snapshot: &StackSnapshot) -> ServiceStatusView {
        let Some(stack) = snapshot.find(&def.stack_name) else {
            let diagnostic = snapshot.failure().map(|e| e.to_string());
            return status_from(def, None, &[], diagnostic);
        };
        let containers = self.client.list_containers(stack).await;
        let diagnostic = containers.failure.map(|e| e.to_string());
        status_from(def, Some(stack), &containers.items, diagnostic)
    }

    pub async fn status_of(&self, def: &ServiceDefinition) -> ServiceStatusView {
        let snapshot = self.snapshot().await;
        self.status_in(def, &snapshot).await
    }

    /// One view per catalog entry, in catalog order
    pub async fn status_of_all(&self) -> Vec<ServiceStatusView> {
        let snapshot = self.snapshot().await;
        let mut views = Vec::with_capacity(self.catalog.definitions().len());
        for def in self.catalog.definitions() {
            views.push(self.status_in(def, &snapshot).await);
        }
        views
    }
}
