// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Stack and container operations against one Portainer environment

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    parse_containers, parse_stack, parse_stacks, ApiRequest, ApiResponse, AuthSession, Method,
    RemoteContainer, RemoteStack, Transport,
};
use crate::error::{Result, ServiceError};

/// Result of a read that degrades to "nothing observed" instead of failing.
/// `failure` says why the items are empty, for diagnostics.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub failure: Option<ServiceError>,
}

impl<T> Listing<T> {
    fn from_result(result: Result<Vec<T>>) -> Self {
        match result {
            Ok(items) => Self { items, failure: None },
            Err(e) => Self { items: Vec::new(), failure: Some(e) },
        }
    }
}

pub struct OrchestrationClient {
    transport: Arc<dyn Transport>,
    auth: Arc<AuthSession>,
    environment_id: u64,
}

impl OrchestrationClient {
    pub fn new(transport: Arc<dyn Transport>, auth: Arc<AuthSession>, environment_id: u64) -> Self {
        Self { transport, auth, environment_id }
    }

    /// Send with the current bearer token; on 401 refresh once and retry once
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let credential = self.auth.current_credential().await?;
        let resp = self.transport.send(request.clone().bearer(&credential.token)).await?;
        if resp.status != 401 {
            return check_status(resp);
        }

        warn!("Portainer rejected token on {}, re-authenticating", request.path);
        let credential = self.auth.refresh(&credential.token).await?;
        let resp = self.transport.send(request.clone().bearer(&credential.token)).await?;
        if resp.status == 401 {
            return Err(ServiceError::Authentication(format!(
                "token rejected twice on {}: {}", request.path, resp.remote_message()
            )));
        }
        check_status(resp)
    }

    async fn fetch_stacks(&self) -> Result<Vec<RemoteStack>> {
        let filter = json!({ "EndpointID": self.environment_id }).to_string();
        let req = ApiRequest::new(Method::Get, "/api/stacks").query("filters", filter);
        let resp = self.execute(req).await?;
        parse_stacks(&resp.body)
    }

    /// All stacks in this environment; empty (with `failure` set) if Portainer could not be read
    pub async fn list_stacks(&self) -> Listing<RemoteStack> {
        let listing = Listing::from_result(self.fetch_stacks().await);
        if let Some(e) = &listing.failure {
            warn!("Error listing stacks from Portainer: {}", e);
        }
        listing
    }

    async fn fetch_containers(&self, stack: &RemoteStack) -> Result<Vec<RemoteContainer>> {
        let filter = json!({
            "label": [format!("com.docker.compose.project={}", stack.name)]
        }).to_string();
        let req = ApiRequest::new(
            Method::Get,
            format!("/api/endpoints/{}/docker/containers/json", self.environment_id),
        )
        .query("all", "1")
        .query("filters", filter);
        let resp = self.execute(req).await?;
        parse_containers(stack.id, &resp.body)
    }

    /// Containers belonging to `stack`, same failure policy as `list_stacks`
    pub async fn list_containers(&self, stack: &RemoteStack) -> Listing<RemoteContainer> {
        let listing = Listing::from_result(self.fetch_containers(stack).await);
        if let Some(e) = &listing.failure {
            warn!("Error listing containers for stack '{}' ({}): {}", stack.name, stack.id, e);
        }
        listing
    }

    /// Deploy a compose stack. A name clash reported by Portainer becomes `Conflict`.
    pub async fn create_stack(&self, name: &str, manifest_body: &str) -> Result<Option<RemoteStack>> {
        let req = ApiRequest::new(Method::Post, "/api/stacks/create/standalone/string")
            .query("endpointId", self.environment_id.to_string())
            .json(json!({
                "name": name,
                "stackFileContent": manifest_body,
            }));

        match self.execute(req).await {
            Ok(resp) => {
                let created = parse_stack(&resp.body);
                info!("Created stack '{}' (id {:?})", name, created.as_ref().map(|s| s.id));
                Ok(created)
            }
            Err(ServiceError::Upstream { status: Some(409), message }) => {
                Err(ServiceError::Conflict(format!("Stack '{}' already exists: {}", name, message)))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_stack(&self, stack_id: u64) -> Result<()> {
        let req = ApiRequest::new(Method::Delete, format!("/api/stacks/{}", stack_id))
            .query("endpointId", self.environment_id.to_string());
        self.execute(req).await?;
        info!("Deleted stack {}", stack_id);
        Ok(())
    }

    /// Start (`true`) or stop (`false`) every container in a stack
    pub async fn set_stack_running(&self, stack_id: u64, running: bool) -> Result<()> {
        let action = if running { "start" } else { "stop" };
        let req = ApiRequest::new(Method::Post, format!("/api/stacks/{}/{}", stack_id, action))
            .query("endpointId", self.environment_id.to_string());
        self.execute(req).await?;
        debug!("Stack {} {} requested", stack_id, action);
        Ok(())
    }
}

fn check_status(resp: ApiResponse) -> Result<ApiResponse> {
    if resp.is_success() {
        Ok(resp)
    } else {
        Err(ServiceError::upstream(Some(resp.status), resp.remote_message()))
    }
}
