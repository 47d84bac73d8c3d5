// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Portainer API plumbing
//!
//! - `Transport`: one JSON request in, status + JSON body out (reqwest in production)
//! - `AuthSession`: cached JWT with a conservative local expiry
//! - `OrchestrationClient`: stack/container operations with a single 401 retry
//!
//! Raw Portainer vocabulary (numeric stack status, Docker state strings) is
//! normalized here and nowhere else.

pub mod auth;
pub mod client;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::PortainerSettings;
use crate::error::{Result, ServiceError};

pub use auth::AuthSession;
pub use client::OrchestrationClient;

// ─── Wire types ───

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), bearer: None, body: None }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Best human-readable message Portainer put in an error body
    pub fn remote_message(&self) -> String {
        for field in ["message", "details", "error"] {
            if let Some(m) = self.body.get(field).and_then(|v| v.as_str()) {
                if !m.is_empty() {
                    return m.to_string();
                }
            }
        }
        match &self.body {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Null => format!("HTTP {}", self.status),
            other => other.to_string(),
        }
    }
}

/// The HTTP seam under the session and the client.
/// `Err` means no response was received at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

// ─── reqwest transport ───

pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &PortainerSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(5))
            // Portainer on a LAN usually serves a self-signed cert
            .danger_accept_invalid_certs(settings.insecure_tls)
            .build()
            .map_err(|e| ServiceError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("Portainer {:?} {}", request.method, url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await
            .map_err(|e| ServiceError::upstream(None, format!("request to {} failed: {}", request.path, e)))?;
        let status = resp.status().as_u16();
        let text = resp.text().await
            .map_err(|e| ServiceError::upstream(Some(status), format!("reading response body: {}", e)))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(ApiResponse { status, body })
    }
}

// ─── Normalized remote facts ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StackStatus {
    Active,
    Inactive,
    Unknown,
}

impl StackStatus {
    /// Portainer reports 1 for active stacks and 2 for inactive ones
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => StackStatus::Active,
            2 => StackStatus::Inactive,
            _ => StackStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteStack {
    pub id: u64,
    pub name: String,
    pub status: StackStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Restarting,
    Paused,
    Created,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    /// Parse Docker's `State` field ("running", "exited", ...)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => ContainerState::Running,
            "restarting" => ContainerState::Restarting,
            "paused" => ContainerState::Paused,
            "created" => ContainerState::Created,
            "exited" => ContainerState::Exited,
            "dead" | "removing" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    pub fn is_active(self) -> bool {
        self == ContainerState::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteContainer {
    pub stack_id: u64,
    pub state: ContainerState,
}

pub(crate) fn parse_stack(item: &Value) -> Option<RemoteStack> {
    let id = item.get("Id").and_then(|v| v.as_u64())?;
    let name = item.get("Name").and_then(|v| v.as_str())?;
    let status = item.get("Status").and_then(|v| v.as_i64()).unwrap_or(0);
    Some(RemoteStack {
        id,
        name: name.to_string(),
        status: StackStatus::from_code(status),
    })
}

pub(crate) fn parse_stacks(body: &Value) -> Result<Vec<RemoteStack>> {
    let arr = body.as_array()
        .ok_or_else(|| ServiceError::upstream(None, "expected an array of stacks"))?;
    Ok(arr.iter().filter_map(parse_stack).collect())
}

pub(crate) fn parse_containers(stack_id: u64, body: &Value) -> Result<Vec<RemoteContainer>> {
    let arr = body.as_array()
        .ok_or_else(|| ServiceError::upstream(None, "expected an array of containers"))?;
    Ok(arr.iter().map(|c| {
        let state = c.get("State").and_then(|v| v.as_str()).unwrap_or("");
        RemoteContainer { stack_id, state: ContainerState::parse(state) }
    }).collect())
}
