// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! In-memory Portainer used by the tests. Counts every request it receives.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::error::{Result, ServiceError};

#[derive(Default)]
struct FakeState {
    next_id: u64,
    /// stack id -> (name, status code)
    stacks: BTreeMap<u64, (String, i64)>,
    /// stack name -> container states
    containers: BTreeMap<String, Vec<String>>,
    issued_tokens: HashSet<String>,
    login_fails: bool,
    unreachable: bool,
    reject_next: usize,
}

#[derive(Default)]
pub struct FakePortainer {
    state: Mutex<FakeState>,
    requests: AtomicUsize,
    logins: AtomicUsize,
}

impl FakePortainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a deployed stack with the given container states; returns its id
    pub fn add_stack(&self, name: &str, containers: &[&str]) -> u64 {
        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let id = st.next_id;
        st.stacks.insert(id, (name.to_string(), 1));
        st.containers.insert(name.to_string(), containers.iter().map(|s| s.to_string()).collect());
        id
    }

    pub fn container_states(&self, stack_name: &str) -> Vec<String> {
        self.state.lock().unwrap().containers.get(stack_name).cloned().unwrap_or_default()
    }

    pub fn stack_names(&self) -> Vec<String> {
        self.state.lock().unwrap().stacks.values().map(|(n, _)| n.clone()).collect()
    }

    pub fn set_login_fails(&self, fails: bool) {
        self.state.lock().unwrap().login_fails = fails;
    }

    /// Every non-login request fails at the transport level
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// Answer the next `n` authenticated requests with 401
    pub fn reject_next_requests(&self, n: usize) {
        self.state.lock().unwrap().reject_next = n;
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    fn handle(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let mut st = self.state.lock().unwrap();

        if req.method == Method::Post && req.path == "/api/auth" {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            if st.login_fails {
                return Ok(reply(422, json!({"message": "Invalid credentials"})));
            }
            let token = format!("jwt-token-{}", n);
            st.issued_tokens.insert(token.clone());
            return Ok(reply(200, json!({ "jwt": token })));
        }

        if st.unreachable {
            return Err(ServiceError::upstream(None, "connection refused"));
        }
        let authorized = req.bearer.as_ref().is_some_and(|t| st.issued_tokens.contains(t));
        if !authorized {
            return Ok(reply(401, json!({"message": "Invalid JWT token"})));
        }
        if st.reject_next > 0 {
            st.reject_next -= 1;
            return Ok(reply(401, json!({"message": "Unauthorized"})));
        }

        let segments: Vec<&str> = req.path.trim_matches('/').split('/').collect();
        match (req.method, segments.as_slice()) {
            (Method::Get, ["api", "stacks"]) => {
                let list: Vec<Value> = st.stacks.iter()
                    .map(|(id, (name, status))| json!({"Id": id, "Name": name, "Status": status, "EndpointId": 1}))
                    .collect();
                Ok(reply(200, Value::Array(list)))
            }
            (Method::Get, ["api", "endpoints", _, "docker", "containers", "json"]) => {
                let project = query_value(req, "filters")
                    .and_then(|f| serde_json::from_str::<Value>(f).ok())
                    .and_then(|f| f["label"][0].as_str().map(str::to_string))
                    .and_then(|l| l.strip_prefix("com.docker.compose.project=").map(str::to_string))
                    .unwrap_or_default();
                let list: Vec<Value> = st.containers.get(&project).cloned().unwrap_or_default()
                    .into_iter()
                    .enumerate()
                    .map(|(i, state)| json!({"Id": format!("{}-{}", project, i), "State": state}))
                    .collect();
                Ok(reply(200, Value::Array(list)))
            }
            (Method::Post, ["api", "stacks", "create", "standalone", "string"]) => {
                let body = req.body.clone().unwrap_or(Value::Null);
                let name = body["name"].as_str().unwrap_or_default().to_string();
                if st.stacks.values().any(|(n, _)| *n == name) {
                    return Ok(reply(409, json!({
                        "message": format!("A stack with the normalized name '{}' already exists", name)
                    })));
                }
                st.next_id += 1;
                let id = st.next_id;
                st.stacks.insert(id, (name.clone(), 1));
                st.containers.insert(name.clone(), vec!["running".to_string()]);
                Ok(reply(200, json!({"Id": id, "Name": name, "Status": 1})))
            }
            (Method::Delete, ["api", "stacks", id]) => {
                let id: u64 = id.parse().unwrap_or_default();
                match st.stacks.remove(&id) {
                    Some((name, _)) => {
                        st.containers.remove(&name);
                        Ok(reply(204, Value::Null))
                    }
                    None => Ok(reply(404, json!({"message": "Stack not found"}))),
                }
            }
            (Method::Post, ["api", "stacks", id, action]) => {
                let id: u64 = id.parse().unwrap_or_default();
                let Some((name, _)) = st.stacks.get(&id).cloned() else {
                    return Ok(reply(404, json!({"message": "Stack not found"})));
                };
                let (code, state) = match *action {
                    "start" => (1, "running"),
                    "stop" => (2, "exited"),
                    _ => return Ok(reply(404, Value::Null)),
                };
                st.stacks.insert(id, (name.clone(), code));
                if let Some(list) = st.containers.get_mut(&name) {
                    list.iter_mut().for_each(|s| *s = state.to_string());
                }
                Ok(reply(200, json!({"Id": id, "Name": name, "Status": code})))
            }
            _ => Ok(reply(404, json!({"message": "no such route"}))),
        }
    }
}

fn query_value<'a>(req: &'a ApiRequest, key: &str) -> Option<&'a str> {
    req.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn reply(status: u16, body: Value) -> ApiResponse {
    ApiResponse { status, body }
}

#[async_trait]
impl Transport for FakePortainer {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.handle(&request)
    }
}
