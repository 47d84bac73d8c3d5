// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Portainer login session — caches the JWT and refreshes it before it lapses
//!
//! The remote token lifetime is never trusted; expiry is our own estimate of
//! `validity - margin` from the moment the login succeeded.

use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{ApiRequest, Method, Transport};
use crate::error::{Result, ServiceError};

/// Portainer's default JWT lifetime
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(24 * 3600);
/// Refresh this long before our estimated expiry
pub const DEFAULT_TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Instant,
}

impl Credential {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &mask_token(&self.token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn mask_token(token: &str) -> String {
    if token.chars().count() <= 8 {
        return "••••••••".to_string();
    }
    format!("{}••••", token.chars().take(4).collect::<String>())
}

pub struct AuthSession {
    transport: Arc<dyn Transport>,
    username: String,
    password: String,
    validity: Duration,
    margin: Duration,
    cached: Mutex<Option<Credential>>,
}

impl AuthSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        username: &str,
        password: &str,
        validity: Duration,
        margin: Duration,
    ) -> Result<Self> {
        if validity <= margin {
            return Err(ServiceError::Configuration(format!(
                "token validity {:?} must exceed the refresh margin {:?}", validity, margin
            )));
        }
        Ok(Self {
            transport,
            username: username.to_string(),
            password: password.to_string(),
            validity,
            margin,
            cached: Mutex::new(None),
        })
    }

    /// A credential that is valid right now, logging in if needed.
    /// Concurrent callers share one login.
    pub async fn current_credential(&self) -> Result<Credential> {
        let mut cached = self.cached.lock().await;
        if let Some(cred) = cached.as_ref() {
            if cred.is_valid_at(Instant::now()) {
                return Ok(cred.clone());
            }
        }
        let cred = self.login().await?;
        *cached = Some(cred.clone());
        Ok(cred)
    }

    /// Force a new login after `rejected` was refused by Portainer.
    /// If another caller already replaced it, that newer credential is returned.
    pub async fn refresh(&self, rejected: &str) -> Result<Credential> {
        let mut cached = self.cached.lock().await;
        if let Some(cred) = cached.as_ref() {
            if cred.token != rejected && cred.is_valid_at(Instant::now()) {
                return Ok(cred.clone());
            }
        }
        let cred = self.login().await?;
        *cached = Some(cred.clone());
        Ok(cred)
    }

    async fn login(&self) -> Result<Credential> {
        let request = ApiRequest::new(Method::Post, "/api/auth").json(json!({
            "username": self.username,
            "password": self.password,
        }));

        let resp = self.transport.send(request).await.map_err(|e| {
            warn!("Error authenticating with Portainer: {}", e);
            ServiceError::Authentication(e.to_string())
        })?;

        if !resp.is_success() {
            let msg = format!("HTTP {}: {}", resp.status, resp.remote_message());
            warn!("Portainer rejected login for '{}': {}", self.username, msg);
            return Err(ServiceError::Authentication(msg));
        }

        let token = resp.body.get("jwt").and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Authentication("login response carried no jwt".into()))?;

        info!("Authenticated with Portainer as '{}'", self.username);
        Ok(Credential {
            token: token.to_string(),
            expires_at: Instant::now() + (self.validity - self.margin),
        })
    }
}
