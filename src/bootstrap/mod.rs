// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Bootstrap guard — builds the service manager lazily, on first use
//!
//! Portainer is often still starting when the NAS boots, so construction is
//! retried a bounded number of times. Only one construction runs at a time;
//! callers that arrive meanwhile wait for its outcome. Missing configuration
//! is permanent and never retried.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// After giving up, try again on the next call once this has elapsed.
    /// `None` stays unavailable until `reset()`.
    pub retry_after: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
            retry_after: Some(Duration::from_secs(60)),
        }
    }
}

enum GuardState<T> {
    Idle,
    Ready(Arc<T>),
    Misconfigured(String),
    Exhausted { since: Instant, reason: String },
}

type Factory<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

pub struct BootstrapGuard<T> {
    factory: Factory<T>,
    policy: RetryPolicy,
    state: Mutex<GuardState<T>>,
    attempts: AtomicU32,
}

impl<T: Send + Sync + 'static> BootstrapGuard<T> {
    pub fn new<F, Fut>(policy: RetryPolicy, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            factory: Box::new(move || factory().boxed()),
            policy,
            state: Mutex::new(GuardState::Idle),
            attempts: AtomicU32::new(0),
        }
    }

    /// Total construction attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The controller, constructing it if this is the first successful call
    pub async fn ensure_controller(&self) -> Result<Arc<T>> {
        let mut state = self.state.lock().await;
        match &*state {
            GuardState::Ready(controller) => return Ok(controller.clone()),
            GuardState::Misconfigured(reason) => {
                return Err(ServiceError::Configuration(reason.clone()));
            }
            GuardState::Exhausted { since, reason } => {
                let cooled = self.policy.retry_after.is_some_and(|d| since.elapsed() >= d);
                if !cooled {
                    return Err(ServiceError::Unavailable(reason.clone()));
                }
            }
            GuardState::Idle => {}
        }

        let max = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=max {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            info!("🔁 Initialising service manager (attempt {}/{})", attempt, max);
            match (self.factory)().await {
                Ok(controller) => {
                    let controller = Arc::new(controller);
                    *state = GuardState::Ready(controller.clone());
                    info!("✅ Service manager ready");
                    return Ok(controller);
                }
                Err(ServiceError::Configuration(reason)) => {
                    warn!("Service manager disabled: {}", reason);
                    *state = GuardState::Misconfigured(reason.clone());
                    return Err(ServiceError::Configuration(reason));
                }
                Err(e) => {
                    warn!("⚠️ Service manager initialisation failed: {}", e);
                    last_error = e.to_string();
                    if attempt < max {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        warn!("Service manager unavailable after {} attempts", max);
        *state = GuardState::Exhausted { since: Instant::now(), reason: last_error.clone() };
        Err(ServiceError::Unavailable(last_error))
    }

    /// Forget any failure (or built controller) so the next call constructs again
    pub async fn reset(&self) {
        *self.state.lock().await = GuardState::Idle;
    }
}
