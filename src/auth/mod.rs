// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Admin authorisation for the mutating service routes
//!
//! Callers present the shared admin key in the `X-Admin-API-Key` header.

use actix_web::HttpRequest;
use tracing::warn;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-API-Key";

/// Constant-time comparison of a provided key against the configured one
pub fn validate_admin_key(provided: &str, expected: &str) -> bool {
    if provided.is_empty() || expected.is_empty() {
        return false;
    }
    provided.len() == expected.len()
        && provided.as_bytes().iter().zip(expected.as_bytes().iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// True if the request carries the admin key. No key configured means no admin.
pub fn is_admin(req: &HttpRequest, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        warn!("Admin route called but ADMIN_API_KEY is not configured");
        return false;
    };
    req.headers().get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| validate_admin_key(provided, expected))
}
