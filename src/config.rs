// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Settings — read once from the environment at startup

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ServiceError};
use crate::portainer::auth::{DEFAULT_TOKEN_MARGIN, DEFAULT_TOKEN_VALIDITY};

#[derive(Debug, Clone)]
pub struct Settings {
    pub portainer_url: Option<String>,
    pub portainer_username: Option<String>,
    pub portainer_password: Option<String>,
    pub environment_id: u64,
    pub timeout: Duration,
    pub insecure_tls: bool,
    pub admin_api_key: Option<String>,
    pub catalog_path: Option<PathBuf>,
    /// Variables that were set but could not be parsed, as `NAME='value'`
    pub invalid: Vec<String>,
}

/// What the controller needs to reach Portainer
#[derive(Debug, Clone)]
pub struct PortainerSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub environment_id: u64,
    pub timeout: Duration,
    pub insecure_tls: bool,
    pub token_validity: Duration,
    pub token_margin: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut invalid = Vec::new();
        let mut number = |key: &str, default: u64| -> u64 {
            match get(key) {
                None => default,
                Some(raw) => match raw.parse::<u64>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        invalid.push(format!("{}='{}'", key, raw));
                        default
                    }
                },
            }
        };
        let environment_id = number("PORTAINER_ENVIRONMENT_ID", 1);
        let timeout = Duration::from_secs(number("PORTAINER_TIMEOUT_SECS", 30));
        let insecure_tls = get("PORTAINER_INSECURE_TLS")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);
        let admin_api_key = get("ADMIN_API_KEY")
            .filter(|k| k != "replace_with_a_secure_random_key");

        Self {
            portainer_url: get("PORTAINER_URL"),
            portainer_username: get("PORTAINER_USERNAME"),
            portainer_password: get("PORTAINER_PASSWORD"),
            environment_id,
            timeout,
            insecure_tls,
            admin_api_key,
            catalog_path: get("NASPI_CATALOG").map(PathBuf::from),
            invalid,
        }
    }

    /// Portainer connection settings, or `Configuration` naming what is missing
    pub fn portainer(&self) -> Result<PortainerSettings> {
        let mut missing = Vec::new();
        if self.portainer_url.is_none() { missing.push("PORTAINER_URL"); }
        if self.portainer_username.is_none() { missing.push("PORTAINER_USERNAME"); }
        if self.portainer_password.is_none() { missing.push("PORTAINER_PASSWORD"); }
        if !missing.is_empty() {
            return Err(ServiceError::Configuration(format!("missing {}", missing.join(", "))));
        }
        if !self.invalid.is_empty() {
            return Err(ServiceError::Configuration(format!("invalid {}", self.invalid.join(", "))));
        }

        Ok(PortainerSettings {
            url: self.portainer_url.clone().unwrap_or_default(),
            username: self.portainer_username.clone().unwrap_or_default(),
            password: self.portainer_password.clone().unwrap_or_default(),
            environment_id: self.environment_id,
            timeout: self.timeout,
            insecure_tls: self.insecure_tls,
            token_validity: DEFAULT_TOKEN_VALIDITY,
            token_margin: DEFAULT_TOKEN_MARGIN,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let s = settings(&[]);
        assert_eq!(s.environment_id, 1);
        assert_eq!(s.timeout, Duration::from_secs(30));
        assert!(s.insecure_tls);
        assert!(s.admin_api_key.is_none());
    }

    #[test]
    fn missing_credentials_is_configuration_error() {
        let s = settings(&[("PORTAINER_URL", "https://nas:9443"), ("PORTAINER_PASSWORD", "  ")]);
        match s.portainer() {
            Err(ServiceError::Configuration(msg)) => {
                assert!(msg.contains("PORTAINER_USERNAME"));
                assert!(msg.contains("PORTAINER_PASSWORD"));
                assert!(!msg.contains("PORTAINER_URL"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn full_settings_parse() {
        let s = settings(&[
            ("PORTAINER_URL", "https://nas:9443"),
            ("PORTAINER_USERNAME", "admin"),
            ("PORTAINER_PASSWORD", "pw"),
            ("PORTAINER_ENVIRONMENT_ID", "3"),
            ("PORTAINER_INSECURE_TLS", "false"),
            ("ADMIN_API_KEY", "replace_with_a_secure_random_key"),
        ]);
        let p = s.portainer().unwrap();
        assert_eq!(p.environment_id, 3);
        assert!(!p.insecure_tls);
        // The placeholder key from the sample .env is not a real key
        assert!(s.admin_api_key.is_none());
    }

    #[test]
    fn unparseable_numbers_are_configuration_errors() {
        let s = settings(&[
            ("PORTAINER_URL", "https://nas:9443"),
            ("PORTAINER_USERNAME", "admin"),
            ("PORTAINER_PASSWORD", "pw"),
            ("PORTAINER_ENVIRONMENT_ID", "two"),
            ("PORTAINER_TIMEOUT_SECS", "0"),
        ]);
        match s.portainer() {
            Err(ServiceError::Configuration(msg)) => {
                assert!(msg.contains("PORTAINER_ENVIRONMENT_ID='two'"));
                assert!(msg.contains("PORTAINER_TIMEOUT_SECS='0'"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}
