// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Service catalog — the fixed set of stacks the NAS knows how to deploy
//!
//! Loaded once at startup, either from the built-in definitions or from a
//! TOML file of `[[service]]` tables. Read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::{Result, ServiceError};

/// One deployable service and the compose manifest behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub key: String,
    pub stack_name: String,
    pub manifest_body: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub access_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "service")]
    services: Vec<ServiceDefinition>,
}

#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    definitions: Vec<ServiceDefinition>,
}

impl ServiceCatalog {
    /// Build a catalog, rejecting bad keys and duplicate keys or stack names
    pub fn new(definitions: Vec<ServiceDefinition>) -> Result<Self> {
        let mut keys = HashSet::new();
        let mut stacks = HashSet::new();
        for def in &definitions {
            if !is_valid_key(&def.key) {
                return Err(ServiceError::Catalog(format!(
                    "service key '{}' must be a non-empty lowercase identifier", def.key
                )));
            }
            if def.stack_name.trim().is_empty() {
                return Err(ServiceError::Catalog(format!("service '{}' has no stack name", def.key)));
            }
            if def.manifest_body.trim().is_empty() {
                return Err(ServiceError::Catalog(format!("service '{}' has an empty manifest", def.key)));
            }
            if !keys.insert(def.key.as_str()) {
                return Err(ServiceError::Catalog(format!("duplicate service key '{}'", def.key)));
            }
            if !stacks.insert(def.stack_name.as_str()) {
                return Err(ServiceError::Catalog(format!("duplicate stack name '{}'", def.stack_name)));
            }
        }
        Ok(Self { definitions })
    }

    pub fn built_in() -> Result<Self> {
        Self::new(built_in_definitions())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| ServiceError::Catalog(e.to_string()))?;
        Self::new(file.services)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Catalog(format!("cannot read {}: {}", path.display(), e)))?;
        let catalog = Self::from_toml_str(&content)?;
        info!("Loaded {} service definitions from {}", catalog.definitions.len(), path.display());
        Ok(catalog)
    }

    /// Load from `path` when given, otherwise the built-in definitions
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::built_in(),
        }
    }

    pub fn definitions(&self) -> &[ServiceDefinition] {
        &self.definitions
    }

    /// Case-insensitive lookup by service key
    pub fn lookup(&self, key: &str) -> Result<&ServiceDefinition> {
        let key = key.trim().to_lowercase();
        self.definitions.iter()
            .find(|d| d.key == key)
            .ok_or_else(|| ServiceError::NotFound(format!("Service '{}' definition not found.", key)))
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

// ─── Built-in catalog ───

const JELLYFIN_COMPOSE: &str = r#"version: "3.5"
services:
  jellyfin:
    image: jellyfin/jellyfin:latest
    container_name: jellyfin
    network_mode: "host"
    volumes:
      - jellyfin_config:/config
      - jellyfin_cache:/cache
      - /srv/naspi/media:/media:ro
    restart: unless-stopped
    environment:
      - PUID=1000
      - PGID=1000
      - TZ=Etc/UTC
volumes:
  jellyfin_config:
  jellyfin_cache:
"#;

const PLEX_COMPOSE: &str = r#"version: "3.5"
services:
  plex:
    image: plexinc/pms-docker:latest
    container_name: plex
    network_mode: "host"
    volumes:
      - plex_config:/config
      - plex_transcode:/transcode
      - /srv/naspi/media:/data:ro
    restart: unless-stopped
    environment:
      - PLEX_CLAIM=
      - PUID=1000
      - PGID=1000
      - TZ=Etc/UTC
volumes:
  plex_config:
  plex_transcode:
"#;

const PIHOLE_COMPOSE: &str = r#"version: "3"
services:
  pihole:
    image: pihole/pihole:latest
    container_name: pihole
    network_mode: "bridge"
    ports:
      - "53:53/tcp"
      - "53:53/udp"
      - "67:67/udp"
      - "80:80/tcp"
    environment:
      - TZ=Etc/UTC
      - WEBPASSWORD=set_a_secure_password
    volumes:
      - pihole_config:/etc/pihole/
      - pihole_dnsmasq:/etc/dnsmasq.d/
    restart: unless-stopped
volumes:
  pihole_config:
  pihole_dnsmasq:
"#;

pub fn built_in_definitions() -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition {
            key: "jellyfin".into(),
            stack_name: "jellyfin-stack".into(),
            manifest_body: JELLYFIN_COMPOSE.into(),
            display_name: "Jellyfin Media Server".into(),
            description: "Media server for your movies, shows and music".into(),
            access_port: Some(8096),
        },
        ServiceDefinition {
            key: "plex".into(),
            stack_name: "plex-stack".into(),
            manifest_body: PLEX_COMPOSE.into(),
            display_name: "Plex Media Server".into(),
            description: "Organise and stream your media library".into(),
            access_port: Some(32400),
        },
        ServiceDefinition {
            key: "pihole".into(),
            stack_name: "pihole-stack".into(),
            manifest_body: PIHOLE_COMPOSE.into(),
            display_name: "Pi-hole".into(),
            description: "Network-wide ad blocking DNS".into(),
            access_port: Some(80),
        },
    ]
}
