// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Host bind-mount preparation after a stack is deployed

use serde_yaml::Value;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Result, ServiceError};

/// Absolute host paths bind-mounted by any service in a compose manifest.
/// Named volumes and relative paths are skipped.
pub fn bind_mount_sources(manifest: &str) -> Vec<PathBuf> {
    let Ok(doc) = serde_yaml::from_str::<Value>(manifest) else {
        return Vec::new();
    };
    let Some(services) = doc.get("services").and_then(|s| s.as_mapping()) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for service in services.values() {
        let Some(volumes) = service.get("volumes").and_then(|v| v.as_sequence()) else {
            continue;
        };
        for volume in volumes {
            let source = match volume {
                // "/host/path:/container/path[:mode]"
                Value::String(s) => s.split(':').next().map(str::to_string),
                // long syntax: { type: bind, source: /host/path, target: ... }
                Value::Mapping(_) => {
                    let is_bind = volume.get("type").and_then(|t| t.as_str()) == Some("bind");
                    if is_bind {
                        volume.get("source").and_then(|s| s.as_str()).map(str::to_string)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(src) = source.filter(|s| s.starts_with('/')) {
                let path = PathBuf::from(src);
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
    }
    paths
}

/// Make sure `path` exists as a directory the containers can write to
pub fn prepare_host_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| ServiceError::Permission(format!("cannot create {}: {}", path.display(), e)))?;

    let meta = std::fs::metadata(path)
        .map_err(|e| ServiceError::Permission(format!("cannot stat {}: {}", path.display(), e)))?;
    if !meta.is_dir() {
        return Err(ServiceError::Permission(format!("{} exists and is not a directory", path.display())));
    }

    let mut perms = meta.permissions();
    let mode = perms.mode();
    if mode & 0o775 != 0o775 {
        perms.set_mode(mode | 0o775);
        std::fs::set_permissions(path, perms)
            .map_err(|e| ServiceError::Permission(format!("cannot chmod {}: {}", path.display(), e)))?;
    }
    Ok(())
}
