//! Resolution of the boot descriptor from a system root.
//!
//! Reads the storage-driver file and the `current` symlink. Nothing is
//! mounted or written.

use std::path::Path;

use hostroot_common::config::RootSwitchConfig;
use hostroot_common::error::{HostrootError, Result};
use hostroot_common::types::{BootDescriptor, ContainerId, DriverName};

/// Reads the driver name and active container id under `sysroot`.
///
/// # Errors
///
/// Returns [`HostrootError::Configuration`] if the storage-driver file is
/// unreadable or empty, or if the `current` link is missing or its target
/// has no final component.
pub fn resolve(sysroot: &Path, config: &RootSwitchConfig) -> Result<BootDescriptor> {
    let driver_file = sysroot.join(&config.storage_driver_file);
    let driver = std::fs::read_to_string(&driver_file).map_err(|e| HostrootError::Configuration {
        path: driver_file.clone(),
        message: format!("cannot read storage driver: {e}"),
    })?;
    let driver = driver.trim();
    if driver.is_empty() {
        return Err(HostrootError::Configuration {
            path: driver_file,
            message: "storage driver file is empty".into(),
        });
    }

    let link = sysroot.join(&config.current_link);
    let target = std::fs::read_link(&link).map_err(|e| HostrootError::Configuration {
        path: link.clone(),
        message: format!("cannot read link: {e}"),
    })?;
    let container_id = target
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| HostrootError::Configuration {
            path: link.clone(),
            message: format!("link target {} names no container", target.display()),
        })?;

    tracing::info!(driver, container = container_id, "boot descriptor resolved");
    Ok(BootDescriptor {
        driver: DriverName::new(driver),
        container_id: ContainerId::new(container_id),
    })
}
