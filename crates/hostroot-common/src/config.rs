//! Configuration model for the root switch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{HostrootError, Result};

/// Paths and parameters used by the boot and inspection procedures.
///
/// Relative paths are resolved against the system root being activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootSwitchConfig {
    /// Root of the live system (`/` outside of tests).
    pub host_root: PathBuf,
    /// Layer store directory, relative to the system root.
    pub layer_dir: PathBuf,
    /// `current` symlink, relative to the system root.
    pub current_link: PathBuf,
    /// Storage driver file, relative to the system root.
    pub storage_driver_file: PathBuf,
    /// Metadata template relative to the store root, with a `%s` driver placeholder.
    pub metadata_template: String,
    /// Old-root location relative to the new root.
    pub pivot_dir: PathBuf,
    /// Shared-memory tmpfs mount point.
    pub shm_dir: PathBuf,
    /// tmpfs `size=` value for the shared-memory mount.
    pub shm_size: String,
    /// Init program executed after the pivot.
    pub init_program: PathBuf,
    /// Mount table consulted for snapshots and idempotent remounts.
    pub mountinfo_path: PathBuf,
}

impl Default for RootSwitchConfig {
    fn default() -> Self {
        Self {
            host_root: PathBuf::from(constants::HOST_ROOT),
            layer_dir: PathBuf::from(constants::LAYER_DIR),
            current_link: PathBuf::from(constants::CURRENT_LINK),
            storage_driver_file: PathBuf::from(constants::STORAGE_DRIVER_FILE),
            metadata_template: constants::METADATA_TEMPLATE.to_string(),
            pivot_dir: PathBuf::from(constants::PIVOT_DIR),
            shm_dir: PathBuf::from(constants::SHM_DIR),
            shm_size: constants::SHM_SIZE.to_string(),
            init_program: PathBuf::from(constants::INIT_PROGRAM),
            mountinfo_path: PathBuf::from(constants::MOUNTINFO_PATH),
        }
    }
}

impl RootSwitchConfig {
    /// Loads a JSON configuration file. Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HostrootError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Returns the layer store root under `sysroot`.
    #[must_use]
    pub fn store_root(&self, sysroot: &Path) -> PathBuf {
        sysroot.join(&self.layer_dir)
    }

    /// Returns the pivot target under `new_root`.
    #[must_use]
    pub fn pivot_target(&self, new_root: &Path) -> PathBuf {
        new_root.join(&self.pivot_dir)
    }

    /// Options string for the shared-memory tmpfs.
    #[must_use]
    pub fn shm_options(&self) -> String {
        format!("mode=1777,size={}", self.shm_size)
    }
}
