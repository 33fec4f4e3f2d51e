//! Local inspection: mount another system root's active container without
//! switching to it.

use std::path::{Path, PathBuf};

use serde::Serialize;

use hostroot_common::config::RootSwitchConfig;
use hostroot_common::error::{HostrootError, Result};
use hostroot_common::types::BootDescriptor;
use hostroot_core::filesystem::mount::MountBackend;
use hostroot_image::storage::StoreOpener;

use crate::{adapter, descriptor};

/// Result of an inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inspection {
    /// Descriptor read from the inspected root.
    pub descriptor: BootDescriptor,
    /// Graph driver id of the mounted layer.
    pub mount_id: String,
    /// Where the container filesystem can be browsed.
    pub mount_path: PathBuf,
}

/// Mounts the active container of `layer_root` read-write.
///
/// Without `mount_dest` the driver's own mount point is returned. Both paths
/// are resolved to canonical form first so stale mounts from an earlier run
/// are found in the mount table. The live root and the running process are
/// left alone.
///
/// # Errors
///
/// Returns an error if `layer_root` does not exist, the descriptor cannot be
/// resolved, the store cannot be opened, the layer is missing, or a mount
/// step fails.
pub fn inspect(
    backend: &dyn MountBackend,
    opener: &dyn StoreOpener,
    config: &RootSwitchConfig,
    layer_root: &Path,
    mount_dest: Option<&Path>,
) -> Result<Inspection> {
    let layer_root = std::fs::canonicalize(layer_root).map_err(|e| HostrootError::Io {
        path: layer_root.to_path_buf(),
        source: e,
    })?;
    tracing::info!(layer_root = %layer_root.display(), "inspecting layer root");
    let descriptor = descriptor::resolve(&layer_root, config)?;
    let options = adapter::store_options(config, &layer_root, &descriptor.driver);
    let mounted = adapter::mount_container(
        backend,
        opener,
        &options,
        &descriptor.container_id,
        mount_dest,
    )?;

    Ok(Inspection {
        descriptor,
        mount_id: mounted.mount_id,
        mount_path: mounted.path,
    })
}
