//! Mounting a container's read-write layer out of the layer store.

use std::path::{Path, PathBuf};

use hostroot_common::config::RootSwitchConfig;
use hostroot_common::error::{HostrootError, Result};
use hostroot_common::types::{ContainerId, DriverName};
use hostroot_core::filesystem::mount::{Access, MountBackend};
use hostroot_image::storage::{StoreOpener, StoreOptions};

/// A read-write layer that is mounted and writable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedLayer {
    /// Container the layer belongs to.
    pub container_id: ContainerId,
    /// Graph driver id of the layer.
    pub mount_id: String,
    /// Where the graph driver mounted the layer.
    pub layer_path: PathBuf,
    /// Root of the container filesystem: the bind destination when one was
    /// requested, otherwise `layer_path`.
    pub path: PathBuf,
}

/// Store options for the layer store under `sysroot`.
///
/// The store root is `<sysroot>/<layer_dir>` and the metadata template is
/// expanded beneath it, so boot (`sysroot = /`) and inspection
/// (`sysroot = <layer root>`) each get paths rooted in their own tree.
#[must_use]
pub fn store_options(
    config: &RootSwitchConfig,
    sysroot: &Path,
    driver: &DriverName,
) -> StoreOptions {
    let store_path = config.store_root(sysroot);
    let metadata_template = store_path
        .join(&config.metadata_template)
        .to_string_lossy()
        .into_owned();
    StoreOptions {
        store_path,
        metadata_template,
        driver: driver.clone(),
        shm_dir: config.shm_dir.clone(),
    }
}

/// Opens the store, mounts the read-write layer of `container_id`, and
/// remounts it read-write.
///
/// Stale mounts on the driver mount point and on `dest` are released first,
/// so repeated calls never stack mounts. `dest` is created if missing and
/// used in canonical form. With a `dest`, the layer is
/// bind-mounted there and the driver's own mount is made read-only, leaving
/// `dest` as the only writable view.
///
/// # Errors
///
/// Returns the store's error if it cannot be opened or has no layer for the
/// container, and [`HostrootError::Mount`] or [`HostrootError::Io`] if any
/// mount step fails. Nothing is retried.
pub fn mount_container(
    backend: &dyn MountBackend,
    opener: &dyn StoreOpener,
    options: &StoreOptions,
    container_id: &ContainerId,
    dest: Option<&Path>,
) -> Result<MountedLayer> {
    let store = opener.open(options)?;
    let layer = store.rw_layer(container_id)?;

    let dest = dest.map(prepare_dest).transpose()?;
    if let Some(dest) = &dest {
        detach_if_mounted(backend, dest)?;
    }
    if backend.is_mounted(&layer.mount_point())? {
        tracing::info!(
            target = %layer.mount_point().display(),
            "releasing stale layer mount"
        );
        layer.unmount(backend)?;
    }

    let layer_path = layer.mount(backend)?;
    backend.remount(&layer_path, Access::ReadWrite)?;

    let path = match dest {
        None => layer_path.clone(),
        Some(dest) => {
            backend.bind(&layer_path, &dest)?;
            backend.remount_bind(&layer_path, Access::ReadOnly)?;
            dest
        }
    };

    tracing::info!(
        container = %container_id,
        path = %path.display(),
        "container layer mounted read-write"
    );
    Ok(MountedLayer {
        container_id: container_id.clone(),
        mount_id: layer.mount_id().to_string(),
        layer_path,
        path,
    })
}

/// Creates `dest` and returns its canonical path, the form the kernel
/// reports in the mount table.
fn prepare_dest(dest: &Path) -> Result<PathBuf> {
    let io_error = |e| HostrootError::Io {
        path: dest.to_path_buf(),
        source: e,
    };
    std::fs::create_dir_all(dest).map_err(io_error)?;
    std::fs::canonicalize(dest).map_err(io_error)
}

fn detach_if_mounted(backend: &dyn MountBackend, target: &Path) -> Result<()> {
    if backend.is_mounted(target)? {
        tracing::info!(target = %target.display(), "detaching existing mount");
        backend.unmount(target)?;
    }
    Ok(())
}
