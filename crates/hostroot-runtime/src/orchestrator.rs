//! Boot-time mount orchestration.
//!
//! Prepares the host root, mounts the container layer, and moves every
//! boot-time mount into the new root so it survives the pivot. Each stage
//! consumes the previous one:
//!
//! ```text
//! prepare_host() -> RootPrepared -> transplant() -> NamespaceTransplanted
//! ```

use std::path::{Path, PathBuf};

use hostroot_common::config::RootSwitchConfig;
use hostroot_common::error::{HostrootError, Result};
use hostroot_common::types::BootDescriptor;
use hostroot_core::filesystem::mount::{Access, MountBackend, MountOptions};
use hostroot_core::filesystem::mountinfo::MountEntry;
use hostroot_image::storage::StoreOpener;

use crate::adapter::{self, MountedLayer};

/// Mount table captured before anything was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSnapshot {
    entries: Vec<MountEntry>,
}

impl MountSnapshot {
    /// Reads the current mount table.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount table cannot be read.
    pub fn capture(backend: &dyn MountBackend) -> Result<Self> {
        let entries = backend.mount_table()?;
        tracing::debug!(mounts = entries.len(), "mount table captured");
        Ok(Self { entries })
    }

    /// Entries in mount order.
    #[must_use]
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }
}

/// Host root is writable and the shared-memory tmpfs is mounted.
#[derive(Debug)]
pub struct RootPrepared {
    snapshot: MountSnapshot,
}

impl RootPrepared {
    /// Mount table as it was before preparation.
    #[must_use]
    pub const fn snapshot(&self) -> &MountSnapshot {
        &self.snapshot
    }
}

/// Outcome of moving the boot-time mounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    /// Original mount points that were moved.
    pub relocated: Vec<PathBuf>,
    /// Original mount points that could not be moved.
    pub skipped: Vec<PathBuf>,
}

/// The container layer is the new root and holds the boot-time mounts.
#[derive(Debug)]
pub struct NamespaceTransplanted {
    pub(crate) layer: MountedLayer,
    pub(crate) pivot_target: PathBuf,
    report: RelocationReport,
}

impl NamespaceTransplanted {
    /// Root of the container filesystem.
    #[must_use]
    pub fn new_root(&self) -> &Path {
        &self.layer.path
    }

    /// Directory where the old root will be placed by the pivot.
    #[must_use]
    pub fn pivot_target(&self) -> &Path {
        &self.pivot_target
    }

    /// Which mounts were moved.
    #[must_use]
    pub const fn report(&self) -> &RelocationReport {
        &self.report
    }
}

/// Captures the mount table, remounts the host root read-write, and mounts
/// a private tmpfs on the shared-memory directory.
///
/// # Errors
///
/// Every step is fatal: an unreadable mount table, a failed remount, or a
/// failure to create or mount the shared-memory directory.
pub fn prepare_host(backend: &dyn MountBackend, config: &RootSwitchConfig) -> Result<RootPrepared> {
    let snapshot = MountSnapshot::capture(backend)?;

    tracing::info!(root = %config.host_root.display(), "remounting host root read-write");
    backend.remount(&config.host_root, Access::ReadWrite)?;

    std::fs::create_dir_all(&config.shm_dir).map_err(|e| HostrootError::Io {
        path: config.shm_dir.clone(),
        source: e,
    })?;
    backend.mount(
        "shm",
        &config.shm_dir,
        "tmpfs",
        &MountOptions::tmpfs(),
        Some(&config.shm_options()),
    )?;
    backend.make_private(&config.shm_dir)?;
    tracing::debug!(path = %config.shm_dir.display(), "shared memory mounted");

    Ok(RootPrepared { snapshot })
}

impl RootPrepared {
    /// Mounts the container described by `descriptor` and moves every
    /// snapshot mount except the host root into it.
    ///
    /// The read-only remount of the new root, the shared-memory detach, and
    /// each individual move are best-effort: failures are logged and the
    /// procedure continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer cannot be mounted or the pivot target
    /// cannot be created.
    pub fn transplant(
        self,
        backend: &dyn MountBackend,
        opener: &dyn StoreOpener,
        config: &RootSwitchConfig,
        descriptor: &BootDescriptor,
    ) -> Result<NamespaceTransplanted> {
        let options = adapter::store_options(config, &config.host_root, &descriptor.driver);
        let layer = adapter::mount_container(
            backend,
            opener,
            &options,
            &descriptor.container_id,
            None,
        )?;

        let pivot_target = config.pivot_target(&layer.path);
        std::fs::create_dir_all(&pivot_target).map_err(|e| HostrootError::Io {
            path: pivot_target.clone(),
            source: e,
        })?;

        if let Err(e) = backend.remount(&layer.path, Access::ReadOnly) {
            tracing::warn!(error = %e, "could not remount new root read-only");
        }
        if let Err(e) = backend.unmount(&config.shm_dir) {
            tracing::warn!(error = %e, "could not detach shared memory");
        }

        let report = relocate(backend, &self.snapshot, &config.host_root, &layer.path);
        tracing::info!(
            relocated = report.relocated.len(),
            skipped = report.skipped.len(),
            "boot mounts moved into new root"
        );

        Ok(NamespaceTransplanted {
            layer,
            pivot_target,
            report,
        })
    }
}

fn relocate(
    backend: &dyn MountBackend,
    snapshot: &MountSnapshot,
    host_root: &Path,
    new_root: &Path,
) -> RelocationReport {
    let mut report = RelocationReport::default();
    for entry in snapshot.entries() {
        if entry.mountpoint == host_root {
            continue;
        }
        let Ok(relative) = entry.mountpoint.strip_prefix(host_root) else {
            tracing::warn!(mountpoint = %entry.mountpoint.display(), "mount outside host root");
            report.skipped.push(entry.mountpoint.clone());
            continue;
        };
        let target = new_root.join(relative);
        match backend.move_mount(&entry.mountpoint, &target) {
            Ok(()) => report.relocated.push(entry.mountpoint.clone()),
            Err(e) => {
                tracing::warn!(
                    mountpoint = %entry.mountpoint.display(),
                    error = %e,
                    "failed to move mount"
                );
                report.skipped.push(entry.mountpoint.clone());
            }
        }
    }
    report
}
