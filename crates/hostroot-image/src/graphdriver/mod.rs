//! Union-filesystem graph drivers.
//!
//! A driver owns a home directory under the store root (`<store>/<name>`)
//! and knows how to turn a layer id into a mounted directory.

pub mod aufs;
pub mod overlay2;

use std::fmt;
use std::path::{Path, PathBuf};

use hostroot_common::error::{HostrootError, Result};
use hostroot_common::types::DriverName;
use hostroot_core::filesystem::mount::MountBackend;

/// Names accepted by [`open_driver`].
pub const SUPPORTED_DRIVERS: &[&str] = &[overlay2::NAME, aufs::NAME];

/// Mounts and unmounts layers stored in one driver's home directory.
pub trait GraphDriver: fmt::Debug {
    /// Driver name as written in the storage-driver file.
    fn name(&self) -> &'static str;

    /// Directory holding this driver's layers.
    fn home(&self) -> &Path;

    /// Returns `true` if the driver has data for layer `id`.
    fn exists(&self, id: &str) -> bool;

    /// Directory where layer `id` appears once mounted.
    fn mount_point(&self, id: &str) -> PathBuf;

    /// Mounts layer `id` and returns its root directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer's on-disk data is unreadable or the
    /// mount fails.
    fn get(&self, backend: &dyn MountBackend, id: &str) -> Result<PathBuf>;

    /// Releases the mount created by [`GraphDriver::get`].
    ///
    /// # Errors
    ///
    /// Returns an error if the unmount fails.
    fn put(&self, backend: &dyn MountBackend, id: &str) -> Result<()>;
}

/// Opens the driver called `name` rooted at `store_root/<name>`.
///
/// Drivers that keep scratch files on the shared-memory tmpfs put them in
/// `shm_dir`.
///
/// # Errors
///
/// Returns [`HostrootError::StoreInit`] if the driver is unknown or its home
/// directory does not exist.
pub fn open_driver(
    name: &DriverName,
    store_root: &Path,
    shm_dir: &Path,
) -> Result<Box<dyn GraphDriver>> {
    let home = store_root.join(name.as_str());
    let driver: Box<dyn GraphDriver> = match name.as_str() {
        overlay2::NAME => Box::new(overlay2::Overlay2::new(home)),
        aufs::NAME => Box::new(aufs::Aufs::new(home, shm_dir)),
        other => {
            return Err(HostrootError::StoreInit {
                root: store_root.to_path_buf(),
                message: format!(
                    "unsupported storage driver {other:?} (supported: {})",
                    SUPPORTED_DRIVERS.join(", ")
                ),
            });
        }
    };

    if !driver.home().is_dir() {
        return Err(HostrootError::StoreInit {
            root: store_root.to_path_buf(),
            message: format!("driver home {} does not exist", driver.home().display()),
        });
    }

    tracing::debug!(driver = driver.name(), home = %driver.home().display(), "graph driver opened");
    Ok(driver)
}

pub(crate) fn read_trimmed(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HostrootError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
