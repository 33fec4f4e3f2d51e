//! Layer store access.
//!
//! Opens the on-disk metadata of one graph driver and resolves a container's
//! read-write layer from it. Only `layerdb/mounts/<container>/mount-id` is
//! consulted; image and layer chain metadata are never read.

use std::fmt;
use std::path::{Path, PathBuf};

use hostroot_common::constants::DRIVER_PLACEHOLDER;
use hostroot_common::error::{HostrootError, Result};
use hostroot_common::types::{ContainerId, DriverName};

use crate::graphdriver::{self, GraphDriver, read_trimmed};
use crate::layer::{DiskRwLayer, RwLayer};

/// Parameters for opening a layer store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Store root; graph driver homes live directly beneath it.
    pub store_path: PathBuf,
    /// Metadata directory with a `%s` placeholder for the driver name.
    pub metadata_template: String,
    /// Graph driver to open.
    pub driver: DriverName,
    /// Shared-memory directory for driver scratch files.
    pub shm_dir: PathBuf,
}

impl StoreOptions {
    /// Expands the metadata template for this driver.
    #[must_use]
    pub fn metadata_root(&self) -> PathBuf {
        PathBuf::from(
            self.metadata_template
                .replacen(DRIVER_PLACEHOLDER, self.driver.as_str(), 1),
        )
    }
}

/// An opened layer store.
pub trait LayerStore: fmt::Debug {
    /// Driver the store was opened with.
    fn driver(&self) -> &DriverName;

    /// Looks up the read-write layer of container `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::LayerNotFound`] if the container has no
    /// read-write layer in this store.
    fn rw_layer(&self, id: &ContainerId) -> Result<Box<dyn RwLayer + '_>>;
}

/// Capability to open a layer store.
pub trait StoreOpener {
    /// Opens the store described by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::StoreInit`] if the store is unusable.
    fn open(&self, options: &StoreOptions) -> Result<Box<dyn LayerStore>>;
}

/// Opens [`DiskLayerStore`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStoreOpener;

impl StoreOpener for DiskStoreOpener {
    fn open(&self, options: &StoreOptions) -> Result<Box<dyn LayerStore>> {
        Ok(Box::new(DiskLayerStore::open(options.clone())?))
    }
}

/// Layer store in the container engine's on-disk layout.
#[derive(Debug)]
pub struct DiskLayerStore {
    options: StoreOptions,
    metadata_root: PathBuf,
    driver: Box<dyn GraphDriver>,
}

impl DiskLayerStore {
    /// Opens the store.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::StoreInit`] if the metadata directory is
    /// missing, or the driver is unknown or has no home directory.
    pub fn open(options: StoreOptions) -> Result<Self> {
        let metadata_root = options.metadata_root();
        tracing::info!(
            store = %options.store_path.display(),
            metadata = %metadata_root.display(),
            driver = %options.driver,
            "opening layer store"
        );

        if !metadata_root.is_dir() {
            return Err(HostrootError::StoreInit {
                root: options.store_path,
                message: format!(
                    "metadata directory {} does not exist",
                    metadata_root.display()
                ),
            });
        }
        let driver =
            graphdriver::open_driver(&options.driver, &options.store_path, &options.shm_dir)?;

        Ok(Self {
            options,
            metadata_root,
            driver,
        })
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.options.store_path
    }

    /// Returns the expanded metadata directory.
    #[must_use]
    pub fn metadata_root(&self) -> &Path {
        &self.metadata_root
    }

    fn mount_id_path(&self, id: &ContainerId) -> PathBuf {
        self.metadata_root
            .join("mounts")
            .join(id.as_str())
            .join("mount-id")
    }
}

impl LayerStore for DiskLayerStore {
    fn driver(&self) -> &DriverName {
        &self.options.driver
    }

    fn rw_layer(&self, id: &ContainerId) -> Result<Box<dyn RwLayer + '_>> {
        let not_found = || HostrootError::LayerNotFound {
            id: id.as_str().to_string(),
        };

        let mount_id = read_trimmed(&self.mount_id_path(id))?
            .filter(|mount_id| !mount_id.is_empty())
            .ok_or_else(not_found)?;
        if !self.driver.exists(&mount_id) {
            tracing::debug!(container = %id, mount_id = %mount_id, "mount id has no driver data");
            return Err(not_found());
        }

        tracing::debug!(container = %id, mount_id = %mount_id, "read-write layer resolved");
        Ok(Box::new(DiskRwLayer::new(
            id.clone(),
            mount_id,
            self.driver.as_ref(),
        )))
    }
}
