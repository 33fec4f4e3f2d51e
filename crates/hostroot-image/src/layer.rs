//! Read-write layer of a container.
//!
//! The read-write layer sits on top of the image layers and is the only
//! writable part of a container's filesystem. Mounting it through its graph
//! driver yields the container's complete root.

use std::fmt;
use std::path::PathBuf;

use hostroot_common::error::Result;
use hostroot_common::types::ContainerId;
use hostroot_core::filesystem::mount::MountBackend;

use crate::graphdriver::GraphDriver;

/// Mutable view of one container's filesystem.
pub trait RwLayer: fmt::Debug {
    /// Container owning this layer.
    fn container_id(&self) -> &ContainerId;

    /// Graph driver id of the layer.
    fn mount_id(&self) -> &str;

    /// Directory where the driver mounts the layer.
    fn mount_point(&self) -> PathBuf;

    /// Mounts the layer and returns its root.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot mount the layer.
    fn mount(&self, backend: &dyn MountBackend) -> Result<PathBuf>;

    /// Releases the driver mount.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot unmount the layer.
    fn unmount(&self, backend: &dyn MountBackend) -> Result<()>;
}

/// Read-write layer backed by a graph driver on disk.
#[derive(Debug)]
pub struct DiskRwLayer<'a> {
    container_id: ContainerId,
    mount_id: String,
    driver: &'a dyn GraphDriver,
}

impl<'a> DiskRwLayer<'a> {
    /// Creates a layer handle for `mount_id` managed by `driver`.
    #[must_use]
    pub fn new(container_id: ContainerId, mount_id: String, driver: &'a dyn GraphDriver) -> Self {
        Self {
            container_id,
            mount_id,
            driver,
        }
    }
}

impl RwLayer for DiskRwLayer<'_> {
    fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    fn mount_id(&self) -> &str {
        &self.mount_id
    }

    fn mount_point(&self) -> PathBuf {
        self.driver.mount_point(&self.mount_id)
    }

    fn mount(&self, backend: &dyn MountBackend) -> Result<PathBuf> {
        tracing::info!(
            container = %self.container_id,
            mount_id = %self.mount_id,
            driver = self.driver.name(),
            "mounting read-write layer"
        );
        let path = self.driver.get(backend, &self.mount_id)?;
        tracing::debug!(path = %path.display(), "read-write layer mounted");
        Ok(path)
    }

    fn unmount(&self, backend: &dyn MountBackend) -> Result<()> {
        tracing::debug!(container = %self.container_id, "unmounting read-write layer");
        self.driver.put(backend, &self.mount_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::graphdriver::aufs::Aufs;
    use crate::testing::StoreFixture;
    use hostroot_core::testing::RecordingBackend;

    #[test]
    fn mount_and_unmount_go_through_driver() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let _ = fixture
            .add_aufs_container("c1", "rw1", &["base1"])
            .expect("fixture");
        let driver = Aufs::new(fixture.store_root().join("aufs"), Path::new("/dev/shm"));
        let layer = DiskRwLayer::new(ContainerId::new("c1"), "rw1".into(), &driver);
        let backend = RecordingBackend::new();

        let path = layer.mount(&backend).expect("mount");
        assert_eq!(path, layer.mount_point());
        assert_eq!(backend.mountpoints(), vec![path]);

        layer.unmount(&backend).expect("unmount");
        assert!(backend.mountpoints().is_empty());
    }
}
