//! On-disk fixtures for a system root with a layer store.
//!
//! Builds just enough of the container engine's layout for the store and
//! graph drivers to resolve and mount a container.

use std::io;
use std::path::{Path, PathBuf};

/// A system root under construction in a temporary directory.
#[derive(Debug, Clone)]
pub struct StoreFixture {
    sysroot: PathBuf,
}

impl StoreFixture {
    /// Uses `sysroot` as the system root. Nothing is created until a
    /// container is added.
    #[must_use]
    pub fn new(sysroot: &Path) -> Self {
        Self {
            sysroot: sysroot.to_path_buf(),
        }
    }

    /// System root directory.
    #[must_use]
    pub fn sysroot(&self) -> &Path {
        &self.sysroot
    }

    /// Layer store root (`<sysroot>/balena`).
    #[must_use]
    pub fn store_root(&self) -> PathBuf {
        self.sysroot.join("balena")
    }

    /// Layer metadata directory of `driver`.
    #[must_use]
    pub fn metadata_root(&self, driver: &str) -> PathBuf {
        self.store_root().join("image").join(driver).join("layerdb")
    }

    /// Points `current` at `containers/<container>` and writes its storage
    /// driver file.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be written.
    pub fn set_current(&self, driver: &str, container: &str) -> io::Result<()> {
        let target = Path::new("containers").join(container);
        let boot = self.sysroot.join(&target).join("boot");
        std::fs::create_dir_all(&boot)?;
        std::fs::write(boot.join("storage-driver"), format!("{driver}\n"))?;

        let link = self.sysroot.join("current");
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link)?;
        }
        std::os::unix::fs::symlink(&target, &link)
    }

    fn add_mount_id(&self, driver: &str, container: &str, mount_id: &str) -> io::Result<()> {
        let dir = self.metadata_root(driver).join("mounts").join(container);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("mount-id"), mount_id)
    }

    /// Adds an `overlay2` read-write layer for `container` and returns the
    /// layer directory. An empty `lowers` makes it a base layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be written.
    pub fn add_overlay2_container(
        &self,
        container: &str,
        mount_id: &str,
        lowers: &[&str],
    ) -> io::Result<PathBuf> {
        self.add_mount_id("overlay2", container, mount_id)?;
        let home = self.store_root().join("overlay2");
        let layer = home.join(mount_id);
        std::fs::create_dir_all(layer.join("diff"))?;
        std::fs::create_dir_all(layer.join("work"))?;
        if !lowers.is_empty() {
            for lower in lowers {
                std::fs::create_dir_all(home.join(lower))?;
            }
            std::fs::write(layer.join("lower"), lowers.join(":"))?;
        }
        Ok(layer)
    }

    /// Adds an `aufs` read-write layer for `container` with the given
    /// parents, nearest first, and returns its diff directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be written.
    pub fn add_aufs_container(
        &self,
        container: &str,
        mount_id: &str,
        parents: &[&str],
    ) -> io::Result<PathBuf> {
        self.add_mount_id("aufs", container, mount_id)?;
        let home = self.store_root().join("aufs");
        for id in std::iter::once(&mount_id).chain(parents) {
            std::fs::create_dir_all(home.join("diff").join(id))?;
        }
        std::fs::create_dir_all(home.join("mnt"))?;
        std::fs::create_dir_all(home.join("layers"))?;
        std::fs::write(home.join("layers").join(mount_id), parents.join("\n"))?;
        Ok(home.join("diff").join(mount_id))
    }
}
