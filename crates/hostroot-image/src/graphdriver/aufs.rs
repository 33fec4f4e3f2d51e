//! `aufs` graph driver.
//!
//! Layer `<id>` keeps its files in `diff/<id>`, is mounted on `mnt/<id>`,
//! and lists its ancestors (nearest first) one per line in `layers/<id>`.

use std::path::{Path, PathBuf};

use hostroot_common::error::{HostrootError, Result};
use hostroot_core::filesystem::mount::{MountBackend, MountOptions};
use hostroot_core::filesystem::overlayfs::MAX_OPTIONS_LEN;

use super::{GraphDriver, read_trimmed};

/// Driver name.
pub const NAME: &str = "aufs";

/// External inode number table, kept on the shared-memory tmpfs.
const XINO_FILE: &str = "aufs.xino";

/// The `aufs` driver.
#[derive(Debug, Clone)]
pub struct Aufs {
    home: PathBuf,
    xino: PathBuf,
}

impl Aufs {
    /// Creates the driver for the given home directory, placing its xino
    /// file in `shm_dir`.
    #[must_use]
    pub fn new(home: PathBuf, shm_dir: &Path) -> Self {
        Self {
            home,
            xino: shm_dir.join(XINO_FILE),
        }
    }

    fn diff_dir(&self, id: &str) -> PathBuf {
        self.home.join("diff").join(id)
    }

    fn parents(&self, id: &str) -> Result<Vec<String>> {
        let path = self.home.join("layers").join(id);
        let content = read_trimmed(&path)?.ok_or_else(|| HostrootError::Io {
            path: path.clone(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Builds the `mount(2)` data string for layer `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer's parent list cannot be read.
    pub fn mount_options(&self, id: &str) -> Result<String> {
        let mut branches = format!("br:{}=rw", self.diff_dir(id).display());
        for parent in self.parents(id)? {
            branches.push_str(&format!(":{}=ro+wh", self.diff_dir(&parent).display()));
        }
        Ok(format!("{branches},dio,xino={}", self.xino.display()))
    }
}

impl GraphDriver for Aufs {
    fn name(&self) -> &'static str {
        NAME
    }

    fn home(&self) -> &Path {
        &self.home
    }

    fn exists(&self, id: &str) -> bool {
        self.diff_dir(id).is_dir()
    }

    fn mount_point(&self, id: &str) -> PathBuf {
        self.home.join("mnt").join(id)
    }

    fn get(&self, backend: &dyn MountBackend, id: &str) -> Result<PathBuf> {
        let target = self.mount_point(id);
        let data = self.mount_options(id)?;
        if data.len() >= MAX_OPTIONS_LEN {
            return Err(HostrootError::Mount {
                operation: "mount",
                target,
                message: format!(
                    "aufs branch list is {} bytes, limit is {MAX_OPTIONS_LEN}",
                    data.len()
                ),
            });
        }

        std::fs::create_dir_all(&target).map_err(|e| HostrootError::Io {
            path: target.clone(),
            source: e,
        })?;
        backend.mount("none", &target, NAME, &MountOptions::default(), Some(&data))?;
        tracing::info!(target = %target.display(), "aufs mounted");
        Ok(target)
    }

    fn put(&self, backend: &dyn MountBackend, id: &str) -> Result<()> {
        backend.unmount(&self.mount_point(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StoreFixture;
    use hostroot_core::testing::{Call, RecordingBackend};

    #[test]
    fn branches_list_rw_layer_then_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let _ = fixture
            .add_aufs_container("c1", "rw1", &["init1", "base1"])
            .expect("fixture");
        let home = fixture.store_root().join(NAME);
        let driver = Aufs::new(home.clone(), Path::new("/dev/shm"));

        let options = driver.mount_options("rw1").expect("options");
        assert_eq!(
            options,
            format!(
                "br:{}=rw:{}=ro+wh:{}=ro+wh,dio,xino=/dev/shm/aufs.xino",
                home.join("diff/rw1").display(),
                home.join("diff/init1").display(),
                home.join("diff/base1").display()
            )
        );
    }

    #[test]
    fn xino_follows_shm_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let _ = fixture
            .add_aufs_container("c1", "rw1", &[])
            .expect("fixture");
        let driver = Aufs::new(fixture.store_root().join(NAME), Path::new("/run/shm"));

        let options = driver.mount_options("rw1").expect("options");
        assert!(options.ends_with(",dio,xino=/run/shm/aufs.xino"));
    }

    #[test]
    fn get_mounts_on_mnt_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let _ = fixture
            .add_aufs_container("c1", "rw1", &["base1"])
            .expect("fixture");
        let home = fixture.store_root().join(NAME);
        let driver = Aufs::new(home.clone(), Path::new("/dev/shm"));
        let backend = RecordingBackend::new();

        let path = driver.get(&backend, "rw1").expect("get");

        assert_eq!(path, home.join("mnt/rw1"));
        assert!(path.is_dir());
        assert!(matches!(
            backend.calls().as_slice(),
            [Call::Mount { source, fstype, .. }] if source == "none" && fstype == "aufs"
        ));
    }

    #[test]
    fn missing_layers_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let home = dir.path().join(NAME);
        std::fs::create_dir_all(home.join("diff/rw1")).expect("mkdir");
        let driver = Aufs::new(home, Path::new("/dev/shm"));
        let backend = RecordingBackend::new();

        assert!(matches!(
            driver.get(&backend, "rw1"),
            Err(HostrootError::Io { .. })
        ));
        assert!(backend.calls().is_empty());
    }
}
