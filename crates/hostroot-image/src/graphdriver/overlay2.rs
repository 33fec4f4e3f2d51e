//! `overlay2` graph driver.
//!
//! Layout of a layer `<id>` under the driver home:
//!
//! ```text
//! <id>/diff     upper (writable) directory
//! <id>/work     overlay work directory
//! <id>/merged   mount point
//! <id>/lower    "l/AAA:l/BBB", shortened lower links relative to the home
//! l/<short>     symlinks to the lower layers' diff directories
//! ```
//!
//! A layer without a `lower` file is a base layer; its `diff` directory is
//! used as-is without mounting.
//!
//! Deep layer chains overflow the one-page mount data limit with absolute
//! paths. Those layers are mounted from inside the home with relative paths.

use std::path::{Path, PathBuf};

use hostroot_common::error::Result;
use hostroot_core::filesystem::mount::MountBackend;
use hostroot_core::filesystem::overlayfs::{self, OverlayConfig};

use super::{GraphDriver, read_trimmed};

/// Driver name.
pub const NAME: &str = "overlay2";

const DIFF_DIR: &str = "diff";
const WORK_DIR: &str = "work";
const MERGED_DIR: &str = "merged";
const LOWER_FILE: &str = "lower";

/// The `overlay2` driver.
#[derive(Debug, Clone)]
pub struct Overlay2 {
    home: PathBuf,
}

impl Overlay2 {
    /// Creates the driver for the given home directory.
    #[must_use]
    pub const fn new(home: PathBuf) -> Self {
        Self { home }
    }

    fn layer_dir(&self, id: &str) -> PathBuf {
        self.home.join(id)
    }

    fn lowers(&self, id: &str) -> Result<Option<Vec<PathBuf>>> {
        let lower = read_trimmed(&self.layer_dir(id).join(LOWER_FILE))?;
        Ok(lower.map(|links| {
            links
                .split(':')
                .filter(|link| !link.is_empty())
                .map(|link| self.home.join(link))
                .collect()
        }))
    }

    /// Builds the overlay configuration for layer `id`, or `None` for a base layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the `lower` file exists but cannot be read.
    pub fn overlay_config(&self, id: &str) -> Result<Option<OverlayConfig>> {
        let dir = self.layer_dir(id);
        Ok(self.lowers(id)?.map(|lower_dirs| OverlayConfig {
            lower_dirs,
            upper_dir: dir.join(DIFF_DIR),
            work_dir: dir.join(WORK_DIR),
            merged_dir: dir.join(MERGED_DIR),
        }))
    }
}

impl GraphDriver for Overlay2 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn home(&self) -> &Path {
        &self.home
    }

    fn exists(&self, id: &str) -> bool {
        self.layer_dir(id).join(DIFF_DIR).is_dir()
    }

    fn mount_point(&self, id: &str) -> PathBuf {
        self.layer_dir(id).join(MERGED_DIR)
    }

    fn get(&self, backend: &dyn MountBackend, id: &str) -> Result<PathBuf> {
        let Some(config) = self.overlay_config(id)? else {
            let diff = self.layer_dir(id).join(DIFF_DIR);
            tracing::debug!(id, diff = %diff.display(), "base layer, using diff directly");
            return Ok(diff);
        };
        if config.mount_options().len() < overlayfs::MAX_OPTIONS_LEN {
            overlayfs::mount_overlay(backend, &config)?;
        } else {
            tracing::debug!(id, "overlay options exceed a page, using paths relative to home");
            overlayfs::mount_overlay_from(backend, &config, &self.home)?;
        }
        Ok(config.merged_dir)
    }

    fn put(&self, backend: &dyn MountBackend, id: &str) -> Result<()> {
        if self.lowers(id)?.is_none() {
            return Ok(());
        }
        overlayfs::unmount_overlay(backend, &self.mount_point(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StoreFixture;
    use hostroot_core::testing::{Call, RecordingBackend};

    #[test]
    fn get_mounts_overlay_with_resolved_lowers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let layer = fixture
            .add_overlay2_container("c1", "mnt-c1", &["l/AAA", "l/BBB"])
            .expect("fixture");
        let driver = Overlay2::new(fixture.store_root().join(NAME));
        let backend = RecordingBackend::new();

        let path = driver.get(&backend, "mnt-c1").expect("get");

        assert_eq!(path, layer.join("merged"));
        let home = fixture.store_root().join(NAME);
        let expected = format!(
            "lowerdir={}:{},upperdir={},workdir={}",
            home.join("l/AAA").display(),
            home.join("l/BBB").display(),
            layer.join("diff").display(),
            layer.join("work").display()
        );
        assert_eq!(
            backend.calls(),
            vec![Call::Mount {
                source: "overlay".into(),
                target: layer.join("merged"),
                fstype: "overlay".into(),
                data: Some(expected),
            }]
        );
    }

    #[test]
    fn deep_layer_chain_mounts_with_relative_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(&dir.path().join("x".repeat(40)));
        let links: Vec<String> = (0..150).map(|i| format!("l/L{i:05}")).collect();
        let lowers: Vec<&str> = links.iter().map(String::as_str).collect();
        let layer = fixture
            .add_overlay2_container("c1", "deep", &lowers)
            .expect("fixture");
        let home = fixture.store_root().join(NAME);
        let driver = Overlay2::new(home.clone());
        let backend = RecordingBackend::new();

        let path = driver.get(&backend, "deep").expect("get");

        assert_eq!(path, layer.join("merged"));
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::Chdir { path: home });
        assert!(matches!(
            &calls[1],
            Call::Mount { data: Some(data), .. }
                if data.starts_with("lowerdir=l/L00000:l/L00001:")
                    && data.ends_with(",upperdir=deep/diff,workdir=deep/work")
        ));
        assert!(matches!(calls[2], Call::Chdir { .. }));
    }

    #[test]
    fn base_layer_returns_diff_without_mounting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let layer = fixture
            .add_overlay2_container("c1", "base", &[])
            .expect("fixture");
        let driver = Overlay2::new(fixture.store_root().join(NAME));
        let backend = RecordingBackend::new();

        assert_eq!(driver.get(&backend, "base").expect("get"), layer.join("diff"));
        driver.put(&backend, "base").expect("put");
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn put_detaches_merged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let layer = fixture
            .add_overlay2_container("c1", "mnt-c1", &["l/AAA"])
            .expect("fixture");
        let driver = Overlay2::new(fixture.store_root().join(NAME));
        let backend = RecordingBackend::new();

        let _ = driver.get(&backend, "mnt-c1").expect("get");
        driver.put(&backend, "mnt-c1").expect("put");

        assert_eq!(
            backend.calls().last(),
            Some(&Call::Unmount {
                target: layer.join("merged")
            })
        );
        assert!(backend.mountpoints().is_empty());
    }

    #[test]
    fn exists_checks_diff_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = StoreFixture::new(dir.path());
        let _ = fixture
            .add_overlay2_container("c1", "mnt-c1", &["l/AAA"])
            .expect("fixture");
        let driver = Overlay2::new(fixture.store_root().join(NAME));
        assert!(driver.exists("mnt-c1"));
        assert!(!driver.exists("missing"));
    }
}
