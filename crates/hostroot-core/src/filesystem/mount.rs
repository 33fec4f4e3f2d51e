//! Mount backend for the root switch.
//!
//! [`MountBackend`] is the only path to the kernel's mount table. The Linux
//! implementation issues raw syscalls through `nix`; tests substitute the
//! recording double from [`crate::testing`].

use std::path::{Path, PathBuf};

use hostroot_common::error::{HostrootError, Result};

use super::mountinfo::{self, MountEntry};

/// Access mode applied by a remount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Clear `MS_RDONLY`.
    ReadWrite,
    /// Set `MS_RDONLY`.
    ReadOnly,
}

/// Flags applied to a fresh mount.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Read-only mount.
    pub readonly: bool,
    /// Ignore set-user-ID bits.
    pub nosuid: bool,
    /// Disallow device files.
    pub nodev: bool,
    /// Disallow program execution.
    pub noexec: bool,
}

impl MountOptions {
    /// Options for the shared-memory tmpfs.
    #[must_use]
    pub const fn tmpfs() -> Self {
        Self {
            readonly: false,
            nosuid: true,
            nodev: true,
            noexec: false,
        }
    }

    #[cfg(target_os = "linux")]
    fn flags(self) -> nix::mount::MsFlags {
        use nix::mount::MsFlags;

        let mut flags = MsFlags::empty();
        if self.readonly {
            flags |= MsFlags::MS_RDONLY;
        }
        if self.nosuid {
            flags |= MsFlags::MS_NOSUID;
        }
        if self.nodev {
            flags |= MsFlags::MS_NODEV;
        }
        if self.noexec {
            flags |= MsFlags::MS_NOEXEC;
        }
        flags
    }
}

/// Privileged mount-namespace operations needed by the root switch.
///
/// Implementations act on the calling process's mount namespace. None of the
/// methods retry; callers decide whether a failure is fatal.
pub trait MountBackend {
    /// Mounts a new filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Mount`] if `mount(2)` fails.
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &MountOptions,
        data: Option<&str>,
    ) -> Result<()>;

    /// Changes the access mode of the filesystem mounted at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Mount`] if the remount fails.
    fn remount(&self, target: &Path, access: Access) -> Result<()>;

    /// Changes the access mode of the single mount at `target` without
    /// touching other mounts of the same superblock.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Mount`] if the remount fails.
    fn remount_bind(&self, target: &Path, access: Access) -> Result<()>;

    /// Bind-mounts `source` onto `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Mount`] if the bind fails.
    fn bind(&self, source: &Path, target: &Path) -> Result<()>;

    /// Moves the mount at `source` (and everything below it) to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Mount`] if `MS_MOVE` fails.
    fn move_mount(&self, source: &Path, target: &Path) -> Result<()>;

    /// Sets private propagation on the mount at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Mount`] if the propagation change fails.
    fn make_private(&self, target: &Path) -> Result<()>;

    /// Lazily detaches the mount at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Mount`] if `umount2(2)` fails.
    fn unmount(&self, target: &Path) -> Result<()>;

    /// Makes `new_root` the root mount, moving the old root to `put_old`.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Pivot`] if `pivot_root(2)` fails.
    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()>;

    /// Changes the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Pivot`] if `chdir(2)` fails.
    fn chdir(&self, path: &Path) -> Result<()>;

    /// Returns the current mount table in kernel order.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount table cannot be read.
    fn mount_table(&self) -> Result<Vec<MountEntry>>;

    /// Returns `true` if something is mounted exactly at `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount table cannot be read.
    fn is_mounted(&self, target: &Path) -> Result<bool> {
        Ok(self
            .mount_table()?
            .iter()
            .any(|entry| entry.mountpoint == target))
    }
}

/// Backend that issues the syscalls against the running kernel.
#[derive(Debug, Clone)]
pub struct LinuxMountBackend {
    mountinfo_path: PathBuf,
}

impl LinuxMountBackend {
    /// Creates a backend that enumerates mounts from `/proc/self/mountinfo`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mountinfo(hostroot_common::constants::MOUNTINFO_PATH)
    }

    /// Creates a backend that enumerates mounts from a custom mountinfo file.
    #[must_use]
    pub fn with_mountinfo(path: impl Into<PathBuf>) -> Self {
        Self {
            mountinfo_path: path.into(),
        }
    }
}

impl Default for LinuxMountBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn mount_error(operation: &'static str, target: &Path, err: nix::Error) -> HostrootError {
    HostrootError::Mount {
        operation,
        target: target.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(target_os = "linux")]
impl MountBackend for LinuxMountBackend {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &MountOptions,
        data: Option<&str>,
    ) -> Result<()> {
        tracing::debug!(source, target = %target.display(), fstype, "mounting filesystem");
        nix::mount::mount(Some(source), target, Some(fstype), options.flags(), data)
            .map_err(|e| mount_error("mount", target, e))
    }

    fn remount(&self, target: &Path, access: Access) -> Result<()> {
        use nix::mount::MsFlags;

        tracing::debug!(target = %target.display(), ?access, "remounting");
        let mut flags = MsFlags::MS_REMOUNT;
        if access == Access::ReadOnly {
            flags |= MsFlags::MS_RDONLY;
        }
        nix::mount::mount(None::<&str>, target, None::<&str>, flags, None::<&str>)
            .map_err(|e| mount_error("remount", target, e))
    }

    fn remount_bind(&self, target: &Path, access: Access) -> Result<()> {
        use nix::mount::MsFlags;

        tracing::debug!(target = %target.display(), ?access, "remounting bind mount");
        let mut flags = MsFlags::MS_REMOUNT | MsFlags::MS_BIND;
        if access == Access::ReadOnly {
            flags |= MsFlags::MS_RDONLY;
        }
        nix::mount::mount(None::<&str>, target, None::<&str>, flags, None::<&str>)
            .map_err(|e| mount_error("remount", target, e))
    }

    fn bind(&self, source: &Path, target: &Path) -> Result<()> {
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "creating bind mount"
        );
        nix::mount::mount(
            Some(source),
            target,
            None::<&str>,
            nix::mount::MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|e| mount_error("bind", target, e))
    }

    fn move_mount(&self, source: &Path, target: &Path) -> Result<()> {
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "moving mount"
        );
        nix::mount::mount(
            Some(source),
            target,
            None::<&str>,
            nix::mount::MsFlags::MS_MOVE,
            None::<&str>,
        )
        .map_err(|e| mount_error("move", target, e))
    }

    fn make_private(&self, target: &Path) -> Result<()> {
        tracing::debug!(target = %target.display(), "making mount private");
        nix::mount::mount(
            None::<&str>,
            target,
            None::<&str>,
            nix::mount::MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(|e| mount_error("make-private", target, e))
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        tracing::debug!(target = %target.display(), "detaching mount");
        nix::mount::umount2(target, nix::mount::MntFlags::MNT_DETACH)
            .map_err(|e| mount_error("unmount", target, e))
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        nix::unistd::pivot_root(new_root, put_old).map_err(|e| HostrootError::Pivot {
            new_root: new_root.to_path_buf(),
            message: format!("pivot_root to {}: {e}", put_old.display()),
        })
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        nix::unistd::chdir(path).map_err(|e| HostrootError::Pivot {
            new_root: path.to_path_buf(),
            message: format!("chdir: {e}"),
        })
    }

    fn mount_table(&self) -> Result<Vec<MountEntry>> {
        mountinfo::read(&self.mountinfo_path)
    }
}

#[cfg(not(target_os = "linux"))]
fn unsupported(target: &Path) -> HostrootError {
    HostrootError::Mount {
        operation: "mount",
        target: target.to_path_buf(),
        message: "Linux required for root switching".into(),
    }
}

/// Stub for non-Linux platforms: every operation fails.
#[cfg(not(target_os = "linux"))]
impl MountBackend for LinuxMountBackend {
    fn mount(
        &self,
        _source: &str,
        target: &Path,
        _fstype: &str,
        _options: &MountOptions,
        _data: Option<&str>,
    ) -> Result<()> {
        Err(unsupported(target))
    }

    fn remount(&self, target: &Path, _access: Access) -> Result<()> {
        Err(unsupported(target))
    }

    fn remount_bind(&self, target: &Path, _access: Access) -> Result<()> {
        Err(unsupported(target))
    }

    fn bind(&self, _source: &Path, target: &Path) -> Result<()> {
        Err(unsupported(target))
    }

    fn move_mount(&self, _source: &Path, target: &Path) -> Result<()> {
        Err(unsupported(target))
    }

    fn make_private(&self, target: &Path) -> Result<()> {
        Err(unsupported(target))
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        Err(unsupported(target))
    }

    fn pivot_root(&self, new_root: &Path, _put_old: &Path) -> Result<()> {
        Err(unsupported(new_root))
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        Err(unsupported(path))
    }

    fn mount_table(&self) -> Result<Vec<MountEntry>> {
        mountinfo::read(&self.mountinfo_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmpfs_options_are_nosuid_nodev() {
        let options = MountOptions::tmpfs();
        assert!(options.nosuid);
        assert!(options.nodev);
        assert!(!options.readonly);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn flags_translate_each_option() {
        use nix::mount::MsFlags;

        let options = MountOptions {
            readonly: true,
            nosuid: true,
            nodev: false,
            noexec: true,
        };
        assert_eq!(
            options.flags(),
            MsFlags::MS_RDONLY | MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC
        );
        assert_eq!(MountOptions::default().flags(), MsFlags::empty());
    }

    #[test]
    fn mount_table_reads_configured_mountinfo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mountinfo");
        std::fs::write(&path, "23 22 0:21 / /proc rw - proc proc rw\n").expect("write");

        let backend = LinuxMountBackend::with_mountinfo(&path);
        let table = backend.mount_table().expect("mount table");
        assert_eq!(table, vec![MountEntry::new("proc", "/proc", "proc")]);
        assert!(backend.is_mounted(Path::new("/proc")).expect("is_mounted"));
        assert!(!backend.is_mounted(Path::new("/sys")).expect("is_mounted"));
    }
}
