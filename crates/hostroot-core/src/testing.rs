//! Recording doubles for the mount backend and init launcher.
//!
//! [`RecordingBackend`] keeps an in-memory mount table that follows the
//! kernel's rules closely enough for ordering tests: moving a mount carries
//! its submounts, detaching removes them, and operating on something that is
//! not a mount point fails.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use hostroot_common::error::{HostrootError, Result};

use crate::filesystem::mount::{Access, MountBackend, MountOptions};
use crate::filesystem::mountinfo::MountEntry;
use crate::process::{Handoff, InitLauncher};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `mount(source, target, fstype, data)`.
    Mount {
        /// Mount source.
        source: String,
        /// Mount point.
        target: PathBuf,
        /// Filesystem type.
        fstype: String,
        /// Mount data string.
        data: Option<String>,
    },
    /// Remount, optionally per-mount (`MS_BIND`).
    Remount {
        /// Mount point.
        target: PathBuf,
        /// Requested access.
        access: Access,
        /// Whether only this mount was affected.
        bind: bool,
    },
    /// Bind mount.
    Bind {
        /// Bound directory.
        source: PathBuf,
        /// Mount point.
        target: PathBuf,
    },
    /// `MS_MOVE`.
    Move {
        /// Old mount point.
        source: PathBuf,
        /// New mount point.
        target: PathBuf,
    },
    /// Propagation change to private.
    MakePrivate {
        /// Mount point.
        target: PathBuf,
    },
    /// Lazy unmount.
    Unmount {
        /// Mount point.
        target: PathBuf,
    },
    /// `pivot_root(2)`.
    PivotRoot {
        /// New root.
        new_root: PathBuf,
        /// Old root destination.
        put_old: PathBuf,
    },
    /// `chdir(2)`.
    Chdir {
        /// New working directory.
        path: PathBuf,
    },
}

type FailurePredicate = Box<dyn Fn(&Call) -> bool>;

/// Mount backend that records calls instead of performing them.
pub struct RecordingBackend {
    calls: RefCell<Vec<Call>>,
    table: RefCell<Vec<MountEntry>>,
    failures: Vec<FailurePredicate>,
}

impl fmt::Debug for RecordingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingBackend")
            .field("calls", &self.calls.borrow())
            .field("table", &self.table.borrow())
            .field("failures", &self.failures.len())
            .finish()
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// Creates a backend with an empty mount table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mounts(Vec::new())
    }

    /// Creates a backend whose mount table starts with `entries`.
    #[must_use]
    pub fn with_mounts(entries: Vec<MountEntry>) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            table: RefCell::new(entries),
            failures: Vec::new(),
        }
    }

    /// Makes every call matching `predicate` fail after being recorded.
    #[must_use]
    pub fn fail_when(mut self, predicate: impl Fn(&Call) -> bool + 'static) -> Self {
        self.failures.push(Box::new(predicate));
        self
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Returns the mount points currently in the modelled table.
    #[must_use]
    pub fn mountpoints(&self) -> Vec<PathBuf> {
        self.table
            .borrow()
            .iter()
            .map(|entry| entry.mountpoint.clone())
            .collect()
    }

    fn record(&self, call: Call) -> bool {
        let failing = self.failures.iter().any(|predicate| predicate(&call));
        self.calls.borrow_mut().push(call);
        !failing
    }

    fn has_mount(&self, target: &Path) -> bool {
        self.table
            .borrow()
            .iter()
            .any(|entry| entry.mountpoint == target)
    }
}

fn injected(operation: &'static str, target: &Path, message: &str) -> HostrootError {
    HostrootError::Mount {
        operation,
        target: target.to_path_buf(),
        message: message.to_string(),
    }
}

impl MountBackend for RecordingBackend {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        _options: &MountOptions,
        data: Option<&str>,
    ) -> Result<()> {
        let call = Call::Mount {
            source: source.to_string(),
            target: target.to_path_buf(),
            fstype: fstype.to_string(),
            data: data.map(str::to_string),
        };
        if !self.record(call) {
            return Err(injected("mount", target, "injected failure"));
        }
        self.table
            .borrow_mut()
            .push(MountEntry::new(source, target, fstype));
        Ok(())
    }

    fn remount(&self, target: &Path, access: Access) -> Result<()> {
        let call = Call::Remount {
            target: target.to_path_buf(),
            access,
            bind: false,
        };
        if !self.record(call) {
            return Err(injected("remount", target, "injected failure"));
        }
        if !self.has_mount(target) {
            return Err(injected("remount", target, "not a mount point"));
        }
        Ok(())
    }

    fn remount_bind(&self, target: &Path, access: Access) -> Result<()> {
        let call = Call::Remount {
            target: target.to_path_buf(),
            access,
            bind: true,
        };
        if !self.record(call) {
            return Err(injected("remount", target, "injected failure"));
        }
        if !self.has_mount(target) {
            return Err(injected("remount", target, "not a mount point"));
        }
        Ok(())
    }

    fn bind(&self, source: &Path, target: &Path) -> Result<()> {
        let call = Call::Bind {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        };
        if !self.record(call) {
            return Err(injected("bind", target, "injected failure"));
        }
        self.table.borrow_mut().push(MountEntry::new(
            source.display().to_string(),
            target,
            "none",
        ));
        Ok(())
    }

    fn move_mount(&self, source: &Path, target: &Path) -> Result<()> {
        let call = Call::Move {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        };
        if !self.record(call) {
            return Err(injected("move", target, "injected failure"));
        }
        if !self.has_mount(source) {
            return Err(injected("move", target, "source is not a mount point"));
        }
        for entry in self.table.borrow_mut().iter_mut() {
            if let Ok(rest) = entry.mountpoint.strip_prefix(source) {
                entry.mountpoint = if rest.as_os_str().is_empty() {
                    target.to_path_buf()
                } else {
                    target.join(rest)
                };
            }
        }
        Ok(())
    }

    fn make_private(&self, target: &Path) -> Result<()> {
        let call = Call::MakePrivate {
            target: target.to_path_buf(),
        };
        if !self.record(call) {
            return Err(injected("make-private", target, "injected failure"));
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        let call = Call::Unmount {
            target: target.to_path_buf(),
        };
        if !self.record(call) {
            return Err(injected("unmount", target, "injected failure"));
        }
        if !self.has_mount(target) {
            return Err(injected("unmount", target, "not a mount point"));
        }
        self.table
            .borrow_mut()
            .retain(|entry| !entry.mountpoint.starts_with(target));
        Ok(())
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        let call = Call::PivotRoot {
            new_root: new_root.to_path_buf(),
            put_old: put_old.to_path_buf(),
        };
        if !self.record(call) {
            return Err(HostrootError::Pivot {
                new_root: new_root.to_path_buf(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        let call = Call::Chdir {
            path: path.to_path_buf(),
        };
        if !self.record(call) {
            return Err(HostrootError::Pivot {
                new_root: path.to_path_buf(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn mount_table(&self) -> Result<Vec<MountEntry>> {
        Ok(self.table.borrow().clone())
    }
}

/// A recorded init execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    /// Program path.
    pub program: PathBuf,
    /// Full argument vector including `argv[0]`.
    pub argv: Vec<OsString>,
    /// Number of environment entries passed.
    pub env_len: usize,
}

/// Init launcher that records the request and reports success or failure.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    calls: RefCell<Vec<ExecCall>>,
    fail: bool,
}

impl RecordingLauncher {
    /// Creates a launcher whose exec "succeeds".
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a launcher whose exec fails with `ENOENT`.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    /// Returns every exec request so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ExecCall> {
        self.calls.borrow().clone()
    }
}

impl InitLauncher for RecordingLauncher {
    fn exec(&self, program: &Path, argv: &[OsString], env: &[(OsString, OsString)]) -> Handoff {
        self.calls.borrow_mut().push(ExecCall {
            program: program.to_path_buf(),
            argv: argv.to_vec(),
            env_len: env.len(),
        });
        if self.fail {
            return Handoff::Failed(HostrootError::Exec {
                program: program.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Handoff::Replaced
    }
}
