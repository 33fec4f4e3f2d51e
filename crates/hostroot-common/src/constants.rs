//! System-wide constants and default paths.
//!
//! Paths without a leading `/` are relative to the system root being
//! inspected (the live `/` at boot, or the `--sysroot` directory).

/// Directory holding the layer store, relative to the system root.
pub const LAYER_DIR: &str = "balena";

/// Symlink whose target's final component is the active container id.
pub const CURRENT_LINK: &str = "current";

/// File holding the storage driver name of the active container.
pub const STORAGE_DRIVER_FILE: &str = "current/boot/storage-driver";

/// Layer metadata location relative to the store root; `%s` is the driver name.
pub const METADATA_TEMPLATE: &str = "image/%s/layerdb";

/// Placeholder substituted by the driver name in metadata templates.
pub const DRIVER_PLACEHOLDER: &str = "%s";

/// Where the old root ends up after the pivot, relative to the new root.
pub const PIVOT_DIR: &str = "mnt/sysroot/active";

/// Shared-memory tmpfs mounted before the container layer.
pub const SHM_DIR: &str = "/dev/shm";

/// Size bound for the shared-memory tmpfs.
pub const SHM_SIZE: &str = "64m";

/// Init program executed inside the new root.
pub const INIT_PROGRAM: &str = "/sbin/init";

/// Root of the live system.
pub const HOST_ROOT: &str = "/";

/// Kernel-maintained mount table of the calling process.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";
