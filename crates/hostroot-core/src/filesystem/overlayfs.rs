//! `OverlayFS` mounting for union-filesystem layers.
//!
//! Stacks read-only lower layers under a single writable upper layer.

use std::path::{Path, PathBuf};

use hostroot_common::error::{HostrootError, Result};

use super::mount::{MountBackend, MountOptions};

/// The kernel copies mount data into a single page.
pub const MAX_OPTIONS_LEN: usize = 4096;

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Read-only lower layers, topmost first.
    pub lower_dirs: Vec<PathBuf>,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Returns the `mount(2)` data string for this overlay.
    #[must_use]
    pub fn mount_options(&self) -> String {
        let lowers = self
            .lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>();
        format_options(
            &lowers,
            &self.upper_dir.display().to_string(),
            &self.work_dir.display().to_string(),
        )
    }

    /// Returns the data string with every directory relative to `base`, or
    /// `None` if one of them lies outside it.
    #[must_use]
    pub fn relative_mount_options(&self, base: &Path) -> Option<String> {
        let relative = |path: &Path| {
            path.strip_prefix(base)
                .ok()
                .map(|rest| rest.display().to_string())
        };
        let lowers = self
            .lower_dirs
            .iter()
            .map(|p| relative(p.as_path()))
            .collect::<Option<Vec<_>>>()?;
        Some(format_options(
            &lowers,
            &relative(self.upper_dir.as_path())?,
            &relative(self.work_dir.as_path())?,
        ))
    }
}

fn format_options(lowers: &[String], upper: &str, work: &str) -> String {
    format!(
        "lowerdir={},upperdir={upper},workdir={work}",
        lowers.join(":")
    )
}

fn check_length(options: &str, target: &Path) -> Result<()> {
    if options.len() >= MAX_OPTIONS_LEN {
        return Err(HostrootError::Mount {
            operation: "mount",
            target: target.to_path_buf(),
            message: format!(
                "overlay options are {} bytes, limit is {MAX_OPTIONS_LEN}",
                options.len()
            ),
        });
    }
    Ok(())
}

fn create_merged(config: &OverlayConfig) -> Result<()> {
    std::fs::create_dir_all(&config.merged_dir).map_err(|e| HostrootError::Io {
        path: config.merged_dir.clone(),
        source: e,
    })
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the merged directory if it does not exist, then mounts.
///
/// # Errors
///
/// Returns an error if the options exceed one page, if the merged directory
/// cannot be created, or if the mount fails.
pub fn mount_overlay(backend: &dyn MountBackend, config: &OverlayConfig) -> Result<()> {
    let opts = config.mount_options();
    check_length(&opts, &config.merged_dir)?;
    create_merged(config)?;

    backend.mount(
        "overlay",
        &config.merged_dir,
        "overlay",
        &MountOptions::default(),
        Some(opts.as_str()),
    )?;

    tracing::info!(
        merged = %config.merged_dir.display(),
        lowers = config.lower_dirs.len(),
        "overlayfs mounted"
    );
    Ok(())
}

/// Mounts an `OverlayFS` whose layer paths are given relative to `base`.
///
/// The kernel resolves relative layer paths against the working directory,
/// so the mount runs from inside `base`. The previous working directory is
/// restored afterwards whether or not the mount succeeded.
///
/// # Errors
///
/// Returns an error if a layer directory is outside `base`, if the relative
/// options still exceed one page, or if changing directory or mounting fails.
pub fn mount_overlay_from(
    backend: &dyn MountBackend,
    config: &OverlayConfig,
    base: &Path,
) -> Result<()> {
    let opts = config
        .relative_mount_options(base)
        .ok_or_else(|| HostrootError::Mount {
            operation: "mount",
            target: config.merged_dir.clone(),
            message: format!("overlay directories are not under {}", base.display()),
        })?;
    check_length(&opts, &config.merged_dir)?;
    create_merged(config)?;

    let previous = std::env::current_dir().map_err(|e| HostrootError::Io {
        path: base.to_path_buf(),
        source: e,
    })?;
    backend.chdir(base)?;
    let mounted = backend.mount(
        "overlay",
        &config.merged_dir,
        "overlay",
        &MountOptions::default(),
        Some(opts.as_str()),
    );
    backend.chdir(&previous)?;
    mounted?;

    tracing::info!(
        merged = %config.merged_dir.display(),
        base = %base.display(),
        lowers = config.lower_dirs.len(),
        "overlayfs mounted with relative layer paths"
    );
    Ok(())
}

/// Unmounts an `OverlayFS` at the given path.
///
/// # Errors
///
/// Returns an error if the unmount fails.
pub fn unmount_overlay(backend: &dyn MountBackend, merged_dir: &Path) -> Result<()> {
    backend.unmount(merged_dir)?;
    tracing::info!(path = %merged_dir.display(), "overlayfs unmounted");
    Ok(())
}
