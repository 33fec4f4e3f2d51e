//! Root filesystem switching via `pivot_root(2)`.
//!
//! Unlike `chroot`, this changes the root mount of the whole mount
//! namespace. The old root stays reachable under `put_old`.

use std::path::Path;

use hostroot_common::error::{HostrootError, Result};

use super::mount::MountBackend;

/// Pivots into `new_root` and moves the working directory to the new `/`.
///
/// `put_old` must already exist beneath `new_root`; its absence is reported
/// before the kernel is asked to pivot.
///
/// # Errors
///
/// Returns [`HostrootError::Pivot`] if `put_old` is missing, or if the pivot
/// or the `chdir` fails.
pub fn pivot_root(backend: &dyn MountBackend, new_root: &Path, put_old: &Path) -> Result<()> {
    if !put_old.is_dir() {
        return Err(HostrootError::Pivot {
            new_root: new_root.to_path_buf(),
            message: format!("pivot target {} does not exist", put_old.display()),
        });
    }

    tracing::info!(
        new_root = %new_root.display(),
        put_old = %put_old.display(),
        "performing pivot_root"
    );
    backend.pivot_root(new_root, put_old)?;
    backend.chdir(Path::new("/"))?;
    tracing::debug!("pivot_root successful");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingBackend};

    #[test]
    fn pivot_then_chdir_to_new_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let put_old = dir.path().join("mnt/sysroot/active");
        std::fs::create_dir_all(&put_old).expect("mkdir");
        let backend = RecordingBackend::new();

        pivot_root(&backend, dir.path(), &put_old).expect("pivot");

        assert_eq!(
            backend.calls(),
            vec![
                Call::PivotRoot {
                    new_root: dir.path().to_path_buf(),
                    put_old,
                },
                Call::Chdir { path: "/".into() },
            ]
        );
    }

    #[test]
    fn missing_put_old_never_reaches_kernel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = RecordingBackend::new();

        let err = pivot_root(&backend, dir.path(), &dir.path().join("mnt/sysroot/active"))
            .expect_err("should fail");
        assert!(matches!(err, HostrootError::Pivot { .. }));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn failed_pivot_skips_chdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let put_old = dir.path().join("old");
        std::fs::create_dir_all(&put_old).expect("mkdir");
        let backend =
            RecordingBackend::new().fail_when(|call| matches!(call, Call::PivotRoot { .. }));

        assert!(pivot_root(&backend, dir.path(), &put_old).is_err());
        assert_eq!(backend.calls().len(), 1);
    }
}
