//! Root switch: pivot into the transplanted namespace and hand over to init.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use hostroot_common::error::{HostrootError, Result};
use hostroot_common::types::SwitchState;
use hostroot_core::filesystem::mount::MountBackend;
use hostroot_core::filesystem::pivot_root;
use hostroot_core::process::{Handoff, InitLauncher};

use crate::orchestrator::NamespaceTransplanted;

/// A fatal boot error together with the last state reached.
#[derive(Debug, thiserror::Error)]
#[error("boot failed after reaching {state}: {source}")]
pub struct BootFailure {
    /// Last state successfully reached.
    pub state: SwitchState,
    /// Cause of the failure.
    #[source]
    pub source: HostrootError,
}

impl BootFailure {
    /// Returns a closure that tags an error with `state`, for use with
    /// `map_err`.
    #[must_use]
    pub fn at(state: SwitchState) -> impl FnOnce(HostrootError) -> Self {
        move |source| Self { state, source }
    }
}

/// `pivot_root(2)` succeeded and the working directory is the new `/`.
#[derive(Debug)]
pub struct PivotedRoot {
    new_root: PathBuf,
}

impl PivotedRoot {
    /// Former path of the new root, as seen before the pivot.
    #[must_use]
    pub fn new_root(&self) -> &Path {
        &self.new_root
    }

    /// Replaces this process with `program`, passing `argv` and `env`
    /// through unchanged.
    pub fn exec_init(
        self,
        launcher: &dyn InitLauncher,
        program: &Path,
        argv: &[OsString],
        env: &[(OsString, OsString)],
    ) -> Handoff {
        tracing::info!(program = %program.display(), "handing over to init");
        launcher.exec(program, argv, env)
    }
}

impl NamespaceTransplanted {
    /// Pivots into the new root, placing the old root at the pivot target.
    ///
    /// # Errors
    ///
    /// Returns [`HostrootError::Pivot`] if the pivot or the `chdir` fails.
    pub fn pivot(self, backend: &dyn MountBackend) -> Result<PivotedRoot> {
        pivot_root::pivot_root(backend, &self.layer.path, &self.pivot_target)?;
        Ok(PivotedRoot {
            new_root: self.layer.path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_names_state() {
        let failure = BootFailure::at(SwitchState::NamespaceTransplanted)(HostrootError::Pivot {
            new_root: "/balena/overlay2/x/merged".into(),
            message: "EINVAL".into(),
        });
        let message = failure.to_string();
        assert!(message.contains("namespace-transplanted"));
        assert!(message.contains("EINVAL"));
    }
}
