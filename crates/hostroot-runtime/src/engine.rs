//! Engine wiring the root switch procedures to their capabilities.

use std::ffi::OsString;
use std::path::Path;

use hostroot_common::config::RootSwitchConfig;
use hostroot_common::error::Result;
use hostroot_common::types::SwitchState;
use hostroot_core::filesystem::mount::{LinuxMountBackend, MountBackend};
use hostroot_core::process::{ExecLauncher, Handoff, InitLauncher};
use hostroot_image::storage::{DiskStoreOpener, StoreOpener};

use crate::inspect::{self, Inspection};
use crate::switch::BootFailure;
use crate::{descriptor, orchestrator};

/// Runs the boot and inspection procedures.
///
/// Kernel access, process replacement, and the layer store are supplied as
/// capabilities so the whole sequence can run against test doubles.
#[derive(Debug)]
pub struct Engine<B = LinuxMountBackend, L = ExecLauncher, O = DiskStoreOpener> {
    backend: B,
    launcher: L,
    opener: O,
    config: RootSwitchConfig,
}

impl Engine {
    /// Creates an engine using the real kernel, `execve`, and the on-disk store.
    #[must_use]
    pub fn new(config: RootSwitchConfig) -> Self {
        let backend = LinuxMountBackend::with_mountinfo(config.mountinfo_path.clone());
        Self::with_parts(backend, ExecLauncher, DiskStoreOpener, config)
    }
}

impl<B, L, O> Engine<B, L, O>
where
    B: MountBackend,
    L: InitLauncher,
    O: StoreOpener,
{
    /// Creates an engine from explicit capabilities.
    #[must_use]
    pub const fn with_parts(backend: B, launcher: L, opener: O, config: RootSwitchConfig) -> Self {
        Self {
            backend,
            launcher,
            opener,
            config,
        }
    }

    /// Mount backend in use.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Init launcher in use.
    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RootSwitchConfig {
        &self.config
    }

    /// Switches the root to the active container and executes its init.
    ///
    /// `argv` (including `argv[0]`) and `env` are handed to init unchanged.
    /// With the real launcher this only returns on failure.
    ///
    /// # Errors
    ///
    /// Returns a [`BootFailure`] carrying the last state reached and the
    /// error that stopped the boot.
    pub fn boot(
        &self,
        argv: &[OsString],
        env: &[(OsString, OsString)],
    ) -> std::result::Result<(), BootFailure> {
        let config = &self.config;
        let descriptor = descriptor::resolve(&config.host_root, config)
            .map_err(BootFailure::at(SwitchState::Unconfigured))?;

        let prepared = orchestrator::prepare_host(&self.backend, config)
            .map_err(BootFailure::at(SwitchState::Unconfigured))?;
        tracing::info!(state = %SwitchState::RootPrepared, "host root prepared");

        let transplanted = prepared
            .transplant(&self.backend, &self.opener, config, &descriptor)
            .map_err(BootFailure::at(SwitchState::RootPrepared))?;
        tracing::info!(
            state = %SwitchState::NamespaceTransplanted,
            new_root = %transplanted.new_root().display(),
            "namespace transplanted"
        );

        let pivoted = transplanted
            .pivot(&self.backend)
            .map_err(BootFailure::at(SwitchState::NamespaceTransplanted))?;
        tracing::info!(state = %SwitchState::PivotedRoot, "root pivoted");

        match pivoted.exec_init(&self.launcher, &config.init_program, argv, env) {
            Handoff::Replaced => Ok(()),
            Handoff::Failed(source) => Err(BootFailure {
                state: SwitchState::PivotedRoot,
                source,
            }),
        }
    }

    /// Mounts the active container of `layer_root` for inspection.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution, store access, or mounting fails.
    pub fn inspect(&self, layer_root: &Path, mount_dest: Option<&Path>) -> Result<Inspection> {
        inspect::inspect(
            &self.backend,
            &self.opener,
            &self.config,
            layer_root,
            mount_dest,
        )
    }
}
