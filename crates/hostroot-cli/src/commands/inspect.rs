//! Inspection mode: mount another system root's active container.

use std::path::PathBuf;

use anyhow::Context;
use hostroot_common::config::RootSwitchConfig;
use hostroot_runtime::engine::Engine;

use crate::output;

/// Inspection parameters taken from the command line.
#[derive(Debug, Clone)]
pub struct InspectArgs {
    /// System root holding the layer store.
    pub sysroot: PathBuf,
    /// Optional bind destination.
    pub mount_dest: Option<PathBuf>,
    /// Print JSON instead of the bare path.
    pub json: bool,
}

/// Mounts the container and prints where it is.
///
/// # Errors
///
/// Returns an error if the container cannot be resolved or mounted.
pub fn execute(config: RootSwitchConfig, args: &InspectArgs) -> anyhow::Result<()> {
    let engine = Engine::new(config);
    let inspection = engine
        .inspect(&args.sysroot, args.mount_dest.as_deref())
        .with_context(|| format!("inspecting {}", args.sysroot.display()))?;

    println!("{}", output::render(&inspection, args.json)?);
    Ok(())
}
