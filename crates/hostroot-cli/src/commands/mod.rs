//! CLI definition and dispatch.
//!
//! Without `--sysroot` the process boots the active container; this is how
//! the kernel starts it as init. With `--sysroot` it only inspects.

pub mod boot;
pub mod inspect;

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use hostroot_common::config::RootSwitchConfig;

/// hostroot — boot a container's filesystem as the host root.
#[derive(Parser, Debug)]
#[command(name = "hostroot", version, about, long_about = None)]
pub struct Cli {
    /// Inspect the active container of this system root instead of booting
    /// (e.g. `/mnt/sysroot/inactive`). The mount path is printed to stdout.
    #[arg(long, visible_alias = "layer-root", value_name = "DIR")]
    pub sysroot: Option<PathBuf>,

    /// Bind the inspected container filesystem at this directory.
    #[arg(long, requires = "sysroot", value_name = "DIR")]
    pub mount_dest: Option<PathBuf>,

    /// Print the inspection result as JSON.
    #[arg(long, requires = "sysroot")]
    pub json: bool,

    /// JSON configuration file overriding the built-in paths.
    #[arg(long, env = "HOSTROOT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Init program executed inside the new root.
    #[arg(long, env = "HOSTROOT_INIT", value_name = "PATH")]
    pub init: Option<PathBuf>,

    /// Arguments passed on by the kernel. Init receives the full original
    /// command line regardless.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    pub init_args: Vec<OsString>,
}

impl Cli {
    /// Builds the configuration from the optional file and flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn config(&self) -> anyhow::Result<RootSwitchConfig> {
        let mut config = match &self.config {
            Some(path) => RootSwitchConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => RootSwitchConfig::default(),
        };
        if let Some(init) = &self.init {
            config.init_program.clone_from(init);
        }
        Ok(config)
    }
}

/// Dispatches to inspection or boot.
///
/// # Errors
///
/// Returns an error if the selected procedure fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config()?;
    match cli.sysroot {
        Some(sysroot) => inspect::execute(
            config,
            &inspect::InspectArgs {
                sysroot,
                mount_dest: cli.mount_dest,
                json: cli.json,
            },
        ),
        None => {
            tracing::debug!(kernel_args = cli.init_args.len(), "boot mode selected");
            boot::execute(config)
        }
    }
}
