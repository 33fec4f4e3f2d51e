//! Boot mode: switch the root to the active container and exec its init.

use hostroot_common::config::RootSwitchConfig;
use hostroot_runtime::engine::Engine;

/// Runs the boot sequence. Only returns if it fails.
///
/// # Errors
///
/// Returns the boot failure, naming the last state reached.
pub fn execute(config: RootSwitchConfig) -> anyhow::Result<()> {
    let argv: Vec<_> = std::env::args_os().collect();
    let env: Vec<_> = std::env::vars_os().collect();

    tracing::info!(init = %config.init_program.display(), "starting root switch");
    let engine = Engine::new(config);
    engine.boot(&argv, &env)?;
    Ok(())
}
