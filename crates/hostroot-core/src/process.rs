//! Replacing the running process with the new root's init.

use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use hostroot_common::error::HostrootError;

/// Outcome of handing control to init.
#[derive(Debug)]
pub enum Handoff {
    /// The process image was replaced. Only test doubles ever return this.
    Replaced,
    /// `execve` failed; the caller still owns the process.
    Failed(HostrootError),
}

/// Capability to replace the current process image.
pub trait InitLauncher {
    /// Executes `program` with `argv` (including `argv[0]`) and `env`.
    fn exec(&self, program: &Path, argv: &[OsString], env: &[(OsString, OsString)]) -> Handoff;
}

/// Launcher that calls `execve(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecLauncher;

impl InitLauncher for ExecLauncher {
    fn exec(&self, program: &Path, argv: &[OsString], env: &[(OsString, OsString)]) -> Handoff {
        tracing::info!(program = %program.display(), args = argv.len(), "executing init");

        let (arg0, rest) = argv
            .split_first()
            .map_or((program.as_os_str(), &[][..]), |(first, rest)| {
                (first.as_os_str(), rest)
            });

        let err = Command::new(program)
            .arg0(arg0)
            .args(rest)
            .env_clear()
            .envs(env.iter().map(|(key, value)| (key, value)))
            .exec();

        Handoff::Failed(HostrootError::Exec {
            program: program.to_path_buf(),
            source: err,
        })
    }
}
