//! # hostroot-core
//!
//! Low-level Linux primitives used to switch the root filesystem.
//!
//! This crate provides:
//! - **Filesystem**: the [`MountBackend`](filesystem::mount::MountBackend)
//!   capability over `mount(2)`, `umount2(2)` and `pivot_root(2)`, mount
//!   table parsing, and `OverlayFS` option construction.
//! - **Process**: replacing the running process with the new root's init.
//! - **Testing** (feature `testing`): recording doubles that model the mount
//!   table in memory so the boot procedure can be exercised unprivileged.
//!
//! Every kernel call goes through a trait so orchestration code never talks
//! to the kernel directly.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod process;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
