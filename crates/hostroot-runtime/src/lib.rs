//! Root switch procedures for the hostroot init shim.
//!
//! Boot mode runs, in order:
//! - [`descriptor`]: read the storage driver and active container id.
//! - [`orchestrator`]: prepare the host root, mount the container layer via
//!   [`adapter`], and move the boot-time mounts into it.
//! - [`switch`]: pivot into the new root and execute its init.
//!
//! [`inspect`] mounts another system root's container without switching.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod adapter;
pub mod descriptor;
pub mod engine;
pub mod inspect;
pub mod orchestrator;
pub mod switch;
