//! Filesystem management for the root switch.
//!
//! Provides the mount backend, `/proc/self/mountinfo` parsing, `OverlayFS`
//! option strings, and the `pivot_root` handoff.

pub mod mount;
pub mod mountinfo;
pub mod overlayfs;
pub mod pivot_root;
