//! # hostroot-image
//!
//! Read-only access to a container engine's on-disk layer store.
//!
//! Handles:
//! - **Storage**: opening the store for one graph driver and resolving a
//!   container's read-write layer from the layer metadata.
//! - **Layers**: mounting and unmounting that read-write layer.
//! - **Graph drivers**: `overlay2` and `aufs` mount construction.
//!
//! Layers are never created, modified, or garbage-collected here.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod graphdriver;
pub mod layer;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
