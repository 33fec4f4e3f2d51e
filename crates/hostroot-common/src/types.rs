//! Domain primitive types used across the hostroot workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the container whose filesystem becomes the new root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a union-filesystem graph driver (`overlay2`, `aufs`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverName(String);

impl DriverName {
    /// Creates a driver name from a string value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Facts read from the system root that select what to boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootDescriptor {
    /// Graph driver that owns the container's layers.
    pub driver: DriverName,
    /// Container whose read-write layer becomes the new root.
    pub container_id: ContainerId,
}

/// Progress of the root switch.
///
/// Transitions only move forward; a failure reports the last state reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchState {
    /// Nothing has been mutated yet.
    Unconfigured,
    /// `/` is writable and the shared-memory tmpfs is mounted.
    RootPrepared,
    /// The container layer is mounted and boot-time mounts were relocated into it.
    NamespaceTransplanted,
    /// `pivot_root(2)` succeeded.
    PivotedRoot,
    /// The init program replaced this process.
    Replaced,
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "unconfigured"),
            Self::RootPrepared => write!(f, "root-prepared"),
            Self::NamespaceTransplanted => write!(f, "namespace-transplanted"),
            Self::PivotedRoot => write!(f, "pivoted-root"),
            Self::Replaced => write!(f, "replaced"),
        }
    }
}
