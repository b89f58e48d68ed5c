//! Host/device access lease state machine
//!
//! ```text
//!                 acquire_host                    acquire_device
//!   HostLeased <────────────────  Idle  ────────────────> DeviceLeased
//!        │                         ▲ ▲                          │
//!        └──────── release ────────┘ └──────── release ─────────┘
//! ```
//!
//! Acquiring from any state other than `Idle` is a `LockViolation` and
//! leaves the lease untouched. Independently of the lease, the allocation
//! tracks whether its memory is currently mapped into host address space
//! and in which direction. A host lease may be granted over an existing
//! map; a device lease is only granted once the map is gone.

use crate::domain::Direction;
use crate::error::MemoryError;
use std::fmt;

/// Which side of the bus holds the allocation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LeaseState {
    #[default]
    Idle,
    HostLeased,
    DeviceLeased,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseKind {
    Host,
    Device,
}

/// Mapping work required before a host lease can be granted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostMapPlan {
    /// Already mapped in the requested direction
    Reuse,
    /// Nothing mapped
    Map,
    /// Mapped in another direction, unmap then map again
    Remap,
}

/// Lease flags plus the current host map direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessLease {
    state: LeaseState,
    host_map: Option<Direction>,
}

impl AccessLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle lease over memory that is already mapped for the host
    pub fn with_host_map(direction: Direction) -> Self {
        Self {
            state: LeaseState::Idle,
            host_map: Some(direction),
        }
    }

    pub fn state(&self) -> LeaseState {
        self.state
    }

    pub fn is_host_locked(&self) -> bool {
        self.state == LeaseState::HostLeased
    }

    pub fn is_device_locked(&self) -> bool {
        self.state == LeaseState::DeviceLeased
    }

    pub fn host_map(&self) -> Option<Direction> {
        self.host_map
    }

    fn ensure_idle(&self, requested: LeaseKind) -> Result<(), MemoryError> {
        if self.state == LeaseState::Idle {
            Ok(())
        } else {
            Err(MemoryError::LockViolation {
                requested,
                state: self.state,
            })
        }
    }

    /// Decide what has to happen to the host map before a host lease in
    /// `requested` direction can be granted
    pub fn plan_host(&self, requested: Direction) -> Result<HostMapPlan, MemoryError> {
        self.ensure_idle(LeaseKind::Host)?;
        Ok(match self.host_map {
            Some(current) if current == requested => HostMapPlan::Reuse,
            Some(_) => HostMapPlan::Remap,
            None => HostMapPlan::Map,
        })
    }

    /// Check a device lease may be granted, returning whether an
    /// outstanding host map has to be removed first
    pub fn plan_device(&self) -> Result<bool, MemoryError> {
        self.ensure_idle(LeaseKind::Device)?;
        Ok(self.host_map.is_some())
    }

    pub fn grant_host(&mut self) -> Result<(), MemoryError> {
        self.ensure_idle(LeaseKind::Host)?;
        self.state = LeaseState::HostLeased;
        Ok(())
    }

    pub fn grant_device(&mut self) -> Result<(), MemoryError> {
        self.ensure_idle(LeaseKind::Device)?;
        if self.host_map.is_some() {
            return Err(MemoryError::InvalidRequest(
                "device lease requested while memory is mapped for the host".to_string(),
            ));
        }
        self.state = LeaseState::DeviceLeased;
        Ok(())
    }

    pub fn release(&mut self, kind: LeaseKind) -> Result<(), MemoryError> {
        let held = match kind {
            LeaseKind::Host => LeaseState::HostLeased,
            LeaseKind::Device => LeaseState::DeviceLeased,
        };
        if self.state != held {
            return Err(MemoryError::LeaseNotHeld(kind));
        }
        self.state = LeaseState::Idle;
        Ok(())
    }

    /// Drop whatever lease is held, returning which one it was
    pub fn force_release(&mut self) -> Option<LeaseKind> {
        let held = match self.state {
            LeaseState::Idle => None,
            LeaseState::HostLeased => Some(LeaseKind::Host),
            LeaseState::DeviceLeased => Some(LeaseKind::Device),
        };
        self.state = LeaseState::Idle;
        held
    }

    pub fn record_mapped(&mut self, direction: Direction) {
        self.host_map = Some(direction);
    }

    pub fn record_unmapped(&mut self) {
        self.host_map = None;
    }
}

impl fmt::Display for LeaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Device => f.write_str("device"),
        }
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::HostLeased => f.write_str("host-leased"),
            Self::DeviceLeased => f.write_str("device-leased"),
        }
    }
}
