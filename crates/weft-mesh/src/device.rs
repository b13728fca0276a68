//! Device identifiers and ordered device assignments.
//!
//! A `DeviceList` fixes which device backs each shard position: shard `i`
//! of a layout lands on `devices[i]`. Construction and disassembly must
//! agree on this order.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Unique identifier for a device within an assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// Ordered device assignment with unique members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceList {
    devices: Vec<DeviceId>,
}

impl DeviceList {
    /// Build an assignment from an owned order.
    pub fn new(devices: Vec<DeviceId>) -> Result<Self, MeshError> {
        let mut seen = HashSet::with_capacity(devices.len());
        for &id in &devices {
            if !seen.insert(id) {
                return Err(MeshError::DuplicateDevice(id));
            }
        }
        Ok(Self { devices })
    }

    /// Build an assignment from caller-supplied identifiers, preserving
    /// their order.
    pub fn from_ids(ids: &[DeviceId]) -> Result<Self, MeshError> {
        Self::new(ids.to_vec())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<DeviceId> {
        self.devices.get(i).copied()
    }

    pub fn as_slice(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn iter(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().copied()
    }
}
