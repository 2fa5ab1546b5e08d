// MIT LICENSE
//
// Copyright (c) 2024 Hoard Engine Contributors
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Cave configuration as plain structs.
//!
//! The engine consumes these; parsing them from a config file is the outer
//! layer's business. Declaration order matters: backup selection walks
//! caves in the order they were declared.

use hoard_path::HoardPath;
use uuid::Uuid;

use crate::Error;

/// What role a cave plays in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaveType {
    /// Holds a subset of the hoard; the usual working repository.
    Partial,
    /// Holds replicas; never a source of intentional change.
    Backup,
    /// A drop box: contents get absorbed into the hoard, then cleaned up.
    Incoming,
}

/// Rough throughput class of the cave's medium; consumed by external
/// file-placement decisions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSpeed {
    /// Slow media (cold external drives, remote mounts).
    Low,
    /// Reasonably fast media.
    Medium,
    /// Fast local storage.
    High,
}

/// Rough availability class of the cave; consumed by external
/// file-placement decisions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLatency {
    /// Usually attached.
    Low,
    /// Rarely attached.
    High,
}

/// One declared cave.
#[derive(Debug, Clone)]
pub struct Cave {
    /// Identity; doubles as the cave's root name.
    pub uuid: Uuid,
    /// Human-readable label.
    pub name: String,
    /// Role in the fleet.
    pub cave_type: CaveType,
    /// Absolute hoard path under which this cave's files appear.
    pub mounted_at: HoardPath,
    /// Whether a Partial cave wants files newly added elsewhere.
    pub fetch_new: bool,
    /// Copies that must exist before a cleanup is allowed to execute.
    pub min_copies_before_cleanup: u32,
    /// Medium throughput class.
    pub speed: ConnectionSpeed,
    /// Attachment class.
    pub latency: ConnectionLatency,
}

impl Cave {
    /// The name of this cave's root: the canonical 36-character UUID.
    pub fn root_name(&self) -> String {
        self.uuid.to_string()
    }

    /// Whether an absolute hoard path falls inside this cave's mount.
    pub fn covers(&self, hoard_path: &HoardPath) -> bool {
        hoard_path.is_relative_to(&self.mounted_at)
    }
}

/// The declared fleet, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct HoardConfig {
    caves: Vec<Cave>,
}

impl HoardConfig {
    /// An empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a cave. Order of declaration is preserved.
    pub fn add_cave(&mut self, cave: Cave) {
        self.caves.push(cave);
    }

    /// All caves, declaration order.
    pub fn caves(&self) -> &[Cave] {
        &self.caves
    }

    /// Looks up a cave by UUID.
    pub fn cave(&self, uuid: &Uuid) -> Result<&Cave, Error> {
        self.caves
            .iter()
            .find(|cave| cave.uuid == *uuid)
            .ok_or_else(|| Error::UnknownCave(uuid.to_string()))
    }

    /// Looks up a cave by its root name.
    pub fn cave_by_root_name(&self, name: &str) -> Result<&Cave, Error> {
        self.caves
            .iter()
            .find(|cave| cave.root_name() == name)
            .ok_or_else(|| Error::UnknownCave(name.to_owned()))
    }

    /// Caves of one type, declaration order.
    pub fn caves_of_type(&self, cave_type: CaveType) -> impl Iterator<Item = &Cave> {
        self.caves
            .iter()
            .filter(move |cave| cave.cave_type == cave_type)
    }
}
