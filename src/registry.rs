//! Bookkeeping of what this process believes exists remotely
//!
//! Three independent collections, each behind its own lock:
//! - spawned cube anchors (`<part>_BASE` names)
//! - requested joint links
//! - occupied placement slots with their owning unit
//!
//! Locks are held only for the duration of an append or scan, never across a
//! network call. The registry is an explicit value passed to whoever needs it.

use parking_lot::Mutex;
use podswarm_common::{UnitId, Vec3};
use std::collections::HashSet;
use std::sync::Arc;

/// A link that was requested between two anchors
#[derive(Debug, Clone, PartialEq)]
pub struct JointLink {
    pub joint_name: String,
    pub joint_type: String,
    pub cube_a: String,
    pub cube_b: String,
}

impl JointLink {
    pub fn new(joint_type: &str, cube_a: &str, cube_b: &str) -> Self {
        Self {
            joint_name: podswarm_common::joint_name(joint_type, cube_a, cube_b),
            joint_type: joint_type.to_string(),
            cube_a: cube_a.to_string(),
            cube_b: cube_b.to_string(),
        }
    }

    pub fn touches(&self, cube: &str) -> bool {
        self.cube_a == cube || self.cube_b == cube
    }

    /// The other end of this link as seen from `cube`
    pub fn counterpart(&self, cube: &str) -> Option<&str> {
        if self.cube_a == cube {
            Some(&self.cube_b)
        } else if self.cube_b == cube {
            Some(&self.cube_a)
        } else {
            None
        }
    }
}

/// A claimed placement and the unit that owns it
#[derive(Debug, Clone, PartialEq)]
pub struct OccupiedSlot {
    pub position: Vec3,
    pub unit: UnitId,
}

/// What a purge removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub cubes: usize,
    pub links: usize,
    pub slots: usize,
}

#[derive(Default)]
struct Collections {
    cubes: Mutex<Vec<String>>,
    links: Mutex<Vec<JointLink>>,
    slots: Mutex<Vec<OccupiedSlot>>,
}

/// Thread-safe registry of cubes, links and slots
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Collections>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a spawned anchor
    pub fn record_cube(&self, name: impl Into<String>) {
        self.inner.cubes.lock().push(name.into());
    }

    pub fn record_cubes<I>(&self, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.inner.cubes.lock().extend(names);
    }

    pub fn cubes(&self) -> Vec<String> {
        self.inner.cubes.lock().clone()
    }

    /// Anchors whose names carry the unit's prefix
    pub fn cubes_for_unit(&self, unit: &UnitId) -> Vec<String> {
        self.inner
            .cubes
            .lock()
            .iter()
            .filter(|name| unit.owns(name))
            .cloned()
            .collect()
    }

    pub fn contains_cube(&self, name: &str) -> bool {
        self.inner.cubes.lock().iter().any(|c| c == name)
    }

    /// Remove the given anchors; returns how many entries were dropped
    pub fn remove_cubes(&self, names: &[String]) -> usize {
        let doomed: HashSet<&str> = names.iter().map(String::as_str).collect();
        let mut cubes = self.inner.cubes.lock();
        let before = cubes.len();
        cubes.retain(|c| !doomed.contains(c.as_str()));
        before - cubes.len()
    }

    /// Record a link unless one with the same joint name already exists
    pub fn record_link(&self, link: JointLink) -> bool {
        let mut links = self.inner.links.lock();
        if links.iter().any(|l| l.joint_name == link.joint_name) {
            return false;
        }
        links.push(link);
        true
    }

    pub fn links(&self) -> Vec<JointLink> {
        self.inner.links.lock().clone()
    }

    pub fn links_touching(&self, cube: &str) -> Vec<JointLink> {
        self.inner
            .links
            .lock()
            .iter()
            .filter(|l| l.touches(cube))
            .cloned()
            .collect()
    }

    /// Links with at least one end owned by `unit`
    pub fn links_for_unit(&self, unit: &UnitId) -> Vec<JointLink> {
        self.inner
            .links
            .lock()
            .iter()
            .filter(|l| unit.owns(&l.cube_a) || unit.owns(&l.cube_b))
            .cloned()
            .collect()
    }

    /// Counterpart of `cube` across the joint named `joint_name`, if recorded
    pub fn counterpart(&self, joint_name: &str, cube: &str) -> Option<String> {
        self.inner
            .links
            .lock()
            .iter()
            .find(|l| l.joint_name == joint_name)
            .and_then(|l| l.counterpart(cube).map(str::to_string))
    }

    /// Drop links touching any of the given anchors
    pub fn remove_links_touching(&self, cubes: &[String]) -> usize {
        let gone: HashSet<&str> = cubes.iter().map(String::as_str).collect();
        let mut links = self.inner.links.lock();
        let before = links.len();
        links.retain(|l| !gone.contains(l.cube_a.as_str()) && !gone.contains(l.cube_b.as_str()));
        before - links.len()
    }

    pub fn claim_slot(&self, position: Vec3, unit: UnitId) {
        self.inner.slots.lock().push(OccupiedSlot { position, unit });
    }

    pub fn slots(&self) -> Vec<OccupiedSlot> {
        self.inner.slots.lock().clone()
    }

    pub fn clear_slots(&self) {
        self.inner.slots.lock().clear();
    }

    pub fn release_slots(&self, unit: &UnitId) -> usize {
        let mut slots = self.inner.slots.lock();
        let before = slots.len();
        slots.retain(|s| &s.unit != unit);
        before - slots.len()
    }

    /// Remove every cube, link and slot belonging to `unit`
    pub fn purge_unit(&self, unit: &UnitId) -> PurgeSummary {
        let cubes = self.cubes_for_unit(unit);
        PurgeSummary {
            links: self.remove_links_touching(&cubes),
            cubes: self.remove_cubes(&cubes),
            slots: self.release_slots(unit),
        }
    }

    pub fn cube_count(&self) -> usize {
        self.inner.cubes.lock().len()
    }

    pub fn link_count(&self) -> usize {
        self.inner.links.lock().len()
    }

    pub fn slot_count(&self) -> usize {
        self.inner.slots.lock().len()
    }
}
