//! GMCP side-channel types (spec.md §4.14). The package catalog itself is
//! out of scope (spec.md §1); what's in scope is the general "structured
//! side-channel" contract: packages, subscriptions, and dirty tracking.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A package name, e.g. `"char.vitals"`, `"room.info"`. Kept as a plain
/// `String` rather than an enum because the catalog is external/out of
/// scope here.
pub type GmcpPackage = String;

/// Some packages coalesce to at most one emission per tick (vitals, mob hp);
/// others emit immediately on the state change that produced them
/// (inventory, chat delivery).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmcpCadence {
    Coalesced,
    Immediate,
}

/// Per-session subscription state plus the set of packages currently dirty
/// for this tick. WebSocket-class sessions auto-subscribe to a core set on
/// connect; telnet-class sessions subscribe explicitly via `GmcpReceived`.
#[derive(Debug, Clone, Default)]
pub struct GmcpSubscription {
    subscribed: HashSet<GmcpPackage>,
    dirty: HashSet<GmcpPackage>,
}

impl GmcpSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_core_packages(packages: impl IntoIterator<Item = GmcpPackage>) -> Self {
        Self {
            subscribed: packages.into_iter().collect(),
            dirty: HashSet::new(),
        }
    }

    pub fn subscribe(&mut self, package: impl Into<GmcpPackage>) {
        self.subscribed.insert(package.into());
    }

    pub fn unsubscribe(&mut self, package: &str) {
        self.subscribed.remove(package);
        self.dirty.remove(package);
    }

    pub fn is_subscribed(&self, package: &str) -> bool {
        self.subscribed.contains(package)
    }

    /// Marks a package dirty. A no-op for packages this session never
    /// subscribed to (spec.md §4.14: "Unsubscribed packages are never
    /// emitted").
    pub fn mark_dirty(&mut self, package: &str) {
        if self.is_subscribed(package) {
            self.dirty.insert(package.to_string());
        }
    }

    /// Drains the dirty set at a tick boundary, ready for the emitter to
    /// compose and send one `GmcpData` per package.
    pub fn drain_dirty(&mut self) -> Vec<GmcpPackage> {
        self.dirty.drain().collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    pub hp: i32,
    pub max_hp: i32,
    pub mana: i32,
    pub max_mana: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribed_package_never_marked_dirty() {
        let mut sub = GmcpSubscription::new();
        sub.mark_dirty("char.vitals");
        assert!(sub.drain_dirty().is_empty());
    }

    #[test]
    fn subscribed_package_drains_once() {
        let mut sub = GmcpSubscription::with_core_packages(["char.vitals".to_string()]);
        sub.mark_dirty("char.vitals");
        sub.mark_dirty("char.vitals");
        let drained = sub.drain_dirty();
        assert_eq!(drained, vec!["char.vitals".to_string()]);
        assert!(sub.drain_dirty().is_empty());
    }

    #[test]
    fn unsubscribe_clears_pending_dirty() {
        let mut sub = GmcpSubscription::with_core_packages(["room.info".to_string()]);
        sub.mark_dirty("room.info");
        sub.unsubscribe("room.info");
        assert!(sub.drain_dirty().is_empty());
        assert!(!sub.is_subscribed("room.info"));
    }
}
