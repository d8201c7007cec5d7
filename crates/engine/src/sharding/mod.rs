//! The inter-engine sharding layer (spec.md §4.13): zone ownership, player
//! handoff between engines, the optional location index, instance
//! selection, and the cluster-wide commands that ride the same bus. Only
//! relevant in `DeploymentMode::Engine`/multi-engine `Standalone` setups -
//! a single standalone engine never needs any of this wired up.

pub mod global_commands;
pub mod handoff;
pub mod instance_selector;
pub mod inter_engine_bus;
pub mod location_index;
pub mod zone_registry;

pub use global_commands::GlobalCommandState;
pub use handoff::{PendingHandoff, PendingHandoffs};
pub use instance_selector::LoadSnapshotStore;
pub use inter_engine_bus::InterEngineBus;
pub use location_index::PlayerLocationIndex;
pub use zone_registry::{DistributedZoneRegistry, StaticZoneRegistry, ZoneMode, ZoneRegistry};
