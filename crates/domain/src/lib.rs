//! AmbonMUD domain.
//!
//! Pure data model and rules for the authoritative simulation. Nothing in
//! this crate touches a socket, a clock, a file, or a database: time and
//! randomness are always passed in by the caller so the same logic replays
//! deterministically under test.
//!
//! ## Structure
//!
//! - `ids` - opaque, type-distinct identifiers for world entities and sessions
//! - `world` - the immutable loaded world (rooms, exits, spawns)
//! - `entities` - mutable runtime state (players, mobs, items, effects, fights)
//! - `value_objects` - attributes, race/class, direction
//! - `record` - the persistable `PlayerRecord`
//! - `command` - the command AST produced by the parser
//! - `abilities` - ability and status-effect definitions
//! - `progression` - XP curves and level-up rules
//! - `scheduler` - the generic due-callback min-heap
//! - `loot` - weighted loot tables
//! - `random` - the injected randomness seam

pub mod abilities;
pub mod command;
pub mod entities;
pub mod errors;
pub mod ids;
pub mod loot;
pub mod progression;
pub mod random;
pub mod record;
pub mod scheduler;
pub mod value_objects;
pub mod world;

pub use errors::DomainError;
