//! AmbonMUD shared.
//!
//! Everything the engine and gateway processes need in common: the typed
//! event bus abstraction and its three transports, inter-engine wire
//! contracts, GMCP payload types, the injected clock seam, metrics, and
//! typed/validated configuration.

pub mod bus;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod gateway_link;
pub mod gmcp;
pub mod inter_engine;
pub mod metrics;

pub use errors::SharedError;
