//! AmbonMUD gateway library: transport termination, session routing, and
//! the renderer boundary (spec.md §4.2). Exposed as a library, not just a
//! binary, so the engine's Standalone composition root can embed these
//! transports in-process instead of going over a network stream.

pub mod engine_link;
pub mod errors;
pub mod reconnect;
pub mod renderer;
pub mod rng;
pub mod session_router;
pub mod telnet;
pub mod websocket;
