//! Gateway-crate error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {transport} listener on {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session id allocation failed: {0}")]
    SessionIdAlloc(#[from] ambonmud_domain::ids::SessionIdAllocError),

    #[error("engine stream reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("engine stream io error: {0}")]
    Io(#[from] std::io::Error),
}
