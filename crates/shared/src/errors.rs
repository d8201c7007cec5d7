//! Shared-crate error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("event bus is closed")]
    BusClosed,

    #[error("outbound queue for session is full (backpressure)")]
    Backpressure,

    #[error("envelope signature verification failed")]
    BadSignature,

    #[error("envelope payload failed to decode: {0}")]
    Decode(String),

    #[error("config validation failed: {0}")]
    InvalidConfig(String),

    #[error("nats transport error: {0}")]
    Nats(String),
}
