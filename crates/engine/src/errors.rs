//! Engine-level error taxonomy (spec.md §7). Domain errors surface to
//! players as `SendError`; the variants below are the ones that cross an
//! `async` boundary (persistence, distribution) before they get there.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record not found")]
    NotFound,
    #[error("name '{0}' is already taken")]
    NameTaken(String),
    #[error("backend I/O failure: {0}")]
    Io(String),
    #[error("serialization failure: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("zone '{0}' is not currently owned by any engine")]
    ZoneUnowned(String),
    #[error("lease for zone '{0}' could not be claimed")]
    LeaseClaimFailed(String),
    #[error("inter-engine bus publish failed: {0}")]
    BusPublishFailed(String),
    #[error("handoff to engine '{0}' timed out")]
    HandoffTimeout(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] ambonmud_domain::DomainError),
    #[error(transparent)]
    Shared(#[from] ambonmud_shared::SharedError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("configuration error: {0}")]
    Config(String),
}
