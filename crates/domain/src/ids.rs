//! Opaque, type-distinct identifiers.
//!
//! World entity ids all share the `<zone>:<local>` shape; construction fails
//! if the `:` separator is absent. Session ids are globally unique across
//! the cluster and support two generation schemes (see [`SessionIdAllocator`]).

use crate::errors::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! zoned_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Parses `<zone>:<local>`. Fails if the separator is missing.
            pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                if !raw.contains(':') {
                    return Err(DomainError::MalformedId(raw));
                }
                Ok(Self(raw))
            }

            pub fn new(zone: &str, local: &str) -> Self {
                Self(format!("{zone}:{local}"))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The zone prefix, i.e. everything before the first `:`.
            pub fn zone(&self) -> &str {
                self.0.split_once(':').map(|(z, _)| z).unwrap_or(&self.0)
            }

            pub fn local(&self) -> &str {
                self.0.split_once(':').map(|(_, l)| l).unwrap_or("")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }
    };
}

zoned_id!(RoomId);
zoned_id!(MobId);
zoned_id!(ItemId);
zoned_id!(ItemTemplateId);
zoned_id!(MobSpawnId);

/// A zone name is just the prefix shared by all ids under it; kept as its
/// own type so callers can't accidentally pass a full `RoomId` where a bare
/// zone is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable player identity; opaque, backend-allocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live connection's globally unique id. Opaque at this layer; the two
/// generation schemes live in [`SessionIdAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The process id of an engine shard, used as the key in the zone ownership
/// registry and as the sender identity on inter-engine envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineId(String);

impl EngineId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A leased gateway id, `0..=65535`, used as the top 16 bits of a snowflake
/// session id. Lease acquisition/renewal lives in `ambonmud-gateway`; this
/// type just carries the validated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GatewayId(pub u16);

/// Generates [`SessionId`]s under one of two schemes.
///
/// - `Counter`: a monotonic, process-local counter. Only valid when exactly
///   one gateway exists.
/// - `Snowflake`: `[16b gatewayId][32b seconds][16b sequence]`, packed into
///   a `u64`, unique across a cluster of gateways as long as each holds an
///   exclusive `GatewayId` lease.
#[derive(Debug)]
pub enum SessionIdAllocator {
    Counter { next: u64 },
    Snowflake {
        gateway_id: GatewayId,
        last_seconds: u32,
        sequence: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionIdAllocError {
    /// All 65536 sequence numbers for the current second are exhausted; the
    /// caller must wait for the next second and retry.
    #[error("sequence exhausted for the current second, retry next second")]
    SequenceExhausted,

    /// The wall clock moved backwards relative to the last allocation.
    #[error("wall clock regression detected: now={now_secs} last={last_secs}")]
    ClockRegression { now_secs: u32, last_secs: u32 },
}

impl SessionIdAllocator {
    pub fn counter() -> Self {
        Self::Counter { next: 1 }
    }

    pub fn snowflake(gateway_id: GatewayId) -> Self {
        Self::Snowflake {
            gateway_id,
            last_seconds: 0,
            sequence: 0,
        }
    }

    /// Allocates the next id. `now_secs` is seconds since epoch, supplied by
    /// the caller's injected clock so allocation is deterministic under test.
    pub fn allocate(&mut self, now_secs: u32) -> Result<SessionId, SessionIdAllocError> {
        match self {
            Self::Counter { next } => {
                let id = *next;
                *next += 1;
                Ok(SessionId(id))
            }
            Self::Snowflake {
                gateway_id,
                last_seconds,
                sequence,
            } => {
                if now_secs < *last_seconds {
                    return Err(SessionIdAllocError::ClockRegression {
                        now_secs,
                        last_secs: *last_seconds,
                    });
                }
                if now_secs > *last_seconds {
                    *last_seconds = now_secs;
                    *sequence = 0;
                } else if *sequence == u16::MAX {
                    return Err(SessionIdAllocError::SequenceExhausted);
                } else {
                    *sequence += 1;
                }
                let packed = ((gateway_id.0 as u64) << 48)
                    | ((now_secs as u64) << 16)
                    | (*sequence as u64);
                Ok(SessionId(packed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoned_id_requires_separator() {
        assert!(RoomId::parse("demo:r1").is_ok());
        assert_eq!(
            RoomId::parse("noseparator").unwrap_err(),
            DomainError::MalformedId("noseparator".into())
        );
    }

    #[test]
    fn zoned_id_zone_and_local() {
        let id = RoomId::new("demo", "r1");
        assert_eq!(id.zone(), "demo");
        assert_eq!(id.local(), "r1");
        assert_eq!(id.as_str(), "demo:r1");
    }

    #[test]
    fn counter_allocator_is_monotonic() {
        let mut alloc = SessionIdAllocator::counter();
        let a = alloc.allocate(0).unwrap();
        let b = alloc.allocate(0).unwrap();
        assert_eq!(a.0, 1);
        assert_eq!(b.0, 2);
    }

    #[test]
    fn snowflake_allocator_packs_fields() {
        let mut alloc = SessionIdAllocator::snowflake(GatewayId(7));
        let id = alloc.allocate(1_000).unwrap();
        assert_eq!(id.0 >> 48, 7);
        assert_eq!((id.0 >> 16) & 0xFFFF_FFFF, 1_000);
        assert_eq!(id.0 & 0xFFFF, 0);

        let id2 = alloc.allocate(1_000).unwrap();
        assert_eq!(id2.0 & 0xFFFF, 1);
    }

    #[test]
    fn snowflake_allocator_detects_clock_regression() {
        let mut alloc = SessionIdAllocator::snowflake(GatewayId(1));
        alloc.allocate(100).unwrap();
        let err = alloc.allocate(99).unwrap_err();
        assert_eq!(
            err,
            SessionIdAllocError::ClockRegression {
                now_secs: 99,
                last_secs: 100
            }
        );
    }

    #[test]
    fn snowflake_allocator_exhausts_sequence() {
        let mut alloc = SessionIdAllocator::snowflake(GatewayId(1));
        for _ in 0..=u16::MAX {
            alloc.allocate(5).unwrap();
        }
        let err = alloc.allocate(5).unwrap_err();
        assert_eq!(err, SessionIdAllocError::SequenceExhausted);
    }
}
