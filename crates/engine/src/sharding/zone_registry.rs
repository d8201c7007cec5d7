//! Zone ownership lookup (spec.md §4.13 "Sharding layer"). A zone is either
//! `SINGLE_OWNER` (exactly one live claim, the default) or `REPLICATED_ENTRY`
//! (multiple live claims; the caller picks among them via the instance
//! selector). Two implementations: a config-backed map for a fixed
//! deployment, and a TTL-leased table for engines that claim zones at
//! runtime.

use crate::errors::DistributionError;
use ambonmud_domain::ids::{EngineId, ZoneId};
use ambonmud_shared::config::ShardingConfig;
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneMode {
    SingleOwner,
    ReplicatedEntry,
}

pub trait ZoneRegistry: Send + Sync {
    /// The single live owner of `zone`, or `None` if unowned or the zone is
    /// `REPLICATED_ENTRY` (use [`ZoneRegistry::replicas_of`] there instead).
    fn owner_of(&self, zone: &ZoneId) -> Option<EngineId>;

    /// Every live claimant of `zone`, in either mode.
    fn replicas_of(&self, zone: &ZoneId) -> Vec<EngineId>;

    fn claim_zones(
        &self,
        engine_id: &EngineId,
        zones: &[ZoneId],
        mode: ZoneMode,
        ttl_ms: i64,
        now_ms: i64,
    ) -> Result<(), DistributionError>;

    fn renew_lease(&self, engine_id: &EngineId, ttl_ms: i64, now_ms: i64);

    fn all_assignments(&self) -> Vec<(ZoneId, ZoneMode, Vec<EngineId>)>;
}

/// Config-map backed registry (spec.md §4.13: "static: config map; no-op
/// leasing"). `claim_zones`/`renew_lease` are no-ops - the map is the
/// deployment's fixed truth, not a lease table. Only `SINGLE_OWNER` zones are
/// representable here since the underlying config is a plain `zone -> engine`
/// map; a zone named in `replicated_zones` but absent from `static_zones` is
/// reported unowned (a static deployment that wants replication should run
/// [`DistributedZoneRegistry`] instead).
pub struct StaticZoneRegistry {
    owners: HashMap<ZoneId, EngineId>,
    replicated: std::collections::HashSet<ZoneId>,
}

impl StaticZoneRegistry {
    pub fn from_config(config: &ShardingConfig) -> Self {
        let owners = config
            .static_zones
            .iter()
            .map(|(zone, engine)| (ZoneId::new(zone.clone()), EngineId::new(engine.clone())))
            .collect();
        let replicated = config.replicated_zones.iter().map(|z| ZoneId::new(z.clone())).collect();
        Self { owners, replicated }
    }
}

impl ZoneRegistry for StaticZoneRegistry {
    fn owner_of(&self, zone: &ZoneId) -> Option<EngineId> {
        if self.replicated.contains(zone) {
            return None;
        }
        self.owners.get(zone).cloned()
    }

    fn replicas_of(&self, zone: &ZoneId) -> Vec<EngineId> {
        self.owners.get(zone).cloned().into_iter().collect()
    }

    fn claim_zones(
        &self,
        _engine_id: &EngineId,
        _zones: &[ZoneId],
        _mode: ZoneMode,
        _ttl_ms: i64,
        _now_ms: i64,
    ) -> Result<(), DistributionError> {
        Ok(())
    }

    fn renew_lease(&self, _engine_id: &EngineId, _ttl_ms: i64, _now_ms: i64) {}

    fn all_assignments(&self) -> Vec<(ZoneId, ZoneMode, Vec<EngineId>)> {
        self.owners
            .iter()
            .map(|(zone, engine)| {
                let mode = if self.replicated.contains(zone) {
                    ZoneMode::ReplicatedEntry
                } else {
                    ZoneMode::SingleOwner
                };
                (zone.clone(), mode, vec![engine.clone()])
            })
            .collect()
    }
}

struct ZoneClaims {
    mode: ZoneMode,
    holders: Vec<(EngineId, i64)>,
}

/// TTL-leased registry for engines that claim zones dynamically (spec.md
/// §4.13: "distributed: TTL keys, separate owner/replica-membership key
/// sets"). A claim expires `ttl_ms` after it was last renewed; expired
/// holders are pruned lazily on the next read or write.
pub struct DistributedZoneRegistry {
    claims: DashMap<ZoneId, ZoneClaims>,
}

impl DistributedZoneRegistry {
    pub fn new() -> Self {
        Self { claims: DashMap::new() }
    }
}

impl Default for DistributedZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneRegistry for DistributedZoneRegistry {
    fn owner_of(&self, zone: &ZoneId) -> Option<EngineId> {
        let entry = self.claims.get(zone)?;
        if entry.mode != ZoneMode::SingleOwner {
            return None;
        }
        entry.holders.first().map(|(id, _)| id.clone())
    }

    fn replicas_of(&self, zone: &ZoneId) -> Vec<EngineId> {
        match self.claims.get(zone) {
            Some(entry) => entry.holders.iter().map(|(id, _)| id.clone()).collect(),
            None => Vec::new(),
        }
    }

    fn claim_zones(
        &self,
        engine_id: &EngineId,
        zones: &[ZoneId],
        mode: ZoneMode,
        ttl_ms: i64,
        now_ms: i64,
    ) -> Result<(), DistributionError> {
        for zone in zones {
            let mut entry = self
                .claims
                .entry(zone.clone())
                .or_insert_with(|| ZoneClaims { mode, holders: Vec::new() });
            entry.holders.retain(|(_, expires_at)| *expires_at > now_ms);

            if mode == ZoneMode::SingleOwner {
                if entry.holders.iter().any(|(id, _)| id != engine_id) {
                    return Err(DistributionError::LeaseClaimFailed(zone.as_str().to_string()));
                }
                entry.mode = ZoneMode::SingleOwner;
                entry.holders = vec![(engine_id.clone(), now_ms + ttl_ms)];
            } else {
                entry.mode = ZoneMode::ReplicatedEntry;
                match entry.holders.iter_mut().find(|(id, _)| id == engine_id) {
                    Some((_, expires_at)) => *expires_at = now_ms + ttl_ms,
                    None => entry.holders.push((engine_id.clone(), now_ms + ttl_ms)),
                }
            }
        }
        Ok(())
    }

    fn renew_lease(&self, engine_id: &EngineId, ttl_ms: i64, now_ms: i64) {
        for mut entry in self.claims.iter_mut() {
            if let Some((_, expires_at)) = entry.holders.iter_mut().find(|(id, _)| id == engine_id) {
                *expires_at = now_ms + ttl_ms;
            }
        }
    }

    fn all_assignments(&self) -> Vec<(ZoneId, ZoneMode, Vec<EngineId>)> {
        self.claims
            .iter()
            .map(|entry| {
                let holders = entry.holders.iter().map(|(id, _)| id.clone()).collect();
                (entry.key().clone(), entry.mode, holders)
            })
            .collect()
    }
}
