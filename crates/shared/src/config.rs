//! Typed, validated configuration (spec.md §6, §9 redesign flag:
//! "Reflection-based config mapping -> generated or handwritten typed
//! deserializer with explicit `validated()` step"). Layered: defaults, an
//! optional file, then environment variables prefixed `AMBONMUD_`, merged
//! by the `config` crate and deserialized into these typed structs.
//! `AmbonConfig::load` always calls `validated()` before returning.

use serde::Deserialize;
use std::collections::HashMap;
use validator::Validate;

use ambonmud_domain::abilities::{AbilityDefinition, StatusEffectDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentMode {
    Standalone,
    Engine,
    Gateway,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(range(min = 1))]
    pub telnet_port: u16,
    #[validate(range(min = 1))]
    pub web_port: u16,
    #[validate(range(min = 1))]
    pub tick_millis: u64,
    #[validate(range(min = 1))]
    pub session_outbound_queue_capacity: usize,
    #[validate(range(min = 1))]
    pub max_inbound_events_per_tick: usize,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginConfig {
    #[validate(range(min = 1))]
    pub max_concurrent_logins: usize,
    #[validate(range(min = 1))]
    pub auth_threads: usize,
    pub max_wrong_password_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombatConfig {
    pub min_damage: i32,
    pub max_damage: i32,
    pub round_interval_ms: i64,
    pub max_combats_per_tick: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegenAxisConfig {
    pub base_interval_millis: i64,
    pub regen_amount: i32,
    pub attribute_modifier: f64,
    pub min_interval_millis: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegenConfig {
    pub hp: RegenAxisConfig,
    pub mana: RegenAxisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MobConfig {
    pub min_wander_delay_ms: i64,
    pub max_wander_delay_ms: i64,
    pub max_moves_per_tick: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbilitiesConfig {
    #[serde(default)]
    pub definitions: HashMap<String, AbilityDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusEffectsConfig {
    #[serde(default)]
    pub definitions: HashMap<String, StatusEffectDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Path to the world content file (rooms, mob/item spawns, zone
    /// lifespans), loaded once at startup.
    pub world_file: String,
    pub combat: CombatConfig,
    pub regen: RegenConfig,
    pub mob: MobConfig,
    pub abilities: AbilitiesConfig,
    pub status_effects: StatusEffectsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressionConfig {
    pub xp_base_xp: f64,
    pub xp_exponent: f64,
    pub xp_linear_xp: f64,
    pub max_level: u32,
    pub full_heal_on_level_up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PersistenceBackendKind {
    File,
    Sql,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackendKind,
    pub path_or_dsn: String,
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(default)]
    pub uri: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub enabled: bool,
    /// NATS server URL the distributed bus connects to.
    #[serde(default = "default_bus_url")]
    pub url: String,
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default = "default_bus_channel")]
    pub channel: String,
    /// UUID; blank means auto-generate at startup.
    #[serde(default)]
    pub instance_id: String,
}

fn default_bus_channel() -> String {
    "ambonmud.events".to_string()
}

fn default_bus_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrpcConfig {
    pub server_port: u16,
    pub client_host: String,
    pub client_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    pub stream_verify_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySnowflakeConfig {
    pub id_lease_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub id: u16,
    pub snowflake: GatewaySnowflakeConfig,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardingSelectionConfig {
    pub strategy: String,
    pub load_ttl_seconds: u64,
    pub health_failure_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardingConfig {
    #[serde(default)]
    pub replicated_zones: Vec<String>,
    /// Zone name -> owning engine id, consulted by `StaticZoneRegistry`
    /// (spec.md §4.13 "static: config map; no-op leasing").
    #[serde(default)]
    pub static_zones: HashMap<String, String>,
    pub selection: ShardingSelectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmbonConfig {
    pub mode: DeploymentMode,
    pub server: ServerConfig,
    pub login: LoginConfig,
    pub engine: EngineConfig,
    pub progression: ProgressionConfig,
    pub persistence: PersistenceConfig,
    pub cache: CacheConfig,
    pub bus: BusConfig,
    pub grpc: GrpcConfig,
    pub gateway: GatewayConfig,
    pub sharding: ShardingConfig,
}

impl AmbonConfig {
    /// Builds a layered `config::Config` (defaults file, optional override
    /// file, then `AMBONMUD_`-prefixed environment variables), deserializes
    /// it, and validates the result before returning.
    pub fn load(config_file: Option<&str>) -> Result<Self, crate::SharedError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));
        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("AMBONMUD")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| crate::SharedError::InvalidConfig(e.to_string()))?;
        let config: AmbonConfig = raw
            .try_deserialize()
            .map_err(|e| crate::SharedError::InvalidConfig(e.to_string()))?;
        config.validated()
    }

    /// Rejects contradictory settings (spec.md §6: "Validation MUST reject
    /// unknown values and contradictory settings, e.g. bus enabled without
    /// a secret, a zone both statically assigned and replicated").
    pub fn validated(self) -> Result<Self, crate::SharedError> {
        self.server
            .validate()
            .map_err(|e| crate::SharedError::InvalidConfig(e.to_string()))?;
        self.login
            .validate()
            .map_err(|e| crate::SharedError::InvalidConfig(e.to_string()))?;
        if self.bus.enabled && self.bus.shared_secret.trim().is_empty() {
            return Err(crate::SharedError::InvalidConfig(
                "bus.shared_secret must be non-blank when bus.enabled is true".into(),
            ));
        }
        if self.engine.combat.min_damage > self.engine.combat.max_damage {
            return Err(crate::SharedError::InvalidConfig(
                "engine.combat.min_damage must be <= max_damage".into(),
            ));
        }
        ambonmud_domain::abilities::validate_ability_catalog(
            &self.engine.abilities.definitions.values().cloned().collect::<Vec<_>>(),
        )
        .map_err(|e| crate::SharedError::InvalidConfig(e.to_string()))?;

        for zone in &self.sharding.replicated_zones {
            if self.sharding.static_zones.contains_key(zone) {
                return Err(crate::SharedError::InvalidConfig(format!(
                    "zone '{zone}' is both statically assigned and replicated"
                )));
            }
        }
        Ok(self)
    }

    pub fn resolved_instance_id(&self) -> String {
        if self.bus.instance_id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.bus.instance_id.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> AmbonConfig {
        AmbonConfig {
            mode: DeploymentMode::Standalone,
            server: ServerConfig {
                telnet_port: 4000,
                web_port: 4001,
                tick_millis: 100,
                session_outbound_queue_capacity: 64,
                max_inbound_events_per_tick: 256,
            },
            login: LoginConfig {
                max_concurrent_logins: 8,
                auth_threads: 2,
                max_wrong_password_retries: 3,
            },
            engine: EngineConfig {
                world_file: "world/world.json".into(),
                combat: CombatConfig {
                    min_damage: 1,
                    max_damage: 4,
                    round_interval_ms: 2000,
                    max_combats_per_tick: 100,
                },
                regen: RegenConfig {
                    hp: RegenAxisConfig {
                        base_interval_millis: 10_000,
                        regen_amount: 1,
                        attribute_modifier: 0.1,
                        min_interval_millis: 1_000,
                    },
                    mana: RegenAxisConfig {
                        base_interval_millis: 10_000,
                        regen_amount: 1,
                        attribute_modifier: 0.1,
                        min_interval_millis: 1_000,
                    },
                },
                mob: MobConfig {
                    min_wander_delay_ms: 5_000,
                    max_wander_delay_ms: 15_000,
                    max_moves_per_tick: 20,
                },
                abilities: AbilitiesConfig {
                    definitions: HashMap::new(),
                },
                status_effects: StatusEffectsConfig {
                    definitions: HashMap::new(),
                },
            },
            progression: ProgressionConfig {
                xp_base_xp: 100.0,
                xp_exponent: 1.5,
                xp_linear_xp: 50.0,
                max_level: 50,
                full_heal_on_level_up: true,
            },
            persistence: PersistenceConfig {
                backend: PersistenceBackendKind::File,
                path_or_dsn: "./data/players".into(),
                flush_interval_ms: 5_000,
            },
            cache: CacheConfig {
                enabled: false,
                uri: String::new(),
                ttl_seconds: 60,
            },
            bus: BusConfig {
                enabled: false,
                url: default_bus_url(),
                shared_secret: String::new(),
                channel: default_bus_channel(),
                instance_id: String::new(),
            },
            grpc: GrpcConfig {
                server_port: 5001,
                client_host: "127.0.0.1".into(),
                client_port: 5001,
            },
            gateway: GatewayConfig {
                id: 1,
                snowflake: GatewaySnowflakeConfig {
                    id_lease_ttl_seconds: 30,
                },
                reconnect: ReconnectConfig {
                    max_attempts: 5,
                    initial_delay_ms: 200,
                    max_delay_ms: 5_000,
                    jitter_factor: 0.2,
                    stream_verify_ms: 1_000,
                },
            },
            sharding: ShardingConfig {
                replicated_zones: vec![],
                static_zones: HashMap::new(),
                selection: ShardingSelectionConfig {
                    strategy: "power-of-two-choices".into(),
                    load_ttl_seconds: 10,
                    health_failure_threshold: 3,
                },
            },
        }
    }

    #[test]
    fn minimal_config_validates() {
        assert!(minimal_config().validated().is_ok());
    }

    #[test]
    fn bus_enabled_without_secret_rejected() {
        let mut config = minimal_config();
        config.bus.enabled = true;
        config.bus.shared_secret = String::new();
        assert!(config.validated().is_err());
    }

    #[test]
    fn zero_tick_millis_rejected() {
        let mut config = minimal_config();
        config.server.tick_millis = 0;
        assert!(config.validated().is_err());
    }

    #[test]
    fn inverted_damage_range_rejected() {
        let mut config = minimal_config();
        config.engine.combat.min_damage = 10;
        config.engine.combat.max_damage = 1;
        assert!(config.validated().is_err());
    }

    #[test]
    fn blank_instance_id_is_auto_generated() {
        let config = minimal_config();
        let id = config.resolved_instance_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn zone_both_static_and_replicated_rejected() {
        let mut config = minimal_config();
        config.sharding.static_zones.insert("hubz".into(), "engine-1".into());
        config.sharding.replicated_zones.push("hubz".into());
        assert!(config.validated().is_err());
    }
}
