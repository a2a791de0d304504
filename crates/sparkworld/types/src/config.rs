//! Engine configuration

use crate::agent::Spark;
use crate::errors::{SparkWorldError, SparkWorldResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for a Spark-World run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seed for the world's random source
    #[serde(default)]
    pub seed: u64,

    /// Bob's starting stash; the agent count at world creation when unset
    #[serde(default)]
    pub initial_stash: Option<Spark>,

    /// Spark charged to every living agent per tick
    #[serde(default = "default_upkeep")]
    pub upkeep_per_tick: Spark,

    /// Spark moved from the initiator of a spawn to the new agent
    #[serde(default = "default_spawn_cost")]
    pub spawn_cost: Spark,

    /// Upper bound of the uniform raid haul
    #[serde(default = "default_max_raid_haul")]
    pub max_raid_haul: Spark,

    /// Spark a failed raider pays the defender
    #[serde(default = "default_raid_failure_penalty")]
    pub raid_failure_penalty: Spark,

    /// Upper bound of a single donation
    #[serde(default = "default_max_donation")]
    pub max_donation: Spark,

    /// Ticks an unmatched bond request stays matchable after the tick it was issued
    #[serde(default = "default_bond_request_ttl")]
    pub bond_request_ttl_ticks: u64,

    /// Per-call timeout for the policy oracle, in milliseconds
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,

    /// Maximum in-flight policy oracle calls
    #[serde(default = "default_max_concurrent_decisions")]
    pub max_concurrent_decisions: usize,

    /// Tick reports retained by the event bus
    #[serde(default = "default_event_history")]
    pub event_history_ticks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            initial_stash: None,
            upkeep_per_tick: default_upkeep(),
            spawn_cost: default_spawn_cost(),
            max_raid_haul: default_max_raid_haul(),
            raid_failure_penalty: default_raid_failure_penalty(),
            max_donation: default_max_donation(),
            bond_request_ttl_ticks: default_bond_request_ttl(),
            oracle_timeout_ms: default_oracle_timeout_ms(),
            max_concurrent_decisions: default_max_concurrent_decisions(),
            event_history_ticks: default_event_history(),
        }
    }
}

// Default value helpers
fn default_upkeep() -> Spark {
    1
}

fn default_spawn_cost() -> Spark {
    5
}

fn default_max_raid_haul() -> Spark {
    5
}

fn default_raid_failure_penalty() -> Spark {
    1
}

fn default_max_donation() -> Spark {
    5
}

fn default_bond_request_ttl() -> u64 {
    1
}

fn default_oracle_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_decisions() -> usize {
    16
}

fn default_event_history() -> usize {
    256
}

impl EngineConfig {
    /// Default configuration with a given seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Configuration for tests: fixed seed and a short oracle timeout
    pub fn test_world(seed: u64) -> Self {
        Self {
            seed,
            oracle_timeout_ms: 200,
            max_concurrent_decisions: 4,
            event_history_ticks: 32,
            ..Default::default()
        }
    }

    /// Builder: set Bob's starting stash
    pub fn with_initial_stash(mut self, stash: Spark) -> Self {
        self.initial_stash = Some(stash);
        self
    }

    /// Per-call oracle timeout
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    /// Parse a JSON configuration document; missing fields take their defaults
    pub fn from_json_str(document: &str) -> SparkWorldResult<Self> {
        let config: Self = serde_json::from_str(document)
            .map_err(|e| SparkWorldError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> SparkWorldResult<()> {
        let checks: [(bool, &str); 5] = [
            (self.max_concurrent_decisions == 0, "max_concurrent_decisions must be at least 1"),
            (self.oracle_timeout_ms == 0, "oracle_timeout_ms must be at least 1"),
            (self.spawn_cost == 0, "spawn_cost must be at least 1"),
            (self.max_raid_haul == 0, "max_raid_haul must be at least 1"),
            (self.max_donation == 0, "max_donation must be at least 1"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(SparkWorldError::InvalidConfig((*message).to_string())),
            None => Ok(()),
        }
    }
}
