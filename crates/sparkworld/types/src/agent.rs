//! Agent types for Spark-World
//!
//! An agent is an autonomous mind whose Spark balance is both its wealth and
//! its remaining life. Agents are owned by the world roster; bonds refer to
//! them by id only.

use crate::ids::{AgentId, BondId, TickId};
use serde::{Deserialize, Serialize};

/// Integer amount of Spark
pub type Spark = u64;

/// Descriptive profile of an agent (opaque to the engine)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Display name
    pub name: String,
    /// Species
    pub species: String,
    /// Personality descriptor
    pub personality: String,
}

impl AgentProfile {
    /// Create a profile
    pub fn new(
        name: impl Into<String>,
        species: impl Into<String>,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            species: species.into(),
            personality: personality.into(),
        }
    }
}

/// Whether an agent is still part of the world
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Acting and paying upkeep
    Alive,
    /// Dissolved; never acts or is targeted again
    Dissolved,
}

/// An agent in the world roster
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier
    pub id: AgentId,
    /// Descriptive profile
    pub profile: AgentProfile,
    /// Current Spark balance
    pub balance: Spark,
    /// Ticks survived
    pub age: u64,
    /// The bond this agent belongs to, if any
    pub bond: Option<BondId>,
    /// Lifecycle status
    pub status: AgentStatus,
    /// Tick at which the agent entered the world
    pub born: TickId,
    /// Tick at which the agent dissolved
    pub dissolved: Option<TickId>,
}

impl Agent {
    /// Create a living, unbonded agent
    pub fn new(id: AgentId, profile: AgentProfile, balance: Spark, born: TickId) -> Self {
        Self {
            id,
            profile,
            balance,
            age: 0,
            bond: None,
            status: AgentStatus::Alive,
            born,
            dissolved: None,
        }
    }

    /// Builder: set the starting age
    pub fn with_age(mut self, age: u64) -> Self {
        self.age = age;
        self
    }

    /// Check if alive
    pub fn is_alive(&self) -> bool {
        self.status == AgentStatus::Alive
    }

    /// Check if bonded
    pub fn is_bonded(&self) -> bool {
        self.bond.is_some()
    }

    /// Raid strength: age plus balance
    pub fn strength(&self) -> u64 {
        self.age.saturating_add(self.balance)
    }

    /// Private view of this agent for its own observation packet
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            profile: self.profile.clone(),
            balance: self.balance,
            age: self.age,
            bond: self.bond,
            strength: self.strength(),
        }
    }

    /// Public roster entry for this agent
    pub fn public_info(&self) -> PublicAgentInfo {
        PublicAgentInfo {
            id: self.id,
            name: self.profile.name.clone(),
            species: self.profile.species.clone(),
            balance: self.balance,
            bonded: self.is_bonded(),
        }
    }
}

/// An agent's view of itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Agent id
    pub id: AgentId,
    /// Profile
    pub profile: AgentProfile,
    /// Balance at packet compilation
    pub balance: Spark,
    /// Age at packet compilation
    pub age: u64,
    /// Bond membership
    pub bond: Option<BondId>,
    /// Current raid strength
    pub strength: u64,
}

/// What every agent may know about another
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAgentInfo {
    /// Agent id
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Species
    pub species: String,
    /// Spark balance
    pub balance: Spark,
    /// Whether the agent belongs to a bond
    pub bonded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_is_age_plus_balance() {
        let agent = Agent::new(
            AgentId::new(1),
            AgentProfile::new("Ember", "wisp", "curious"),
            6,
            TickId::genesis(),
        )
        .with_age(4);

        assert_eq!(agent.strength(), 10);
        assert_eq!(agent.snapshot().strength, 10);
    }

    #[test]
    fn new_agent_is_alive_and_unbonded() {
        let agent = Agent::new(
            AgentId::new(2),
            AgentProfile::default(),
            5,
            TickId::new(3),
        );

        assert!(agent.is_alive());
        assert!(!agent.is_bonded());
        assert_eq!(agent.age, 0);
        assert!(!agent.public_info().bonded);
    }
}
