//! Capability interfaces for the engine's external collaborators
//!
//! Every decision the engine does not make itself sits behind one of these
//! traits. Async capabilities may be slow and are always called under a
//! timeout; a failure never aborts a tick.
//!
//! ```text
//!   PolicyOracle      packet  -> action      (per agent, per tick, fanned out)
//!   MissionGenerator  roster  -> goal        (once per new bond)
//!   CompletionJudge   mission -> completed?  (once per active mission per tick)
//!   DonationJudge     plea    -> accept?     (once per plea, in order)
//!   ReplenishmentSource       -> spark       (once per tick)
//!   CharacterForge    parents -> profile     (once per spawn)
//!   EventSink         report                 (once per tick)
//! ```

pub mod scripted;

use crate::errors::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sparkworld_types::action::{ActionMessage, Plea};
use sparkworld_types::agent::{Agent, AgentProfile, PublicAgentInfo, Spark};
use sparkworld_types::event::TickReport;
use sparkworld_types::ids::{AgentId, BondId, TickId};
use sparkworld_types::mission::Mission;
use sparkworld_types::observation::{ObservationPacket, TeammateAction};
use std::sync::Arc;

/// Chooses one agent's action for the tick
#[async_trait]
pub trait PolicyOracle: Send + Sync {
    /// Decide from the agent's observation packet.
    ///
    /// Reads nothing but the packet; an error counts as no action.
    async fn decide(&self, packet: &ObservationPacket) -> Result<ActionMessage, OracleError>;
}

/// What the mission generator is told about a new bond
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionRequest {
    /// New bond
    pub bond: BondId,
    /// Mission leader
    pub leader: AgentId,
    /// Public view of the members
    pub roster: Vec<PublicAgentInfo>,
    /// Tick of formation
    pub tick: TickId,
}

/// Produces a goal for a newly formed bond
#[async_trait]
pub trait MissionGenerator: Send + Sync {
    /// Goal text for the bond
    async fn generate(&self, request: &MissionRequest) -> Result<String, OracleError>;
}

/// What the completion judge is shown
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionReview {
    /// Bond carrying the mission
    pub bond: BondId,
    /// Mission state after this tick's actions
    pub mission: Mission,
    /// This tick's actions by the bond's members (public parts)
    pub recent_actions: Vec<TeammateAction>,
    /// Current tick
    pub tick: TickId,
}

/// Decides whether a mission is complete
#[async_trait]
pub trait CompletionJudge: Send + Sync {
    /// `true` marks the mission completed
    async fn judge(&self, review: &MissionReview) -> Result<bool, OracleError>;
}

/// Decides whether Bob grants a plea
#[async_trait]
pub trait DonationJudge: Send + Sync {
    /// `true` accepts the plea
    async fn judge(&self, plea: &Plea) -> Result<bool, OracleError>;
}

/// Supplies Spark to Bob's stash once per tick
pub trait ReplenishmentSource: Send + Sync {
    /// Spark to add after this tick's donations
    fn replenish(&self, tick: TickId, living_agents: usize) -> Spark;
}

/// Adds a fixed amount every tick
#[derive(Clone, Copy, Debug)]
pub struct FixedReplenishment(pub Spark);

impl ReplenishmentSource for FixedReplenishment {
    fn replenish(&self, _tick: TickId, _living_agents: usize) -> Spark {
        self.0
    }
}

/// Adds `max(1, floor(sqrt(living agents)))` every tick
#[derive(Clone, Copy, Debug, Default)]
pub struct PopulationScaledReplenishment;

impl ReplenishmentSource for PopulationScaledReplenishment {
    fn replenish(&self, _tick: TickId, living_agents: usize) -> Spark {
        let mut root: Spark = 0;
        while (root + 1) * (root + 1) <= living_agents as Spark {
            root += 1;
        }
        root.max(1)
    }
}

/// Manufactures the profile of a spawned agent
pub trait CharacterForge: Send + Sync {
    /// Profile for `child`, born of `parent` and `partner`
    fn forge(&self, parent: &Agent, partner: &Agent, child: AgentId) -> AgentProfile;
}

/// Derives a child's profile from its parents
#[derive(Clone, Copy, Debug, Default)]
pub struct LineageForge;

impl CharacterForge for LineageForge {
    fn forge(&self, parent: &Agent, partner: &Agent, child: AgentId) -> AgentProfile {
        let species = if parent.profile.species == partner.profile.species {
            parent.profile.species.clone()
        } else {
            format!("{}-{}", parent.profile.species, partner.profile.species)
        };
        AgentProfile::new(
            format!("{} {}", parent.profile.name, child.number()),
            species,
            format!(
                "child of {} and {}",
                parent.profile.name, partner.profile.name
            ),
        )
    }
}

/// Receives every finished tick report
pub trait EventSink: Send + Sync {
    /// Handle a report; must not block for long
    fn emit(&self, report: &TickReport);
}

/// The full set of collaborators a [`TickEngine`](crate::orchestrator::TickEngine) calls
#[derive(Clone)]
pub struct Oracles {
    /// Per-agent decisions
    pub policy: Arc<dyn PolicyOracle>,
    /// Mission goals
    pub missions: Arc<dyn MissionGenerator>,
    /// Mission completion
    pub completion: Arc<dyn CompletionJudge>,
    /// Plea judgments
    pub donations: Arc<dyn DonationJudge>,
    /// Stash top-ups
    pub replenishment: Arc<dyn ReplenishmentSource>,
    /// Child profiles
    pub forge: Arc<dyn CharacterForge>,
}

impl Oracles {
    /// Create a collaborator set with population-scaled replenishment and the lineage forge
    pub fn new(
        policy: Arc<dyn PolicyOracle>,
        missions: Arc<dyn MissionGenerator>,
        completion: Arc<dyn CompletionJudge>,
        donations: Arc<dyn DonationJudge>,
    ) -> Self {
        Self {
            policy,
            missions,
            completion,
            donations,
            replenishment: Arc::new(PopulationScaledReplenishment),
            forge: Arc::new(LineageForge),
        }
    }

    /// Builder: set the replenishment source
    pub fn with_replenishment(mut self, source: Arc<dyn ReplenishmentSource>) -> Self {
        self.replenishment = source;
        self
    }

    /// Builder: set the character forge
    pub fn with_forge(mut self, forge: Arc<dyn CharacterForge>) -> Self {
        self.forge = forge;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_scaled_rate() {
        let source = PopulationScaledReplenishment;
        let tick = TickId::new(1);

        assert_eq!(source.replenish(tick, 0), 1);
        assert_eq!(source.replenish(tick, 3), 1);
        assert_eq!(source.replenish(tick, 4), 2);
        assert_eq!(source.replenish(tick, 15), 3);
        assert_eq!(source.replenish(tick, 100), 10);
    }

    #[test]
    fn lineage_forge_names_the_child() {
        let parent = Agent::new(
            AgentId::new(1),
            AgentProfile::new("Ember", "wisp", "bold"),
            5,
            TickId::genesis(),
        );
        let partner = Agent::new(
            AgentId::new(2),
            AgentProfile::new("Moss", "golem", "calm"),
            5,
            TickId::genesis(),
        );

        let profile = LineageForge.forge(&parent, &partner, AgentId::new(9));

        assert_eq!(profile.name, "Ember 9");
        assert_eq!(profile.species, "wisp-golem");
        assert!(profile.personality.contains("Moss"));
    }
}
