//! Observation packets
//!
//! The packet is the only thing a policy oracle sees. It is compiled once per
//! living agent at the start of the action stage and is read-only afterwards.

use crate::action::{InboxMessage, Intent, SubmittedAction};
use crate::agent::{AgentSnapshot, PublicAgentInfo, Spark};
use crate::event::TickEvent;
use crate::ids::{AgentId, BondId, TickId};
use crate::mission::{MissionStatus, MissionStep, Suggestion};
use serde::{Deserialize, Serialize};

/// Public changes to the world since the previous packet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldNews {
    /// Living agents
    pub total_agents: usize,
    /// Live bonds
    pub total_bonds: usize,
    /// Public roster of living agents
    pub roster: Vec<PublicAgentInfo>,
    /// Agents that dissolved last tick
    pub dissolved: Vec<AgentId>,
    /// Agents spawned last tick
    pub spawned: Vec<AgentId>,
    /// Bonds formed last tick
    pub bonds_formed: Vec<BondId>,
    /// Bonds dissolved last tick
    pub bonds_dissolved: Vec<BondId>,
}

/// Mission view for a bonded agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionBriefing {
    /// Bond carrying the mission
    pub bond: BondId,
    /// Goal text
    pub goal: String,
    /// Mission leader
    pub leader: AgentId,
    /// Fellow members, the reader included
    pub roster: Vec<AgentId>,
    /// Step in effect this tick
    pub step: MissionStep,
    /// Lifecycle status
    pub status: MissionStatus,
    /// Completed rounds
    pub round: u64,
    /// Latest brief from the leader
    pub brief: Option<String>,
    /// Leader messages sent to the bond last tick
    pub leader_messages: Vec<String>,
    /// What teammates did last tick (public parts only)
    pub teammate_actions: Vec<TeammateAction>,
    /// The reader's assigned task
    pub assigned_task: Option<String>,
    /// Suggestions collected so far (leader only)
    pub suggestions: Vec<Suggestion>,
}

/// The public face of a teammate's action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeammateAction {
    /// Teammate
    pub agent: AgentId,
    /// Intent used
    pub intent: Intent,
    /// Target named, if any
    pub target: Option<AgentId>,
    /// Public content
    pub content: String,
}

impl From<&SubmittedAction> for TeammateAction {
    fn from(action: &SubmittedAction) -> Self {
        Self {
            agent: action.agent,
            intent: action.message.intent,
            target: action.message.target,
            content: action.message.content.clone(),
        }
    }
}

/// World rules every agent is told
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesDigest {
    /// Spark charged per tick
    pub upkeep_per_tick: Spark,
    /// Spark a spawn costs the initiator
    pub spawn_cost: Spark,
    /// Largest possible raid haul
    pub max_raid_haul: Spark,
    /// Minting rule
    pub minting: String,
    /// Strength rule
    pub strength: String,
    /// Intents an agent may use
    pub intents: Vec<Intent>,
}

/// Everything an agent sees when deciding its action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationPacket {
    /// Current tick
    pub tick: TickId,
    /// The agent's own state
    pub self_state: AgentSnapshot,
    /// Events involving the agent since its last packet
    pub events: Vec<TickEvent>,
    /// Messages addressed to the agent
    pub inbox: Vec<InboxMessage>,
    /// Public world news
    pub world_news: WorldNews,
    /// Mission view, for agents in a bond with a mission
    pub mission: Option<MissionBriefing>,
    /// Rules of the world
    pub rules: RulesDigest,
}

impl ObservationPacket {
    /// Whose packet this is
    pub fn agent(&self) -> AgentId {
        self.self_state.id
    }

    /// Whether the agent leads a mission that expects it to speak this tick
    pub fn leader_expected(&self) -> bool {
        self.mission
            .as_ref()
            .map(|m| m.leader == self.agent() && m.step.expects_leader())
            .unwrap_or(false)
    }
}
