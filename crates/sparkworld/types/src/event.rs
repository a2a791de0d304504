//! Tick events and reports
//!
//! Every observable effect of a tick is recorded as a [`TickEvent`]. The full,
//! ordered list plus all submitted actions (private reasoning included) forms
//! the [`TickReport`] handed to the narrative and persistence collaborators.

use crate::action::{Intent, SubmittedAction};
use crate::agent::Spark;
use crate::ids::{AgentId, BondId, MessageId, TickId};
use crate::mission::MissionStep;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Why a submitted action had no effect
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Unparseable or missing a required field
    #[error("malformed action: {detail}")]
    Malformed {
        /// What was wrong
        detail: String,
    },
    /// The actor already submitted an action this tick
    #[error("only one action per tick is accepted")]
    DuplicateSubmission,
    /// The actor is not a living agent
    #[error("actor is not a living agent")]
    ActorNotLiving,
    /// Self-targeting where it is not allowed
    #[error("cannot target self")]
    SelfTarget,
    /// Target does not exist
    #[error("unknown target {target}")]
    UnknownTarget {
        /// Named target
        target: AgentId,
    },
    /// Target has dissolved
    #[error("target {target} has dissolved")]
    TargetDissolved {
        /// Named target
        target: AgentId,
    },
    /// Actor already belongs to a bond
    #[error("already bonded")]
    AlreadyBonded,
    /// Target already belongs to a bond
    #[error("target {target} is already bonded")]
    TargetBonded {
        /// Named target
        target: AgentId,
    },
    /// Actor and partner are not in the same bond
    #[error("{partner} is not a bond partner")]
    NotBondPartners {
        /// Named partner
        partner: AgentId,
    },
    /// Not enough Spark
    #[error("needs {required} spark, has {available}")]
    InsufficientBalance {
        /// Spark required
        required: Spark,
        /// Spark held
        available: Spark,
    },
    /// `in_reply_to` does not name a known message
    #[error("unknown message {message}")]
    UnknownMessage {
        /// Named message
        message: MessageId,
    },
}

/// Why an agent contributed no action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum NoActionCause {
    /// The policy oracle did not answer in time
    OracleTimeout,
    /// The policy oracle failed or returned an invalid payload
    OracleFailure {
        /// Failure description
        detail: String,
    },
}

/// Why a plea received nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    /// The donation judge said no
    Judged,
    /// Bob's stash was empty; the judge was not consulted
    StashEmpty,
    /// The requester dissolved before the plea was heard
    RequesterDissolved,
    /// The donation judge failed; treated as a decline
    JudgeFailed,
}

/// Something that happened during a tick
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickEvent {
    /// A bond minted Spark into its pool
    Minted {
        /// Minting bond
        bond: BondId,
        /// Member count at minting
        members: usize,
        /// Spark minted
        amount: Spark,
    },
    /// Pool Spark landed with a member
    Distributed {
        /// Source bond
        bond: BondId,
        /// Receiving member
        recipient: AgentId,
        /// Spark received
        amount: Spark,
    },
    /// A `request_spark` was queued for the next tick
    PleaQueued {
        /// Pleading agent
        agent: AgentId,
    },
    /// Bob granted a plea
    DonationGranted {
        /// Recipient
        agent: AgentId,
        /// Spark donated
        amount: Spark,
        /// Stash left afterwards
        stash_after: Spark,
    },
    /// Bob declined a plea
    PleaDeclined {
        /// Pleading agent
        agent: AgentId,
        /// Why
        reason: DeclineReason,
    },
    /// Bob's stash was topped up
    StashReplenished {
        /// Spark added
        amount: Spark,
        /// Stash afterwards
        stash_after: Spark,
    },
    /// A bond request was recorded
    BondRequested {
        /// Requester
        from: AgentId,
        /// Requested partner
        to: AgentId,
    },
    /// A bond request lapsed without a reciprocal
    BondRequestExpired {
        /// Requester
        from: AgentId,
        /// Requested partner
        to: AgentId,
    },
    /// Two agents formed a bond
    BondFormed {
        /// New bond
        bond: BondId,
        /// Founding members
        members: Vec<AgentId>,
        /// Leader
        leader: AgentId,
    },
    /// A mission was attached to a bond
    MissionAssigned {
        /// Bond
        bond: BondId,
        /// Mission leader
        leader: AgentId,
        /// Goal text
        goal: String,
    },
    /// The leader briefed the bond
    MissionBriefed {
        /// Bond
        bond: BondId,
        /// Leader
        leader: AgentId,
        /// Brief text
        content: String,
    },
    /// A member offered a suggestion to the leader
    MissionSuggestion {
        /// Bond
        bond: BondId,
        /// Suggesting member
        from: AgentId,
        /// Suggestion text
        content: String,
    },
    /// The leader assigned tasks
    TasksAssigned {
        /// Bond
        bond: BondId,
        /// Task per member
        tasks: BTreeMap<AgentId, String>,
    },
    /// A mission moved to its next step
    MissionStepAdvanced {
        /// Bond
        bond: BondId,
        /// Step left
        from: MissionStep,
        /// Step entered
        to: MissionStep,
        /// Completed rounds
        round: u64,
    },
    /// A mission was judged complete
    MissionCompleted {
        /// Bond
        bond: BondId,
    },
    /// A raid was resolved
    RaidResolved {
        /// Attacker
        attacker: AgentId,
        /// Defender
        defender: AgentId,
        /// Whether the attacker won
        success: bool,
        /// Attacker strength at resolution
        attacker_strength: u64,
        /// Defender strength at resolution
        defender_strength: u64,
        /// Spark moved (to attacker on success, to defender on failure)
        transferred: Spark,
    },
    /// A new agent was created by `spawn_with`
    AgentSpawned {
        /// Paying parent
        parent: AgentId,
        /// Bond partner named in the action
        partner: AgentId,
        /// The new agent
        child: AgentId,
        /// Bond the child joined
        bond: BondId,
        /// Spark paid by the parent and given to the child
        cost: Spark,
    },
    /// A message was placed in an inbox
    MessageDelivered {
        /// Message id
        id: MessageId,
        /// Sender
        from: AgentId,
        /// Recipient
        to: AgentId,
        /// Intent that carried the message
        intent: Intent,
    },
    /// An action was ignored
    ActionRejected {
        /// Actor
        agent: AgentId,
        /// Intent of the rejected action
        intent: Option<Intent>,
        /// Why
        reason: RejectionReason,
    },
    /// An agent submitted nothing usable
    NoAction {
        /// Agent
        agent: AgentId,
        /// Why
        cause: NoActionCause,
    },
    /// Upkeep was charged
    UpkeepCharged {
        /// Agents charged
        agents: usize,
        /// Spark removed
        total: Spark,
    },
    /// An agent ran out of Spark and left the world
    AgentDissolved {
        /// Agent
        agent: AgentId,
        /// Bond it belonged to
        bond: Option<BondId>,
    },
    /// A bond lost a member and lives on
    BondMemberLost {
        /// Bond
        bond: BondId,
        /// Departed member
        agent: AgentId,
        /// Members left
        remaining: usize,
    },
    /// A bond fell below two members and dissolved
    BondDissolved {
        /// Bond
        bond: BondId,
        /// Members released (still living)
        released: Vec<AgentId>,
    },
}

impl TickEvent {
    /// Whether `agent` was an actor, target or beneficiary of this event
    pub fn involves(&self, agent: &AgentId) -> bool {
        match self {
            Self::Minted { .. }
            | Self::StashReplenished { .. }
            | Self::UpkeepCharged { .. }
            | Self::MissionStepAdvanced { .. }
            | Self::MissionCompleted { .. }
            | Self::MissionAssigned { .. }
            | Self::MissionBriefed { .. }
            | Self::MissionSuggestion { .. } => false,
            Self::Distributed { recipient, .. } => recipient == agent,
            Self::PleaQueued { agent: a }
            | Self::DonationGranted { agent: a, .. }
            | Self::PleaDeclined { agent: a, .. }
            | Self::ActionRejected { agent: a, .. }
            | Self::NoAction { agent: a, .. }
            | Self::AgentDissolved { agent: a, .. }
            | Self::BondMemberLost { agent: a, .. } => a == agent,
            Self::BondRequested { from, to }
            | Self::BondRequestExpired { from, to }
            | Self::MessageDelivered { from, to, .. } => from == agent || to == agent,
            Self::BondFormed { members, .. } => members.contains(agent),
            Self::TasksAssigned { tasks, .. } => tasks.contains_key(agent),
            Self::RaidResolved {
                attacker, defender, ..
            } => attacker == agent || defender == agent,
            Self::AgentSpawned {
                parent,
                partner,
                child,
                ..
            } => parent == agent || partner == agent || child == agent,
            Self::BondDissolved { released, .. } => released.contains(agent),
        }
    }

    /// Short name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Minted { .. } => "minted",
            Self::Distributed { .. } => "distributed",
            Self::PleaQueued { .. } => "plea_queued",
            Self::DonationGranted { .. } => "donation_granted",
            Self::PleaDeclined { .. } => "plea_declined",
            Self::StashReplenished { .. } => "stash_replenished",
            Self::BondRequested { .. } => "bond_requested",
            Self::BondRequestExpired { .. } => "bond_request_expired",
            Self::BondFormed { .. } => "bond_formed",
            Self::MissionAssigned { .. } => "mission_assigned",
            Self::MissionBriefed { .. } => "mission_briefed",
            Self::MissionSuggestion { .. } => "mission_suggestion",
            Self::TasksAssigned { .. } => "tasks_assigned",
            Self::MissionStepAdvanced { .. } => "mission_step_advanced",
            Self::MissionCompleted { .. } => "mission_completed",
            Self::RaidResolved { .. } => "raid_resolved",
            Self::AgentSpawned { .. } => "agent_spawned",
            Self::MessageDelivered { .. } => "message_delivered",
            Self::ActionRejected { .. } => "action_rejected",
            Self::NoAction { .. } => "no_action",
            Self::UpkeepCharged { .. } => "upkeep_charged",
            Self::AgentDissolved { .. } => "agent_dissolved",
            Self::BondMemberLost { .. } => "bond_member_lost",
            Self::BondDissolved { .. } => "bond_dissolved",
        }
    }
}

/// The six stages of a tick, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Bonds mint into their pools
    Mint,
    /// Bob hears last tick's pleas
    Donations,
    /// Observation, decisions and resolution
    Actions,
    /// Pools are shared out
    Distribute,
    /// Upkeep and dissolution
    Upkeep,
    /// Event log emission
    Emit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mint => "mint",
            Self::Donations => "donations",
            Self::Actions => "actions",
            Self::Distribute => "distribute",
            Self::Upkeep => "upkeep",
            Self::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// One-line outcome of a stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Stage
    pub stage: Stage,
    /// Outcome
    pub summary: String,
}

/// Everything a tick produced
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number
    pub tick: TickId,
    /// Per-stage summaries, in order
    pub stages: Vec<StageSummary>,
    /// Ordered events
    pub events: Vec<TickEvent>,
    /// Every accepted action, including private reasoning
    pub actions: Vec<SubmittedAction>,
    /// Spark held by agents before the tick
    pub supply_before: Spark,
    /// Spark held by agents after the tick
    pub supply_after: Spark,
    /// Spark minted
    pub minted: Spark,
    /// Spark distributed from pools
    pub distributed: Spark,
    /// Spark removed by upkeep
    pub upkeep: Spark,
    /// Spark donated by Bob
    pub donated: Spark,
    /// Spark added to Bob's stash
    pub replenished: Spark,
    /// Raids resolved
    pub raids: u64,
    /// Agents created this tick
    pub spawned: Vec<AgentId>,
    /// Agents dissolved this tick
    pub dissolved: Vec<AgentId>,
    /// Bonds formed this tick
    pub bonds_formed: Vec<BondId>,
    /// Bonds dissolved this tick
    pub bonds_dissolved: Vec<BondId>,
}

impl TickReport {
    /// Empty report for a tick
    pub fn new(tick: TickId) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }

    /// Events involving `agent`
    pub fn events_for<'a>(&'a self, agent: &'a AgentId) -> impl Iterator<Item = &'a TickEvent> {
        self.events.iter().filter(move |e| e.involves(agent))
    }

    /// Whether the agent-held supply moved exactly by mint - upkeep + donations
    pub fn is_conserving(&self) -> bool {
        self.supply_before + self.minted + self.donated == self.supply_after + self.upkeep
    }
}

/// Cumulative statistics for a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldStats {
    /// Last completed tick
    pub tick: TickId,
    /// Living agents
    pub living_agents: usize,
    /// Dissolved agents
    pub dissolved_agents: usize,
    /// Live bonds
    pub bonds: usize,
    /// Bob's stash
    pub stash: Spark,
    /// Spark held by living agents
    pub total_supply: Spark,
    /// Spark ever minted
    pub total_minted: Spark,
    /// Spark ever removed by upkeep
    pub total_upkeep: Spark,
    /// Spark ever donated
    pub total_donated: Spark,
    /// Spark ever added to the stash, initial stash included
    pub total_replenished: Spark,
    /// Raids ever resolved
    pub total_raids: u64,
    /// Bonds ever formed
    pub total_bonds_formed: u64,
    /// Agents ever spawned
    pub total_spawned: u64,
    /// Largest living population seen
    pub peak_population: usize,
}
