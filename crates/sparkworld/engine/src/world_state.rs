//! World state for Spark-World
//!
//! The single-writer state the orchestrator threads through every stage. It
//! owns the ledger, the bond registry, mission bookkeeping, Bob's stash, the
//! plea queue, inboxes and the one random source of the run.

use crate::bond_registry::BondRegistry;
use crate::donation_gateway::DonationGateway;
use crate::ledger::Ledger;
use crate::mission_coordinator::MissionCoordinator;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use sparkworld_types::action::{InboxMessage, Intent, Plea};
use sparkworld_types::agent::{Agent, Spark};
use sparkworld_types::bond::{Bond, PendingBondRequest};
use sparkworld_types::config::EngineConfig;
use sparkworld_types::event::{TickEvent, TickReport, WorldStats};
use sparkworld_types::ids::{AgentId, BondId, MessageId, TickId};
use std::collections::BTreeMap;

/// The world's random source
pub type WorldRng = ChaCha12Rng;

/// Public deltas from the previous tick, shown as world news
#[derive(Clone, Debug, Default)]
pub(crate) struct NewsDelta {
    pub dissolved: Vec<AgentId>,
    pub spawned: Vec<AgentId>,
    pub bonds_formed: Vec<BondId>,
    pub bonds_dissolved: Vec<BondId>,
}

/// The complete Spark-World state
pub struct WorldState {
    pub(crate) config: EngineConfig,
    pub(crate) tick: TickId,
    pub(crate) ledger: Ledger,
    pub(crate) bonds: BondRegistry,
    pub(crate) missions: MissionCoordinator,
    pub(crate) gateway: DonationGateway,
    /// Pleas queued this tick, heard next tick
    pub(crate) pleas: Vec<Plea>,
    pub(crate) inboxes: BTreeMap<AgentId, Vec<InboxMessage>>,
    /// Sender and tick of recent messages, for `in_reply_to` routing
    message_senders: BTreeMap<MessageId, (AgentId, TickId)>,
    next_message: MessageId,
    pub(crate) rng: WorldRng,
    /// Events emitted after the last packet compilation, not yet seen by agents
    pub(crate) unseen_events: Vec<TickEvent>,
    pub(crate) news: NewsDelta,
    pub(crate) stats: WorldStats,
    started: bool,
}

impl WorldState {
    /// Create an empty world
    pub fn new(config: EngineConfig) -> Self {
        Self {
            rng: WorldRng::seed_from_u64(config.seed),
            config,
            tick: TickId::genesis(),
            ledger: Ledger::new(),
            bonds: BondRegistry::new(),
            missions: MissionCoordinator::new(),
            gateway: DonationGateway::new(0),
            pleas: Vec::new(),
            inboxes: BTreeMap::new(),
            message_senders: BTreeMap::new(),
            next_message: MessageId(1),
            unseen_events: Vec::new(),
            news: NewsDelta::default(),
            stats: WorldStats::default(),
            started: false,
        }
    }

    /// Configuration in force
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Last completed tick
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// The ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The bond registry
    pub fn bonds(&self) -> &BondRegistry {
        &self.bonds
    }

    /// Bob's stash
    pub fn stash(&self) -> Spark {
        self.gateway.stash()
    }

    /// Pleas waiting for next tick
    pub fn pleas(&self) -> &[Plea] {
        &self.pleas
    }

    /// Cumulative statistics as of the last completed tick
    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }

    /// Whether the first tick has begun
    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Open Bob's stash on the first tick
    pub(crate) fn start(&mut self) {
        if self.started {
            return;
        }
        let opening = self
            .config
            .initial_stash
            .unwrap_or(self.ledger.living_count() as Spark);
        self.gateway = DonationGateway::new(opening);
        self.started = true;
    }

    /// Place a message in `to`'s inbox
    pub(crate) fn deliver(
        &mut self,
        from: AgentId,
        to: AgentId,
        intent: Intent,
        content: &str,
        in_reply_to: Option<MessageId>,
        tick: TickId,
    ) -> TickEvent {
        let id = self.next_message;
        self.next_message = id.next();
        self.message_senders.insert(id, (from, tick));
        self.inboxes.entry(to).or_default().push(InboxMessage {
            id,
            from,
            intent,
            content: content.to_string(),
            tick,
            in_reply_to,
        });
        TickEvent::MessageDelivered {
            id,
            from,
            to,
            intent,
        }
    }

    /// Sender of a message that can still be answered
    pub(crate) fn sender_of(&self, message: &MessageId) -> Option<AgentId> {
        self.message_senders.get(message).map(|(sender, _)| *sender)
    }

    /// Drop inboxes of dissolved agents and the routes back to them
    pub(crate) fn forget_dissolved(&mut self) {
        let ledger = &self.ledger;
        self.inboxes.retain(|agent, _| ledger.is_alive(agent));
        self.message_senders
            .retain(|_, (sender, _)| ledger.is_alive(sender));
    }

    /// Forget routes for messages older than the event history window
    fn forget_stale_messages(&mut self, now: TickId) {
        let window = self.config.event_history_ticks as u64;
        self.message_senders
            .retain(|_, (_, sent)| now.since(*sent) <= window);
    }

    /// Fold a finished tick into the cumulative statistics
    pub(crate) fn record(&mut self, report: &TickReport) {
        let living = self.ledger.living_count();
        let stats = &mut self.stats;
        stats.tick = report.tick;
        stats.living_agents = living;
        stats.dissolved_agents = self.ledger.dissolved_count();
        stats.bonds = self.bonds.len();
        stats.stash = self.gateway.stash();
        stats.total_supply = self.ledger.total_supply();
        stats.total_minted = self.ledger.total_minted();
        stats.total_upkeep = self.ledger.total_upkeep();
        stats.total_donated = self.gateway.total_donated();
        stats.total_replenished = self.gateway.total_replenished();
        stats.total_raids += report.raids;
        stats.total_bonds_formed = self.bonds.total_formed();
        stats.total_spawned += report.spawned.len() as u64;
        stats.peak_population = stats.peak_population.max(living);

        self.forget_stale_messages(report.tick);

        self.news = NewsDelta {
            dissolved: report.dissolved.clone(),
            spawned: report.spawned.clone(),
            bonds_formed: report.bonds_formed.clone(),
            bonds_dissolved: report.bonds_dissolved.clone(),
        };
    }

    /// Run every ledger, registry and stash audit; panics on violation
    pub(crate) fn audit(&self) {
        self.ledger.audit();
        self.bonds.audit(&self.ledger);
        self.gateway.audit();
    }

    /// Serializable copy of the world for an external persistence layer
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            agents: self.ledger.agents().cloned().collect(),
            bonds: self.bonds.bonds().cloned().collect(),
            pending_requests: self.bonds.pending().to_vec(),
            pleas: self.pleas.clone(),
            stash: self.gateway.stash(),
            stats: self.stats.clone(),
        }
    }
}

/// Point-in-time copy of the world
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Last completed tick
    pub tick: TickId,
    /// Every agent, dissolved ones included
    pub agents: Vec<Agent>,
    /// Live bonds
    pub bonds: Vec<Bond>,
    /// Outstanding bond requests
    pub pending_requests: Vec<PendingBondRequest>,
    /// Pleas waiting for next tick
    pub pleas: Vec<Plea>,
    /// Bob's stash
    pub stash: Spark,
    /// Cumulative statistics
    pub stats: WorldStats,
}

impl WorldSnapshot {
    /// Look up an agent in the snapshot
    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == *id)
    }
}
