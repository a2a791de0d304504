//! Spark ledger
//!
//! Owns the agent roster and every balance in it. Minting and upkeep are the
//! only places Spark enters or leaves agent hands outside of Bob's donations;
//! `transfer` moves Spark between agents without changing the total.
//!
//! A ledger operation that would drive a balance below zero is a bug in the
//! caller and panics: every rule that moves Spark clamps before it calls in.

use crate::bond_registry::BondRegistry;
use rand::Rng;
use sparkworld_types::agent::{Agent, AgentProfile, AgentStatus, Spark};
use sparkworld_types::bond::mint_amount;
use sparkworld_types::event::TickEvent;
use sparkworld_types::ids::{AgentId, TickId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Outcome of the upkeep pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpkeepOutcome {
    /// Agents charged
    pub charged_agents: usize,
    /// Spark removed
    pub total: Spark,
    /// Agents left at zero, in roster order
    pub exhausted: Vec<AgentId>,
}

/// The agent roster and its balances
#[derive(Clone, Debug)]
pub struct Ledger {
    /// Every agent ever registered, dissolved ones included
    agents: BTreeMap<AgentId, Agent>,
    /// Next id to hand out
    next_id: AgentId,
    /// Lifetime minted Spark
    total_minted: Spark,
    /// Lifetime upkeep removed
    total_upkeep: Spark,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            next_id: AgentId::new(1),
            total_minted: 0,
            total_upkeep: 0,
        }
    }

    /// Add a living agent with an opening balance; ids are handed out in order
    pub fn open_account(&mut self, profile: AgentProfile, balance: Spark, born: TickId) -> AgentId {
        let id = self.next_id;
        self.next_id = id.next();
        self.agents.insert(id, Agent::new(id, profile, balance, born));
        debug!(agent = %id, balance, "Account opened");
        id
    }

    /// The id the next account will receive
    pub fn next_id(&self) -> AgentId {
        self.next_id
    }

    /// Look up an agent, living or dissolved
    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Check if an agent exists and is alive
    pub fn is_alive(&self, id: &AgentId) -> bool {
        self.agents.get(id).map(Agent::is_alive).unwrap_or(false)
    }

    /// Every agent ever registered, in id order
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Living agents, in id order
    pub fn living(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values().filter(|a| a.is_alive())
    }

    /// Ids of living agents, in id order
    pub fn living_ids(&self) -> Vec<AgentId> {
        self.living().map(|a| a.id).collect()
    }

    /// Number of living agents
    pub fn living_count(&self) -> usize {
        self.living().count()
    }

    /// Number of dissolved agents
    pub fn dissolved_count(&self) -> usize {
        self.agents.len() - self.living_count()
    }

    /// Balance of an agent (0 if unknown)
    pub fn balance(&self, id: &AgentId) -> Spark {
        self.agents.get(id).map(|a| a.balance).unwrap_or(0)
    }

    /// Spark held by living agents
    pub fn total_supply(&self) -> Spark {
        self.living().map(|a| a.balance).sum()
    }

    /// Lifetime minted Spark
    pub fn total_minted(&self) -> Spark {
        self.total_minted
    }

    /// Lifetime upkeep removed
    pub fn total_upkeep(&self) -> Spark {
        self.total_upkeep
    }

    fn living_mut(&mut self, id: &AgentId, operation: &str) -> &mut Agent {
        match self.agents.get_mut(id) {
            Some(agent) if agent.is_alive() => agent,
            Some(_) => panic!("ledger invariant violated: {operation} on dissolved agent {id}"),
            None => panic!("ledger invariant violated: {operation} on unknown agent {id}"),
        }
    }

    /// Add Spark to a living agent
    pub fn credit(&mut self, id: &AgentId, amount: Spark) {
        let agent = self.living_mut(id, "credit");
        agent.balance = agent
            .balance
            .checked_add(amount)
            .unwrap_or_else(|| panic!("ledger invariant violated: balance overflow for {id}"));
    }

    /// Remove Spark from a living agent; the caller guarantees it is held
    pub fn debit(&mut self, id: &AgentId, amount: Spark) {
        let agent = self.living_mut(id, "debit");
        let held = agent.balance;
        agent.balance = held.checked_sub(amount).unwrap_or_else(|| {
            panic!("ledger invariant violated: debit of {amount} from {id} holding {held}")
        });
    }

    /// Move Spark between living agents without changing the total
    pub fn transfer(&mut self, from: &AgentId, to: &AgentId, amount: Spark) {
        if amount == 0 {
            return;
        }
        self.debit(from, amount);
        self.credit(to, amount);
    }

    /// Credit every bond's pool with its minted Spark
    pub fn mint(&mut self, bonds: &mut BondRegistry) -> Vec<TickEvent> {
        let mut events = Vec::new();

        for bond in bonds.bonds_mut() {
            let amount = mint_amount(bond.size());
            if amount == 0 {
                continue;
            }
            bond.pool += amount;
            self.total_minted += amount;
            events.push(TickEvent::Minted {
                bond: bond.id,
                members: bond.size(),
                amount,
            });
        }

        events
    }

    /// Share out every pool one Spark at a time, each unit to a uniformly drawn member
    ///
    /// Returns the events and the Spark distributed.
    pub fn distribute<R: Rng>(
        &mut self,
        bonds: &mut BondRegistry,
        rng: &mut R,
    ) -> (Vec<TickEvent>, Spark) {
        let mut events = Vec::new();
        let mut distributed = 0;

        for bond in bonds.bonds_mut() {
            if bond.pool == 0 {
                continue;
            }
            let members: Vec<AgentId> = bond
                .members
                .iter()
                .copied()
                .filter(|m| self.is_alive(m))
                .collect();
            if members.is_empty() {
                panic!("bond invariant violated: {} holds a pool but no living members", bond.id);
            }

            let mut shares: BTreeMap<AgentId, Spark> = BTreeMap::new();
            for _ in 0..bond.pool {
                let winner = members[rng.gen_range(0..members.len())];
                *shares.entry(winner).or_insert(0) += 1;
            }

            for (recipient, amount) in shares {
                self.credit(&recipient, amount);
                events.push(TickEvent::Distributed {
                    bond: bond.id,
                    recipient,
                    amount,
                });
            }
            distributed += bond.pool;
            bond.pool = 0;
        }

        (events, distributed)
    }

    /// Charge every living agent, ageing the ones that still hold Spark
    pub fn upkeep(&mut self, per_tick: Spark) -> UpkeepOutcome {
        let mut outcome = UpkeepOutcome::default();

        for agent in self.agents.values_mut().filter(|a| a.is_alive()) {
            let charge = per_tick.min(agent.balance);
            agent.balance -= charge;
            outcome.charged_agents += 1;
            outcome.total += charge;

            if agent.balance == 0 {
                outcome.exhausted.push(agent.id);
            } else {
                agent.age += 1;
            }
        }

        self.total_upkeep += outcome.total;
        outcome
    }

    /// Dissolve an exhausted agent and remove it from its bond
    pub fn dissolve(
        &mut self,
        id: &AgentId,
        tick: TickId,
        bonds: &mut BondRegistry,
    ) -> Vec<TickEvent> {
        let agent = self.living_mut(id, "dissolve");
        if agent.balance != 0 {
            panic!(
                "ledger invariant violated: dissolving {id} with balance {}",
                agent.balance
            );
        }
        agent.status = AgentStatus::Dissolved;
        agent.dissolved = Some(tick);
        let bond = agent.bond;

        info!(agent = %id, tick = tick.number(), "Agent dissolved");

        let mut events = vec![TickEvent::AgentDissolved { agent: *id, bond }];
        bonds.drop_requests_of(id);
        if let Some(bond) = bond {
            events.extend(bonds.remove_member(bond, id, self));
        }
        events
    }

    /// Panic if any agent-side invariant is broken
    pub fn audit(&self) {
        for agent in self.agents.values() {
            if agent.is_alive() {
                continue;
            }
            if agent.balance != 0 {
                panic!(
                    "ledger invariant violated: dissolved {} holds {}",
                    agent.id, agent.balance
                );
            }
            if agent.bond.is_some() {
                panic!("ledger invariant violated: dissolved {} is still bonded", agent.id);
            }
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
