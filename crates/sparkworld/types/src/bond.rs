//! Bond types
//!
//! A bond is a mutually formed group of two or more agents. Bonds mint Spark
//! every tick and may carry a mission. Membership is a set of agent ids; the
//! agents themselves live in the world roster.

use crate::agent::Spark;
use crate::ids::{AgentId, BondId, TickId};
use crate::mission::Mission;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Spark minted per tick by a bond of `members` agents: `floor(n + (n - 1) * 0.5)`.
///
/// Groups smaller than two mint nothing.
pub const fn mint_amount(members: usize) -> Spark {
    if members < 2 {
        return 0;
    }
    let n = members as Spark;
    n + (n - 1) / 2
}

/// A bond between agents
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bond {
    /// Unique identifier
    pub id: BondId,
    /// Member agent ids
    pub members: BTreeSet<AgentId>,
    /// Designated leader
    pub leader: AgentId,
    /// Tick the bond formed
    pub created: TickId,
    /// Spark minted this tick, awaiting distribution
    pub pool: Spark,
    /// Attached mission
    pub mission: Option<Mission>,
}

impl Bond {
    /// Create a bond with no mission and an empty pool
    pub fn new(
        id: BondId,
        members: impl IntoIterator<Item = AgentId>,
        leader: AgentId,
        created: TickId,
    ) -> Self {
        Self {
            id,
            members: members.into_iter().collect(),
            leader,
            created,
            pool: 0,
            mission: None,
        }
    }

    /// Number of members
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Check membership
    pub fn contains(&self, agent: &AgentId) -> bool {
        self.members.contains(agent)
    }

    /// What this bond mints per tick at its current size
    pub fn mint_rate(&self) -> Spark {
        mint_amount(self.size())
    }

    /// The active mission, if any
    pub fn active_mission(&self) -> Option<&Mission> {
        self.mission.as_ref().filter(|m| m.is_active())
    }
}

/// An outstanding `bond` request awaiting its reciprocal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBondRequest {
    /// Requesting agent
    pub from: AgentId,
    /// Requested partner
    pub to: AgentId,
    /// Tick the request was issued
    pub issued: TickId,
}

impl PendingBondRequest {
    /// Create a request
    pub fn new(from: AgentId, to: AgentId, issued: TickId) -> Self {
        Self { from, to, issued }
    }

    /// Whether this is the mirror image of a request `from -> to`
    pub fn reciprocates(&self, from: AgentId, to: AgentId) -> bool {
        self.from == to && self.to == from
    }

    /// Whether the request is still matchable at `now` given a time-to-live in ticks
    pub fn is_live(&self, now: TickId, ttl_ticks: u64) -> bool {
        now.since(self.issued) <= ttl_ticks
    }
}
