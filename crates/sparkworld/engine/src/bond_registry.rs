//! Bond registry
//!
//! Owns the bond table and the pending bond requests. Agents carry a bond
//! reference and bonds carry a member set; every method that touches one side
//! updates the other in the same call, and [`BondRegistry::audit`] panics if
//! the two ever disagree.

use crate::ledger::Ledger;
use sparkworld_types::bond::{Bond, PendingBondRequest};
use sparkworld_types::event::TickEvent;
use sparkworld_types::ids::{AgentId, BondId, TickId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of recording a bond request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BondRequestOutcome {
    /// Recorded (or refreshed); waiting for the reciprocal
    Pending,
    /// The reciprocal was live; both requests are consumed
    Matched(PendingBondRequest),
}

/// Bond table plus the request handshake
#[derive(Clone, Debug)]
pub struct BondRegistry {
    bonds: BTreeMap<BondId, Bond>,
    pending: Vec<PendingBondRequest>,
    next_id: BondId,
    total_formed: u64,
}

impl BondRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            bonds: BTreeMap::new(),
            pending: Vec::new(),
            next_id: BondId::new(1),
            total_formed: 0,
        }
    }

    /// Look up a bond
    pub fn get(&self, id: &BondId) -> Option<&Bond> {
        self.bonds.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &BondId) -> Option<&mut Bond> {
        self.bonds.get_mut(id)
    }

    /// Live bonds, in id order
    pub fn bonds(&self) -> impl Iterator<Item = &Bond> {
        self.bonds.values()
    }

    pub(crate) fn bonds_mut(&mut self) -> impl Iterator<Item = &mut Bond> {
        self.bonds.values_mut()
    }

    /// Number of live bonds
    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    /// Check if there are no bonds
    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }

    /// Bonds ever formed
    pub fn total_formed(&self) -> u64 {
        self.total_formed
    }

    /// Outstanding requests, oldest first
    pub fn pending(&self) -> &[PendingBondRequest] {
        &self.pending
    }

    /// Record `from -> to`, consuming a live reciprocal if there is one
    pub fn request_bond(
        &mut self,
        from: AgentId,
        to: AgentId,
        now: TickId,
        ttl_ticks: u64,
    ) -> BondRequestOutcome {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|r| r.reciprocates(from, to) && r.is_live(now, ttl_ticks))
        {
            let reciprocal = self.pending.remove(pos);
            self.pending.retain(|r| !(r.from == from && r.to == to));
            return BondRequestOutcome::Matched(reciprocal);
        }

        match self
            .pending
            .iter_mut()
            .find(|r| r.from == from && r.to == to)
        {
            Some(existing) => existing.issued = now,
            None => self.pending.push(PendingBondRequest::new(from, to, now)),
        }
        BondRequestOutcome::Pending
    }

    /// Purge requests that had their last chance to match at `now`
    pub fn expire_requests(&mut self, now: TickId, ttl_ticks: u64) -> Vec<TickEvent> {
        let mut expired = Vec::new();
        self.pending.retain(|r| {
            if now.since(r.issued) >= ttl_ticks {
                expired.push(TickEvent::BondRequestExpired {
                    from: r.from,
                    to: r.to,
                });
                false
            } else {
                true
            }
        });
        if !expired.is_empty() {
            debug!(count = expired.len(), "Bond requests expired");
        }
        expired
    }

    /// Drop every pending request sent by or to `agent`
    pub fn drop_requests_of(&mut self, agent: &AgentId) {
        self.pending.retain(|r| r.from != *agent && r.to != *agent);
    }

    /// Create a bond from unbonded living agents
    pub fn form_bond(
        &mut self,
        ledger: &mut Ledger,
        members: &[AgentId],
        leader: AgentId,
        tick: TickId,
    ) -> BondId {
        if members.len() < 2 || !members.contains(&leader) {
            panic!("bond invariant violated: cannot form a bond from {members:?} led by {leader}");
        }

        let id = self.next_id;
        for member in members {
            match ledger.get_mut(member) {
                Some(agent) if agent.is_alive() && agent.bond.is_none() => agent.bond = Some(id),
                _ => panic!("bond invariant violated: {member} cannot join {id}"),
            }
        }

        self.next_id = id.next();
        self.total_formed += 1;
        self.bonds
            .insert(id, Bond::new(id, members.iter().copied(), leader, tick));

        info!(bond = %id, members = members.len(), leader = %leader, "Bond formed");
        id
    }

    /// Add an unbonded living agent to a bond
    pub fn add_member(&mut self, bond: BondId, agent: AgentId, ledger: &mut Ledger) {
        let Some(entry) = self.bonds.get_mut(&bond) else {
            panic!("bond invariant violated: {agent} cannot join missing {bond}");
        };
        match ledger.get_mut(&agent) {
            Some(a) if a.is_alive() && a.bond.is_none() => a.bond = Some(bond),
            _ => panic!("bond invariant violated: {agent} cannot join {bond}"),
        }
        entry.members.insert(agent);
        debug!(bond = %bond, agent = %agent, size = entry.size(), "Member added");
    }

    /// Remove a member, dissolving the bond if fewer than two remain
    ///
    /// When the leader leaves a surviving bond, the lowest remaining id leads
    /// the bond and its mission.
    pub fn remove_member(
        &mut self,
        bond: BondId,
        agent: &AgentId,
        ledger: &mut Ledger,
    ) -> Vec<TickEvent> {
        let Some(entry) = self.bonds.get_mut(&bond) else {
            panic!("bond invariant violated: {agent} leaving missing {bond}");
        };
        if !entry.members.remove(agent) {
            panic!("bond invariant violated: {agent} is not a member of {bond}");
        }
        if let Some(a) = ledger.get_mut(agent) {
            a.bond = None;
        }

        if entry.size() >= 2 {
            if entry.leader == *agent {
                if let Some(successor) = entry.members.iter().next().copied() {
                    entry.leader = successor;
                    if let Some(mission) = entry.mission.as_mut() {
                        mission.leader = successor;
                    }
                    info!(bond = %bond, leader = %successor, "Bond leader replaced");
                }
            }
            return vec![TickEvent::BondMemberLost {
                bond,
                agent: *agent,
                remaining: entry.size(),
            }];
        }

        let Some(dissolved) = self.bonds.remove(&bond) else {
            return Vec::new();
        };
        let released: Vec<AgentId> = dissolved.members.into_iter().collect();
        for member in &released {
            if let Some(a) = ledger.get_mut(member) {
                a.bond = None;
            }
        }
        info!(bond = %bond, "Bond dissolved");
        vec![TickEvent::BondDissolved { bond, released }]
    }

    /// The bond `agent` belongs to
    pub fn bond_of(&self, agent: &AgentId) -> Option<BondId> {
        self.bonds
            .values()
            .find(|b| b.contains(agent))
            .map(|b| b.id)
    }

    /// The bond `a` and `b` both belong to
    pub fn shared_bond(&self, a: &AgentId, b: &AgentId) -> Option<BondId> {
        self.bonds
            .values()
            .find(|bond| bond.contains(a) && bond.contains(b))
            .map(|bond| bond.id)
    }

    /// Panic if membership and agent bond references disagree
    pub fn audit(&self, ledger: &Ledger) {
        for bond in self.bonds.values() {
            if bond.size() < 2 {
                panic!("bond invariant violated: {} has {} members", bond.id, bond.size());
            }
            if !bond.contains(&bond.leader) {
                panic!("bond invariant violated: {} led by non-member {}", bond.id, bond.leader);
            }
            for member in &bond.members {
                match ledger.get(member) {
                    Some(agent) if agent.is_alive() && agent.bond == Some(bond.id) => {}
                    _ => panic!(
                        "bond invariant violated: member {member} of {} is out of sync",
                        bond.id
                    ),
                }
            }
        }

        for agent in ledger.living() {
            if let Some(bond) = agent.bond {
                if !self.bonds.get(&bond).map(|b| b.contains(&agent.id)).unwrap_or(false) {
                    panic!(
                        "bond invariant violated: {} points at {bond} which does not hold it",
                        agent.id
                    );
                }
            }
        }
    }
}

impl Default for BondRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkworld_types::agent::AgentProfile;
    use sparkworld_types::mission::Mission;

    const TTL: u64 = 1;

    fn world(n: usize) -> (Ledger, BondRegistry, Vec<AgentId>) {
        let mut ledger = Ledger::new();
        let ids = (0..n)
            .map(|_| ledger.open_account(AgentProfile::default(), 5, TickId::genesis()))
            .collect();
        (ledger, BondRegistry::new(), ids)
    }

    #[test]
    fn test_same_tick_handshake() {
        let (_, mut bonds, ids) = world(2);
        let t = TickId::new(3);

        assert_eq!(bonds.request_bond(ids[0], ids[1], t, TTL), BondRequestOutcome::Pending);
        let outcome = bonds.request_bond(ids[1], ids[0], t, TTL);

        assert!(matches!(outcome, BondRequestOutcome::Matched(r) if r.from == ids[0]));
        assert!(bonds.pending().is_empty());
    }

    #[test]
    fn test_handshake_across_adjacent_ticks() {
        let (_, mut bonds, ids) = world(2);

        bonds.request_bond(ids[0], ids[1], TickId::new(3), TTL);
        assert!(bonds.expire_requests(TickId::new(3), TTL).is_empty());

        let outcome = bonds.request_bond(ids[1], ids[0], TickId::new(4), TTL);
        assert!(matches!(outcome, BondRequestOutcome::Matched(_)));
    }

    #[test]
    fn test_unmatched_request_expires_after_one_tick() {
        let (_, mut bonds, ids) = world(2);

        bonds.request_bond(ids[0], ids[1], TickId::new(3), TTL);
        bonds.expire_requests(TickId::new(3), TTL);
        let expired = bonds.expire_requests(TickId::new(4), TTL);

        assert_eq!(expired.len(), 1);
        assert!(bonds.pending().is_empty());
        assert_eq!(
            bonds.request_bond(ids[1], ids[0], TickId::new(5), TTL),
            BondRequestOutcome::Pending
        );
    }

    #[test]
    fn test_repeat_request_refreshes() {
        let (_, mut bonds, ids) = world(2);

        bonds.request_bond(ids[0], ids[1], TickId::new(1), TTL);
        bonds.request_bond(ids[0], ids[1], TickId::new(2), TTL);

        assert_eq!(bonds.pending().len(), 1);
        assert_eq!(bonds.pending()[0].issued, TickId::new(2));
    }

    #[test]
    fn test_form_bond_links_both_sides() {
        let (mut ledger, mut bonds, ids) = world(2);
        let bond = bonds.form_bond(&mut ledger, &ids, ids[1], TickId::new(1));

        assert_eq!(ledger.get(&ids[0]).unwrap().bond, Some(bond));
        assert_eq!(bonds.bond_of(&ids[1]), Some(bond));
        assert_eq!(bonds.shared_bond(&ids[0], &ids[1]), Some(bond));
        bonds.audit(&ledger);
    }

    #[test]
    #[should_panic(expected = "bond invariant violated")]
    fn test_double_membership_panics() {
        let (mut ledger, mut bonds, ids) = world(3);
        bonds.form_bond(&mut ledger, &ids[0..2], ids[0], TickId::new(1));
        bonds.form_bond(&mut ledger, &ids[1..3], ids[1], TickId::new(1));
    }

    #[test]
    fn test_pair_dissolves_when_one_leaves() {
        let (mut ledger, mut bonds, ids) = world(2);
        let bond = bonds.form_bond(&mut ledger, &ids, ids[0], TickId::new(1));

        let events = bonds.remove_member(bond, &ids[0], &mut ledger);

        assert!(matches!(&events[0], TickEvent::BondDissolved { released, .. } if released == &vec![ids[1]]));
        assert!(bonds.is_empty());
        assert_eq!(ledger.get(&ids[1]).unwrap().bond, None);
        bonds.audit(&ledger);
    }

    #[test]
    fn test_leader_succession() {
        let (mut ledger, mut bonds, ids) = world(3);
        let bond = bonds.form_bond(&mut ledger, &ids, ids[0], TickId::new(1));
        bonds.get_mut(&bond).unwrap().mission =
            Some(Mission::new("goal", ids[0], TickId::new(1)));

        bonds.remove_member(bond, &ids[0], &mut ledger);

        let entry = bonds.get(&bond).unwrap();
        assert_eq!(entry.leader, ids[1]);
        assert_eq!(entry.mission.as_ref().unwrap().leader, ids[1]);
    }

    #[test]
    fn test_add_member() {
        let (mut ledger, mut bonds, ids) = world(3);
        let bond = bonds.form_bond(&mut ledger, &ids[0..2], ids[0], TickId::new(1));

        bonds.add_member(bond, ids[2], &mut ledger);

        assert_eq!(bonds.get(&bond).unwrap().size(), 3);
        assert_eq!(bonds.get(&bond).unwrap().mint_rate(), 4);
        bonds.audit(&ledger);
    }
}
