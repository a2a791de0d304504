//! Mission coordinator
//!
//! Drives each bond's mission through its meeting cycle:
//!
//! ```text
//!   Seed ──> LeaderBrief ──> MemberInput ──> LeaderAssignment ─┐
//!               ^                                              │
//!               └──────────────────────────────────────────────┘
//! ```
//!
//! Each step lasts one tick. The coordinator never grants an extra action:
//! a leader's brief or assignment *is* that leader's `reply` for the tick,
//! and a member's suggestion *is* that member's `reply` to the leader.

use crate::bond_registry::BondRegistry;
use crate::oracles::MissionReview;
use sparkworld_types::action::SubmittedAction;
use sparkworld_types::bond::Bond;
use sparkworld_types::event::TickEvent;
use sparkworld_types::ids::{AgentId, BondId, TickId};
use sparkworld_types::mission::{parse_assignment, Mission, MissionStep, Suggestion};
use sparkworld_types::observation::{MissionBriefing, TeammateAction};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-tick mission bookkeeping
#[derive(Clone, Debug, Default)]
pub struct MissionCoordinator {
    /// Leader messages recorded during the tick being resolved
    pending_leader_messages: BTreeMap<BondId, Vec<String>>,
    /// Leader messages from the previous tick
    leader_messages: BTreeMap<BondId, Vec<String>>,
    /// Members' public actions from the previous tick
    teammate_actions: BTreeMap<BondId, Vec<TeammateAction>>,
    /// Missions ever completed
    total_completed: u64,
}

impl MissionCoordinator {
    /// Create a new coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Missions ever completed
    pub fn total_completed(&self) -> u64 {
        self.total_completed
    }

    /// Attach a freshly generated mission to a bond, led by the bond's leader
    pub fn attach_mission(&mut self, bond: &mut Bond, goal: String, tick: TickId) -> TickEvent {
        info!(bond = %bond.id, leader = %bond.leader, "Mission assigned");
        bond.mission = Some(Mission::new(goal.clone(), bond.leader, tick));
        TickEvent::MissionAssigned {
            bond: bond.id,
            leader: bond.leader,
            goal,
        }
    }

    /// Whether `agent`'s reply this tick is the leader's brief or assignment
    pub fn is_leader_turn(bond: &Bond, agent: &AgentId) -> bool {
        bond.active_mission()
            .map(|m| m.leader == *agent && m.step.expects_leader())
            .unwrap_or(false)
    }

    /// Who a member's untargeted reply goes to during the input step
    pub fn suggestion_recipient(bond: &Bond, agent: &AgentId) -> Option<AgentId> {
        bond.active_mission()
            .filter(|m| m.step == MissionStep::MemberInput && m.leader != *agent)
            .map(|m| m.leader)
    }

    /// Record the leader's reply as this step's brief or assignment
    pub fn record_leader_message(&mut self, bond: &mut Bond, content: &str) -> Vec<TickEvent> {
        let bond_id = bond.id;
        let members = bond.members.clone();
        let Some(mission) = bond.mission.as_mut().filter(|m| m.is_active()) else {
            return Vec::new();
        };

        self.pending_leader_messages
            .entry(bond_id)
            .or_default()
            .push(content.to_string());

        match mission.step {
            MissionStep::LeaderBrief => {
                mission.brief = Some(content.to_string());
                debug!(bond = %bond_id, "Mission brief recorded");
                vec![TickEvent::MissionBriefed {
                    bond: bond_id,
                    leader: mission.leader,
                    content: content.to_string(),
                }]
            }
            MissionStep::LeaderAssignment => {
                mission.assignment = parse_assignment(content, &members, mission.leader);
                debug!(bond = %bond_id, tasks = mission.assignment.len(), "Tasks assigned");
                vec![TickEvent::TasksAssigned {
                    bond: bond_id,
                    tasks: mission.assignment.clone(),
                }]
            }
            MissionStep::Seed | MissionStep::MemberInput => Vec::new(),
        }
    }

    /// Collect a member's reply to the leader during the input step
    pub fn record_suggestion(
        &mut self,
        bond: &mut Bond,
        from: AgentId,
        content: &str,
    ) -> Option<TickEvent> {
        let bond_id = bond.id;
        let mission = bond
            .mission
            .as_mut()
            .filter(|m| m.is_active() && m.step == MissionStep::MemberInput && m.leader != from)?;

        mission.suggestions.push(Suggestion {
            from,
            content: content.to_string(),
        });
        Some(TickEvent::MissionSuggestion {
            bond: bond_id,
            from,
            content: content.to_string(),
        })
    }

    /// Mission view for one member of a bond
    pub fn briefing_for(&self, bond: &Bond, agent: &AgentId) -> Option<MissionBriefing> {
        let mission = bond.mission.as_ref()?;
        let is_leader = mission.leader == *agent;

        Some(MissionBriefing {
            bond: bond.id,
            goal: mission.goal.clone(),
            leader: mission.leader,
            roster: bond.members.iter().copied().collect(),
            step: mission.step,
            status: mission.status,
            round: mission.round,
            brief: mission.brief.clone(),
            leader_messages: self
                .leader_messages
                .get(&bond.id)
                .cloned()
                .unwrap_or_default(),
            teammate_actions: self
                .teammate_actions
                .get(&bond.id)
                .map(|actions| {
                    actions
                        .iter()
                        .filter(|a| a.agent != *agent)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            assigned_task: mission.task_for(agent).map(str::to_string),
            suggestions: if is_leader {
                mission.suggestions.clone()
            } else {
                Vec::new()
            },
        })
    }

    /// Roll this tick's actions and leader messages over for the next packets
    pub fn finish_tick(&mut self, bonds: &BondRegistry, actions: &[SubmittedAction]) {
        self.teammate_actions.clear();
        for action in actions {
            if let Some(bond) = bonds.bond_of(&action.agent) {
                self.teammate_actions
                    .entry(bond)
                    .or_default()
                    .push(TeammateAction::from(action));
            }
        }
        self.leader_messages = std::mem::take(&mut self.pending_leader_messages);
    }

    /// What the completion judge should see for a bond, if its mission is up for judgment
    pub fn review(&self, bond: &Bond, tick: TickId) -> Option<MissionReview> {
        let mission = bond.active_mission().filter(|m| m.created < tick)?;
        Some(MissionReview {
            bond: bond.id,
            mission: mission.clone(),
            recent_actions: self
                .teammate_actions
                .get(&bond.id)
                .cloned()
                .unwrap_or_default(),
            tick,
        })
    }

    /// Apply the completion judge's verdict
    pub fn apply_completion(
        &mut self,
        bond: &mut Bond,
        completed: bool,
        tick: TickId,
    ) -> Option<TickEvent> {
        if !completed {
            return None;
        }
        let mission = bond.mission.as_mut().filter(|m| m.is_active())?;
        mission.complete(tick);
        self.total_completed += 1;
        info!(bond = %bond.id, rounds = mission.round, "Mission completed");
        Some(TickEvent::MissionCompleted { bond: bond.id })
    }

    /// Move every active mission created before `tick` to its next step
    pub fn advance(&mut self, bonds: &mut BondRegistry, tick: TickId) -> Vec<TickEvent> {
        let mut events = Vec::new();
        for bond in bonds.bonds_mut() {
            let bond_id = bond.id;
            let Some(mission) = bond
                .mission
                .as_mut()
                .filter(|m| m.is_active() && m.created < tick)
            else {
                continue;
            };
            let from = mission.step;
            mission.advance_step();
            events.push(TickEvent::MissionStepAdvanced {
                bond: bond_id,
                from,
                to: mission.step,
                round: mission.round,
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use sparkworld_types::action::ActionMessage;
    use sparkworld_types::agent::AgentProfile;

    fn bonded(n: usize) -> (Ledger, BondRegistry, BondId, Vec<AgentId>) {
        let mut ledger = Ledger::new();
        let ids: Vec<AgentId> = (0..n)
            .map(|_| ledger.open_account(AgentProfile::default(), 5, TickId::genesis()))
            .collect();
        let mut bonds = BondRegistry::new();
        let bond = bonds.form_bond(&mut ledger, &ids, ids[0], TickId::new(1));
        (ledger, bonds, bond, ids)
    }

    #[test]
    fn test_new_mission_waits_a_tick_before_advancing() {
        let (_, mut bonds, bond, _) = bonded(2);
        let mut coordinator = MissionCoordinator::new();
        coordinator.attach_mission(bonds.get_mut(&bond).unwrap(), "goal".into(), TickId::new(1));

        assert!(coordinator.advance(&mut bonds, TickId::new(1)).is_empty());
        let events = coordinator.advance(&mut bonds, TickId::new(2));

        assert_eq!(events.len(), 1);
        assert_eq!(
            bonds.get(&bond).unwrap().mission.as_ref().unwrap().step,
            MissionStep::LeaderBrief
        );
    }

    #[test]
    fn test_full_cycle() {
        let (_, mut bonds, bond, ids) = bonded(3);
        let mut coordinator = MissionCoordinator::new();
        coordinator.attach_mission(bonds.get_mut(&bond).unwrap(), "goal".into(), TickId::new(1));
        coordinator.advance(&mut bonds, TickId::new(2));

        // Brief
        let entry = bonds.get_mut(&bond).unwrap();
        assert!(MissionCoordinator::is_leader_turn(entry, &ids[0]));
        assert!(!MissionCoordinator::is_leader_turn(entry, &ids[1]));
        let events = coordinator.record_leader_message(entry, "What should we do?");
        assert!(matches!(events[0], TickEvent::MissionBriefed { .. }));
        coordinator.advance(&mut bonds, TickId::new(3));

        // Input
        let entry = bonds.get_mut(&bond).unwrap();
        assert_eq!(MissionCoordinator::suggestion_recipient(entry, &ids[2]), Some(ids[0]));
        assert!(coordinator.record_suggestion(entry, ids[2], "scout east").is_some());
        assert!(coordinator.record_suggestion(entry, ids[0], "self talk").is_none());
        let leader_view = coordinator.briefing_for(entry, &ids[0]).unwrap();
        assert_eq!(leader_view.suggestions.len(), 1);
        assert!(coordinator.briefing_for(entry, &ids[1]).unwrap().suggestions.is_empty());
        coordinator.advance(&mut bonds, TickId::new(4));

        // Assignment
        let entry = bonds.get_mut(&bond).unwrap();
        let events = coordinator.record_leader_message(entry, "agent_002: gather\nagent_003: scout");
        assert!(matches!(&events[0], TickEvent::TasksAssigned { tasks, .. } if tasks.len() == 2));
        assert_eq!(
            coordinator.briefing_for(entry, &ids[2]).unwrap().assigned_task.as_deref(),
            Some("scout")
        );
        let events = coordinator.advance(&mut bonds, TickId::new(5));
        assert!(matches!(
            events[0],
            TickEvent::MissionStepAdvanced {
                to: MissionStep::LeaderBrief,
                round: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_leader_messages_surface_next_tick() {
        let (_, mut bonds, bond, ids) = bonded(2);
        let mut coordinator = MissionCoordinator::new();
        coordinator.attach_mission(bonds.get_mut(&bond).unwrap(), "goal".into(), TickId::new(1));
        coordinator.advance(&mut bonds, TickId::new(2));

        let entry = bonds.get_mut(&bond).unwrap();
        coordinator.record_leader_message(entry, "rally");
        assert!(coordinator.briefing_for(entry, &ids[1]).unwrap().leader_messages.is_empty());

        let actions = vec![SubmittedAction {
            agent: ids[0],
            message: ActionMessage::broadcast("rally"),
        }];
        coordinator.finish_tick(&bonds, &actions);

        let view = coordinator
            .briefing_for(bonds.get(&bond).unwrap(), &ids[1])
            .unwrap();
        assert_eq!(view.leader_messages, vec!["rally".to_string()]);
        assert_eq!(view.teammate_actions.len(), 1);
        assert_eq!(view.brief.as_deref(), Some("rally"));
    }

    #[test]
    fn test_completed_mission_is_inert() {
        let (_, mut bonds, bond, _) = bonded(2);
        let mut coordinator = MissionCoordinator::new();
        coordinator.attach_mission(bonds.get_mut(&bond).unwrap(), "goal".into(), TickId::new(1));

        let entry = bonds.get_mut(&bond).unwrap();
        assert!(coordinator.review(entry, TickId::new(1)).is_none());
        assert!(coordinator.review(entry, TickId::new(2)).is_some());
        assert!(coordinator.apply_completion(entry, true, TickId::new(2)).is_some());
        assert!(coordinator.apply_completion(entry, true, TickId::new(3)).is_none());

        assert!(coordinator.advance(&mut bonds, TickId::new(3)).is_empty());
        assert_eq!(coordinator.total_completed(), 1);
        assert!(bonds.get(&bond).is_some());
    }
}
