//! Observation packet compilation
//!
//! Packets are built for every living agent at the start of the action
//! stage, before any oracle is consulted. Compiling drains the inboxes and
//! the backlog of unseen events, so each message and event reaches an agent
//! exactly once.

use crate::world_state::WorldState;
use sparkworld_types::action::Intent;
use sparkworld_types::config::EngineConfig;
use sparkworld_types::event::TickEvent;
use sparkworld_types::ids::TickId;
use sparkworld_types::observation::{ObservationPacket, RulesDigest, WorldNews};

/// The rules every agent is told
pub fn rules_digest(config: &EngineConfig) -> RulesDigest {
    RulesDigest {
        upkeep_per_tick: config.upkeep_per_tick,
        spawn_cost: config.spawn_cost,
        max_raid_haul: config.max_raid_haul,
        minting: "a bond of n members mints floor(n + (n - 1) * 0.5) spark per tick, \
                  shared one spark at a time among random members"
            .to_string(),
        strength: "strength = age + balance; a raid succeeds with probability \
                   attacker / (attacker + defender)"
            .to_string(),
        intents: Intent::ALL.to_vec(),
    }
}

/// Public news for this tick's packets
fn world_news(world: &WorldState) -> WorldNews {
    WorldNews {
        total_agents: world.ledger.living_count(),
        total_bonds: world.bonds.len(),
        roster: world.ledger.living().map(|a| a.public_info()).collect(),
        dissolved: world.news.dissolved.clone(),
        spawned: world.news.spawned.clone(),
        bonds_formed: world.news.bonds_formed.clone(),
        bonds_dissolved: world.news.bonds_dissolved.clone(),
    }
}

/// Build one packet per living agent, in ascending id order
///
/// `this_tick` holds the events already emitted earlier in the current tick
/// (minting, donations); they are delivered along with the backlog.
pub fn compile_packets(
    world: &mut WorldState,
    tick: TickId,
    this_tick: &[TickEvent],
) -> Vec<ObservationPacket> {
    let mut backlog = std::mem::take(&mut world.unseen_events);
    backlog.extend_from_slice(this_tick);

    let news = world_news(world);
    let rules = rules_digest(&world.config);

    let mut packets = Vec::new();
    for id in world.ledger.living_ids() {
        let Some(agent) = world.ledger.get(&id) else {
            continue;
        };
        let self_state = agent.snapshot();
        let mission = agent
            .bond
            .and_then(|bond| world.bonds.get(&bond))
            .and_then(|bond| world.missions.briefing_for(bond, &id));

        packets.push(ObservationPacket {
            tick,
            self_state,
            events: backlog.iter().filter(|e| e.involves(&id)).cloned().collect(),
            inbox: world.inboxes.remove(&id).unwrap_or_default(),
            world_news: news.clone(),
            mission,
            rules: rules.clone(),
        });
    }

    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkworld_types::agent::AgentProfile;
    use sparkworld_types::mission::MissionStep;

    fn world(n: usize) -> (WorldState, Vec<sparkworld_types::ids::AgentId>) {
        let mut world = WorldState::new(EngineConfig::test_world(1));
        let ids = (0..n)
            .map(|i| {
                world.ledger.open_account(
                    AgentProfile::new(format!("agent {i}"), "wisp", "calm"),
                    5,
                    TickId::genesis(),
                )
            })
            .collect();
        (world, ids)
    }

    #[test]
    fn test_one_packet_per_living_agent() {
        let (mut world, ids) = world(3);
        let packets = compile_packets(&mut world, TickId::new(1), &[]);

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].agent(), ids[0]);
        assert_eq!(packets[2].world_news.roster.len(), 3);
        assert_eq!(packets[1].rules.intents.len(), 5);
        assert!(packets[1].mission.is_none());
    }

    #[test]
    fn test_inbox_is_drained_once() {
        let (mut world, ids) = world(2);
        world.deliver(ids[0], ids[1], Intent::Reply, "hi", None, TickId::new(1));

        let first = compile_packets(&mut world, TickId::new(2), &[]);
        let second = compile_packets(&mut world, TickId::new(3), &[]);

        assert_eq!(first[1].inbox.len(), 1);
        assert!(second[1].inbox.is_empty());
        assert!(first[0].inbox.is_empty());
    }

    #[test]
    fn test_events_are_filtered_per_agent() {
        let (mut world, ids) = world(3);
        world.unseen_events.push(TickEvent::RaidResolved {
            attacker: ids[0],
            defender: ids[1],
            success: false,
            attacker_strength: 5,
            defender_strength: 5,
            transferred: 1,
        });
        let this_tick = [TickEvent::PleaQueued { agent: ids[2] }];

        let packets = compile_packets(&mut world, TickId::new(2), &this_tick);

        assert_eq!(packets[0].events.len(), 1);
        assert_eq!(packets[1].events.len(), 1);
        assert_eq!(packets[2].events, this_tick.to_vec());
        assert!(world.unseen_events.is_empty());
    }

    #[test]
    fn test_bonded_agent_sees_mission() {
        let (mut world, ids) = world(2);
        let bond = world
            .bonds
            .form_bond(&mut world.ledger, &ids, ids[0], TickId::new(1));
        let entry = world.bonds.get_mut(&bond).unwrap();
        world
            .missions
            .attach_mission(entry, "Light the beacon".into(), TickId::new(1));

        let packets = compile_packets(&mut world, TickId::new(2), &[]);
        let briefing = packets[1].mission.as_ref().unwrap();

        assert_eq!(briefing.goal, "Light the beacon");
        assert_eq!(briefing.leader, ids[0]);
        assert_eq!(briefing.step, MissionStep::Seed);
        assert!(!packets[1].leader_expected());
    }
}
