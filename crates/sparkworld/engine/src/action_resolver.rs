//! Action resolution
//!
//! All of a tick's actions are collected into an [`ActionBatch`] first and
//! then applied by [`resolve_batch`] in one sequential pass, in ascending agent
//! id order. Nothing is applied as it arrives, so the order in which oracles
//! answer never matters. The world's random source is touched only here.
//!
//! An illegal action changes nothing and is recorded as
//! [`TickEvent::ActionRejected`]; it never fails the tick.

use crate::bond_registry::BondRequestOutcome;
use crate::errors::OracleError;
use crate::mission_coordinator::MissionCoordinator;
use crate::oracles::CharacterForge;
use crate::world_state::WorldState;
use rand::Rng;
use sparkworld_types::action::{ActionMessage, Intent, Plea, SubmittedAction};
use sparkworld_types::event::{NoActionCause, RejectionReason, TickEvent};
use sparkworld_types::ids::{AgentId, BondId, TickId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One tick's worth of collected actions
#[derive(Clone, Debug)]
pub struct ActionBatch {
    tick: TickId,
    accepted: BTreeMap<AgentId, ActionMessage>,
    /// Rejections and no-actions recorded during collection
    events: Vec<TickEvent>,
}

impl ActionBatch {
    /// Create an empty batch for a tick
    pub fn new(tick: TickId) -> Self {
        Self {
            tick,
            accepted: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Tick the batch belongs to
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// Accept one action for `agent`; a second or malformed action is rejected
    pub fn submit(&mut self, agent: AgentId, message: ActionMessage) -> Result<(), RejectionReason> {
        let verdict = if self.accepted.contains_key(&agent) {
            Err(RejectionReason::DuplicateSubmission)
        } else {
            message.validate().map_err(|e| RejectionReason::Malformed {
                detail: e.to_string(),
            })
        };

        match verdict {
            Ok(()) => {
                self.accepted.insert(agent, message);
                Ok(())
            }
            Err(reason) => {
                debug!(agent = %agent, intent = %message.intent, %reason, "Action rejected at submission");
                self.events.push(TickEvent::ActionRejected {
                    agent,
                    intent: Some(message.intent),
                    reason: reason.clone(),
                });
                Err(reason)
            }
        }
    }

    /// Record that `agent`'s oracle produced nothing usable
    pub fn record_failure(&mut self, agent: AgentId, error: OracleError) {
        let event = match error {
            OracleError::Timeout => TickEvent::NoAction {
                agent,
                cause: NoActionCause::OracleTimeout,
            },
            OracleError::Failed(detail) => TickEvent::NoAction {
                agent,
                cause: NoActionCause::OracleFailure { detail },
            },
            OracleError::InvalidAction(e) => TickEvent::ActionRejected {
                agent,
                intent: None,
                reason: RejectionReason::Malformed {
                    detail: e.to_string(),
                },
            },
        };
        self.events.push(event);
    }

    /// Number of accepted actions
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    /// Check if no action was accepted
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// The accepted action of `agent`
    pub fn action_of(&self, agent: &AgentId) -> Option<&ActionMessage> {
        self.accepted.get(agent)
    }
}

/// What the resolution pass produced
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    /// Ordered events
    pub events: Vec<TickEvent>,
    /// Every accepted action, reasoning included, in resolution order
    pub actions: Vec<SubmittedAction>,
    /// Bonds formed, awaiting their missions
    pub formed: Vec<BondId>,
    /// Agents created by `spawn_with`
    pub spawned: Vec<AgentId>,
    /// Raids resolved
    pub raids: u64,
}

/// Apply every accepted action in ascending agent id order
pub fn resolve_batch(
    world: &mut WorldState,
    batch: ActionBatch,
    forge: &dyn CharacterForge,
) -> Resolution {
    let tick = batch.tick;
    let mut resolution = Resolution {
        events: batch.events,
        ..Default::default()
    };

    for (agent, message) in batch.accepted {
        let outcome = if !world.ledger.is_alive(&agent) {
            Err(RejectionReason::ActorNotLiving)
        } else {
            match message.intent {
                Intent::Bond => resolve_bond(world, agent, &message, tick, &mut resolution),
                Intent::Raid => resolve_raid(world, agent, &message, tick, &mut resolution),
                Intent::RequestSpark => {
                    resolve_request_spark(world, agent, &message, tick, &mut resolution)
                }
                Intent::SpawnWith => {
                    resolve_spawn(world, agent, &message, tick, forge, &mut resolution)
                }
                Intent::Reply => resolve_reply(world, agent, &message, tick, &mut resolution),
            }
        };

        if let Err(reason) = outcome {
            debug!(agent = %agent, intent = %message.intent, %reason, "Action rejected");
            resolution.events.push(TickEvent::ActionRejected {
                agent,
                intent: Some(message.intent),
                reason,
            });
        }
        resolution.actions.push(SubmittedAction { agent, message });
    }

    resolution
}

/// A living agent other than the actor
fn living_target(
    world: &WorldState,
    actor: AgentId,
    target: Option<AgentId>,
) -> Result<AgentId, RejectionReason> {
    let target = target.ok_or_else(|| RejectionReason::Malformed {
        detail: "missing target".to_string(),
    })?;
    if target == actor {
        return Err(RejectionReason::SelfTarget);
    }
    match world.ledger.get(&target) {
        None => Err(RejectionReason::UnknownTarget { target }),
        Some(agent) if !agent.is_alive() => Err(RejectionReason::TargetDissolved { target }),
        Some(_) => Ok(target),
    }
}

fn deliver_content(
    world: &mut WorldState,
    from: AgentId,
    to: AgentId,
    message: &ActionMessage,
    tick: TickId,
    resolution: &mut Resolution,
) {
    if message.content.trim().is_empty() {
        return;
    }
    let event = world.deliver(from, to, message.intent, &message.content, message.in_reply_to, tick);
    resolution.events.push(event);
}

fn resolve_bond(
    world: &mut WorldState,
    actor: AgentId,
    message: &ActionMessage,
    tick: TickId,
    resolution: &mut Resolution,
) -> Result<(), RejectionReason> {
    let target = living_target(world, actor, message.target)?;
    if world.ledger.get(&actor).map(|a| a.is_bonded()).unwrap_or(false) {
        return Err(RejectionReason::AlreadyBonded);
    }
    if world.ledger.get(&target).map(|a| a.is_bonded()).unwrap_or(false) {
        return Err(RejectionReason::TargetBonded { target });
    }

    deliver_content(world, actor, target, message, tick, resolution);
    resolution.events.push(TickEvent::BondRequested {
        from: actor,
        to: target,
    });

    let ttl = world.config.bond_request_ttl_ticks;
    if let BondRequestOutcome::Matched(_) = world.bonds.request_bond(actor, target, tick, ttl) {
        let mut members = [actor, target];
        members.sort();
        let leader = members[world.rng.gen_range(0..members.len())];
        let bond = world.bonds.form_bond(&mut world.ledger, &members, leader, tick);
        resolution.events.push(TickEvent::BondFormed {
            bond,
            members: members.to_vec(),
            leader,
        });
        resolution.formed.push(bond);
    }
    Ok(())
}

fn resolve_raid(
    world: &mut WorldState,
    actor: AgentId,
    message: &ActionMessage,
    tick: TickId,
    resolution: &mut Resolution,
) -> Result<(), RejectionReason> {
    let defender = living_target(world, actor, message.target)?;
    let stake = world.config.raid_failure_penalty.max(1);
    let available = world.ledger.balance(&actor);
    if available < stake {
        return Err(RejectionReason::InsufficientBalance {
            required: stake,
            available,
        });
    }

    let attacker_strength = world.ledger.get(&actor).map(|a| a.strength()).unwrap_or(0);
    let defender_strength = world.ledger.get(&defender).map(|a| a.strength()).unwrap_or(0);

    let total = attacker_strength + defender_strength;
    let success = if total == 0 {
        world.rng.gen_bool(0.5)
    } else {
        world.rng.gen_range(0..total) < attacker_strength
    };

    let transferred = if success {
        let haul = world
            .rng
            .gen_range(1..=world.config.max_raid_haul)
            .min(world.ledger.balance(&defender));
        world.ledger.transfer(&defender, &actor, haul);
        haul
    } else {
        let penalty = world
            .config
            .raid_failure_penalty
            .min(world.ledger.balance(&actor));
        world.ledger.transfer(&actor, &defender, penalty);
        penalty
    };

    debug!(
        attacker = %actor,
        defender = %defender,
        success,
        transferred,
        "Raid resolved"
    );
    deliver_content(world, actor, defender, message, tick, resolution);
    resolution.raids += 1;
    resolution.events.push(TickEvent::RaidResolved {
        attacker: actor,
        defender,
        success,
        attacker_strength,
        defender_strength,
        transferred,
    });
    Ok(())
}

fn resolve_request_spark(
    world: &mut WorldState,
    actor: AgentId,
    message: &ActionMessage,
    tick: TickId,
    resolution: &mut Resolution,
) -> Result<(), RejectionReason> {
    world.pleas.push(Plea {
        agent: actor,
        reason: message.content.clone(),
        tick,
    });
    resolution.events.push(TickEvent::PleaQueued { agent: actor });
    Ok(())
}

fn resolve_spawn(
    world: &mut WorldState,
    actor: AgentId,
    message: &ActionMessage,
    tick: TickId,
    forge: &dyn CharacterForge,
    resolution: &mut Resolution,
) -> Result<(), RejectionReason> {
    let partner = living_target(world, actor, message.target)?;
    let bond = world
        .bonds
        .shared_bond(&actor, &partner)
        .ok_or(RejectionReason::NotBondPartners { partner })?;

    let cost = world.config.spawn_cost;
    let available = world.ledger.balance(&actor);
    if available < cost {
        return Err(RejectionReason::InsufficientBalance {
            required: cost,
            available,
        });
    }

    let child_id = world.ledger.next_id();
    let profile = match (world.ledger.get(&actor), world.ledger.get(&partner)) {
        (Some(parent), Some(other)) => forge.forge(parent, other, child_id),
        _ => return Err(RejectionReason::UnknownTarget { target: partner }),
    };

    let child = world.ledger.open_account(profile, 0, tick);
    world.ledger.transfer(&actor, &child, cost);
    world.bonds.add_member(bond, child, &mut world.ledger);

    info!(parent = %actor, partner = %partner, child = %child, bond = %bond, "Agent spawned");
    deliver_content(world, actor, partner, message, tick, resolution);
    resolution.spawned.push(child);
    resolution.events.push(TickEvent::AgentSpawned {
        parent: actor,
        partner,
        child,
        bond,
        cost,
    });
    Ok(())
}

fn resolve_reply(
    world: &mut WorldState,
    actor: AgentId,
    message: &ActionMessage,
    tick: TickId,
    resolution: &mut Resolution,
) -> Result<(), RejectionReason> {
    let bond_id = world.bonds.bond_of(&actor);

    if let Some(bond) = bond_id.and_then(|id| world.bonds.get_mut(&id)) {
        if MissionCoordinator::is_leader_turn(bond, &actor) {
            let events = world.missions.record_leader_message(bond, &message.content);
            resolution.events.extend(events);
            return Ok(());
        }
    }

    let suggestion_to = bond_id
        .and_then(|id| world.bonds.get(&id))
        .and_then(|bond| MissionCoordinator::suggestion_recipient(bond, &actor));

    let addressee = match (message.in_reply_to, message.target) {
        (Some(original), _) => Some(
            world
                .sender_of(&original)
                .ok_or(RejectionReason::UnknownMessage { message: original })?,
        ),
        (None, Some(target)) => Some(target),
        (None, None) => suggestion_to,
    };
    if addressee.is_none() {
        return Err(RejectionReason::Malformed {
            detail: "reply needs a target or in_reply_to".to_string(),
        });
    }
    let recipient = living_target(world, actor, addressee)?;

    let event = world.deliver(actor, recipient, Intent::Reply, &message.content, message.in_reply_to, tick);
    resolution.events.push(event);

    if suggestion_to == Some(recipient) {
        if let Some(bond) = bond_id.and_then(|id| world.bonds.get_mut(&id)) {
            if let Some(event) = world.missions.record_suggestion(bond, actor, &message.content) {
                resolution.events.push(event);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracles::LineageForge;
    use sparkworld_types::agent::{AgentProfile, Spark};
    use sparkworld_types::config::EngineConfig;
    use sparkworld_types::event::TickReport;
    use sparkworld_types::mission::MissionStep;

    fn world(balances: &[Spark]) -> (WorldState, Vec<AgentId>) {
        let mut world = WorldState::new(EngineConfig::test_world(5));
        let ids = balances
            .iter()
            .map(|b| {
                world
                    .ledger
                    .open_account(AgentProfile::new("a", "wisp", "calm"), *b, TickId::genesis())
            })
            .collect();
        (world, ids)
    }

    fn resolve(world: &mut WorldState, tick: u64, actions: Vec<(AgentId, ActionMessage)>) -> Resolution {
        let mut batch = ActionBatch::new(TickId::new(tick));
        for (agent, action) in actions {
            let _ = batch.submit(agent, action);
        }
        resolve_batch(world, batch, &LineageForge)
    }

    fn rejections(resolution: &Resolution) -> Vec<RejectionReason> {
        resolution
            .events
            .iter()
            .filter_map(|e| match e {
                TickEvent::ActionRejected { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_second_submission_rejected() {
        let mut batch = ActionBatch::new(TickId::new(1));
        let agent = AgentId::new(1);

        assert!(batch.submit(agent, ActionMessage::request_spark("please")).is_ok());
        assert_eq!(
            batch.submit(agent, ActionMessage::raid(AgentId::new(2))),
            Err(RejectionReason::DuplicateSubmission)
        );
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.action_of(&agent).unwrap().intent, Intent::RequestSpark);
    }

    #[test]
    fn test_missing_target_is_malformed() {
        let mut batch = ActionBatch::new(TickId::new(1));
        let result = batch.submit(AgentId::new(1), ActionMessage::new(Intent::Raid, ""));
        assert!(matches!(result, Err(RejectionReason::Malformed { .. })));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_mutual_bond_same_tick() {
        let (mut world, ids) = world(&[5, 5]);
        let resolution = resolve(
            &mut world,
            1,
            vec![
                (ids[0], ActionMessage::bond(ids[1], "together?")),
                (ids[1], ActionMessage::bond(ids[0], "")),
            ],
        );

        assert_eq!(resolution.formed.len(), 1);
        let bond = world.bonds.get(&resolution.formed[0]).unwrap();
        assert!(bond.contains(&ids[0]) && bond.contains(&ids[1]));
        assert!(world.inboxes[&ids[1]].iter().any(|m| m.content == "together?"));
        world.bonds.audit(&world.ledger);
    }

    #[test]
    fn test_bonded_agent_cannot_bond_again() {
        let (mut world, ids) = world(&[5, 5, 5]);
        resolve(
            &mut world,
            1,
            vec![
                (ids[0], ActionMessage::bond(ids[1], "")),
                (ids[1], ActionMessage::bond(ids[0], "")),
            ],
        );

        let resolution = resolve(
            &mut world,
            2,
            vec![
                (ids[0], ActionMessage::bond(ids[2], "")),
                (ids[2], ActionMessage::bond(ids[1], "")),
            ],
        );

        assert_eq!(
            rejections(&resolution),
            vec![
                RejectionReason::AlreadyBonded,
                RejectionReason::TargetBonded { target: ids[1] }
            ]
        );
        assert!(resolution.formed.is_empty());
    }

    #[test]
    fn test_raid_is_zero_sum() {
        for seed in 0..20 {
            let (mut world, ids) = world(&[6, 3]);
            world.rng = rand::SeedableRng::seed_from_u64(seed);
            let before = world.ledger.total_supply();

            let resolution = resolve(&mut world, 1, vec![(ids[0], ActionMessage::raid(ids[1]))]);

            assert_eq!(world.ledger.total_supply(), before);
            let TickEvent::RaidResolved { success, transferred, .. } = resolution.events[0] else {
                panic!("expected a raid event");
            };
            if success {
                assert!((1..=3).contains(&transferred));
                assert_eq!(world.ledger.balance(&ids[0]), 6 + transferred);
            } else {
                assert_eq!(transferred, 1);
                assert_eq!(world.ledger.balance(&ids[1]), 4);
            }
        }
    }

    #[test]
    fn test_raid_against_empty_defender_takes_nothing() {
        let (mut world, ids) = world(&[4, 0]);

        let resolution = resolve(&mut world, 1, vec![(ids[0], ActionMessage::raid(ids[1]))]);

        // Defender strength is zero, so the raid always succeeds with an empty haul
        assert!(matches!(
            resolution.events[0],
            TickEvent::RaidResolved {
                success: true,
                transferred: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_broke_attacker_cannot_raid() {
        for seed in 0..50 {
            let (mut world, ids) = world(&[0, 5]);
            world.rng = rand::SeedableRng::seed_from_u64(seed);
            if let Some(attacker) = world.ledger.get_mut(&ids[0]) {
                attacker.age = 10;
            }

            let resolution = resolve(&mut world, 1, vec![(ids[0], ActionMessage::raid(ids[1]))]);

            assert_eq!(
                rejections(&resolution),
                vec![RejectionReason::InsufficientBalance {
                    required: 1,
                    available: 0
                }]
            );
            assert_eq!(resolution.raids, 0);
            assert_eq!(world.ledger.balance(&ids[0]), 0);
            assert_eq!(world.ledger.balance(&ids[1]), 5);
        }
    }

    #[test]
    fn test_newborn_can_be_raided_in_same_pass() {
        let (mut world, ids) = world(&[9, 9, 5]);
        resolve(
            &mut world,
            1,
            vec![
                (ids[0], ActionMessage::bond(ids[1], "")),
                (ids[1], ActionMessage::bond(ids[0], "")),
            ],
        );
        let child = world.ledger.next_id();
        let before = world.ledger.total_supply();

        let resolution = resolve(
            &mut world,
            2,
            vec![
                (ids[0], ActionMessage::spawn_with(ids[1])),
                (ids[2], ActionMessage::raid(child)),
            ],
        );

        assert_eq!(resolution.spawned, vec![child]);
        assert_eq!(resolution.raids, 1);
        assert!(resolution.events.iter().any(|e| matches!(
            e,
            TickEvent::RaidResolved { defender, .. } if *defender == child
        )));
        assert_eq!(world.ledger.total_supply(), before);
        world.bonds.audit(&world.ledger);
    }

    #[test]
    fn test_raid_self_and_unknown_rejected() {
        let (mut world, ids) = world(&[5, 5]);
        let resolution = resolve(
            &mut world,
            1,
            vec![
                (ids[0], ActionMessage::raid(ids[0])),
                (ids[1], ActionMessage::raid(AgentId::new(99))),
            ],
        );

        assert_eq!(
            rejections(&resolution),
            vec![
                RejectionReason::SelfTarget,
                RejectionReason::UnknownTarget {
                    target: AgentId::new(99)
                }
            ]
        );
        assert_eq!(world.ledger.total_supply(), 10);
    }

    #[test]
    fn test_spawn_requires_shared_bond_and_balance() {
        let (mut world, ids) = world(&[4, 9, 5]);
        resolve(
            &mut world,
            1,
            vec![
                (ids[0], ActionMessage::bond(ids[1], "")),
                (ids[1], ActionMessage::bond(ids[0], "")),
            ],
        );

        let resolution = resolve(
            &mut world,
            2,
            vec![
                (ids[0], ActionMessage::spawn_with(ids[1])),
                (ids[1], ActionMessage::spawn_with(ids[2])),
            ],
        );
        assert_eq!(
            rejections(&resolution),
            vec![
                RejectionReason::InsufficientBalance {
                    required: 5,
                    available: 4
                },
                RejectionReason::NotBondPartners { partner: ids[2] }
            ]
        );

        let resolution = resolve(&mut world, 3, vec![(ids[1], ActionMessage::spawn_with(ids[0]))]);
        let child = resolution.spawned[0];
        let bond = world.bonds.bond_of(&ids[0]).unwrap();

        assert_eq!(world.ledger.balance(&ids[1]), 4);
        assert_eq!(world.ledger.balance(&child), 5);
        assert_eq!(world.ledger.get(&child).unwrap().age, 0);
        assert_eq!(world.bonds.get(&bond).unwrap().size(), 3);
        world.bonds.audit(&world.ledger);
    }

    #[test]
    fn test_request_spark_queues_plea() {
        let (mut world, ids) = world(&[1]);
        resolve(&mut world, 4, vec![(ids[0], ActionMessage::request_spark("starving"))]);

        assert_eq!(world.pleas.len(), 1);
        assert_eq!(world.pleas[0].reason, "starving");
        assert_eq!(world.pleas[0].tick, TickId::new(4));
        assert_eq!(world.ledger.balance(&ids[0]), 1);
    }

    #[test]
    fn test_reply_routes_to_original_sender() {
        let (mut world, ids) = world(&[5, 5, 5]);
        let original = world.deliver(ids[2], ids[0], Intent::Reply, "hi", None, TickId::new(1));
        let TickEvent::MessageDelivered { id, .. } = original else {
            panic!("expected a delivery event");
        };

        resolve(
            &mut world,
            2,
            vec![(ids[0], ActionMessage::reply(ids[1], "hello back").answering(id))],
        );

        let inbox = &world.inboxes[&ids[2]];
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].in_reply_to, Some(id));
        assert!(!world.inboxes.contains_key(&ids[1]));
    }

    #[test]
    fn test_reply_to_forgotten_message_rejected() {
        let (mut world, ids) = world(&[5, 5, 5]);
        let original = world.deliver(ids[2], ids[0], Intent::Reply, "hi", None, TickId::new(1));
        let TickEvent::MessageDelivered { id, .. } = original else {
            panic!("expected a delivery event");
        };
        let later = TickId::new(2 + world.config.event_history_ticks as u64);
        world.record(&TickReport::new(later));

        let resolution = resolve(
            &mut world,
            later.number() + 1,
            vec![(ids[0], ActionMessage::reply(ids[1], "too late").answering(id))],
        );

        assert_eq!(
            rejections(&resolution),
            vec![RejectionReason::UnknownMessage { message: id }]
        );
        assert!(!world.inboxes.contains_key(&ids[1]));
    }

    #[test]
    fn test_reply_without_addressee_rejected() {
        let (mut world, ids) = world(&[5]);
        let resolution = resolve(&mut world, 1, vec![(ids[0], ActionMessage::broadcast("anyone?"))]);
        assert!(matches!(
            rejections(&resolution)[0],
            RejectionReason::Malformed { .. }
        ));
    }

    #[test]
    fn test_leader_reply_becomes_brief() {
        let (mut world, ids) = world(&[5, 5]);
        let resolution = resolve(
            &mut world,
            1,
            vec![
                (ids[0], ActionMessage::bond(ids[1], "")),
                (ids[1], ActionMessage::bond(ids[0], "")),
            ],
        );
        let bond_id = resolution.formed[0];
        let bond = world.bonds.get_mut(&bond_id).unwrap();
        world
            .missions
            .attach_mission(bond, "goal".into(), TickId::new(1));
        world.missions.advance(&mut world.bonds, TickId::new(2));
        let leader = world.bonds.get(&bond_id).unwrap().leader;

        let resolution = resolve(&mut world, 2, vec![(leader, ActionMessage::broadcast("plan?"))]);

        assert!(matches!(resolution.events[0], TickEvent::MissionBriefed { .. }));
        let mission = world.bonds.get(&bond_id).unwrap().mission.clone().unwrap();
        assert_eq!(mission.step, MissionStep::LeaderBrief);
        assert_eq!(mission.brief.as_deref(), Some("plan?"));
    }
}
