//! Property tests: whatever the agents do, Spark is only created by minting
//! and donations and only destroyed by upkeep.

use proptest::prelude::*;
use sparkworld_engine::oracles::scripted::{
    CompleteAfterRounds, FixedMissions, FnPolicy, ScriptedDonations,
};
use sparkworld_engine::prelude::*;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// One scripted choice: intent selector, target offset, whether to answer mail
type Choice = (u8, u64, bool);

fn arb_choices() -> impl Strategy<Value = Vec<Choice>> {
    prop::collection::vec((0u8..6, 0u64..8, any::<bool>()), 8..64)
}

fn arb_balances() -> impl Strategy<Value = Vec<Spark>> {
    prop::collection::vec(1u64..12, 2..7)
}

/// Deterministic policy that plays `choices` by (tick, agent)
fn choice_policy(choices: Vec<Choice>) -> impl PolicyOracle {
    FnPolicy::new(move |packet: &ObservationPacket| {
        let me = packet.agent();
        let slot = (packet.tick.number() * 7 + me.number()) as usize % choices.len();
        let (selector, offset, answer) = choices[slot];

        let roster = &packet.world_news.roster;
        let target = roster
            .get((offset as usize) % roster.len().max(1))
            .map(|a| a.id)
            .unwrap_or(me);

        if answer {
            if let Some(message) = packet.inbox.first() {
                return Some(ActionMessage::broadcast("heard you").answering(message.id));
            }
        }
        match selector {
            0 => Some(ActionMessage::bond(target, "join me")),
            1 => Some(ActionMessage::raid(target)),
            2 => Some(ActionMessage::request_spark("running low")),
            3 => Some(ActionMessage::spawn_with(target)),
            4 => Some(ActionMessage::reply(target, "hello")),
            _ => None,
        }
    })
}

fn run(seed: u64, balances: &[Spark], choices: Vec<Choice>, ticks: u64) -> (Vec<TickReport>, TickEngine) {
    let oracles = Oracles::new(
        Arc::new(choice_policy(choices)),
        Arc::new(FixedMissions::default()),
        Arc::new(CompleteAfterRounds(2)),
        Arc::new(ScriptedDonations::accepting()),
    );
    let mut engine = TickEngine::new(EngineConfig::test_world(seed), oracles).unwrap();
    for (i, balance) in balances.iter().enumerate() {
        engine
            .register_agent(AgentProfile::new(format!("Agent {i}"), "wisp", "restless"), *balance)
            .unwrap();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let reports = runtime.block_on(engine.run_ticks(ticks));
    (reports, engine)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every tick moves the agent-held supply exactly by mint + donations - upkeep.
    #[test]
    fn every_tick_conserves_spark(
        seed in any::<u64>(),
        balances in arb_balances(),
        choices in arb_choices(),
    ) {
        let (reports, engine) = run(seed, &balances, choices, 8);

        for report in &reports {
            prop_assert!(report.is_conserving(), "tick {} leaked spark", report.tick);
            prop_assert_eq!(report.minted, report.distributed);
        }
        for pair in reports.windows(2) {
            prop_assert_eq!(pair[0].supply_after, pair[1].supply_before);
        }

        let stats = engine.stats();
        prop_assert_eq!(stats.total_donated + stats.stash, stats.total_replenished);
    }

    /// Dissolved agents hold nothing, belong to nothing and never act again.
    #[test]
    fn dissolution_is_final(
        seed in any::<u64>(),
        balances in arb_balances(),
        choices in arb_choices(),
    ) {
        let (reports, engine) = run(seed, &balances, choices, 8);

        for (i, report) in reports.iter().enumerate() {
            for agent in &report.dissolved {
                let later_actions = reports[i + 1..]
                    .iter()
                    .flat_map(|r| r.actions.iter())
                    .filter(|a| a.agent == *agent)
                    .count();
                prop_assert_eq!(later_actions, 0);

                let dissolved = engine.agent(*agent).unwrap();
                prop_assert!(!dissolved.is_alive());
                prop_assert_eq!(dissolved.balance, 0);
                prop_assert!(dissolved.bond.is_none());
            }
        }
    }

    /// Same seed and same choices give the same world.
    #[test]
    fn runs_are_reproducible(
        seed in any::<u64>(),
        balances in arb_balances(),
        choices in arb_choices(),
    ) {
        let (_, first) = run(seed, &balances, choices.clone(), 6);
        let (_, second) = run(seed, &balances, choices, 6);

        prop_assert_eq!(first.stats(), second.stats());
        let a = serde_json::to_string(&first.snapshot()).unwrap();
        let b = serde_json::to_string(&second.snapshot()).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Every bond has at least two living members, each pointing back at it.
    #[test]
    fn bonds_stay_consistent(
        seed in any::<u64>(),
        balances in arb_balances(),
        choices in arb_choices(),
    ) {
        let (_, engine) = run(seed, &balances, choices, 8);

        for bond in engine.world().bonds().bonds() {
            prop_assert!(bond.size() >= 2);
            prop_assert!(bond.members.contains(&bond.leader));
            for member in &bond.members {
                let agent = engine.agent(*member).unwrap();
                prop_assert!(agent.is_alive());
                prop_assert_eq!(agent.bond, Some(bond.id));
            }
        }
    }
}
