//! Tick orchestration
//!
//! [`TickEngine`] owns the world and runs the six stages of a tick in a fixed
//! order. Oracle calls are the only concurrent part: observation packets are
//! fanned out to the policy oracle under a concurrency cap and a timeout, and
//! the answers are gathered into one [`ActionBatch`] before anything is
//! applied.

use crate::action_resolver::{resolve_batch, ActionBatch};
use crate::errors::{EngineError, EngineResult, OracleError};
use crate::event_bus::EventBus;
use crate::observation::compile_packets;
use crate::oracles::{EventSink, MissionRequest, MissionReview, Oracles};
use crate::world_state::{WorldSnapshot, WorldState};
use futures::stream::{self, StreamExt};
use sparkworld_types::action::ActionMessage;
use sparkworld_types::agent::{Agent, AgentProfile, Spark};
use sparkworld_types::config::EngineConfig;
use sparkworld_types::event::{Stage, StageSummary, TickEvent, TickReport, WorldStats};
use sparkworld_types::ids::{AgentId, BondId, TickId};
use sparkworld_types::observation::ObservationPacket;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Drives Spark-World one tick at a time
pub struct TickEngine {
    world: WorldState,
    oracles: Oracles,
    bus: EventBus,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl TickEngine {
    /// Create an engine over an empty world
    pub fn new(config: EngineConfig, oracles: Oracles) -> EngineResult<Self> {
        config.validate()?;
        let bus = EventBus::new(config.event_history_ticks);
        info!(seed = config.seed, "Tick engine created");
        Ok(Self {
            world: WorldState::new(config),
            oracles,
            bus,
            sinks: Vec::new(),
        })
    }

    /// Add an agent to the world with a starting balance
    pub fn register_agent(&mut self, profile: AgentProfile, balance: Spark) -> EngineResult<AgentId> {
        if profile.name.trim().is_empty() {
            return Err(EngineError::RegistrationFailed {
                name: profile.name,
                reason: "name is empty".to_string(),
            });
        }
        if balance == 0 {
            return Err(EngineError::RegistrationFailed {
                name: profile.name,
                reason: "starting balance must be positive".to_string(),
            });
        }

        let name = profile.name.clone();
        let id = self.world.ledger.open_account(profile, balance, self.world.tick);
        info!(agent = %id, name = %name, balance, "Agent registered");
        Ok(id)
    }

    /// Look up an agent, living or dissolved
    pub fn agent(&self, id: AgentId) -> EngineResult<&Agent> {
        self.world.ledger.get(&id).ok_or(EngineError::AgentNotFound(id))
    }

    /// The world
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Cumulative statistics
    pub fn stats(&self) -> &WorldStats {
        self.world.stats()
    }

    /// The event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to finished tick reports
    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.bus.subscribe()
    }

    /// Register a sink that receives every finished report
    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Serializable copy of the world
    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot()
    }

    /// Run `count` ticks back to back
    pub async fn run_ticks(&mut self, count: u64) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for _ in 0..count {
            reports.push(self.run_tick().await);
        }
        reports
    }

    /// Run one full tick and return its report
    ///
    /// Rejected actions and oracle failures are recorded as events; the only
    /// way a tick fails is an invariant violation, which panics.
    #[instrument(skip(self), fields(tick = self.world.tick().next().number()))]
    pub async fn run_tick(&mut self) -> TickReport {
        let tick = self.world.tick.next();
        let timeout = self.world.config.oracle_timeout();
        self.world.start();

        let mut report = TickReport::new(tick);
        report.supply_before = self.world.ledger.total_supply();

        // Stage 1: mint
        let minted_before = self.world.ledger.total_minted();
        let minted = self.world.ledger.mint(&mut self.world.bonds);
        let minting_bonds = minted.len();
        report.events.extend(minted);
        report.minted = self.world.ledger.total_minted() - minted_before;
        report.stages.push(StageSummary {
            stage: Stage::Mint,
            summary: format!("{minting_bonds} bonds minted {} spark", report.minted),
        });

        // Stage 2: Bob hears last tick's pleas
        let pleas = std::mem::take(&mut self.world.pleas);
        let heard = pleas.len();
        let world = &mut self.world;
        let round = world
            .gateway
            .resolve_pleas(
                pleas,
                self.oracles.donations.as_ref(),
                timeout,
                world.config.max_donation,
                &mut world.ledger,
                &mut world.rng,
            )
            .await;
        report.events.extend(round.events);
        report.donated = round.donated;

        let replenishment = self
            .oracles
            .replenishment
            .replenish(tick, self.world.ledger.living_count());
        if let Some(event) = self.world.gateway.replenish(replenishment) {
            report.events.push(event);
        }
        report.replenished = replenishment;
        report.stages.push(StageSummary {
            stage: Stage::Donations,
            summary: format!(
                "{heard} pleas heard, {} donated, {replenishment} replenished, stash {}",
                report.donated,
                self.world.stash()
            ),
        });

        // Stage 3: observe, decide, resolve
        let delivered = report.events.len();
        let packets = compile_packets(&mut self.world, tick, &report.events);
        let decisions = self.collect_decisions(packets).await;

        let mut batch = ActionBatch::new(tick);
        for (agent, decision) in decisions {
            match decision {
                Ok(message) => {
                    let _ = batch.submit(agent, message);
                }
                Err(e) => {
                    if e.is_malformed_action() {
                        debug!(agent = %agent, error = %e, "Malformed action from policy oracle");
                    } else {
                        warn!(agent = %agent, error = %e, "No action from policy oracle");
                    }
                    batch.record_failure(agent, e);
                }
            }
        }
        let collected = batch.len();

        let resolution = resolve_batch(&mut self.world, batch, self.oracles.forge.as_ref());
        report.events.extend(resolution.events);
        report.actions = resolution.actions;
        report.raids = resolution.raids;
        report.spawned = resolution.spawned;
        report.bonds_formed = resolution.formed;

        for bond in report.bonds_formed.clone() {
            if let Some(event) = self.generate_mission(bond, tick, timeout).await {
                report.events.push(event);
            }
        }

        self.world
            .missions
            .finish_tick(&self.world.bonds, &report.actions);
        let judged = self.judge_missions(tick, timeout).await;
        report.events.extend(judged);
        report
            .events
            .extend(self.world.missions.advance(&mut self.world.bonds, tick));
        report.events.extend(
            self.world
                .bonds
                .expire_requests(tick, self.world.config.bond_request_ttl_ticks),
        );

        let rejected = report
            .events
            .iter()
            .filter(|e| matches!(e, TickEvent::ActionRejected { .. }))
            .count();
        report.stages.push(StageSummary {
            stage: Stage::Actions,
            summary: format!(
                "{collected} actions, {rejected} rejected, {} raids, {} bonds formed, {} spawned",
                report.raids,
                report.bonds_formed.len(),
                report.spawned.len()
            ),
        });

        // Stage 4: distribute
        let (shares, distributed) = self
            .world
            .ledger
            .distribute(&mut self.world.bonds, &mut self.world.rng);
        report.events.extend(shares);
        report.distributed = distributed;
        report.stages.push(StageSummary {
            stage: Stage::Distribute,
            summary: format!("{distributed} spark distributed"),
        });

        // Stage 5: upkeep and dissolution
        let upkeep = self.world.ledger.upkeep(self.world.config.upkeep_per_tick);
        report.upkeep = upkeep.total;
        report.events.push(TickEvent::UpkeepCharged {
            agents: upkeep.charged_agents,
            total: upkeep.total,
        });
        for agent in &upkeep.exhausted {
            let events = self.world.ledger.dissolve(agent, tick, &mut self.world.bonds);
            for event in &events {
                if let TickEvent::BondDissolved { bond, .. } = event {
                    report.bonds_dissolved.push(*bond);
                }
            }
            report.events.extend(events);
        }
        report.dissolved = upkeep.exhausted;
        self.world.forget_dissolved();
        report.stages.push(StageSummary {
            stage: Stage::Upkeep,
            summary: format!(
                "{} charged {} spark, {} dissolved",
                upkeep.charged_agents,
                report.upkeep,
                report.dissolved.len()
            ),
        });

        // Stage 6: emit
        report.supply_after = self.world.ledger.total_supply();
        self.world.audit();
        if !report.is_conserving() {
            panic!(
                "ledger invariant violated: tick {tick} supply {} + minted {} + donated {} != supply {} + upkeep {}",
                report.supply_before, report.minted, report.donated, report.supply_after, report.upkeep
            );
        }
        report.stages.push(StageSummary {
            stage: Stage::Emit,
            summary: format!(
                "{} events, supply {} -> {}",
                report.events.len(),
                report.supply_before,
                report.supply_after
            ),
        });

        self.world.unseen_events = report.events[delivered..].to_vec();
        self.world.tick = tick;
        self.world.record(&report);

        for sink in &self.sinks {
            sink.emit(&report);
        }
        self.bus.publish(report.clone());

        info!(
            tick = tick.number(),
            living = self.world.ledger.living_count(),
            bonds = self.world.bonds.len(),
            supply = report.supply_after,
            stash = self.world.stash(),
            "Tick complete"
        );
        report
    }

    /// Ask the policy oracle for every packet, answers in packet order
    async fn collect_decisions(
        &self,
        packets: Vec<ObservationPacket>,
    ) -> Vec<(AgentId, Result<ActionMessage, OracleError>)> {
        let timeout = self.world.config.oracle_timeout();
        let policy = &self.oracles.policy;

        stream::iter(packets)
            .map(|packet| async move {
                let agent = packet.agent();
                let decision = match tokio::time::timeout(timeout, policy.decide(&packet)).await {
                    Ok(decision) => decision,
                    Err(_) => Err(OracleError::Timeout),
                };
                (agent, decision)
            })
            .buffered(self.world.config.max_concurrent_decisions)
            .collect()
            .await
    }

    /// Give a newly formed bond its mission; the bond stays mission-less on failure
    async fn generate_mission(
        &mut self,
        bond: BondId,
        tick: TickId,
        timeout: std::time::Duration,
    ) -> Option<TickEvent> {
        let request = {
            let entry = self.world.bonds.get(&bond)?;
            MissionRequest {
                bond,
                leader: entry.leader,
                roster: entry
                    .members
                    .iter()
                    .filter_map(|m| self.world.ledger.get(m))
                    .map(|a| a.public_info())
                    .collect(),
                tick,
            }
        };

        let goal = match tokio::time::timeout(timeout, self.oracles.missions.generate(&request)).await {
            Ok(Ok(goal)) => goal,
            Ok(Err(e)) => {
                warn!(bond = %bond, error = %e, "Mission generation failed");
                return None;
            }
            Err(_) => {
                warn!(bond = %bond, "Mission generation timed out");
                return None;
            }
        };

        let entry = self.world.bonds.get_mut(&bond)?;
        Some(self.world.missions.attach_mission(entry, goal, tick))
    }

    /// Put every mission created before this tick in front of the completion judge
    async fn judge_missions(&mut self, tick: TickId, timeout: std::time::Duration) -> Vec<TickEvent> {
        let reviews: Vec<MissionReview> = self
            .world
            .bonds
            .bonds()
            .filter_map(|bond| self.world.missions.review(bond, tick))
            .collect();

        let mut events = Vec::new();
        for review in reviews {
            let completed =
                match tokio::time::timeout(timeout, self.oracles.completion.judge(&review)).await {
                    Ok(Ok(completed)) => completed,
                    Ok(Err(e)) => {
                        warn!(bond = %review.bond, error = %e, "Completion judge failed");
                        false
                    }
                    Err(_) => {
                        warn!(bond = %review.bond, "Completion judge timed out");
                        false
                    }
                };
            debug!(bond = %review.bond, completed, "Mission judged");

            if let Some(bond) = self.world.bonds.get_mut(&review.bond) {
                if let Some(event) = self.world.missions.apply_completion(bond, completed, tick) {
                    events.push(event);
                }
            }
        }
        events
    }
}
