//! Deterministic stand-ins for every capability
//!
//! Used by the engine's own tests and by anyone driving a world without real
//! decision makers behind it.

use super::{
    CompletionJudge, DonationJudge, EventSink, MissionGenerator, MissionRequest, MissionReview,
    PolicyOracle,
};
use crate::errors::OracleError;
use async_trait::async_trait;
use sparkworld_types::action::{ActionMessage, Plea};
use sparkworld_types::event::TickReport;
use sparkworld_types::ids::{AgentId, TickId};
use sparkworld_types::observation::ObservationPacket;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Policy that plays back a fixed script
///
/// Lookup order: the action scripted for this exact tick, then the agent's
/// standing action. With neither, the agent takes no action.
#[derive(Debug, Default)]
pub struct ScriptedPolicy {
    by_tick: BTreeMap<(TickId, AgentId), ActionMessage>,
    standing: BTreeMap<AgentId, ActionMessage>,
    delays: BTreeMap<AgentId, Duration>,
    failing: BTreeSet<AgentId>,
    calls: AtomicUsize,
}

impl ScriptedPolicy {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `action` for `agent` at `tick`
    pub fn at(mut self, tick: u64, agent: AgentId, action: ActionMessage) -> Self {
        self.by_tick.insert((TickId::new(tick), agent), action);
        self
    }

    /// Script `action` for `agent` on every tick without a specific entry
    pub fn always(mut self, agent: AgentId, action: ActionMessage) -> Self {
        self.standing.insert(agent, action);
        self
    }

    /// Make every call for `agent` take `delay` first
    pub fn delay(mut self, agent: AgentId, delay: Duration) -> Self {
        self.delays.insert(agent, delay);
        self
    }

    /// Make every call for `agent` fail
    pub fn fail(mut self, agent: AgentId) -> Self {
        self.failing.insert(agent);
        self
    }

    /// Number of decisions requested so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyOracle for ScriptedPolicy {
    async fn decide(&self, packet: &ObservationPacket) -> Result<ActionMessage, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let agent = packet.agent();

        if let Some(delay) = self.delays.get(&agent) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&agent) {
            return Err(OracleError::Failed(format!("scripted failure for {agent}")));
        }

        self.by_tick
            .get(&(packet.tick, agent))
            .or_else(|| self.standing.get(&agent))
            .cloned()
            .ok_or_else(|| OracleError::Failed(format!("no scripted action for {agent}")))
    }
}

/// Policy backed by a closure; `None` means no action
pub struct FnPolicy<F> {
    decide: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&ObservationPacket) -> Option<ActionMessage> + Send + Sync,
{
    /// Wrap a decision function
    pub fn new(decide: F) -> Self {
        Self { decide }
    }
}

#[async_trait]
impl<F> PolicyOracle for FnPolicy<F>
where
    F: Fn(&ObservationPacket) -> Option<ActionMessage> + Send + Sync,
{
    async fn decide(&self, packet: &ObservationPacket) -> Result<ActionMessage, OracleError> {
        (self.decide)(packet).ok_or_else(|| OracleError::Failed("abstained".to_string()))
    }
}

/// Mission generator returning `"<goal> (<bond>)"`
#[derive(Clone, Debug)]
pub struct FixedMissions {
    goal: String,
}

impl FixedMissions {
    /// Create a generator for a goal
    pub fn new(goal: impl Into<String>) -> Self {
        Self { goal: goal.into() }
    }
}

impl Default for FixedMissions {
    fn default() -> Self {
        Self::new("Keep the hearth burning")
    }
}

#[async_trait]
impl MissionGenerator for FixedMissions {
    async fn generate(&self, request: &MissionRequest) -> Result<String, OracleError> {
        Ok(format!("{} ({})", self.goal, request.bond))
    }
}

/// Mission generator that always fails
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingMissions;

#[async_trait]
impl MissionGenerator for FailingMissions {
    async fn generate(&self, _request: &MissionRequest) -> Result<String, OracleError> {
        Err(OracleError::Failed("mission generator offline".to_string()))
    }
}

/// Completion judge that completes a mission once it has run `rounds` rounds
#[derive(Clone, Copy, Debug)]
pub struct CompleteAfterRounds(pub u64);

#[async_trait]
impl CompletionJudge for CompleteAfterRounds {
    async fn judge(&self, review: &MissionReview) -> Result<bool, OracleError> {
        Ok(review.mission.round >= self.0)
    }
}

/// Completion judge that never completes anything
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverComplete;

#[async_trait]
impl CompletionJudge for NeverComplete {
    async fn judge(&self, _review: &MissionReview) -> Result<bool, OracleError> {
        Ok(false)
    }
}

/// Donation judge with a fixed answer that counts its calls
#[derive(Debug)]
pub struct ScriptedDonations {
    accept: bool,
    calls: AtomicUsize,
}

impl ScriptedDonations {
    /// Accept every plea
    pub fn accepting() -> Self {
        Self {
            accept: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Decline every plea
    pub fn declining() -> Self {
        Self {
            accept: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of pleas judged so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DonationJudge for ScriptedDonations {
    async fn judge(&self, _plea: &Plea) -> Result<bool, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accept)
    }
}

/// Sink that keeps every report it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<TickReport>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far
    pub fn reports(&self) -> Vec<TickReport> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, report: &TickReport) {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report.clone());
    }
}
