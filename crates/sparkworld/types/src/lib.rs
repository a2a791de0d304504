//! # Spark-World Types
//!
//! Data model for Spark-World, a population of autonomous agents living on a
//! single scarce resource. Spark is both currency and life: every tick costs
//! an agent one Spark, and an agent at zero dissolves.
//!
//! ## Core Principles
//!
//! 1. **Spark is conserved**: only minting, upkeep and Bob's donations change the total
//! 2. **Bonds are mutual**: a bond forms only from a reciprocated request
//! 3. **One action per tick**: no agent ever acts twice in a tick
//! 4. **Ids, not references**: bonds hold member ids; agents live in the roster
//!
//! ## Module Organization
//!
//! - [`ids`]: Agent, bond, message and tick identifiers
//! - [`agent`]: Agents, profiles and their public/private views
//! - [`bond`]: Bonds, minting and pending bond requests
//! - [`mission`]: Mission state machine and assignment parsing
//! - [`action`]: Action messages, pleas and inbox messages
//! - [`observation`]: Observation packets handed to policy oracles
//! - [`event`]: Tick events, reports and cumulative statistics
//! - [`config`]: Engine configuration
//! - [`errors`]: Error types for the data layer

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod agent;
pub mod bond;
pub mod config;
pub mod errors;
pub mod event;
pub mod ids;
pub mod mission;
pub mod observation;

// Re-export commonly used types
pub use action::{ActionMessage, InboxMessage, Intent, Plea, SubmittedAction};
pub use agent::{Agent, AgentProfile, AgentSnapshot, AgentStatus, PublicAgentInfo, Spark};
pub use bond::{mint_amount, Bond, PendingBondRequest};
pub use config::EngineConfig;
pub use errors::{SparkWorldError, SparkWorldResult};
pub use event::{
    DeclineReason, NoActionCause, RejectionReason, Stage, StageSummary, TickEvent, TickReport,
    WorldStats,
};
pub use ids::{AgentId, BondId, MessageId, TickId};
pub use mission::{parse_assignment, Mission, MissionStatus, MissionStep, Suggestion};
pub use observation::{MissionBriefing, ObservationPacket, RulesDigest, TeammateAction, WorldNews};

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for Spark-World types
    pub use super::action::{ActionMessage, InboxMessage, Intent, Plea, SubmittedAction};
    pub use super::agent::{Agent, AgentProfile, AgentSnapshot, Spark};
    pub use super::bond::{Bond, PendingBondRequest};
    pub use super::config::EngineConfig;
    pub use super::errors::{SparkWorldError, SparkWorldResult};
    pub use super::event::{RejectionReason, TickEvent, TickReport, WorldStats};
    pub use super::ids::{AgentId, BondId, MessageId, TickId};
    pub use super::mission::{Mission, MissionStatus, MissionStep};
    pub use super::observation::{MissionBriefing, ObservationPacket, WorldNews};
}
