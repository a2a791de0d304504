//! # Spark-World Tick Engine
//!
//! Advances a Spark-World one tick at a time. Every tick runs the same six
//! stages in the same order:
//!
//! ```text
//!   1. Mint        bonds credit their pools
//!   2. Donations   Bob hears last tick's pleas, stash is replenished
//!   3. Actions     packets ──> policy oracles (concurrent, timed out)
//!                  ──> ActionBatch ──> sequential resolution
//!   4. Distribute  pools are shared out, one Spark at a time
//!   5. Upkeep      every agent pays; agents at zero dissolve
//!   6. Emit        TickReport ──> EventBus + EventSinks
//! ```
//!
//! ## Core Principles
//!
//! 1. **Single writer**: only the orchestrator mutates the world, between awaits
//! 2. **Collect, then resolve**: oracle answers are batched before any is applied
//! 3. **One seeded random source**: reruns with the same seed and the same
//!    oracle answers produce the same world
//! 4. **Rejections are events**: an illegal action never fails a tick
//!
//! ## Module Organization
//!
//! - [`ledger`]: Balances, minting, distribution, upkeep and dissolution
//! - [`bond_registry`]: Bond requests, formation and membership
//! - [`mission_coordinator`]: Mission meeting cycle
//! - [`action_resolver`]: Action batching and resolution
//! - [`donation_gateway`]: Bob's stash and plea judgment
//! - [`observation`]: Observation packet compilation
//! - [`oracles`]: Capability interfaces and scripted stand-ins
//! - [`event_bus`]: Report history and broadcast
//! - [`world_state`]: The world and its snapshot
//! - [`orchestrator`]: The tick loop
//! - [`telemetry`]: Tracing subscriber setup
//! - [`errors`]: Error types

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action_resolver;
pub mod bond_registry;
pub mod donation_gateway;
pub mod errors;
pub mod event_bus;
pub mod ledger;
pub mod mission_coordinator;
pub mod observation;
pub mod oracles;
pub mod orchestrator;
pub mod telemetry;
pub mod world_state;

// Re-export commonly used types
pub use action_resolver::{resolve_batch, ActionBatch, Resolution};
pub use bond_registry::{BondRegistry, BondRequestOutcome};
pub use donation_gateway::{DonationGateway, DonationRound};
pub use errors::{EngineError, EngineResult, OracleError};
pub use event_bus::{EventBus, EventBusStats};
pub use ledger::{Ledger, UpkeepOutcome};
pub use mission_coordinator::MissionCoordinator;
pub use observation::{compile_packets, rules_digest};
pub use oracles::{
    CharacterForge, CompletionJudge, DonationJudge, EventSink, FixedReplenishment, LineageForge,
    MissionGenerator, MissionRequest, MissionReview, Oracles, PolicyOracle,
    PopulationScaledReplenishment, ReplenishmentSource,
};
pub use orchestrator::TickEngine;
pub use telemetry::init_tracing;
pub use world_state::{WorldRng, WorldSnapshot, WorldState};

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for driving the engine
    pub use super::errors::{EngineError, EngineResult, OracleError};
    pub use super::oracles::{
        CompletionJudge, DonationJudge, EventSink, MissionGenerator, Oracles, PolicyOracle,
    };
    pub use super::orchestrator::TickEngine;
    pub use super::world_state::WorldSnapshot;
    pub use sparkworld_types::prelude::*;
}
