//! Identifiers for Spark-World values
//!
//! Agents and bonds are numbered in creation order, so the natural ordering
//! of the ids is also the roster's insertion order. Resolution order within a
//! tick relies on this.

use crate::errors::{SparkWorldError, SparkWorldResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse `prefix_007`, `prefix-7` or a bare `7`
fn parse_numbered(kind: &'static str, prefix: &str, value: &str) -> SparkWorldResult<u64> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix(prefix)
        .map(|rest| rest.trim_start_matches(['_', '-']))
        .unwrap_or(trimmed);

    digits.parse::<u64>().map_err(|_| SparkWorldError::InvalidId {
        kind,
        value: value.to_string(),
    })
}

/// Unique identifier for an agent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AgentId(u64);

impl AgentId {
    /// Create an agent id from its roster number
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// Roster number
    pub const fn number(&self) -> u64 {
        self.0
    }

    /// The id allocated after this one
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent_{:03}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = SparkWorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_numbered("agent", "agent", s).map(Self)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for AgentId {
    type Error = SparkWorldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Unique identifier for a bond
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BondId(u64);

impl BondId {
    /// Create a bond id
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// Sequence number
    pub const fn number(&self) -> u64 {
        self.0
    }

    /// The id allocated after this one
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BondId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bond_{:03}", self.0)
    }
}

impl FromStr for BondId {
    type Err = SparkWorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_numbered("bond", "bond", s).map(Self)
    }
}

impl From<BondId> for String {
    fn from(id: BondId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for BondId {
    type Error = SparkWorldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identifier of a delivered message
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MessageId(pub u64);

impl MessageId {
    /// The id allocated after this one
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Tick counter
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TickId(pub u64);

impl TickId {
    /// Create a tick id
    pub const fn new(tick: u64) -> Self {
        Self(tick)
    }

    /// The world before any tick has run
    pub const fn genesis() -> Self {
        Self(0)
    }

    /// Tick number
    pub const fn number(&self) -> u64 {
        self.0
    }

    /// Get the next tick
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Number of ticks between `earlier` and this tick (saturating)
    pub const fn since(&self, earlier: TickId) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick-{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(n: u64) -> Self {
        Self(n)
    }
}
