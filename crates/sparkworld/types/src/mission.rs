//! Mission types
//!
//! A mission is the collaborative goal a bond receives when it forms. It moves
//! through a four-step meeting cycle, one step per tick, until an external
//! judgment marks it completed.

use crate::ids::{AgentId, TickId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Step of the mission meeting cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStep {
    /// Leader receives goal and roster; nothing is expected from anyone
    Seed,
    /// Leader's reply this tick is the opening brief
    LeaderBrief,
    /// Members' replies to the leader are collected as suggestions
    MemberInput,
    /// Leader's reply this tick is the task assignment
    LeaderAssignment,
}

impl MissionStep {
    /// The step that follows this one
    pub fn next(self) -> Self {
        match self {
            Self::Seed => Self::LeaderBrief,
            Self::LeaderBrief => Self::MemberInput,
            Self::MemberInput => Self::LeaderAssignment,
            Self::LeaderAssignment => Self::LeaderBrief,
        }
    }

    /// Whether the leader is expected to speak during this step
    pub fn expects_leader(self) -> bool {
        matches!(self, Self::LeaderBrief | Self::LeaderAssignment)
    }
}

impl fmt::Display for MissionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Seed => "seed",
            Self::LeaderBrief => "leader_brief",
            Self::MemberInput => "member_input",
            Self::LeaderAssignment => "leader_assignment",
        };
        f.write_str(name)
    }
}

/// Mission lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Advancing one step per tick
    Active,
    /// Inert; kept for the record
    Completed,
}

/// A member suggestion collected during the input step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Who suggested
    pub from: AgentId,
    /// What they said
    pub content: String,
}

/// A bond's mission
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mission {
    /// Goal text from the mission generator
    pub goal: String,
    /// Leader, fixed at creation
    pub leader: AgentId,
    /// Lifecycle status
    pub status: MissionStatus,
    /// Current step of the meeting cycle
    pub step: MissionStep,
    /// Completed brief/input/assignment cycles
    pub round: u64,
    /// Latest opening brief from the leader
    pub brief: Option<String>,
    /// Suggestions collected during the most recent input step
    pub suggestions: Vec<Suggestion>,
    /// Latest task assignment, per member
    pub assignment: BTreeMap<AgentId, String>,
    /// Creation tick
    pub created: TickId,
    /// Completion tick
    pub completed: Option<TickId>,
}

impl Mission {
    /// Create a mission at the seed step
    pub fn new(goal: impl Into<String>, leader: AgentId, created: TickId) -> Self {
        Self {
            goal: goal.into(),
            leader,
            status: MissionStatus::Active,
            step: MissionStep::Seed,
            round: 0,
            brief: None,
            suggestions: Vec::new(),
            assignment: BTreeMap::new(),
            created,
            completed: None,
        }
    }

    /// Check if still advancing
    pub fn is_active(&self) -> bool {
        self.status == MissionStatus::Active
    }

    /// Mark completed; the mission becomes inert
    pub fn complete(&mut self, tick: TickId) {
        if self.is_active() {
            self.status = MissionStatus::Completed;
            self.completed = Some(tick);
        }
    }

    /// Move to the next step, counting a round each time the cycle wraps
    pub fn advance_step(&mut self) {
        let next = self.step.next();
        if self.step == MissionStep::LeaderAssignment {
            self.round += 1;
        }
        if next == MissionStep::MemberInput {
            self.suggestions.clear();
        }
        self.step = next;
    }

    /// Task currently assigned to `agent`
    pub fn task_for(&self, agent: &AgentId) -> Option<&str> {
        self.assignment.get(agent).map(String::as_str)
    }
}

/// Parse a leader's assignment message into a per-member task map.
///
/// Each line of the form `<agent id>: <task>` naming a member becomes an
/// entry. When nothing parses, every member other than the leader is given
/// the whole text.
pub fn parse_assignment(
    text: &str,
    members: &BTreeSet<AgentId>,
    leader: AgentId,
) -> BTreeMap<AgentId, String> {
    let mut tasks = BTreeMap::new();

    for line in text.lines() {
        let Some((who, task)) = line.split_once(':') else {
            continue;
        };
        let who = who.trim().trim_start_matches(['-', '*']).trim();
        let task = task.trim();
        if task.is_empty() {
            continue;
        }
        if let Ok(id) = who.parse::<AgentId>() {
            if members.contains(&id) {
                tasks.insert(id, task.to_string());
            }
        }
    }

    if tasks.is_empty() {
        let whole = text.trim();
        if !whole.is_empty() {
            for member in members.iter().filter(|m| **m != leader) {
                tasks.insert(*member, whole.to_string());
            }
        }
    }

    tasks
}
