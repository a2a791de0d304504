//! Action messages
//!
//! Each living agent submits at most one [`ActionMessage`] per tick. The
//! `reasoning` field is private: it is kept for the narrative collaborator and
//! never routed to another agent.

use crate::errors::{SparkWorldError, SparkWorldResult};
use crate::ids::{AgentId, MessageId, TickId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What an agent is trying to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Ask another unbonded agent to form a bond
    Bond,
    /// Try to take Spark from another agent
    Raid,
    /// Plead with Bob for Spark (resolved next tick)
    RequestSpark,
    /// Create a new agent with a bond partner
    #[serde(alias = "spawn")]
    SpawnWith,
    /// Send a message
    Reply,
}

impl Intent {
    /// All intents, in documentation order
    pub const ALL: [Intent; 5] = [
        Intent::Bond,
        Intent::Raid,
        Intent::RequestSpark,
        Intent::SpawnWith,
        Intent::Reply,
    ];

    /// Keyword used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bond => "bond",
            Self::Raid => "raid",
            Self::RequestSpark => "request_spark",
            Self::SpawnWith => "spawn_with",
            Self::Reply => "reply",
        }
    }

    /// Whether the intent is meaningless without a target agent
    pub fn requires_target(&self) -> bool {
        matches!(self, Self::Bond | Self::Raid | Self::SpawnWith)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = SparkWorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bond" => Ok(Self::Bond),
            "raid" => Ok(Self::Raid),
            "request_spark" | "request-spark" => Ok(Self::RequestSpark),
            "spawn_with" | "spawn-with" | "spawn" => Ok(Self::SpawnWith),
            "reply" => Ok(Self::Reply),
            other => Err(SparkWorldError::UnknownIntent(other.to_string())),
        }
    }
}

/// One agent's action for one tick
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    /// What the agent is doing
    pub intent: Intent,
    /// Target agent, when the intent has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<AgentId>,
    /// Message this replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MessageId>,
    /// Public content seen by the recipient
    #[serde(default)]
    pub content: String,
    /// Private reasoning; never delivered to other agents
    #[serde(default)]
    pub reasoning: String,
}

/// Loosely typed payload as produced by text-generating oracles
#[derive(Deserialize)]
struct WireAction {
    intent: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    in_reply_to: Option<u64>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    reasoning: String,
}

impl ActionMessage {
    /// Create an action with no target
    pub fn new(intent: Intent, content: impl Into<String>) -> Self {
        Self {
            intent,
            target: None,
            in_reply_to: None,
            content: content.into(),
            reasoning: String::new(),
        }
    }

    /// `bond <target>`
    pub fn bond(target: AgentId, content: impl Into<String>) -> Self {
        Self::new(Intent::Bond, content).with_target(target)
    }

    /// `raid <target>`
    pub fn raid(target: AgentId) -> Self {
        Self::new(Intent::Raid, "").with_target(target)
    }

    /// `request_spark` with a reason
    pub fn request_spark(reason: impl Into<String>) -> Self {
        Self::new(Intent::RequestSpark, reason)
    }

    /// `spawn_with <partner>`
    pub fn spawn_with(partner: AgentId) -> Self {
        Self::new(Intent::SpawnWith, "").with_target(partner)
    }

    /// `reply` addressed to an agent
    pub fn reply(target: AgentId, content: impl Into<String>) -> Self {
        Self::new(Intent::Reply, content).with_target(target)
    }

    /// `reply` with no explicit addressee
    pub fn broadcast(content: impl Into<String>) -> Self {
        Self::new(Intent::Reply, content)
    }

    /// Builder: set target
    pub fn with_target(mut self, target: AgentId) -> Self {
        self.target = Some(target);
        self
    }

    /// Builder: set the message being answered
    pub fn answering(mut self, message: MessageId) -> Self {
        self.in_reply_to = Some(message);
        self
    }

    /// Builder: set private reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Check structural requirements of the intent
    pub fn validate(&self) -> SparkWorldResult<()> {
        if self.intent.requires_target() && self.target.is_none() {
            return Err(SparkWorldError::MissingField {
                intent: self.intent,
                field: "target",
            });
        }
        Ok(())
    }

    /// Decode and validate a JSON action payload
    pub fn from_json(payload: &str) -> SparkWorldResult<Self> {
        let wire: WireAction = serde_json::from_str(payload)
            .map_err(|e| SparkWorldError::MalformedPayload(e.to_string()))?;

        let intent: Intent = wire.intent.parse()?;
        let target = match wire.target.as_deref().map(str::trim) {
            None | Some("") | Some("none") | Some("null") => None,
            Some(raw) => Some(
                raw.parse::<AgentId>()
                    .map_err(|e| SparkWorldError::MalformedPayload(e.to_string()))?,
            ),
        };

        let message = Self {
            intent,
            target,
            in_reply_to: wire.in_reply_to.map(MessageId),
            content: wire.content,
            reasoning: wire.reasoning,
        };
        message.validate()?;
        Ok(message)
    }
}

/// A `request_spark` plea awaiting Bob's judgment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plea {
    /// Who is asking
    pub agent: AgentId,
    /// Their stated reason
    pub reason: String,
    /// Tick the plea was made
    pub tick: TickId,
}

/// An action as accepted from an agent, reasoning included
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAction {
    /// Acting agent
    pub agent: AgentId,
    /// The action
    pub message: ActionMessage,
}

/// A message waiting in an agent's inbox
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Message id, usable as `in_reply_to`
    pub id: MessageId,
    /// Sender
    pub from: AgentId,
    /// Intent the sender used
    pub intent: Intent,
    /// Public content
    pub content: String,
    /// Tick the message was sent
    pub tick: TickId,
    /// Message this answers, if any
    pub in_reply_to: Option<MessageId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_parsing_accepts_aliases() {
        assert_eq!("spawn".parse::<Intent>().unwrap(), Intent::SpawnWith);
        assert_eq!("Request_Spark".parse::<Intent>().unwrap(), Intent::RequestSpark);
        assert!(matches!(
            "dance".parse::<Intent>(),
            Err(SparkWorldError::UnknownIntent(_))
        ));
    }

    #[test]
    fn from_json_builds_targeted_action() {
        let payload = r#"{"intent":"raid","target":"agent_004","content":"yield!","reasoning":"they look weak"}"#;
        let action = ActionMessage::from_json(payload).unwrap();

        assert_eq!(action.intent, Intent::Raid);
        assert_eq!(action.target, Some(AgentId::new(4)));
        assert_eq!(action.reasoning, "they look weak");
    }

    #[test]
    fn from_json_rejects_missing_target() {
        let err = ActionMessage::from_json(r#"{"intent":"bond","content":"hi"}"#).unwrap_err();
        assert!(err.is_malformed_action());
        assert!(matches!(
            err,
            SparkWorldError::MissingField {
                intent: Intent::Bond,
                field: "target"
            }
        ));
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(ActionMessage::from_json("not json").unwrap_err().is_malformed_action());
        assert!(ActionMessage::from_json(r#"{"intent":"fly"}"#)
            .unwrap_err()
            .is_malformed_action());
        assert!(ActionMessage::from_json(r#"{"intent":"raid","target":"nobody"}"#)
            .unwrap_err()
            .is_malformed_action());
    }

    #[test]
    fn request_spark_needs_no_target() {
        let action = ActionMessage::from_json(r#"{"intent":"request_spark","target":"none","content":"please"}"#).unwrap();
        assert_eq!(action.target, None);
        assert_eq!(action.content, "please");
    }
}
