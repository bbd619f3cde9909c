//! Call session lifecycle, turns, and tool-call records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::llm_types::Message;

/// Lifecycle state of a call session.
///
/// Exactly one state is active at a time; `Closed` is terminal and entered
/// exactly once regardless of the teardown trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Connection accepted, handshake/tenant resolution pending
    #[default]
    Connecting,
    /// Handshake done, tenant resolved, greeting scheduled
    Active,
    /// Teardown started (hangup, fatal error, or idle timeout)
    Closing,
    /// Terminal; all resources released
    Closed,
}

impl CallState {
    /// Allowed transitions from this state
    pub fn allowed_transitions(&self) -> &'static [CallState] {
        match self {
            CallState::Connecting => &[CallState::Active, CallState::Closing],
            CallState::Active => &[CallState::Closing],
            CallState::Closing => &[CallState::Closed],
            CallState::Closed => &[],
        }
    }

    pub fn can_transition_to(&self, target: CallState) -> bool {
        self.allowed_transitions().contains(&target)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Connecting => "connecting",
            CallState::Active => "active",
            CallState::Closing => "closing",
            CallState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Final disposition of a call, logged exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Caller hung up after a normal conversation
    Completed,
    /// Caller hung up mid-flow
    CallerHangup,
    /// Handed to a human operator
    Transferred,
    /// Ended by the silence-escalation policy
    SilenceTimeout,
    /// Ended by an unrecoverable pipeline failure
    Failed,
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallOutcome::Completed => "completed",
            CallOutcome::CallerHangup => "caller_hangup",
            CallOutcome::Transferred => "transferred",
            CallOutcome::SilenceTimeout => "silence_timeout",
            CallOutcome::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Who opened a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caller,
    Agent,
}

/// Per-stage latencies for one turn, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageLatency {
    pub stt_ms: u64,
    pub llm_ms: u64,
    pub tts_ms: u64,
}

impl StageLatency {
    pub fn total_ms(&self) -> u64 {
        self.stt_ms + self.llm_ms + self.tts_ms
    }
}

/// One tool invocation made during a turn. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    pub result: String,
    pub duration_ms: u64,
    pub success: bool,
}

/// One exchange within a call. Immutable once logged.
///
/// `speaker` marks who opened the exchange: `Caller` for a normal
/// utterance/response pair (the agent reply in `response`), `Agent` for
/// agent-initiated turns such as silence reprompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub number: u32,
    pub speaker: Speaker,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub latency: StageLatency,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub timestamp: DateTime<Utc>,
}

/// Per-call session state, owned exclusively by its turn controller.
#[derive(Debug)]
pub struct CallSession {
    pub id: Uuid,
    pub tenant: String,
    pub caller_id: String,
    state: CallState,
    turn_counter: u32,
    pub history: Vec<Message>,
    tools_called: BTreeSet<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl CallSession {
    pub fn new(id: Uuid, tenant: impl Into<String>, caller_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant: tenant.into(),
            caller_id: caller_id.into(),
            state: CallState::Connecting,
            turn_counter: 0,
            history: Vec::new(),
            tools_called: BTreeSet::new(),
            started_at: now,
            last_activity: now,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Move to a new lifecycle state, rejecting illegal transitions.
    pub fn transition(&mut self, target: CallState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidTransition(format!(
                "{} -> {}",
                self.state, target
            )));
        }
        tracing::debug!(session_id = %self.id, from = %self.state, to = %target, "state transition");
        self.state = target;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state == CallState::Closed
    }

    /// Allocate the next turn number; strictly increasing per session.
    pub fn next_turn_number(&mut self) -> u32 {
        self.turn_counter += 1;
        self.turn_counter
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_counter
    }

    /// Record that a tool was invoked this call. The set only grows; a
    /// repeat invocation is a no-op and returns false.
    pub fn note_tool(&mut self, name: &str) -> bool {
        self.tools_called.insert(name.to_string())
    }

    pub fn tools_called(&self) -> &BTreeSet<String> {
        &self.tools_called
    }

    /// Refresh the activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Serializable view for the session store and monitoring.
    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            session_id: self.id,
            tenant: self.tenant.clone(),
            caller_id: self.caller_id.clone(),
            state: self.state,
            turn_count: self.turn_counter,
            tools_called: self.tools_called.iter().cloned().collect(),
            started_at: self.started_at,
            last_activity: self.last_activity,
        }
    }
}

/// Snapshot of a session as held by the external session store.
///
/// Writes are unconditional idempotent upserts; recovery and monitoring
/// processes may read or overwrite concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub session_id: Uuid,
    pub tenant: String,
    pub caller_id: String,
    pub state: CallState,
    pub turn_count: u32,
    pub tools_called: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// A turn as handed to the call log sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: Uuid,
    pub tenant: String,
    pub turn: Turn,
}

/// A tool call as handed to the call log sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallLogRecord {
    pub session_id: Uuid,
    pub tenant: String,
    pub turn_number: u32,
    pub call: ToolCallRecord,
    pub timestamp: DateTime<Utc>,
}

/// Final call record written once per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFinalRecord {
    pub session_id: Uuid,
    pub tenant: String,
    pub caller_id: String,
    pub outcome: CallOutcome,
    pub turn_count: u32,
    pub tools_called: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new(Uuid::new_v4(), "kolesoplus", "380501234567")
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut s = session();
        assert_eq!(s.state(), CallState::Connecting);
        s.transition(CallState::Active).unwrap();
        s.transition(CallState::Closing).unwrap();
        s.transition(CallState::Closed).unwrap();
        assert!(s.is_closed());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut s = session();
        // Cannot jump straight to Closed
        assert!(s.transition(CallState::Closed).is_err());
        s.transition(CallState::Active).unwrap();
        // Cannot go back
        assert!(s.transition(CallState::Connecting).is_err());
        s.transition(CallState::Closing).unwrap();
        s.transition(CallState::Closed).unwrap();
        // Closed is terminal
        assert!(s.transition(CallState::Closing).is_err());
    }

    #[test]
    fn test_turn_numbers_strictly_increase() {
        let mut s = session();
        let a = s.next_turn_number();
        let b = s.next_turn_number();
        let c = s.next_turn_number();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_tools_called_is_a_growing_set() {
        let mut s = session();
        assert!(s.note_tool("get_order_status"));
        assert!(!s.note_tool("get_order_status"));
        assert!(s.note_tool("search_tires"));
        assert_eq!(s.tools_called().len(), 2);
    }

    #[test]
    fn test_snapshot_reflects_session() {
        let mut s = session();
        s.transition(CallState::Active).unwrap();
        s.next_turn_number();
        s.note_tool("search_tires");

        let snap = s.snapshot();
        assert_eq!(snap.session_id, s.id);
        assert_eq!(snap.state, CallState::Active);
        assert_eq!(snap.turn_count, 1);
        assert_eq!(snap.tools_called, vec!["search_tires".to_string()]);
    }
}
