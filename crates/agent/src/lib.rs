//! Per-call turn controller
//!
//! One controller instance owns one [`CallSession`](call_agent_core::CallSession)
//! and drives its listen → think → speak cycle: streaming caller audio into
//! STT, calling the model with the live prompt, dispatching tools, pacing
//! synthesized audio back onto the wire, and handling barge-in, silence
//! timeouts, and teardown.

pub mod controller;
pub mod events;

pub use controller::{ControllerDeps, TurnController};
pub use events::CallEvent;
