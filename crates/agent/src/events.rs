//! Events delivered to a turn controller

use call_agent_core::AudioFrame;

/// What the connection task (or the session sweeper) tells the controller.
#[derive(Debug)]
pub enum CallEvent {
    /// One decoded frame of caller audio
    Audio(AudioFrame),
    /// Hangup frame from the gateway, or an administrative close
    Hangup,
}
