//! Prompt construction for the call-center voice agent
//!
//! The system prompt driving the agent is assembled per call: fixed global
//! instructions, one scenario module selected from the caller's inferred
//! intent (or the tenant default), and additional modules pulled in as the
//! conversation's tool usage requires them. Expansion is deterministic and
//! only ever grows the prompt.

pub mod modules;
pub mod prompt;

pub use modules::{infer_expansion, modules_for_tool, PromptModule, Scenario};
pub use prompt::ContextAssembler;
