//! Live prompt assembly
//!
//! Render order is fixed: global rules first, then the scenario plus any
//! expansion modules, then the tenant suffix, then preloaded caller context.
//! Foundational rules are always read before tenant- or caller-specific
//! text.

use std::collections::BTreeSet;

use call_agent_core::TenantConfig;

use crate::modules::{modules_for_tool, PromptModule, Scenario};

/// Fixed global instructions shared by every call.
const GLOBAL_RULES: &str = "\
You are a voice assistant answering phone calls for a tire and wheel retail \
network. You hear the caller through speech recognition and your replies are \
spoken aloud, so keep them short: one to three sentences, no lists, no \
markup. Always answer in the caller's language (Ukrainian by default). Use \
the provided tools for any order, stock, price, or booking fact; never guess. \
If you cannot help, transfer the call to an operator rather than ending it.";

/// Per-call prompt state.
///
/// Starts from the scenario's base modules; whenever a tool outside the
/// active set is invoked, its module text joins the prompt for the rest of
/// the call.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    scenario: Scenario,
    active: BTreeSet<PromptModule>,
    tenant_suffix: String,
    caller_profile: Option<String>,
}

impl ContextAssembler {
    pub fn new(scenario: Scenario, tenant: &TenantConfig, caller_profile: Option<String>) -> Self {
        Self {
            scenario,
            active: scenario.base_modules(),
            tenant_suffix: tenant.prompt_suffix.clone(),
            caller_profile,
        }
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn active_modules(&self) -> &BTreeSet<PromptModule> {
        &self.active
    }

    /// Record a tool invocation, pulling in its modules. Returns true when
    /// the prompt grew. A no-op for the full-prompt sentinel and for tools
    /// whose modules are already active.
    pub fn note_tool(&mut self, tool: &str) -> bool {
        if self.scenario == Scenario::Full {
            return false;
        }
        let mut grew = false;
        for module in modules_for_tool(tool) {
            if self.active.insert(*module) {
                tracing::debug!(tool, module = ?module, "prompt module activated");
                grew = true;
            }
        }
        grew
    }

    /// Render the current system prompt.
    pub fn render(&self) -> String {
        let mut prompt = String::from(GLOBAL_RULES);

        // BTreeSet iterates in enum order, so module order is stable across
        // renders regardless of activation order.
        for module in &self.active {
            prompt.push_str("\n\n");
            prompt.push_str(module.text());
        }

        if !self.tenant_suffix.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.tenant_suffix);
        }

        if let Some(ref profile) = self.caller_profile {
            prompt.push_str("\n\nCaller context: ");
            prompt.push_str(profile);
        }

        prompt
    }
}
