//! Scenario and prompt-module dispatch
//!
//! The tool→module table is an explicit enumerated mapping, so expansion is
//! provably deterministic: the same (scenario, tools-called) input always
//! yields the same deduplicated module set, and a superset of tools yields a
//! superset of modules.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Named instruction modules. Enum order is render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptModule {
    /// Order lookup and status flow
    OrderFlow,
    /// Tire search and selection flow
    TireSearch,
    /// Fitting-station booking flow
    Fitting,
    /// Combined order-plus-fitting flow (confirmations that touch both)
    OrderFitting,
    /// Operator handoff rules
    Operator,
}

impl PromptModule {
    pub const ALL: [PromptModule; 5] = [
        PromptModule::OrderFlow,
        PromptModule::TireSearch,
        PromptModule::Fitting,
        PromptModule::OrderFitting,
        PromptModule::Operator,
    ];

    /// Instruction text appended to the live prompt when the module
    /// activates.
    pub fn text(&self) -> &'static str {
        match self {
            PromptModule::OrderFlow => {
                "## Orders\n\
                 When the caller asks about an order, get the order number or the \
                 phone number the order was placed under, then call get_order_status. \
                 Read back the status, the items, and the expected delivery date. \
                 Never invent order details."
            }
            PromptModule::TireSearch => {
                "## Tire search\n\
                 For tire questions, collect width, profile, and diameter (for \
                 example 205/55 R16) plus the season, then call search_tires. Offer \
                 at most three options with prices, starting with in-stock items. \
                 If nothing matches, offer the closest size or an operator."
            }
            PromptModule::Fitting => {
                "## Fitting\n\
                 For fitting requests, offer the nearest free slots via book_fitting. \
                 Confirm the date, the time, and the car model back to the caller \
                 before booking. Mention that balancing is included."
            }
            PromptModule::OrderFitting => {
                "## Order with fitting\n\
                 When confirming an order that includes fitting, use confirm_order \
                 only after the caller has agreed to both the goods and the fitting \
                 slot. Summarize the full total, goods plus services, before \
                 confirming."
            }
            PromptModule::Operator => {
                "## Operator handoff\n\
                 Call transfer_to_operator when the caller explicitly asks for a \
                 person, repeats a complaint, or when you cannot complete the task \
                 with the tools available. Tell the caller you are transferring them \
                 before you do."
            }
        }
    }
}

/// Conversation scenario selected at call start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Caller is asking about an existing order
    OrderStatus,
    /// Caller is choosing tires
    TireSelection,
    /// Caller wants a fitting appointment
    FittingBooking,
    /// Sentinel: the full generic prompt that already contains every
    /// module. Expansion is always a no-op here.
    #[default]
    Full,
}

impl Scenario {
    /// Modules present in the base prompt for this scenario.
    pub fn base_modules(&self) -> BTreeSet<PromptModule> {
        match self {
            Scenario::OrderStatus => BTreeSet::from([PromptModule::OrderFlow]),
            Scenario::TireSelection => BTreeSet::from([PromptModule::TireSearch]),
            Scenario::FittingBooking => BTreeSet::from([PromptModule::Fitting]),
            Scenario::Full => PromptModule::ALL.into_iter().collect(),
        }
    }

    /// Parse a scenario label from tenant configuration.
    pub fn parse(label: &str) -> Option<Scenario> {
        match label {
            "order_status" => Some(Scenario::OrderStatus),
            "tire_selection" => Some(Scenario::TireSelection),
            "fitting_booking" => Some(Scenario::FittingBooking),
            "full" => Some(Scenario::Full),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::OrderStatus => "order_status",
            Scenario::TireSelection => "tire_selection",
            Scenario::FittingBooking => "fitting_booking",
            Scenario::Full => "full",
        }
    }
}

static ORDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)замов|заказ|посилк|доставк|відправ|накладн").unwrap());
static TIRES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)шин|резин|покришк|колес|r1[3-9]|r2[0-2]").unwrap());
static FITTING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)шиномонтаж|монтаж|запис|балансуванн|переобу").unwrap());

impl Scenario {
    /// Infer the scenario from the caller's first utterance. Deterministic:
    /// first matching rule wins, unmatched text keeps the full prompt.
    pub fn infer(utterance: &str) -> Scenario {
        if ORDER_RE.is_match(utterance) {
            Scenario::OrderStatus
        } else if FITTING_RE.is_match(utterance) {
            Scenario::FittingBooking
        } else if TIRES_RE.is_match(utterance) {
            Scenario::TireSelection
        } else {
            Scenario::Full
        }
    }
}

/// Modules implied by a tool. Some tools imply more than one; unknown tools
/// imply none.
pub fn modules_for_tool(tool: &str) -> &'static [PromptModule] {
    match tool {
        "get_order_status" => &[PromptModule::OrderFlow],
        "search_tires" => &[PromptModule::TireSearch],
        "book_fitting" => &[PromptModule::Fitting],
        "confirm_order" => &[
            PromptModule::OrderFlow,
            PromptModule::Fitting,
            PromptModule::OrderFitting,
        ],
        "transfer_to_operator" => &[PromptModule::Operator],
        _ => &[],
    }
}

/// Pure expansion function: the deduplicated module set for a scenario plus
/// the tools called so far.
pub fn infer_expansion(scenario: Scenario, tools: &BTreeSet<String>) -> BTreeSet<PromptModule> {
    let mut modules = scenario.base_modules();
    if scenario == Scenario::Full {
        // Sentinel already carries every module
        return modules;
    }
    for tool in tools {
        modules.extend(modules_for_tool(tool).iter().copied());
    }
    modules
}
