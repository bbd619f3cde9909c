//! Retail domain tools
//!
//! Order lookup, tire search, fitting booking, order confirmation, and the
//! terminal operator-transfer tool.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::Arc;

use call_agent_core::{Tool, ToolError, ToolOutput, ToolSchema};

use crate::backend::{RetailBackend, TireQuery};
use crate::registry::ToolRegistry;

/// A tool schema compiled once at first use.
struct SchemaValidator {
    raw: Value,
    compiled: JSONSchema,
}

impl SchemaValidator {
    fn new(raw: Value) -> Self {
        let compiled = JSONSchema::compile(&raw).expect("static tool schema must compile");
        Self { raw, compiled }
    }

    fn check(&self, tool: &str, args: &Value) -> Result<(), ToolError> {
        if let Err(errors) = self.compiled.validate(args) {
            let message = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ToolError::invalid(tool, message));
        }
        Ok(())
    }
}

static ORDER_STATUS_SCHEMA: Lazy<SchemaValidator> = Lazy::new(|| {
    SchemaValidator::new(json!({
        "type": "object",
        "properties": {
            "order_id": {
                "type": "string",
                "description": "Order number, e.g. A-10234"
            },
            "phone": {
                "type": "string",
                "description": "Phone number the order was placed under"
            }
        },
        "anyOf": [
            {"required": ["order_id"]},
            {"required": ["phone"]}
        ],
        "additionalProperties": false
    }))
});

/// Look up an order's status by number or phone.
pub struct OrderStatusTool {
    backend: Arc<dyn RetailBackend>,
}

impl OrderStatusTool {
    pub fn new(backend: Arc<dyn RetailBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for OrderStatusTool {
    fn name(&self) -> &str {
        "get_order_status"
    }

    fn description(&self) -> &str {
        "Look up the status, items, and delivery date of an existing order by order number or customer phone"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: ORDER_STATUS_SCHEMA.raw.clone(),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        ORDER_STATUS_SCHEMA.check(self.name(), arguments)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let order_id = arguments.get("order_id").and_then(Value::as_str);
        let phone = arguments.get("phone").and_then(Value::as_str);

        match self.backend.order_status(order_id, phone).await? {
            Some(order) => {
                let delivery = order
                    .expected_delivery
                    .as_deref()
                    .unwrap_or("not scheduled");
                let text = format!(
                    "Order {}: status {}, items: {}; total {} UAH; expected delivery {}{}",
                    order.order_id,
                    order.status,
                    order.items.join(", "),
                    order.total_uah,
                    delivery,
                    if order.includes_fitting {
                        "; fitting included"
                    } else {
                        ""
                    }
                );
                Ok(ToolOutput::with_data(text, json!(order)))
            }
            None => Ok(ToolOutput::text(
                "No order found for the given number or phone.",
            )),
        }
    }
}

static SEARCH_TIRES_SCHEMA: Lazy<SchemaValidator> = Lazy::new(|| {
    SchemaValidator::new(json!({
        "type": "object",
        "properties": {
            "width": {"type": "integer", "minimum": 125, "maximum": 355},
            "profile": {"type": "integer", "minimum": 25, "maximum": 85},
            "diameter": {"type": "integer", "minimum": 13, "maximum": 22},
            "season": {"type": "string", "enum": ["summer", "winter", "all_season"]},
            "brand": {"type": "string"}
        },
        "required": ["width", "profile", "diameter"],
        "additionalProperties": false
    }))
});

/// Search the tire catalog by size and season.
pub struct TireSearchTool {
    backend: Arc<dyn RetailBackend>,
}

impl TireSearchTool {
    pub fn new(backend: Arc<dyn RetailBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for TireSearchTool {
    fn name(&self) -> &str {
        "search_tires"
    }

    fn description(&self) -> &str {
        "Search available tires by size (width/profile/diameter), optionally filtered by season and brand"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: SEARCH_TIRES_SCHEMA.raw.clone(),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        SEARCH_TIRES_SCHEMA.check(self.name(), arguments)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let query = TireQuery {
            width: arguments["width"].as_u64().unwrap_or(0) as u32,
            profile: arguments["profile"].as_u64().unwrap_or(0) as u32,
            diameter: arguments["diameter"].as_u64().unwrap_or(0) as u32,
            season: arguments
                .get("season")
                .and_then(Value::as_str)
                .map(String::from),
            brand: arguments
                .get("brand")
                .and_then(Value::as_str)
                .map(String::from),
        };

        let found = self.backend.search_tires(&query).await?;
        if found.is_empty() {
            return Ok(ToolOutput::text(
                "Nothing in this size; offer the closest size or an operator.",
            ));
        }

        let lines: Vec<String> = found
            .iter()
            .take(3)
            .map(|t| {
                format!(
                    "{} {} {} ({}), {} UAH, {}",
                    t.brand,
                    t.model,
                    t.size,
                    t.season,
                    t.price_uah,
                    if t.in_stock { "in stock" } else { "on order" }
                )
            })
            .collect();
        Ok(ToolOutput::with_data(lines.join("\n"), json!(found)))
    }
}

static BOOK_FITTING_SCHEMA: Lazy<SchemaValidator> = Lazy::new(|| {
    SchemaValidator::new(json!({
        "type": "object",
        "properties": {
            "date": {
                "type": "string",
                "pattern": "^\\d{4}-\\d{2}-\\d{2}$",
                "description": "Desired date, YYYY-MM-DD"
            },
            "time": {
                "type": "string",
                "pattern": "^\\d{2}:\\d{2}$",
                "description": "Slot time; omit to list free slots"
            },
            "car_model": {"type": "string"}
        },
        "required": ["date"],
        "additionalProperties": false
    }))
});

/// List free fitting slots or book one.
pub struct FittingBookingTool {
    backend: Arc<dyn RetailBackend>,
}

impl FittingBookingTool {
    pub fn new(backend: Arc<dyn RetailBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for FittingBookingTool {
    fn name(&self) -> &str {
        "book_fitting"
    }

    fn description(&self) -> &str {
        "List free fitting-station slots for a date, or book one when a time is given"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: BOOK_FITTING_SCHEMA.raw.clone(),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        BOOK_FITTING_SCHEMA.check(self.name(), arguments)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let date = arguments["date"].as_str().unwrap_or_default();
        let car_model = arguments
            .get("car_model")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        match arguments.get("time").and_then(Value::as_str) {
            Some(time) => {
                let confirmation = self.backend.book_fitting(date, time, car_model).await?;
                Ok(ToolOutput::with_data(
                    format!(
                        "Booked: {} at {} on {}, booking {}",
                        confirmation.station,
                        confirmation.time,
                        confirmation.date,
                        confirmation.booking_id
                    ),
                    json!(confirmation),
                ))
            }
            None => {
                let slots = self.backend.fitting_slots(date).await?;
                if slots.is_empty() {
                    return Ok(ToolOutput::text(format!("No free slots on {date}.")));
                }
                let times: Vec<&str> = slots.iter().map(|s| s.time.as_str()).collect();
                Ok(ToolOutput::with_data(
                    format!("Free slots on {date}: {}", times.join(", ")),
                    json!(slots),
                ))
            }
        }
    }
}

static CONFIRM_ORDER_SCHEMA: Lazy<SchemaValidator> = Lazy::new(|| {
    SchemaValidator::new(json!({
        "type": "object",
        "properties": {
            "order_id": {"type": "string"}
        },
        "required": ["order_id"],
        "additionalProperties": false
    }))
});

/// Confirm a pending order (goods plus any attached fitting).
pub struct ConfirmOrderTool {
    backend: Arc<dyn RetailBackend>,
}

impl ConfirmOrderTool {
    pub fn new(backend: Arc<dyn RetailBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ConfirmOrderTool {
    fn name(&self) -> &str {
        "confirm_order"
    }

    fn description(&self) -> &str {
        "Confirm a pending order after the caller has agreed to the goods and any attached fitting"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: CONFIRM_ORDER_SCHEMA.raw.clone(),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        CONFIRM_ORDER_SCHEMA.check(self.name(), arguments)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let order_id = arguments["order_id"].as_str().unwrap_or_default();
        let order = self.backend.confirm_order(order_id).await?;
        Ok(ToolOutput::with_data(
            format!(
                "Order {} confirmed, total {} UAH{}",
                order.order_id,
                order.total_uah,
                if order.includes_fitting {
                    ", fitting included"
                } else {
                    ""
                }
            ),
            json!(order),
        ))
    }
}

static TRANSFER_SCHEMA: Lazy<SchemaValidator> = Lazy::new(|| {
    SchemaValidator::new(json!({
        "type": "object",
        "properties": {
            "reason": {
                "type": "string",
                "enum": [
                    "caller_request",
                    "complaint",
                    "out_of_scope",
                    "repeated_failure"
                ]
            },
            "summary": {"type": "string"}
        },
        "required": ["reason"],
        "additionalProperties": false
    }))
});

/// Terminal tool: hand the call to a human operator.
pub struct OperatorTransferTool;

impl OperatorTransferTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OperatorTransferTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for OperatorTransferTool {
    fn name(&self) -> &str {
        "transfer_to_operator"
    }

    fn description(&self) -> &str {
        "Transfer the call to a human operator; ends the automated conversation"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: TRANSFER_SCHEMA.raw.clone(),
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        TRANSFER_SCHEMA.check(self.name(), arguments)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let reason = arguments["reason"].as_str().unwrap_or("caller_request");
        tracing::info!(reason, "operator transfer requested");
        Ok(ToolOutput::transfer(format!(
            "Transferring to an operator ({reason})."
        )))
    }

    fn timeout_secs(&self) -> u64 {
        5
    }
}

/// Build the standard retail registry against a backend.
pub fn create_retail_registry(backend: Arc<dyn RetailBackend>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(OrderStatusTool::new(Arc::clone(&backend)));
    registry.register(TireSearchTool::new(Arc::clone(&backend)));
    registry.register(FittingBookingTool::new(Arc::clone(&backend)));
    registry.register(ConfirmOrderTool::new(backend));
    registry.register(OperatorTransferTool::new());

    tracing::info!(tools = registry.len(), "created retail tool registry");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubRetailBackend;
    use std::collections::BTreeSet;

    fn registry() -> ToolRegistry {
        create_retail_registry(Arc::new(StubRetailBackend::new()))
    }

    #[tokio::test]
    async fn test_order_status_happy_path() {
        let output = registry()
            .execute("get_order_status", json!({"order_id": "A-10234"}))
            .await
            .unwrap();
        assert!(output.text.contains("A-10234"));
        assert!(output.data.is_some());
        assert!(!output.transfer);
    }

    #[tokio::test]
    async fn test_order_status_requires_id_or_phone() {
        let err = registry()
            .execute("get_order_status", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_tire_search_limits_options() {
        let output = registry()
            .execute(
                "search_tires",
                json!({"width": 205, "profile": 55, "diameter": 16}),
            )
            .await
            .unwrap();
        assert!(output.text.lines().count() <= 3);
    }

    #[tokio::test]
    async fn test_tire_search_rejects_bad_size() {
        let err = registry()
            .execute(
                "search_tires",
                json!({"width": 5000, "profile": 55, "diameter": 16}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_fitting_lists_then_books() {
        let reg = registry();
        let slots = reg
            .execute("book_fitting", json!({"date": "2026-08-12"}))
            .await
            .unwrap();
        assert!(slots.text.contains("09:00"));

        let booked = reg
            .execute(
                "book_fitting",
                json!({"date": "2026-08-12", "time": "09:00", "car_model": "Octavia"}),
            )
            .await
            .unwrap();
        assert!(booked.text.contains("F-"));
    }

    #[tokio::test]
    async fn test_transfer_is_terminal() {
        let output = registry()
            .execute("transfer_to_operator", json!({"reason": "complaint"}))
            .await
            .unwrap();
        assert!(output.transfer);
    }

    #[test]
    fn test_definitions_for_model_are_sorted() {
        let defs = registry().definitions_for(&BTreeSet::new());
        assert_eq!(defs.len(), 5);
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
