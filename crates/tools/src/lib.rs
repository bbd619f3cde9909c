//! Domain tools for the call-center voice agent
//!
//! Each tool carries a JSON Schema for its arguments, validated before
//! dispatch; the registry wraps execution in a per-tool timeout. Business
//! data comes from a [`RetailBackend`] integration so tools stay testable
//! without the order system.

pub mod backend;
pub mod registry;
pub mod retail;

pub use backend::{
    FittingConfirmation, FittingSlot, OrderInfo, RetailBackend, StubRetailBackend, TireItem,
    TireQuery,
};
pub use registry::ToolRegistry;
pub use retail::{
    create_retail_registry, ConfirmOrderTool, FittingBookingTool, OperatorTransferTool,
    OrderStatusTool, TireSearchTool,
};
