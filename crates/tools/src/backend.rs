//! Retail backend integration
//!
//! The order system, tire catalog, and fitting calendar live outside this
//! service. Tools reach them through this trait; [`StubRetailBackend`] is the
//! in-memory implementation used in development and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use call_agent_core::ToolError;

/// An order as known to the retail system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    pub customer_phone: String,
    pub status: String,
    pub items: Vec<String>,
    pub total_uah: f64,
    pub expected_delivery: Option<String>,
    pub includes_fitting: bool,
    pub confirmed: bool,
}

/// Tire search parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TireQuery {
    pub width: u32,
    pub profile: u32,
    pub diameter: u32,
    pub season: Option<String>,
    pub brand: Option<String>,
}

/// A catalog position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TireItem {
    pub brand: String,
    pub model: String,
    pub size: String,
    pub season: String,
    pub price_uah: f64,
    pub in_stock: bool,
}

/// A free fitting-station slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittingSlot {
    pub date: String,
    pub time: String,
    pub station: String,
}

/// A confirmed fitting booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittingConfirmation {
    pub booking_id: String,
    pub date: String,
    pub time: String,
    pub station: String,
}

/// Boundary to the retail order/catalog/calendar systems.
#[async_trait]
pub trait RetailBackend: Send + Sync {
    /// Look up an order by id or by the phone it was placed under.
    async fn order_status(
        &self,
        order_id: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<OrderInfo>, ToolError>;

    /// Search the tire catalog.
    async fn search_tires(&self, query: &TireQuery) -> Result<Vec<TireItem>, ToolError>;

    /// Free fitting slots for a date.
    async fn fitting_slots(&self, date: &str) -> Result<Vec<FittingSlot>, ToolError>;

    /// Book a fitting slot.
    async fn book_fitting(
        &self,
        date: &str,
        time: &str,
        car_model: &str,
    ) -> Result<FittingConfirmation, ToolError>;

    /// Confirm a pending order.
    async fn confirm_order(&self, order_id: &str) -> Result<OrderInfo, ToolError>;
}

/// In-memory backend with a small fixed dataset.
pub struct StubRetailBackend {
    orders: Mutex<HashMap<String, OrderInfo>>,
    catalog: Vec<TireItem>,
    booked: Mutex<HashSet<(String, String)>>,
    booking_seq: Mutex<u32>,
}

impl StubRetailBackend {
    pub fn new() -> Self {
        let mut orders = HashMap::new();
        orders.insert(
            "A-10234".to_string(),
            OrderInfo {
                order_id: "A-10234".to_string(),
                customer_phone: "380501234567".to_string(),
                status: "in_transit".to_string(),
                items: vec!["Nokian Hakkapeliitta R5 205/55 R16, 4 шт.".to_string()],
                total_uah: 18400.0,
                expected_delivery: Some("2026-08-10".to_string()),
                includes_fitting: true,
                confirmed: false,
            },
        );
        orders.insert(
            "A-10235".to_string(),
            OrderInfo {
                order_id: "A-10235".to_string(),
                customer_phone: "380671112233".to_string(),
                status: "ready_for_pickup".to_string(),
                items: vec!["Michelin Primacy 4 195/65 R15, 4 шт.".to_string()],
                total_uah: 14200.0,
                expected_delivery: None,
                includes_fitting: false,
                confirmed: true,
            },
        );

        let catalog = vec![
            TireItem {
                brand: "Nokian".into(),
                model: "Hakkapeliitta R5".into(),
                size: "205/55 R16".into(),
                season: "winter".into(),
                price_uah: 4600.0,
                in_stock: true,
            },
            TireItem {
                brand: "Michelin".into(),
                model: "Primacy 4".into(),
                size: "205/55 R16".into(),
                season: "summer".into(),
                price_uah: 4100.0,
                in_stock: true,
            },
            TireItem {
                brand: "Continental".into(),
                model: "WinterContact TS 870".into(),
                size: "195/65 R15".into(),
                season: "winter".into(),
                price_uah: 3700.0,
                in_stock: false,
            },
        ];

        Self {
            orders: Mutex::new(orders),
            catalog,
            booked: Mutex::new(HashSet::new()),
            booking_seq: Mutex::new(0),
        }
    }
}

impl Default for StubRetailBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetailBackend for StubRetailBackend {
    async fn order_status(
        &self,
        order_id: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<OrderInfo>, ToolError> {
        let orders = self.orders.lock();
        if let Some(id) = order_id {
            return Ok(orders.get(id).cloned());
        }
        if let Some(phone) = phone {
            return Ok(orders.values().find(|o| o.customer_phone == phone).cloned());
        }
        Ok(None)
    }

    async fn search_tires(&self, query: &TireQuery) -> Result<Vec<TireItem>, ToolError> {
        let size = format!("{}/{} R{}", query.width, query.profile, query.diameter);
        let mut matches: Vec<TireItem> = self
            .catalog
            .iter()
            .filter(|item| item.size == size)
            .filter(|item| {
                query
                    .season
                    .as_deref()
                    .map_or(true, |s| item.season.eq_ignore_ascii_case(s))
            })
            .filter(|item| {
                query
                    .brand
                    .as_deref()
                    .map_or(true, |b| item.brand.eq_ignore_ascii_case(b))
            })
            .cloned()
            .collect();
        // In-stock items first, then by price
        matches.sort_by(|a, b| {
            b.in_stock
                .cmp(&a.in_stock)
                .then(a.price_uah.total_cmp(&b.price_uah))
        });
        Ok(matches)
    }

    async fn fitting_slots(&self, date: &str) -> Result<Vec<FittingSlot>, ToolError> {
        let booked = self.booked.lock();
        Ok(["09:00", "11:30", "14:00", "16:30"]
            .iter()
            .filter(|time| !booked.contains(&(date.to_string(), time.to_string())))
            .map(|time| FittingSlot {
                date: date.to_string(),
                time: time.to_string(),
                station: "Станція №1".to_string(),
            })
            .collect())
    }

    async fn book_fitting(
        &self,
        date: &str,
        time: &str,
        _car_model: &str,
    ) -> Result<FittingConfirmation, ToolError> {
        let mut booked = self.booked.lock();
        if !booked.insert((date.to_string(), time.to_string())) {
            return Err(ToolError::Execution(format!(
                "slot {date} {time} is already taken"
            )));
        }
        let mut seq = self.booking_seq.lock();
        *seq += 1;
        Ok(FittingConfirmation {
            booking_id: format!("F-{:05}", *seq),
            date: date.to_string(),
            time: time.to_string(),
            station: "Станція №1".to_string(),
        })
    }

    async fn confirm_order(&self, order_id: &str) -> Result<OrderInfo, ToolError> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| ToolError::Execution(format!("order {order_id} not found")))?;
        order.confirmed = true;
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_order_lookup_by_id_and_phone() {
        let backend = StubRetailBackend::new();

        let by_id = backend.order_status(Some("A-10234"), None).await.unwrap();
        assert_eq!(by_id.unwrap().status, "in_transit");

        let by_phone = backend
            .order_status(None, Some("380671112233"))
            .await
            .unwrap();
        assert_eq!(by_phone.unwrap().order_id, "A-10235");

        assert!(backend.order_status(Some("NOPE"), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tire_search_prefers_stock() {
        let backend = StubRetailBackend::new();
        let query = TireQuery {
            width: 205,
            profile: 55,
            diameter: 16,
            season: None,
            brand: None,
        };
        let found = backend.search_tires(&query).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].in_stock);
    }

    #[tokio::test]
    async fn test_double_booking_rejected() {
        let backend = StubRetailBackend::new();
        backend
            .book_fitting("2026-08-12", "09:00", "Skoda Octavia")
            .await
            .unwrap();
        assert!(backend
            .book_fitting("2026-08-12", "09:00", "VW Golf")
            .await
            .is_err());

        let slots = backend.fitting_slots("2026-08-12").await.unwrap();
        assert!(!slots.iter().any(|s| s.time == "09:00"));
    }
}
