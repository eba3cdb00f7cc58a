//! Persisted entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// Integer stored for an enum did not match any variant
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: i32,
}

/// Catalog item sold on its own or inside an order
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Accessory {
    pub id: i32,
    pub name: String,
    /// Business key, unique among accessories
    pub description: String,
    pub cost: f64,
    pub price: f64,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Accessory fields before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccessory {
    pub name: String,
    pub description: String,
    pub cost: f64,
    pub price: f64,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Role {
    Customer,
    Admin,
}

impl From<Role> for i32 {
    fn from(role: Role) -> Self {
        match role {
            Role::Customer => 0,
            Role::Admin => 1,
        }
    }
}

impl TryFrom<i32> for Role {
    type Error = UnknownVariant;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::Customer),
            1 => Ok(Role::Admin),
            _ => Err(UnknownVariant { kind: "role", value }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub phone_number: String,
    pub address: String,
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    #[sqlx(try_from = "i32")]
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub phone_number: String,
    pub address: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl From<OrderStatus> for i32 {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => 0,
            OrderStatus::Paid => 1,
            OrderStatus::Shipped => 2,
            OrderStatus::Delivered => 3,
            OrderStatus::Cancelled => 4,
        }
    }
}

impl TryFrom<i32> for OrderStatus {
    type Error = UnknownVariant;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderStatus::Pending),
            1 => Ok(OrderStatus::Paid),
            2 => Ok(OrderStatus::Shipped),
            3 => Ok(OrderStatus::Delivered),
            4 => Ok(OrderStatus::Cancelled),
            _ => Err(UnknownVariant {
                kind: "order status",
                value,
            }),
        }
    }
}

/// Purchase order header; items are loaded separately
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct OrderRecord {
    pub id: i32,
    pub user_id: i32,
    pub total_price: f64,
    #[sqlx(try_from = "i32")]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub bicycle_color: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct OrderItem {
    pub id: i32,
    pub accessory_id: i32,
    pub quantity: i32,
    pub order_id: Option<i32>,
}

/// Order together with the items it owns
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub record: OrderRecord,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub accessory_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: i32,
    pub total_price: f64,
    pub bicycle_color: String,
    pub items: Vec<NewOrderItem>,
}
