//! Repository contracts over the persistence gateway.
//!
//! Handlers only see these traits; [`crate::pg_store::PgStore`] and
//! [`crate::memory_store::MemoryStore`] implement them.

use crate::models::{
    Accessory, NewAccessory, NewOrder, NewUser, Order, OrderStatus, User,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during repository operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{entity_type} not found: {key}")]
    NotFound {
        entity_type: &'static str,
        key: String,
    },

    /// A uniqueness constraint rejected the write
    #[error("{entity_type} already exists: {key}")]
    AlreadyExists {
        entity_type: &'static str,
        key: String,
    },

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait AccessoryRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Accessory>>;

    async fn get(&self, id: i32) -> Result<Option<Accessory>>;

    /// Whether an accessory with exactly this description is stored
    async fn exists(&self, description: &str) -> Result<bool>;

    async fn create(&self, accessory: NewAccessory) -> Result<Accessory>;

    async fn update(&self, accessory: &Accessory) -> Result<()>;

    /// Deletes the accessory and, through the foreign key, its order items
    async fn delete(&self, id: i32) -> Result<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<User>>;

    async fn get(&self, id: i32) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn exists(&self, username: &str) -> Result<bool>;

    async fn create(&self, user: NewUser) -> Result<User>;

    async fn update(&self, user: &User) -> Result<()>;

    /// Deletes the user together with their orders
    async fn delete(&self, id: i32) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Order>>;

    async fn list_for_user(&self, user_id: i32) -> Result<Vec<Order>>;

    async fn get(&self, id: i32) -> Result<Option<Order>>;

    /// Inserts the order and its items atomically
    async fn create(&self, order: NewOrder) -> Result<Order>;

    async fn update_status(&self, id: i32, status: OrderStatus) -> Result<()>;

    /// Deletes the items first, then the order, atomically
    async fn delete(&self, id: i32) -> Result<()>;
}

/// Liveness check for the readiness endpoint
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}
