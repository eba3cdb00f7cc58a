//! In-memory repository implementation.

use crate::models::{
    Accessory, NewAccessory, NewOrder, NewUser, Order, OrderItem, OrderRecord, OrderStatus, User,
};
use crate::repository::{
    AccessoryRepository, HealthCheck, OrderRepository, RepositoryError, Result, UserRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    accessories: BTreeMap<i32, Accessory>,
    users: BTreeMap<i32, User>,
    orders: BTreeMap<i32, OrderRecord>,
    items: BTreeMap<i32, OrderItem>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn order_with_items(&self, record: &OrderRecord) -> Order {
        Order {
            record: record.clone(),
            items: self
                .items
                .values()
                .filter(|item| item.order_id == Some(record.id))
                .cloned()
                .collect(),
        }
    }

    fn remove_order(&mut self, id: i32) -> bool {
        self.items.retain(|_, item| item.order_id != Some(id));
        self.orders.remove(&id).is_some()
    }
}

/// In-memory storage backend for tests and local development.
///
/// All tables live behind one lock so multi-table writes are atomic and the
/// same uniqueness and cascade rules as the database schema apply. Data is
/// lost when the store is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(entity_type: &'static str, id: i32) -> RepositoryError {
    RepositoryError::NotFound {
        entity_type,
        key: id.to_string(),
    }
}

#[async_trait]
impl AccessoryRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<Accessory>> {
        Ok(self.tables.read().await.accessories.values().cloned().collect())
    }

    async fn get(&self, id: i32) -> Result<Option<Accessory>> {
        Ok(self.tables.read().await.accessories.get(&id).cloned())
    }

    async fn exists(&self, description: &str) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .accessories
            .values()
            .any(|a| a.description == description))
    }

    async fn create(&self, accessory: NewAccessory) -> Result<Accessory> {
        let mut tables = self.tables.write().await;
        if tables
            .accessories
            .values()
            .any(|a| a.description == accessory.description)
        {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "Accessory",
                key: accessory.description,
            });
        }

        let now = Utc::now();
        let created = Accessory {
            id: tables.next_id(),
            name: accessory.name,
            description: accessory.description,
            cost: accessory.cost,
            price: accessory.price,
            image_path: accessory.image_path,
            created_at: now,
            updated_at: now,
        };
        tables.accessories.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, accessory: &Accessory) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .accessories
            .values()
            .any(|a| a.id != accessory.id && a.description == accessory.description)
        {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "Accessory",
                key: accessory.description.clone(),
            });
        }

        match tables.accessories.get_mut(&accessory.id) {
            Some(stored) => {
                *stored = accessory.clone();
                Ok(())
            }
            None => Err(not_found("Accessory", accessory.id)),
        }
    }

    async fn delete(&self, id: i32) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.accessories.remove(&id).is_none() {
            return Err(not_found("Accessory", id));
        }
        tables.items.retain(|_, item| item.accessory_id != id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn get(&self, id: i32) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn exists(&self, username: &str) -> Result<bool> {
        Ok(self.get_by_username(username).await?.is_some())
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "User",
                key: user.username,
            });
        }

        let created = User {
            id: tables.next_id(),
            username: user.username,
            name: user.name,
            surname: user.surname,
            phone_number: user.phone_number,
            address: user.address,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "User",
                key: user.username.clone(),
            });
        }

        match tables.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(not_found("User", user.id)),
        }
    }

    async fn delete(&self, id: i32) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Err(not_found("User", id));
        }

        let owned: Vec<i32> = tables
            .orders
            .values()
            .filter(|o| o.user_id == id)
            .map(|o| o.id)
            .collect();
        for order_id in owned {
            tables.remove_order(order_id);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .rev()
            .map(|record| tables.order_with_items(record))
            .collect())
    }

    async fn list_for_user(&self, user_id: i32) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .rev()
            .filter(|record| record.user_id == user_id)
            .map(|record| tables.order_with_items(record))
            .collect())
    }

    async fn get(&self, id: i32) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .get(&id)
            .map(|record| tables.order_with_items(record)))
    }

    async fn create(&self, order: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&order.user_id) {
            return Err(not_found("User", order.user_id));
        }
        if let Some(missing) = order
            .items
            .iter()
            .find(|item| !tables.accessories.contains_key(&item.accessory_id))
        {
            return Err(not_found("Accessory", missing.accessory_id));
        }

        let record = OrderRecord {
            id: tables.next_id(),
            user_id: order.user_id,
            total_price: order.total_price,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            bicycle_color: order.bicycle_color,
        };
        tables.orders.insert(record.id, record.clone());

        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            let stored = OrderItem {
                id: tables.next_id(),
                accessory_id: item.accessory_id,
                quantity: item.quantity,
                order_id: Some(record.id),
            };
            tables.items.insert(stored.id, stored.clone());
            items.push(stored);
        }

        Ok(Order { record, items })
    }

    async fn update_status(&self, id: i32, status: OrderStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.orders.get_mut(&id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(not_found("Order", id)),
        }
    }

    async fn delete(&self, id: i32) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.remove_order(id) {
            Ok(())
        } else {
            Err(not_found("Order", id))
        }
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
