use crate::config::DatabaseConfig;
use crate::models::{
    Accessory, NewAccessory, NewOrder, NewUser, Order, OrderItem, OrderRecord, OrderStatus, User,
};
use crate::repository::{
    AccessoryRepository, HealthCheck, OrderRepository, RepositoryError, Result, UserRepository,
};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

const ACCESSORY_COLUMNS: &str =
    "id, name, description, cost, price, image_path, created_at, updated_at";
const USER_COLUMNS: &str =
    "id, username, name, surname, phone_number, address, email, password_hash, role";
const ORDER_COLUMNS: &str = "id, user_id, total_price, status, created_at, bicycle_color";

/// PostgreSQL-backed repositories sharing one connection pool
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store with connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(database_error)
    }

    /// Attach items to their order headers
    async fn load_items(&self, records: Vec<OrderRecord>) -> Result<Vec<Order>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = records.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, accessory_id, quantity, order_id
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        let mut by_order: HashMap<i32, Vec<OrderItem>> = HashMap::new();
        for item in items {
            if let Some(order_id) = item.order_id {
                by_order.entry(order_id).or_default().push(item);
            }
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let items = by_order.remove(&record.id).unwrap_or_default();
                Order { record, items }
            })
            .collect())
    }
}

/// Map a driver error, singling out unique-constraint violations
fn write_error<'a>(
    entity_type: &'static str,
    key: &'a str,
) -> impl FnOnce(sqlx::Error) -> RepositoryError + 'a {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::AlreadyExists {
            entity_type,
            key: key.to_string(),
        },
        _ => database_error(err),
    }
}

/// Map a driver error, reporting a dangling foreign key as the missing row
fn reference_error(
    entity_type: &'static str,
    id: i32,
) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => not_found(entity_type, id),
        _ => database_error(err),
    }
}

fn database_error(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(err.to_string())
}

fn not_found(entity_type: &'static str, id: i32) -> RepositoryError {
    RepositoryError::NotFound {
        entity_type,
        key: id.to_string(),
    }
}

#[async_trait]
impl AccessoryRepository for PgStore {
    async fn list(&self) -> Result<Vec<Accessory>> {
        sqlx::query_as::<_, Accessory>(&format!(
            "SELECT {ACCESSORY_COLUMNS} FROM accessories ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)
    }

    async fn get(&self, id: i32) -> Result<Option<Accessory>> {
        sqlx::query_as::<_, Accessory>(&format!(
            "SELECT {ACCESSORY_COLUMNS} FROM accessories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)
    }

    async fn exists(&self, description: &str) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM accessories WHERE description = $1)")
                .bind(description)
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;

        Ok(exists)
    }

    #[instrument(skip(self, accessory), fields(description = %accessory.description))]
    async fn create(&self, accessory: NewAccessory) -> Result<Accessory> {
        let created = sqlx::query_as::<_, Accessory>(&format!(
            r#"
            INSERT INTO accessories (name, description, cost, price, image_path, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {ACCESSORY_COLUMNS}
            "#
        ))
        .bind(&accessory.name)
        .bind(&accessory.description)
        .bind(accessory.cost)
        .bind(accessory.price)
        .bind(&accessory.image_path)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("Accessory", &accessory.description))?;

        debug!(accessory_id = created.id, "Accessory inserted");
        Ok(created)
    }

    #[instrument(skip(self, accessory), fields(accessory_id = accessory.id))]
    async fn update(&self, accessory: &Accessory) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE accessories
            SET name = $2, description = $3, cost = $4, price = $5,
                image_path = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(accessory.id)
        .bind(&accessory.name)
        .bind(&accessory.description)
        .bind(accessory.cost)
        .bind(accessory.price)
        .bind(&accessory.image_path)
        .bind(accessory.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error("Accessory", &accessory.description))?;

        if result.rows_affected() == 0 {
            return Err(not_found("Accessory", accessory.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i32) -> Result<()> {
        let result = sqlx::query("DELETE FROM accessories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(not_found("Accessory", id));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn list(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)
    }

    async fn get(&self, id: i32) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)
    }

    async fn exists(&self, username: &str) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;

        Ok(exists)
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create(&self, user: NewUser) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, name, surname, phone_number, address, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.phone_number)
        .bind(&user.address)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(i32::from(user.role))
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("User", &user.username))
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn update(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = $2, name = $3, surname = $4, phone_number = $5,
                address = $6, email = $7, password_hash = $8, role = $9
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.phone_number)
        .bind(&user.address)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(i32::from(user.role))
        .execute(&self.pool)
        .await
        .map_err(write_error("User", &user.username))?;

        if result.rows_affected() == 0 {
            return Err(not_found("User", user.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i32) -> Result<()> {
        let mut tx = self.begin().await?;

        // Items only reference their order without cascade
        sqlx::query(
            "DELETE FROM order_items WHERE order_id IN (SELECT id FROM orders WHERE user_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(not_found("User", id));
        }

        tx.commit().await.map_err(database_error)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn list(&self) -> Result<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        self.load_items(records).await
    }

    async fn list_for_user(&self, user_id: i32) -> Result<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        self.load_items(records).await
    }

    async fn get(&self, id: i32) -> Result<Option<Order>> {
        let record = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        match record {
            Some(record) => Ok(self.load_items(vec![record]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, order), fields(user_id = order.user_id, item_count = order.items.len()))]
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.begin().await?;

        let record = sqlx::query_as::<_, OrderRecord>(&format!(
            r#"
            INSERT INTO orders (user_id, total_price, status, created_at, bicycle_color)
            VALUES ($1, $2, $3, NOW(), $4)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id)
        .bind(order.total_price)
        .bind(i32::from(OrderStatus::Pending))
        .bind(&order.bicycle_color)
        .fetch_one(&mut *tx)
        .await
        .map_err(reference_error("User", order.user_id))?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let inserted = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (accessory_id, quantity, order_id)
                VALUES ($1, $2, $3)
                RETURNING id, accessory_id, quantity, order_id
                "#,
            )
            .bind(item.accessory_id)
            .bind(item.quantity)
            .bind(record.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(reference_error("Accessory", item.accessory_id))?;

            items.push(inserted);
        }

        tx.commit().await.map_err(database_error)?;

        debug!(order_id = record.id, "Order inserted");
        Ok(Order { record, items })
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: i32, status: OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(i32::from(status))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(not_found("Order", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i32) -> Result<()> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;

        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(not_found("Order", id));
        }

        tx.commit().await.map_err(database_error)
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_passes_through_other_failures() {
        let key = format!("Casco {}", 'X');
        let err = write_error("Accessory", &key)(sqlx::Error::RowNotFound);
        drop(key);

        assert!(matches!(err, RepositoryError::Database(_)));
        assert!(err.to_string().starts_with("Database error:"));
    }

    #[test]
    fn test_reference_error_passes_through_other_failures() {
        let err = reference_error("User", 7)(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, RepositoryError::Database(_)));

        assert_eq!(
            not_found("Order", 3).to_string(),
            "Order not found: 3"
        );
    }
}
