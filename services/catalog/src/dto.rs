//! Wire shapes of the JSON API and their conversions to and from entities.
//!
//! Field names follow the public API (`descripcion`, `rutaImagen`, ...).
//! Every conversion is written out field by field.

use crate::error::{ApiError, ApiResult};
use crate::models::{
    Accessory, NewAccessory, NewOrderItem, NewUser, Order, OrderItem, OrderStatus, Role, User,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =========================
// Accessories
// =========================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryDto {
    pub id: i32,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "costo")]
    pub cost: f64,
    #[serde(rename = "precio")]
    pub price: f64,
    #[serde(rename = "rutaImagen")]
    pub image_path: Option<String>,
    #[serde(rename = "fechaCreacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fechaActualizacion")]
    pub updated_at: DateTime<Utc>,
}

impl From<Accessory> for AccessoryDto {
    fn from(a: Accessory) -> Self {
        Self {
            id: a.id,
            name: a.name,
            description: a.description,
            cost: a.cost,
            price: a.price,
            image_path: a.image_path,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessoryCreate {
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(rename = "descripcion", alias = "description")]
    pub description: String,
    #[serde(rename = "costo", default)]
    pub cost: f64,
    #[serde(rename = "precio", default)]
    pub price: f64,
    #[serde(rename = "rutaImagen", default)]
    pub image_path: Option<String>,
}

impl AccessoryCreate {
    pub fn into_new(self) -> ApiResult<NewAccessory> {
        if self.description.trim().is_empty() {
            return Err(ApiError::Validation(
                "Accessory description is required".to_string(),
            ));
        }

        Ok(NewAccessory {
            name: self.name,
            description: self.description,
            cost: self.cost,
            price: self.price,
            image_path: self.image_path.filter(|path| !path.is_empty()),
        })
    }
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Deserialize)]
pub struct AccessoryUpdate {
    pub id: i32,
    #[serde(rename = "nombre", default)]
    pub name: Option<String>,
    #[serde(rename = "descripcion", alias = "description", default)]
    pub description: Option<String>,
    #[serde(rename = "costo", default)]
    pub cost: Option<f64>,
    #[serde(rename = "precio", default)]
    pub price: Option<f64>,
    #[serde(rename = "rutaImagen", default)]
    pub image_path: Option<String>,
}

impl AccessoryUpdate {
    /// Overwrite `accessory` with the fields present in the update
    pub fn apply(self, accessory: &mut Accessory, now: DateTime<Utc>) -> ApiResult<()> {
        if let Some(name) = self.name {
            accessory.name = name;
        }
        if let Some(description) = self.description {
            if description.trim().is_empty() {
                return Err(ApiError::Validation(
                    "Accessory description cannot be empty".to_string(),
                ));
            }
            accessory.description = description;
        }
        if let Some(cost) = self.cost {
            accessory.cost = cost;
        }
        if let Some(price) = self.price {
            accessory.price = price;
        }
        if let Some(image_path) = self.image_path.filter(|path| !path.is_empty()) {
            accessory.image_path = Some(image_path);
        }
        accessory.updated_at = now;
        Ok(())
    }
}

// =========================
// Users
// =========================

/// User as returned by the API; never carries the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i32,
    #[serde(rename = "nombreUsuario")]
    pub username: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "apellido")]
    pub surname: String,
    #[serde(rename = "numeroCelular")]
    pub phone_number: String,
    #[serde(rename = "direccion")]
    pub address: String,
    pub email: String,
    #[serde(rename = "rol")]
    pub role: Role,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            name: u.name,
            surname: u.surname,
            phone_number: u.phone_number,
            address: u.address,
            email: u.email,
            role: u.role,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "nombreUsuario")]
    pub username: String,
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(rename = "apellido", default)]
    pub surname: String,
    #[serde(rename = "numeroCelular", default)]
    pub phone_number: String,
    #[serde(rename = "direccion", default)]
    pub address: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.username.trim().is_empty() {
            return Err(ApiError::Validation("Username is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(ApiError::Validation("Password is required".to_string()));
        }
        Ok(())
    }

    /// Build the stored user; registration never grants admin
    pub fn into_new(self, password_hash: String) -> NewUser {
        NewUser {
            username: self.username.trim().to_string(),
            name: self.name,
            surname: self.surname,
            phone_number: self.phone_number,
            address: self.address,
            email: self.email,
            password_hash,
            role: Role::Customer,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "nombreUsuario")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "usuario")]
    pub user: UserDto,
}

/// Partial user update
#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdate {
    pub id: i32,
    #[serde(rename = "nombre", default)]
    pub name: Option<String>,
    #[serde(rename = "apellido", default)]
    pub surname: Option<String>,
    #[serde(rename = "numeroCelular", default)]
    pub phone_number: Option<String>,
    #[serde(rename = "direccion", default)]
    pub address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "rol", default)]
    pub role: Option<Role>,
}

impl UserUpdate {
    /// Overwrite profile fields; the password and role are handled by the caller
    pub fn apply_profile(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(surname) = &self.surname {
            user.surname = surname.clone();
        }
        if let Some(phone_number) = &self.phone_number {
            user.phone_number = phone_number.clone();
        }
        if let Some(address) = &self.address {
            user.address = address.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
    }
}

// =========================
// Orders
// =========================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemDto {
    pub id: i32,
    #[serde(rename = "accesorioId")]
    pub accessory_id: i32,
    #[serde(rename = "cantidad")]
    pub quantity: i32,
    #[serde(rename = "pedidoId")]
    pub order_id: Option<i32>,
}

impl From<OrderItem> for OrderItemDto {
    fn from(i: OrderItem) -> Self {
        Self {
            id: i.id,
            accessory_id: i.accessory_id,
            quantity: i.quantity,
            order_id: i.order_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDto {
    pub id: i32,
    #[serde(rename = "usuarioId")]
    pub user_id: i32,
    #[serde(rename = "precioTotal")]
    pub total_price: f64,
    #[serde(rename = "estado")]
    pub status: OrderStatus,
    #[serde(rename = "fechaCreacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "colorBicicleta")]
    pub bicycle_color: String,
    pub items: Vec<OrderItemDto>,
}

impl From<Order> for OrderDto {
    fn from(o: Order) -> Self {
        Self {
            id: o.record.id,
            user_id: o.record.user_id,
            total_price: o.record.total_price,
            status: o.record.status,
            created_at: o.record.created_at,
            bicycle_color: o.record.bicycle_color,
            items: o.items.into_iter().map(OrderItemDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemCreate {
    #[serde(rename = "accesorioId")]
    pub accessory_id: i32,
    #[serde(rename = "cantidad")]
    pub quantity: i32,
}

impl From<&OrderItemCreate> for NewOrderItem {
    fn from(i: &OrderItemCreate) -> Self {
        Self {
            accessory_id: i.accessory_id,
            quantity: i.quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreate {
    #[serde(rename = "colorBicicleta", default)]
    pub bicycle_color: String,
    pub items: Vec<OrderItemCreate>,
}

impl OrderCreate {
    pub fn validate(&self) -> ApiResult<()> {
        if self.items.is_empty() {
            return Err(ApiError::Validation(
                "An order needs at least one item".to_string(),
            ));
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity <= 0) {
            return Err(ApiError::Validation(format!(
                "Quantity for accessory {} must be positive",
                item.accessory_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusUpdate {
    #[serde(rename = "estado")]
    pub status: OrderStatus,
}
