//! Catalog Service
//!
//! Backend for the bicycle shop: accessory catalog, customer accounts,
//! orders and publishing of 3D bicycle models to S3-compatible storage.
//!
//! ## Features
//!
//! - **Accessory catalog**: CRUD with descriptions kept unique by the
//!   database, partial updates and `Location` headers on create
//! - **Accounts**: registration with Argon2id password hashes, HS256 bearer
//!   tokens and admin/customer roles checked by extractors
//! - **Orders**: items priced server-side and stored in one transaction
//! - **Model uploads**: sanitized object keys, case-insensitive collision
//!   checks and conditional puts so a model is never overwritten
//!
//! ## Architecture
//!
//! ```text
//!   HTTP clients
//!        │
//!        ▼
//! ┌──────────────┐  AuthUser / AdminUser  ┌──────────────┐
//! │ axum router  │───────────────────────▶│ JWT keys     │
//! └──────────────┘                        └──────────────┘
//!        │                     │
//!        ▼                     ▼
//! ┌──────────────┐      ┌──────────────┐
//! │ Repositories │      │ Upload guard │
//! │ (traits)     │      │ lease + list │
//! └──────────────┘      └──────────────┘
//!    │        │                │
//!    ▼        ▼                ▼
//! ┌───────┐ ┌────────┐  ┌──────────────┐
//! │PgStore│ │Memory  │  │ S3 bucket    │
//! │       │ │Store   │  │ If-None-Match│
//! └───────┘ └────────┘  └──────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod memory_store;
pub mod models;
pub mod object_store;
pub mod pg_store;
pub mod repository;
pub mod s3_store;
pub mod upload_guard;

pub use api::{create_router, start_api_server, AppState};
pub use auth::{AdminUser, AuthUser, JwtKeys};
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use memory_store::MemoryStore;
pub use object_store::{MemoryObjectStore, ObjectStore, PutOutcome};
pub use pg_store::PgStore;
pub use repository::{AccessoryRepository, OrderRepository, RepositoryError, UserRepository};
pub use s3_store::S3ObjectStore;
pub use upload_guard::{UploadGuard, UploadResponse};
