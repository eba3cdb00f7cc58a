use anyhow::{bail, Context, Result};
use catalog_service::auth::{hash_password, JwtKeys};
use catalog_service::config::{AuthConfig, Config, StorageBackend};
use catalog_service::models::{NewUser, Role};
use catalog_service::repository::{
    AccessoryRepository, HealthCheck, OrderRepository, UserRepository,
};
use catalog_service::{start_api_server, AppState, MemoryStore, PgStore, S3ObjectStore, UploadGuard};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Catalog Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    if config.auth.jwt_secret.trim().is_empty() {
        bail!("auth.jwt_secret must be set");
    }
    let jwt = Arc::new(JwtKeys::new(&config.auth.jwt_secret, config.token_ttl()));

    let object_store = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize S3 client")?,
    );
    if config.s3.bucket.is_none() {
        warn!("No bucket configured, uploads will fail");
    }
    let uploads = Arc::new(UploadGuard::new(
        object_store,
        config.s3.bucket.clone(),
        config.s3.endpoint.clone(),
    ));

    let state = match config.database.backend {
        StorageBackend::Postgres => {
            let store = Arc::new(
                PgStore::new(&config.database)
                    .await
                    .context("Failed to initialize database")?,
            );

            // Run migrations if enabled
            if config.database.run_migrations {
                store
                    .run_migrations()
                    .await
                    .context("Failed to run database migrations")?;
            }

            app_state(store, uploads, jwt)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on exit");
            app_state(Arc::new(MemoryStore::new()), uploads, jwt)
        }
    };

    ensure_admin(state.users.as_ref(), &config.auth)
        .await
        .context("Failed to create admin account")?;

    info!("Catalog service started successfully");

    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("Catalog service stopped");

    Ok(())
}

fn app_state<S>(store: Arc<S>, uploads: Arc<UploadGuard>, jwt: Arc<JwtKeys>) -> AppState
where
    S: AccessoryRepository + UserRepository + OrderRepository + HealthCheck + 'static,
{
    AppState {
        accessories: store.clone(),
        users: store.clone(),
        orders: store.clone(),
        health: store,
        uploads,
        jwt,
    }
}

/// Create the configured admin account unless the username is taken
async fn ensure_admin(users: &dyn UserRepository, auth: &AuthConfig) -> Result<()> {
    let (Some(username), Some(password)) = (&auth.admin_username, &auth.admin_password) else {
        return Ok(());
    };

    if users.exists(username).await? {
        info!(username = %username, "Admin account already present");
        return Ok(());
    }

    let admin = users
        .create(NewUser {
            username: username.clone(),
            name: username.clone(),
            surname: String::new(),
            phone_number: String::new(),
            address: String::new(),
            email: String::new(),
            password_hash: hash_password(password)?,
            role: Role::Admin,
        })
        .await?;

    info!(id = admin.id, username = %admin.username, "Admin account created");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Shutting down catalog service");
}
