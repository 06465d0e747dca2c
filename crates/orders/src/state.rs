//! Engine state shared by every caller.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::OrdersConfig;
use crate::services::{
    AddressLookup, CartService, FileStore, ImageService, LocalFileStore, NotificationSink,
    OrderService, PgAddressLookup, PgNotificationSink, PgUserDirectory, UserDirectory,
};

/// The external collaborators the services consume.
#[derive(Clone)]
pub struct Collaborators {
    pub addresses: Arc<dyn AddressLookup>,
    pub users: Arc<dyn UserDirectory>,
    pub notifications: Arc<dyn NotificationSink>,
    pub files: Arc<dyn FileStore>,
}

impl Collaborators {
    /// Postgres lookups, the deduplicating Postgres sink and local file
    /// storage as configured.
    #[must_use]
    pub fn postgres(config: &OrdersConfig, pool: &PgPool) -> Self {
        Self {
            addresses: Arc::new(PgAddressLookup::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            notifications: Arc::new(PgNotificationSink::new(
                pool.clone(),
                config.notification_dedup,
            )),
            files: Arc::new(LocalFileStore::from_config(&config.upload)),
        }
    }
}

/// Engine state.
///
/// This struct is cheaply cloneable via `Arc` and hands out the services,
/// which share one connection pool.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: OrdersConfig,
    pool: PgPool,
    images: ImageService,
    carts: CartService,
    orders: OrderService,
}

impl AppState {
    /// Create the state with the default collaborators.
    #[must_use]
    pub fn new(config: OrdersConfig, pool: PgPool) -> Self {
        let collaborators = Collaborators::postgres(&config, &pool);
        Self::with_collaborators(config, pool, collaborators)
    }

    /// Create the state with caller-provided collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: OrdersConfig,
        pool: PgPool,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            addresses,
            users,
            notifications,
            files,
        } = collaborators;

        let images = ImageService::new(pool.clone(), Arc::clone(&files), config.upload.max_bytes);
        let carts = CartService::new(pool.clone(), files);
        let orders = OrderService::new(
            pool.clone(),
            addresses,
            users,
            notifications,
            config.order_number_prefix.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                images,
                carts,
                orders,
            }),
        }
    }

    /// Get a reference to the engine configuration.
    #[must_use]
    pub fn config(&self) -> &OrdersConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn images(&self) -> &ImageService {
        &self.inner.images
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }
}
