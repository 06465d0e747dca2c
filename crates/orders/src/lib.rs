//! Grocer Orders - the order lifecycle and item image engine.
//!
//! This crate wires the pure rules of `grocer-core` to `PostgreSQL`:
//! - [`services::CartService`] - the active cart and its items
//! - [`services::OrderService`] - checkout, lifecycle transitions and reads
//! - [`services::ImageService`] - uploads and edits of item images
//!
//! Every multi-step mutation runs in one transaction. Notifications are sent
//! after commit and never undo the change that caused them.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = OrdersConfig::from_env()?;
//! let pool = db::create_pool(&config.database_url, config.max_connections).await?;
//! let state = AppState::new(config, pool);
//!
//! let cart = state.carts().add_item(user_id, CartItemDraft::new("Milk", "1")).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod state;

pub use config::{ConfigError, LogFormat, OrdersConfig, UploadConfig};
pub use error::{ErrorBody, ErrorKind, Result, ServiceError};
pub use services::{CartService, Checkout, ImageService, OrderService};
pub use state::{AppState, Collaborators};
