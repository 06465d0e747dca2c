//! Engine services and the collaborators they consume.
//!
//! Collaborators are traits so the host application can swap them out; the
//! Postgres and local-disk implementations here are the defaults.

pub mod cart;
pub mod directory;
pub mod files;
pub mod images;
pub mod notify;
pub mod orders;

use async_trait::async_trait;

use grocer_core::{Address, AddressId, Notification, NotificationKind, OrderId, User, UserId};

use crate::db::RepositoryError;

pub use cart::CartService;
pub use directory::{PgAddressLookup, PgUserDirectory};
pub use files::{FileStore, FileStoreError, LocalFileStore};
pub use images::ImageService;
pub use notify::PgNotificationSink;
pub use orders::{Checkout, OrderService};

/// Resolves delivery addresses.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    /// The address, only if `user_id` owns it.
    async fn get_owned(
        &self,
        address_id: AddressId,
        user_id: UserId,
    ) -> Result<Option<Address>, RepositoryError>;
}

/// Resolves users and admins.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn list_admins(&self) -> Result<Vec<User>, RepositoryError>;
}

/// Delivers in-app notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Record a notification for `user_id`. Within the dedup window a repeat
    /// of the same `(user, kind, order)` returns the earlier notification.
    async fn notify(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        message: &str,
        related_order_id: Option<OrderId>,
    ) -> Result<Notification, RepositoryError>;
}
