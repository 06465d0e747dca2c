//! Shopping cart operations.

use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, instrument, warn};

use grocer_core::cart::{non_blank_owned, resolve_for_add, resolve_replacement};
use grocer_core::{
    Cart, CartId, CartItem, CartItemDraft, CartItemId, ImageOwner, ImageOwnerKind, OrderId, OrderItem,
    ResolvedItem, UserId,
};

use super::FileStore;
use super::images::{ImageHolder, copy_in_savepoint, hydrate, ingest_in_savepoint, release_files};
use crate::db::{self, RepositoryError};
use crate::error::{Result, ServiceError};

/// Cart operations for a single user's active cart.
///
/// Deleting items also deletes image files no other record references.
#[derive(Clone)]
pub struct CartService {
    pool: PgPool,
    files: Arc<dyn FileStore>,
}

impl CartService {
    #[must_use]
    pub fn new(pool: PgPool, files: Arc<dyn FileStore>) -> Self {
        Self { pool, files }
    }

    /// Add an item, creating the active cart on first use.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank product name or quantity, or when no
    /// store is given and none can be inherited.
    #[instrument(skip(self, draft), fields(user_id = %user_id, product = %draft.product_name))]
    pub async fn add_item(&self, user_id: UserId, draft: CartItemDraft) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;
        let cart = db::carts::get_or_create_active(&mut *tx, user_id).await?;
        let stores = db::carts::item_stores_newest_first(&mut *tx, cart.id).await?;
        let resolved = resolve_for_add(
            &draft,
            stores.iter().map(Option::as_deref),
            cart.store.as_deref(),
        )?;

        let item = insert_with_images(&mut *tx, cart.id, &resolved).await?;
        tx.commit().await?;

        info!(cart_id = %cart.id, item_id = %item.id, store = %resolved.store, "Cart item added");
        Ok(item)
    }

    /// Replace every item of the active cart.
    ///
    /// `cart_store`, when given, also becomes the cart's default store. Items
    /// are validated before anything is written.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first invalid item.
    #[instrument(skip(self, drafts), fields(user_id = %user_id, items = drafts.len()))]
    pub async fn replace_all(
        &self,
        user_id: UserId,
        drafts: Vec<CartItemDraft>,
        cart_store: Option<String>,
    ) -> Result<Cart> {
        let cart_store = non_blank_owned(cart_store);

        let mut tx = self.pool.begin().await?;
        let mut cart = db::carts::get_or_create_active(&mut *tx, user_id).await?;
        let fallback = cart_store.as_deref().or(cart.store.as_deref());
        let resolved = resolve_replacement(&drafts, fallback)?;

        let replaced_urls = db::images::cart_urls(&mut *tx, cart.id, None).await?;
        db::carts::delete_items(&mut *tx, cart.id).await?;
        if cart_store.is_some() {
            db::carts::set_store(&mut *tx, cart.id, cart_store.as_deref()).await?;
            cart.store = cart_store;
        }

        let mut items = Vec::with_capacity(resolved.len());
        for item in &resolved {
            items.push(insert_with_images(&mut *tx, cart.id, item).await?);
        }
        tx.commit().await?;

        info!(cart_id = %cart.id, items = items.len(), "Cart replaced");
        self.release(&replaced_urls).await;
        cart.items = items;
        Ok(cart)
    }

    /// Delete every item. The cart stays active. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the delete fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear(&self, user_id: UserId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let Some(cart) = db::carts::lock_active(&mut *tx, user_id).await? else {
            return Ok(0);
        };
        let urls = db::images::cart_urls(&mut *tx, cart.id, None).await?;
        let removed = db::carts::delete_items(&mut *tx, cart.id).await?;
        tx.commit().await?;

        info!(cart_id = %cart.id, removed, "Cart cleared");
        self.release(&urls).await;
        Ok(removed)
    }

    /// Delete one item of the active cart.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the item is not in the user's active cart.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let cart = db::carts::lock_active(&mut *tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("cart item {item_id}")))?;
        let urls = db::images::cart_urls(&mut *tx, cart.id, Some(item_id)).await?;
        if !db::carts::delete_item(&mut *tx, cart.id, item_id).await? {
            return Err(ServiceError::not_found(format!("cart item {item_id}")));
        }
        tx.commit().await?;

        debug!(cart_id = %cart.id, "Cart item removed");
        self.release(&urls).await;
        Ok(())
    }

    async fn release(&self, urls: &[String]) {
        release_files(&self.pool, self.files.as_ref(), urls.iter().map(String::as_str)).await;
    }

    /// Set the cart's default store, creating the cart if needed.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the update fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn set_store(&self, user_id: UserId, store: Option<String>) -> Result<Cart> {
        let store = non_blank_owned(store);

        let mut tx = self.pool.begin().await?;
        let mut cart = db::carts::get_or_create_active(&mut *tx, user_id).await?;
        db::carts::set_store(&mut *tx, cart.id, store.as_deref()).await?;
        tx.commit().await?;

        cart.store = store;
        Ok(cart)
    }

    /// The user's active cart with items and their images.
    ///
    /// # Errors
    ///
    /// Returns `Database` if a query fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_active(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        let Some(mut cart) = db::carts::get_active(&mut conn, user_id).await? else {
            return Ok(None);
        };
        cart.items = db::carts::items(&mut conn, cart.id).await?;
        hydrate(&mut conn, ImageOwnerKind::CartItem, &mut cart.items).await?;
        Ok(Some(cart))
    }
}

/// Insert a resolved item and ingest its transport string.
async fn insert_with_images(
    conn: &mut PgConnection,
    cart_id: CartId,
    resolved: &ResolvedItem,
) -> std::result::Result<CartItem, RepositoryError> {
    let mut item = db::carts::insert_item(&mut *conn, cart_id, resolved).await?;
    let images = match resolved.image_url.as_deref() {
        Some(encoded) => ingest_in_savepoint(&mut *conn, item.owner(), encoded)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, item_id = %item.id, "Cart item image ingestion failed");
                Vec::new()
            }),
        None => Vec::new(),
    };
    item.attach(images);
    Ok(item)
}

/// Insert an order item and give it images: copied from `source` when that
/// cart item has records, else ingested from the item's transport string.
///
/// Image failures are logged and leave the item without images.
pub(crate) async fn insert_order_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &ResolvedItem,
    source: Option<CartItemId>,
) -> std::result::Result<OrderItem, RepositoryError> {
    let mut order_item = db::orders::insert_item(&mut *conn, order_id, item).await?;
    let to = order_item.owner();

    let mut images = match source {
        Some(cart_item_id) => {
            copy_in_savepoint(&mut *conn, ImageOwner::CartItem(cart_item_id), to).await
        }
        None => Vec::new(),
    };
    if images.is_empty()
        && let Some(encoded) = item.image_url.as_deref()
    {
        images = ingest_in_savepoint(&mut *conn, to, encoded)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, owner = %to, "Order item image ingestion failed");
                Vec::new()
            });
    }

    order_item.attach(images);
    Ok(order_item)
}

/// Turn a locked cart's items into order items and retire the cart.
///
/// `resolved` holds the cart's items in the same order as `cart.items`, with
/// stores resolved for the order. Image records are copied, so the order
/// items share the cart items' urls.
pub(crate) async fn promote_to_order(
    conn: &mut PgConnection,
    cart: &Cart,
    order_id: OrderId,
    resolved: &[ResolvedItem],
) -> std::result::Result<Vec<OrderItem>, RepositoryError> {
    let mut order_items = Vec::with_capacity(resolved.len());
    for (cart_item, item) in cart.items.iter().zip(resolved) {
        order_items.push(insert_order_item(&mut *conn, order_id, item, Some(cart_item.id)).await?);
    }

    db::carts::delete_items(&mut *conn, cart.id).await?;
    db::carts::deactivate(&mut *conn, cart.id).await?;

    debug!(cart_id = %cart.id, order_id = %order_id, items = order_items.len(), "Cart promoted");
    Ok(order_items)
}
