//! Order creation, lifecycle transitions and reads.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use grocer_core::cart::{non_blank_owned, resolve_checkout};
use grocer_core::{
    Actor, AddressId, AddressSnapshot, CartItem, CartItemDraft, DeliveryWindow, ImageOwnerKind,
    NotificationIntent, NotificationKind, Order, OrderEvent, OrderId, OrderItem, OrderNumber,
    OrderStatus, Recipient, Transition, UserId, ValidationError, evaluate,
};

use super::cart::{insert_order_item, promote_to_order};
use super::images::hydrate;
use super::notify::deliver;
use super::{AddressLookup, NotificationSink, UserDirectory};
use crate::db::orders::NewOrder;
use crate::db::{self, RepositoryError};
use crate::error::{Result, ServiceError};

/// Attempts at creating an order before an order number collision is
/// reported as `Conflict`.
const CREATE_ATTEMPTS: u32 = 2;

/// A customer's checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    pub address_id: AddressId,
    pub desired_date: NaiveDate,
    pub desired_slot: String,
    /// Order-level store for items that name none.
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    /// Items to order. The active cart is used when absent.
    #[serde(default)]
    pub items: Option<Vec<CartItemDraft>>,
}

/// Creates orders and drives their lifecycle.
#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
    addresses: Arc<dyn AddressLookup>,
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationSink>,
    prefix: String,
}

impl OrderService {
    #[must_use]
    pub fn new(
        pool: PgPool,
        addresses: Arc<dyn AddressLookup>,
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationSink>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            addresses,
            users,
            notifications,
            prefix: prefix.into(),
        }
    }

    /// Resolve a user id to the actor it acts as.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown user.
    pub async fn actor_for(&self, user_id: UserId) -> Result<Actor> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("user {user_id}")))?;
        Ok(if user.is_admin {
            Actor::Admin(user.id)
        } else {
            Actor::Customer(user.id)
        })
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create an order from the active cart or from explicit items.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before anything is written when the slot is blank,
    /// there are no items, or an item has no store. Returns `NotFound` for an
    /// address the user does not own, and `Conflict` when order number
    /// allocation collides twice.
    #[instrument(skip(self, checkout), fields(user_id = %user_id, address_id = %checkout.address_id))]
    pub async fn create(&self, user_id: UserId, checkout: Checkout) -> Result<Order> {
        let slot = non_blank_owned(Some(checkout.desired_slot.clone()))
            .ok_or(ValidationError::EmptyTimeSlot)?;
        if let Some(drafts) = &checkout.items {
            resolve_checkout(drafts, checkout.store.as_deref())?;
        }

        let address = self
            .addresses
            .get_owned(checkout.address_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("address {}", checkout.address_id)))?;
        let snapshot = address.snapshot();

        let mut attempt = 1;
        let order = loop {
            match self.try_create(user_id, &checkout, &slot, &snapshot).await {
                Err(ServiceError::Conflict(message)) if attempt < CREATE_ATTEMPTS => {
                    warn!(attempt, message = %message, "Order number collision, retrying");
                    attempt += 1;
                }
                result => break result?,
            }
        };

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = order.items.len(),
            "Order created"
        );

        deliver(
            self.notifications.as_ref(),
            self.users.as_ref(),
            NotificationIntent {
                recipient: Recipient::Admins,
                kind: NotificationKind::NewOrder,
                message: format!("New order {} was placed", order.order_number),
                related_order_id: order.id,
            },
        )
        .await;

        Ok(order)
    }

    async fn try_create(
        &self,
        user_id: UserId,
        checkout: &Checkout,
        slot: &str,
        address: &AddressSnapshot,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let (cart, drafts) = match &checkout.items {
            Some(drafts) => (None, drafts.clone()),
            None => {
                let Some(mut cart) = db::carts::lock_active(&mut *tx, user_id).await? else {
                    return Err(ValidationError::NoItems.into());
                };
                cart.items = db::carts::items(&mut *tx, cart.id).await?;
                let drafts = cart.items.iter().map(CartItem::to_draft).collect();
                (Some(cart), drafts)
            }
        };

        let order_store = non_blank_owned(checkout.store.clone())
            .or_else(|| cart.as_ref().and_then(|cart| non_blank_owned(cart.store.clone())));
        let resolved = resolve_checkout(&drafts, order_store.as_deref())?;
        let instructions = non_blank_owned(checkout.instructions.clone());

        let number = db::order_numbers::next(&mut *tx, &self.prefix, Utc::now().year()).await?;
        let mut order = db::orders::insert(
            &mut *tx,
            NewOrder {
                user_id,
                order_number: &number,
                address_id: checkout.address_id,
                address,
                desired_delivery_date: checkout.desired_date,
                desired_time_slot: slot,
                store: order_store.as_deref(),
                additional_instructions: instructions.as_deref(),
            },
        )
        .await?;

        order.items = match &cart {
            Some(cart) => promote_to_order(&mut *tx, cart, order.id, &resolved).await?,
            None => {
                let mut items = Vec::with_capacity(resolved.len());
                for item in &resolved {
                    items.push(insert_order_item(&mut *tx, order.id, item, None).await?);
                }
                items
            }
        };

        tx.commit().await?;
        Ok(order)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Apply a lifecycle event to an order.
    ///
    /// The order row is locked for the evaluation. The resulting notification
    /// is sent after commit; its failure does not undo the transition.
    ///
    /// # Errors
    ///
    /// Returns the rejection of the state machine mapped to a
    /// [`ServiceError`], or `NotFound` for an unknown order.
    #[instrument(skip(self, event), fields(order_id = %order_id, event = %event.kind()))]
    pub async fn transition(
        &self,
        actor: Actor,
        order_id: OrderId,
        event: OrderEvent,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = match db::orders::lock(&mut *tx, order_id).await {
            Err(RepositoryError::NotFound) => {
                return Err(ServiceError::not_found(format!("order {order_id}")));
            }
            result => result?,
        };

        let now = Utc::now();
        let Transition { patch, notify } = evaluate(&order, actor, &event, now)?;
        let previous = order.status;
        order.apply(patch, now);
        db::orders::update_state(&mut *tx, &order).await?;
        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            from = %previous,
            to = %order.status,
            locked = order.is_locked,
            deleted = order.is_deleted,
            "Order transition applied"
        );

        if let Some(intent) = notify {
            deliver(self.notifications.as_ref(), self.users.as_ref(), intent).await;
        }

        let mut conn = self.pool.acquire().await?;
        let mut orders = with_items(&mut conn, vec![order]).await?;
        orders
            .pop()
            .ok_or_else(|| ServiceError::Internal(format!("order {order_id} vanished")))
    }

    /// Overwrite the desired delivery date and/or slot.
    ///
    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn edit_delivery(
        &self,
        actor: Actor,
        order_id: OrderId,
        date: Option<NaiveDate>,
        slot: Option<String>,
    ) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::EditDelivery { date, slot })
            .await
    }

    /// Point the order at another address of its owner, taking a fresh
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the address does not belong to the order's
    /// owner. See also [`OrderService::transition`].
    pub async fn change_address(
        &self,
        actor: Actor,
        order_id: OrderId,
        address_id: AddressId,
    ) -> Result<Order> {
        let owner = {
            let mut conn = self.pool.acquire().await?;
            db::orders::get(&mut conn, order_id)
                .await?
                .filter(|order| actor.is_admin() || !order.is_deleted)
                .ok_or_else(|| ServiceError::not_found(format!("order {order_id}")))?
                .user_id
        };
        let address = self
            .addresses
            .get_owned(address_id, owner)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("address {address_id}")))?;

        self.transition(
            actor,
            order_id,
            OrderEvent::ChangeAddress {
                address_id,
                snapshot: address.snapshot(),
            },
        )
        .await
    }

    /// Replace the additional instructions. Blank clears them.
    ///
    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn update_instructions(
        &self,
        actor: Actor,
        order_id: OrderId,
        text: Option<String>,
    ) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::UpdateInstructions(text))
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn set_status(
        &self,
        actor: Actor,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::SetStatus(status))
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn suggest_date(
        &self,
        actor: Actor,
        order_id: OrderId,
        window: DeliveryWindow,
    ) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::SuggestDate(window))
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn accept_suggestion(&self, actor: Actor, order_id: OrderId) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::AcceptSuggestion)
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn propose_date(
        &self,
        actor: Actor,
        order_id: OrderId,
        window: DeliveryWindow,
    ) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::ProposeDate(window))
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn accept_desired(&self, actor: Actor, order_id: OrderId) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::AcceptDesired)
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn force_date(
        &self,
        actor: Actor,
        order_id: OrderId,
        window: DeliveryWindow,
    ) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::ForceDate(window))
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn cancel(&self, actor: Actor, order_id: OrderId) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::Cancel).await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn soft_delete(&self, actor: Actor, order_id: OrderId) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::SoftDelete)
            .await
    }

    /// # Errors
    ///
    /// See [`OrderService::transition`].
    pub async fn restore(&self, actor: Actor, order_id: OrderId) -> Result<Order> {
        self.transition(actor, order_id, OrderEvent::Restore).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist or a customer does not
    /// own it or it is deleted.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get(&self, actor: Actor, order_id: OrderId) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        let order = db::orders::get(&mut conn, order_id).await?;
        let order = visible(order, actor)
            .ok_or_else(|| ServiceError::not_found(format!("order {order_id}")))?;
        single(with_items(&mut conn, vec![order]).await?, order_id)
    }

    /// Get an order by its number.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed number and otherwise behaves like
    /// [`OrderService::get`].
    #[instrument(skip(self))]
    pub async fn get_by_number(&self, actor: Actor, number: &str) -> Result<Order> {
        let number =
            OrderNumber::parse(number).map_err(|e| ServiceError::Validation(e.to_string()))?;

        let mut conn = self.pool.acquire().await?;
        let order = db::orders::get_by_number(&mut conn, &number).await?;
        let order = visible(order, actor)
            .ok_or_else(|| ServiceError::not_found(format!("order {number}")))?;
        let order_id = order.id;
        single(with_items(&mut conn, vec![order]).await?, order_id)
    }

    /// A customer's orders, newest first. Deleted orders are left out.
    ///
    /// # Errors
    ///
    /// Returns `Database` if a query fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let orders = db::orders::list_for_user(&mut conn, user_id).await?;
        Ok(with_items(&mut conn, orders).await?)
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the actor is an admin.
    #[instrument(skip(self))]
    pub async fn list_all(&self, actor: Actor, include_deleted: bool) -> Result<Vec<Order>> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "only admins can list every order".to_string(),
            ));
        }
        let mut conn = self.pool.acquire().await?;
        let orders = db::orders::list_all(&mut conn, include_deleted).await?;
        Ok(with_items(&mut conn, orders).await?)
    }
}

/// The order if `actor` may see it. Customers see only their own, live
/// orders.
fn visible(order: Option<Order>, actor: Actor) -> Option<Order> {
    order.filter(|order| match actor {
        Actor::Admin(_) => true,
        Actor::Customer(user_id) => order.is_owned_by(user_id) && !order.is_deleted,
    })
}

fn single(mut orders: Vec<Order>, order_id: OrderId) -> Result<Order> {
    orders
        .pop()
        .ok_or_else(|| ServiceError::not_found(format!("order {order_id}")))
}

/// Attach items and their images to `orders`.
async fn with_items(
    conn: &mut PgConnection,
    mut orders: Vec<Order>,
) -> std::result::Result<Vec<Order>, RepositoryError> {
    let ids: Vec<i32> = orders.iter().map(|order| order.id.as_i32()).collect();
    let mut items = db::orders::items_for_orders(&mut *conn, &ids).await?;
    hydrate(&mut *conn, ImageOwnerKind::OrderItem, &mut items).await?;

    let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }
    for order in &mut orders {
        order.items = by_order.remove(&order.id).unwrap_or_default();
    }
    Ok(orders)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_deserializes_camel_case() {
        let json = r#"{
            "addressId": 3,
            "desiredDate": "2025-01-08",
            "desiredSlot": "evening",
            "items": [{"productName": "Milk", "quantity": "1"}]
        }"#;
        let checkout: Checkout = serde_json::from_str(json).unwrap();
        assert_eq!(checkout.address_id, AddressId::new(3));
        assert_eq!(checkout.desired_slot, "evening");
        assert_eq!(checkout.store, None);
        assert_eq!(checkout.items.unwrap()[0].product_name, "Milk");
    }
}
