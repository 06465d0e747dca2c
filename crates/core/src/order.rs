//! Orders, their items and the collaborator records they copy from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::image::ImageRecord;
use crate::types::{AddressId, OrderId, OrderItemId, OrderNumber, OrderStatus, UserId};

/// A user known to the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

/// A delivery address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub label: Option<String>,
    pub recipient_name: String,
    pub street: String,
    pub house_number: Option<String>,
    pub postal_code: String,
    pub city: String,
    pub phone: Option<String>,
    pub delivery_notes: Option<String>,
}

impl Address {
    /// Copy the displayable fields for storage on an order.
    #[must_use]
    pub fn snapshot(&self) -> AddressSnapshot {
        AddressSnapshot {
            recipient_name: self.recipient_name.clone(),
            street: self.street.clone(),
            house_number: self.house_number.clone(),
            postal_code: self.postal_code.clone(),
            city: self.city.clone(),
            phone: self.phone.clone(),
            delivery_notes: self.delivery_notes.clone(),
        }
    }
}

/// Address fields frozen on an order at creation time.
///
/// Later edits or deletion of the source address do not affect it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub recipient_name: String,
    pub street: String,
    pub house_number: Option<String>,
    pub postal_code: String,
    pub city: String,
    pub phone: Option<String>,
    pub delivery_notes: Option<String>,
}

impl std::fmt::Display for AddressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.recipient_name, self.street)?;
        if let Some(number) = &self.house_number {
            write!(f, " {number}")?;
        }
        write!(f, ", {} {}", self.postal_code, self.city)
    }
}

/// A delivery date with its time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryWindow {
    pub date: NaiveDate,
    pub slot: String,
}

impl DeliveryWindow {
    #[must_use]
    pub fn new(date: NaiveDate, slot: impl Into<String>) -> Self {
        Self {
            date,
            slot: slot.into(),
        }
    }
}

impl std::fmt::Display for DeliveryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.date, self.slot)
    }
}

/// An order with its delivery negotiation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub address_id: Option<AddressId>,
    pub address: AddressSnapshot,
    pub desired_delivery_date: NaiveDate,
    pub desired_time_slot: String,
    pub suggested_delivery_date: Option<NaiveDate>,
    pub suggested_time_slot: Option<String>,
    pub final_delivery_date: Option<NaiveDate>,
    pub final_time_slot: Option<String>,
    pub store: Option<String>,
    pub additional_instructions: Option<String>,
    pub is_locked: bool,
    pub is_deleted: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    #[must_use]
    pub fn desired(&self) -> DeliveryWindow {
        DeliveryWindow::new(self.desired_delivery_date, self.desired_time_slot.clone())
    }

    /// The admin's suggestion, if both date and slot are set.
    #[must_use]
    pub fn suggested(&self) -> Option<DeliveryWindow> {
        Some(DeliveryWindow::new(
            self.suggested_delivery_date?,
            self.suggested_time_slot.clone()?,
        ))
    }

    #[must_use]
    pub fn final_window(&self) -> Option<DeliveryWindow> {
        Some(DeliveryWindow::new(
            self.final_delivery_date?,
            self.final_time_slot.clone()?,
        ))
    }

    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Apply a computed change set.
    pub fn apply(&mut self, patch: OrderPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(date) = patch.desired_delivery_date {
            self.desired_delivery_date = date;
        }
        if let Some(slot) = patch.desired_time_slot {
            self.desired_time_slot = slot;
        }
        if let Some(window) = patch.suggested {
            self.suggested_delivery_date = Some(window.date);
            self.suggested_time_slot = Some(window.slot);
        }
        if let Some(window) = patch.final_window {
            self.final_delivery_date = Some(window.date);
            self.final_time_slot = Some(window.slot);
        }
        if let Some((address_id, snapshot)) = patch.address {
            self.address_id = Some(address_id);
            self.address = snapshot;
        }
        if let Some(instructions) = patch.additional_instructions {
            self.additional_instructions = instructions;
        }
        if let Some(locked) = patch.is_locked {
            self.is_locked = locked;
        }
        if let Some(deleted) = patch.is_deleted {
            self.is_deleted = deleted;
        }
        if let Some(at) = patch.cancelled_at {
            self.cancelled_at = Some(at);
        }
        self.updated_at = now;
    }
}

/// Field changes produced by a lifecycle transition.
///
/// `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub desired_delivery_date: Option<NaiveDate>,
    pub desired_time_slot: Option<String>,
    pub suggested: Option<DeliveryWindow>,
    pub final_window: Option<DeliveryWindow>,
    pub address: Option<(AddressId, AddressSnapshot)>,
    pub additional_instructions: Option<Option<String>>,
    pub is_locked: Option<bool>,
    pub is_deleted: Option<bool>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// A line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_name: String,
    pub quantity: String,
    pub store: String,
    pub notes: Option<String>,
    /// Transport string of `images` on read. Historical rows keep their
    /// legacy value here until it has been ingested.
    pub image_url: Option<String>,
    pub images: Vec<ImageRecord>,
    pub created_at: DateTime<Utc>,
}
