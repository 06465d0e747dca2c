//! Shopping cart types and item validation.
//!
//! Every cart item and every order item must end up with a non-empty store.
//! Items may omit it and inherit one instead; the rules for where the store
//! comes from live here so the cart and order services share them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::image::ImageRecord;
use crate::types::{CartId, CartItemId, UserId};

/// Errors raised while validating item drafts, before anything is written.
///
/// `index` is the position of the offending item in the submitted list.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("item {index}: product name is required")]
    EmptyProductName { index: usize },
    #[error("item {index}: quantity is required")]
    EmptyQuantity { index: usize },
    #[error("item {index}: no store given and none to inherit")]
    MissingStore { index: usize },
    #[error("an order needs at least one item")]
    NoItems,
    #[error("a delivery time slot is required")]
    EmptyTimeSlot,
}

/// An item as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemDraft {
    pub product_name: String,
    /// Free-form quantity such as `"2"` or `"500 g"`.
    pub quantity: String,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Transport string with the item's images.
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CartItemDraft {
    #[must_use]
    pub fn new(product_name: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            quantity: quantity.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    #[must_use]
    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// The item's own store, if it names a non-blank one.
    #[must_use]
    pub fn own_store(&self) -> Option<&str> {
        non_blank(self.store.as_deref())
    }

    fn check_fields(&self, index: usize) -> Result<(), ValidationError> {
        if self.product_name.trim().is_empty() {
            return Err(ValidationError::EmptyProductName { index });
        }
        if self.quantity.trim().is_empty() {
            return Err(ValidationError::EmptyQuantity { index });
        }
        Ok(())
    }

    fn resolve(&self, index: usize, fallback: Option<&str>) -> Result<ResolvedItem, ValidationError> {
        self.check_fields(index)?;
        let store = self
            .own_store()
            .or_else(|| non_blank(fallback))
            .ok_or(ValidationError::MissingStore { index })?;

        Ok(ResolvedItem {
            product_name: self.product_name.trim().to_owned(),
            quantity: self.quantity.trim().to_owned(),
            store: store.to_owned(),
            notes: non_blank(self.notes.as_deref()).map(str::to_owned),
            image_url: non_blank(self.image_url.as_deref()).map(str::to_owned),
        })
    }
}

/// A validated item with its store resolved and fields trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedItem {
    pub product_name: String,
    pub quantity: String,
    pub store: String,
    pub notes: Option<String>,
    pub image_url: Option<String>,
}

/// Resolve a single item added to an existing cart.
///
/// `existing_stores` are the stores of the cart's current items, most
/// recently added first. The fallback is the first non-blank one, then the
/// cart's own store.
///
/// # Errors
///
/// Returns a [`ValidationError`] for a blank product name or quantity, or
/// when no store can be found.
pub fn resolve_for_add<'a, I>(
    draft: &CartItemDraft,
    existing_stores: I,
    cart_store: Option<&str>,
) -> Result<ResolvedItem, ValidationError>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let inherited = existing_stores
        .into_iter()
        .find_map(non_blank)
        .or_else(|| non_blank(cart_store));
    draft.resolve(0, inherited)
}

/// Resolve a whole replacement list for a cart.
///
/// Items without a store inherit the store of the last item in the list that
/// names one, then `cart_store`. Nothing is returned unless every item
/// resolves; the first offending item is reported.
///
/// # Errors
///
/// Returns the first [`ValidationError`] in list order.
pub fn resolve_replacement(
    drafts: &[CartItemDraft],
    cart_store: Option<&str>,
) -> Result<Vec<ResolvedItem>, ValidationError> {
    let inherited = drafts
        .iter()
        .rev()
        .find_map(CartItemDraft::own_store)
        .or_else(|| non_blank(cart_store));

    drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| draft.resolve(index, inherited))
        .collect()
}

/// Resolve the items of a checkout against the order-level store.
///
/// # Errors
///
/// Returns [`ValidationError::NoItems`] for an empty list, otherwise the
/// first offending item.
pub fn resolve_checkout(
    drafts: &[CartItemDraft],
    order_store: Option<&str>,
) -> Result<Vec<ResolvedItem>, ValidationError> {
    if drafts.is_empty() {
        return Err(ValidationError::NoItems);
    }

    drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| draft.resolve(index, order_store))
        .collect()
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Trim an optional text field, mapping blank to `None`.
#[must_use]
pub fn non_blank_owned(value: Option<String>) -> Option<String> {
    non_blank(value.as_deref()).map(str::to_owned)
}

/// A user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub is_active: bool,
    /// Default store for items that name none.
    pub store: Option<String>,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An item in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_name: String,
    pub quantity: String,
    pub store: Option<String>,
    pub notes: Option<String>,
    /// Transport string of `images` on read. Holds the stored legacy value
    /// only while the item has no image records.
    pub image_url: Option<String>,
    pub images: Vec<ImageRecord>,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    /// The draft that recreates this item elsewhere.
    #[must_use]
    pub fn to_draft(&self) -> CartItemDraft {
        CartItemDraft {
            product_name: self.product_name.clone(),
            quantity: self.quantity.clone(),
            store: self.store.clone(),
            notes: self.notes.clone(),
            image_url: self.image_url.clone(),
        }
    }
}
