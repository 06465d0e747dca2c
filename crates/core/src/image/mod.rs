//! Item images.
//!
//! Every cart item and order item owns up to [`MAX_IMAGES_PER_ITEM`] images.
//! The normalized per-item records are the source of truth; the transport
//! string produced by [`codec::encode`] is only a projection of them.

pub mod codec;
pub mod set;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CartItemId, ImageId, ImageOwnerKind, OrderItemId};

pub use codec::{
    Decoding, MULTI_PREFIX, UPLOAD_PATH_MARKER, decode, decode_detailed, encode, is_recoverable_url,
    normalize,
};
pub use set::{ImageSet, IngestPlan, PendingImage, Removal};

/// Maximum number of images per cart item or order item.
pub const MAX_IMAGES_PER_ITEM: usize = 3;

/// Errors raised by image set operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// The owner already has the maximum number of images.
    #[error("an item can have at most {max} images")]
    CapacityExceeded {
        /// Maximum allowed images.
        max: usize,
    },
    /// The image does not exist or belongs to another owner.
    #[error("image {0} not found for this item")]
    NotFound(ImageId),
}

/// One image of an item, as exchanged with clients.
///
/// Field names are part of the transport format and must stay camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub url: String,
    pub is_main: bool,
    pub sort_order: i32,
}

impl ImageRef {
    /// A lone legacy url becomes the main image at position `0`.
    #[must_use]
    pub fn legacy(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_main: true,
            sort_order: 0,
        }
    }
}

/// The item an image belongs to.
///
/// Stored as `owner_kind` plus exactly one of two nullable foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ImageOwner {
    OrderItem(OrderItemId),
    CartItem(CartItemId),
}

impl ImageOwner {
    #[must_use]
    pub const fn kind(self) -> ImageOwnerKind {
        match self {
            Self::OrderItem(_) => ImageOwnerKind::OrderItem,
            Self::CartItem(_) => ImageOwnerKind::CartItem,
        }
    }

    /// Foreign key value for `order_item_id`.
    #[must_use]
    pub const fn order_item_id(self) -> Option<OrderItemId> {
        match self {
            Self::OrderItem(id) => Some(id),
            Self::CartItem(_) => None,
        }
    }

    /// Foreign key value for `cart_item_id`.
    #[must_use]
    pub const fn cart_item_id(self) -> Option<CartItemId> {
        match self {
            Self::CartItem(id) => Some(id),
            Self::OrderItem(_) => None,
        }
    }
}

impl std::fmt::Display for ImageOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderItem(id) => write!(f, "order_item:{id}"),
            Self::CartItem(id) => write!(f, "cart_item:{id}"),
        }
    }
}

/// A persisted image row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub owner: ImageOwner,
    pub url: String,
    pub is_main: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    #[must_use]
    pub fn to_ref(&self) -> ImageRef {
        ImageRef {
            url: self.url.clone(),
            is_main: self.is_main,
            sort_order: self.sort_order,
        }
    }
}
