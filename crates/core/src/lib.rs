//! Grocer Core - Order lifecycle and image consistency rules.
//!
//! This crate provides the domain types and pure algorithms used by the
//! Grocer components:
//! - `orders` - Postgres-backed cart, order and image services
//! - `cli` - Command-line tools for migrations and operations
//!
//! # Architecture
//!
//! The core crate contains only types and algorithms - no I/O, no database
//! access. Services load state, ask the core what a change means, and persist
//! the result inside their own transaction.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, order numbers and status enums
//! - [`image`] - Image transport strings and per-item image set invariants
//! - [`cart`] - Cart types and store resolution for item drafts
//! - [`order`] - Orders, address snapshots and change sets
//! - [`lifecycle`] - The order state machine
//! - [`notification`] - Notifications and the dedup window

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod image;
pub mod lifecycle;
pub mod notification;
pub mod order;
pub mod types;

pub use cart::{Cart, CartItem, CartItemDraft, ResolvedItem, ValidationError};
pub use image::{ImageError, ImageOwner, ImageRecord, ImageRef, ImageSet, MAX_IMAGES_PER_ITEM};
pub use lifecycle::{Actor, EventKind, OrderEvent, Transition, TransitionError, evaluate};
pub use notification::{DedupWindow, Notification, NotificationIntent, Recipient};
pub use order::{Address, AddressSnapshot, DeliveryWindow, Order, OrderItem, OrderPatch, User};
pub use types::*;
