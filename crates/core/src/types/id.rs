//! Integer ids, one newtype per table.
//!
//! Every id is a plain `SERIAL` key in the database. Wrapping each in its own
//! type keeps a cart item id from being passed where an order item id is
//! expected, which matters most for image owners.

/// Declare an `i32`-backed id type.
///
/// Attributes before the name (doc comments included) are kept. The type
/// serializes as a bare number and, with the `postgres` feature, maps to
/// `INTEGER` and `INTEGER[]` through `sqlx(transparent)`.
///
/// ```rust
/// # use grocer_core::define_id;
/// define_id!(
///     /// A shelf in the warehouse.
///     ShelfId
/// );
///
/// let shelf = ShelfId::new(4);
/// assert_eq!(shelf.as_i32(), 4);
/// assert_eq!(shelf.to_string(), "4");
/// ```
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type))]
        #[cfg_attr(feature = "postgres", sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_i32(self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::convert::From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl ::core::convert::From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// A customer or admin.
    UserId
);
define_id!(
    /// A saved delivery address.
    AddressId
);
define_id!(CartId);
define_id!(CartItemId);
define_id!(OrderId);
define_id!(OrderItemId);
define_id!(
    /// A row of `item_images`.
    ImageId
);
define_id!(NotificationId);
