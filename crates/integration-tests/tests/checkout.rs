//! Integration tests for carts and order creation.
//!
//! These tests require a `PostgreSQL` database in `TEST_DATABASE_URL`.
//!
//! Run with: cargo test -p grocer-integration-tests -- --ignored

use std::collections::HashSet;

use grocer_core::image::encode;
use grocer_core::{CartItemDraft, ImageOwner, ImageRef, OrderStatus};
use grocer_integration_tests::{
    cart_checkout, delivery_date, insert_address, insert_user, test_pool, test_state,
};
use grocer_orders::{Checkout, ErrorKind, ServiceError, db};

// =============================================================================
// Checkout from the cart
// =============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_promotes_cart_items_and_images() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let address = insert_address(&pool, user).await;

    let milk = state
        .carts()
        .add_item(
            user,
            CartItemDraft::new("Milk", "1")
                .with_store("Edeka")
                .with_image_url("/uploads/milk.jpg"),
        )
        .await
        .expect("add milk");
    assert_eq!(milk.images.len(), 1);

    let bread = state
        .carts()
        .add_item(user, CartItemDraft::new("Bread", "2"))
        .await
        .expect("add bread");
    assert_eq!(bread.store.as_deref(), Some("Edeka"));

    let order = state
        .orders()
        .create(user, cart_checkout(address, delivery_date()))
        .await
        .expect("checkout");

    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.items.len(), 2);
    assert!(order.items.iter().all(|item| item.store == "Edeka"));
    assert_eq!(order.address.city, "Berlin");

    let milk_item = order
        .items
        .iter()
        .find(|item| item.product_name == "Milk")
        .expect("milk in order");
    assert_eq!(milk_item.images.len(), 1);
    assert_eq!(milk_item.images[0].url, "/uploads/milk.jpg");
    assert!(milk_item.images[0].is_main);
    assert_eq!(milk_item.images[0].owner, ImageOwner::OrderItem(milk_item.id));
    assert!(milk_item.image_url.is_some());

    assert!(
        state.carts().get_active(user).await.expect("cart").is_none(),
        "cart should be deactivated after checkout"
    );
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_uses_order_store_for_storeless_items() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let address = insert_address(&pool, user).await;

    state
        .carts()
        .add_item(user, CartItemDraft::new("Apples", "1 kg"))
        .await
        .expect("add apples");

    let mut checkout = cart_checkout(address, delivery_date());
    checkout.store = Some("Rewe".to_owned());
    let order = state.orders().create(user, checkout).await.expect("checkout");

    assert_eq!(order.store.as_deref(), Some("Rewe"));
    assert_eq!(order.items[0].store, "Rewe");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_without_store_fails_before_writing() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let address = insert_address(&pool, user).await;

    state
        .carts()
        .add_item(user, CartItemDraft::new("Apples", "1 kg"))
        .await
        .expect("add apples");

    let err = state
        .orders()
        .create(user, cart_checkout(address, delivery_date()))
        .await
        .expect_err("no store anywhere");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let cart = state.carts().get_active(user).await.expect("cart");
    assert_eq!(cart.map(|cart| cart.items.len()), Some(1));
    assert!(state.orders().list_for_user(user).await.expect("orders").is_empty());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_with_empty_cart_is_rejected() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let address = insert_address(&pool, user).await;

    let err = state
        .orders()
        .create(user, cart_checkout(address, delivery_date()))
        .await
        .expect_err("nothing to order");
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_rejects_foreign_address() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let stranger = insert_user(&pool, false).await;
    let address = insert_address(&pool, stranger).await;

    let mut checkout = cart_checkout(address, delivery_date());
    checkout.items = Some(vec![CartItemDraft::new("Eggs", "10").with_store("Aldi")]);

    let err = state
        .orders()
        .create(user, checkout)
        .await
        .expect_err("address of another user");
    assert!(matches!(err, ServiceError::NotFound(_)));
}

// =============================================================================
// Checkout from explicit items
// =============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_explicit_items_leave_cart_untouched() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let address = insert_address(&pool, user).await;

    state
        .carts()
        .add_item(user, CartItemDraft::new("Butter", "1").with_store("Lidl"))
        .await
        .expect("add butter");

    let checkout = Checkout {
        items: Some(vec![
            CartItemDraft::new("Eggs", "10").with_image_url("/uploads/eggs.jpg"),
        ]),
        store: Some("Aldi".to_owned()),
        ..cart_checkout(address, delivery_date())
    };
    let order = state.orders().create(user, checkout).await.expect("checkout");

    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].store, "Aldi");
    assert_eq!(order.items[0].images.len(), 1);

    let cart = state
        .carts()
        .get_active(user)
        .await
        .expect("cart")
        .expect("cart still active");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].product_name, "Butter");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_unreadable_image_strings_never_block_items() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let address = insert_address(&pool, user).await;
    let garbage = "MULTI:%%%garbage";

    let item = state
        .carts()
        .add_item(
            user,
            CartItemDraft::new("Salt", "1")
                .with_store("Rewe")
                .with_image_url(garbage),
        )
        .await
        .expect("item is added without images");
    assert!(item.images.is_empty());
    assert_eq!(item.image_url, None);

    let checkout = Checkout {
        items: Some(vec![CartItemDraft::new("Pepper", "1").with_image_url(garbage)]),
        store: Some("Rewe".to_owned()),
        ..cart_checkout(address, delivery_date())
    };
    let order = state.orders().create(user, checkout).await.expect("checkout");
    assert_eq!(order.items.len(), 1);
    assert!(order.items[0].images.is_empty());

    // A string cut off mid-payload still yields the urls before the cut.
    let encoded = encode(&[
        ImageRef {
            url: "/uploads/sugar.jpg".to_owned(),
            is_main: true,
            sort_order: 0,
        },
        ImageRef {
            url: "/uploads/sugar-back.jpg".to_owned(),
            is_main: false,
            sort_order: 1,
        },
    ]);
    let truncated = &encoded[..encoded.len() - 6];
    let item = state
        .carts()
        .add_item(
            user,
            CartItemDraft::new("Sugar", "1").with_image_url(truncated),
        )
        .await
        .expect("add item");
    let urls: Vec<&str> = item.images.iter().map(|image| image.url.as_str()).collect();
    assert_eq!(urls, ["/uploads/sugar.jpg", "/uploads/sugar-back.jpg"]);
    assert!(item.images[0].is_main);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_concurrent_checkouts_get_distinct_numbers() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let user = insert_user(&pool, false).await;
        let address = insert_address(&pool, user).await;
        let orders = state.orders().clone();
        handles.push(tokio::spawn(async move {
            let mut checkout = cart_checkout(address, delivery_date());
            checkout.items = Some(vec![CartItemDraft::new("Tea", "1").with_store("dm")]);
            orders.create(user, checkout).await
        }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let order = handle.await.expect("task").expect("checkout");
        numbers.insert(order.order_number.into_inner());
    }
    assert_eq!(numbers.len(), 8);

    let mut sequences: Vec<u32> = numbers
        .iter()
        .map(|number| number.rsplit('-').next().expect("sequence").parse().expect("numeric"))
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_concurrent_cart_creation_yields_one_active_cart() {
    let pool = test_pool().await;
    let user = insert_user(&pool, false).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = pool.begin().await.expect("begin");
            let cart = db::carts::get_or_create_active(&mut *tx, user)
                .await
                .expect("cart");
            tx.commit().await.expect("commit");
            cart.id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.expect("task"));
    }
    assert_eq!(ids.len(), 1);

    let active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM carts WHERE user_id = $1 AND is_active")
            .bind(user)
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(active, 1);
}

// =============================================================================
// Cart editing
// =============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_replace_all_is_atomic() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;

    state
        .carts()
        .add_item(user, CartItemDraft::new("Cheese", "200 g").with_store("Edeka"))
        .await
        .expect("add cheese");

    let err = state
        .carts()
        .replace_all(
            user,
            vec![
                CartItemDraft::new("Salt", "1"),
                CartItemDraft::new("", "1").with_store("Edeka"),
            ],
            None,
        )
        .await
        .expect_err("blank product name");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let cart = state
        .carts()
        .get_active(user)
        .await
        .expect("cart")
        .expect("active cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].product_name, "Cheese");

    let cart = state
        .carts()
        .replace_all(
            user,
            vec![CartItemDraft::new("Salt", "1"), CartItemDraft::new("Pepper", "1")],
            Some("Kaufland".to_owned()),
        )
        .await
        .expect("replace");
    assert_eq!(cart.store.as_deref(), Some("Kaufland"));
    assert_eq!(cart.items.len(), 2);
    assert!(cart.items.iter().all(|item| item.store.as_deref() == Some("Kaufland")));
}
