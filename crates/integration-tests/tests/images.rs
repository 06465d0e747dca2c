//! Integration tests for item images.
//!
//! These tests require a `PostgreSQL` database in `TEST_DATABASE_URL`.
//!
//! Run with: cargo test -p grocer-integration-tests -- --ignored

use grocer_core::image::encode;
use grocer_core::{Actor, CartItemDraft, ImageOwner, ImageRef, MAX_IMAGES_PER_ITEM};
use grocer_integration_tests::{
    cart_checkout, delivery_date, insert_address, insert_user, test_pool, test_state,
};
use grocer_orders::{ErrorKind, db};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot really a picture";

fn refs(urls: &[&str]) -> Vec<ImageRef> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| ImageRef {
            url: (*url).to_owned(),
            is_main: i == 0,
            sort_order: i32::try_from(i).expect("small index"),
        })
        .collect()
}

// =============================================================================
// Uploads
// =============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_upload_set_main_and_remove() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let actor = Actor::Customer(user);

    let item = state
        .carts()
        .add_item(user, CartItemDraft::new("Flour", "1 kg").with_store("Edeka"))
        .await
        .expect("add item");
    let owner = ImageOwner::CartItem(item.id);

    for name in ["front.png", "back.png", "side.png"] {
        state
            .images()
            .upload(actor, owner, name, PNG)
            .await
            .expect("upload");
    }

    let err = state
        .images()
        .upload(actor, owner, "extra.png", PNG)
        .await
        .expect_err("item is full");
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

    let images = state.images().list(actor, owner).await.expect("list");
    assert_eq!(images.len(), MAX_IMAGES_PER_ITEM);
    assert_eq!(images.iter().filter(|image| image.is_main).count(), 1);
    assert!(images[0].is_main);

    state
        .images()
        .set_main(actor, owner, images[1].id)
        .await
        .expect("set main");
    let images = state.images().list(actor, owner).await.expect("list");
    let main = images.iter().find(|image| image.is_main).expect("a main image");
    assert_eq!(main.sort_order, 1);

    let removed = state.images().remove(actor, main.id).await.expect("remove");
    let file = state
        .config()
        .upload
        .dir
        .join(removed.url.rsplit('/').next().expect("file name"));
    assert!(!file.exists(), "unreferenced file should be deleted");

    let images = state.images().list(actor, owner).await.expect("list");
    assert_eq!(images.len(), 2);
    assert_eq!(images.iter().filter(|image| image.is_main).count(), 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_upload_rejects_other_users_and_bad_files() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let stranger = Actor::Customer(insert_user(&pool, false).await);
    let admin = Actor::Admin(insert_user(&pool, true).await);

    let item = state
        .carts()
        .add_item(user, CartItemDraft::new("Honey", "1").with_store("Rewe"))
        .await
        .expect("add item");
    let owner = ImageOwner::CartItem(item.id);

    let err = state
        .images()
        .upload(stranger, owner, "honey.png", PNG)
        .await
        .expect_err("foreign item");
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = state
        .images()
        .upload(Actor::Customer(user), owner, "honey.exe", PNG)
        .await
        .expect_err("bad extension");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = state
        .images()
        .upload(Actor::Customer(user), owner, "honey.png", b"")
        .await
        .expect_err("empty file");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let image = state
        .images()
        .upload(admin, owner, "honey.png", PNG)
        .await
        .expect("admin may upload");
    assert!(image.is_main);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_shared_file_is_deleted_with_its_last_reference() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let actor = Actor::Customer(user);
    let address = insert_address(&pool, user).await;

    let item = state
        .carts()
        .add_item(user, CartItemDraft::new("Jam", "1").with_store("Aldi"))
        .await
        .expect("add item");
    let uploaded = state
        .images()
        .upload(actor, ImageOwner::CartItem(item.id), "jam.webp", PNG)
        .await
        .expect("upload");
    let file = state
        .config()
        .upload
        .dir
        .join(uploaded.url.rsplit('/').next().expect("file name"));

    // Checkout copies the record, so the cart item and order item share the url.
    let order = state
        .orders()
        .create(user, cart_checkout(address, delivery_date()))
        .await
        .expect("checkout");
    let copy = &order.items[0].images[0];
    assert_eq!(copy.url, uploaded.url);

    // A second item pointing at the same url keeps the file alive.
    let twin = state
        .carts()
        .add_item(
            user,
            CartItemDraft::new("Jam", "2")
                .with_store("Aldi")
                .with_image_url(uploaded.url.clone()),
        )
        .await
        .expect("add twin");
    assert_eq!(twin.images.len(), 1);

    state.images().remove(actor, copy.id).await.expect("remove copy");
    assert!(file.exists(), "file is still referenced by the cart item");

    state
        .images()
        .remove(actor, twin.images[0].id)
        .await
        .expect("remove last reference");
    assert!(!file.exists(), "unreferenced file should be deleted");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_cart_deletes_release_their_files() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let actor = Actor::Customer(user);
    let file_of = |url: &str| {
        state
            .config()
            .upload
            .dir
            .join(url.rsplit('/').next().expect("file name"))
    };

    let olives = state
        .carts()
        .add_item(user, CartItemDraft::new("Olives", "1").with_store("Lidl"))
        .await
        .expect("add item");
    let olives_image = state
        .images()
        .upload(actor, ImageOwner::CartItem(olives.id), "olives.png", PNG)
        .await
        .expect("upload");

    let capers = state
        .carts()
        .add_item(user, CartItemDraft::new("Capers", "1"))
        .await
        .expect("add item");
    let capers_image = state
        .images()
        .upload(actor, ImageOwner::CartItem(capers.id), "capers.png", PNG)
        .await
        .expect("upload");
    let shared = state
        .carts()
        .add_item(
            user,
            CartItemDraft::new("Capers", "2").with_image_url(capers_image.url.clone()),
        )
        .await
        .expect("add item sharing the url");
    assert_eq!(shared.images.len(), 1);

    state
        .carts()
        .remove_item(user, olives.id)
        .await
        .expect("remove item");
    assert!(!file_of(&olives_image.url).exists(), "removed item's file should be deleted");

    state
        .carts()
        .remove_item(user, capers.id)
        .await
        .expect("remove item");
    assert!(file_of(&capers_image.url).exists(), "file is still referenced by the other item");

    let removed = state.carts().clear(user).await.expect("clear");
    assert_eq!(removed, 1);
    assert!(!file_of(&capers_image.url).exists(), "cleared cart's file should be deleted");
}

// =============================================================================
// Legacy strings
// =============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_ingesting_the_same_string_twice_adds_nothing() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;

    let item = state
        .carts()
        .add_item(user, CartItemDraft::new("Rice", "1").with_store("Netto"))
        .await
        .expect("add item");
    let owner = ImageOwner::CartItem(item.id);
    let encoded = encode(&refs(&["/uploads/a.jpg", "/uploads/b.jpg"]));

    let mut tx = pool.begin().await.expect("begin");
    let first = db::images::ingest_legacy_string(&mut *tx, owner, &encoded)
        .await
        .expect("first ingest");
    let second = db::images::ingest_legacy_string(&mut *tx, owner, &encoded)
        .await
        .expect("second ingest");
    tx.commit().await.expect("commit");

    assert_eq!(first.inserted.len(), 2);
    assert!(second.inserted.is_empty());
    assert_eq!(second.skipped_existing, 2);

    let mut conn = pool.acquire().await.expect("connection");
    let records = db::images::list_for(&mut conn, owner).await.expect("list");
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|r| r.is_main).count(), 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_legacy_order_item_string_is_ingested_on_read() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;
    let address = insert_address(&pool, user).await;

    let mut checkout = cart_checkout(address, delivery_date());
    checkout.items = Some(vec![CartItemDraft::new("Oats", "1").with_store("dm")]);
    let order = state.orders().create(user, checkout).await.expect("checkout");
    let item_id = order.items[0].id;

    let encoded = encode(&refs(&["/uploads/old-1.jpg", "/uploads/old-2.jpg"]));
    sqlx::query("UPDATE order_items SET image_url = $1 WHERE id = $2")
        .bind(&encoded)
        .bind(item_id)
        .execute(&pool)
        .await
        .expect("write legacy string");

    let order = state
        .orders()
        .get(Actor::Customer(user), order.id)
        .await
        .expect("get");
    let images = &order.items[0].images;
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].url, "/uploads/old-1.jpg");
    assert!(images[0].is_main);

    // A second read finds records and does not ingest again.
    let order = state
        .orders()
        .get(Actor::Customer(user), order.id)
        .await
        .expect("get again");
    assert_eq!(order.items[0].images.len(), 2);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_backfill_ingests_plain_legacy_urls() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let user = insert_user(&pool, false).await;

    let item = state
        .carts()
        .add_item(user, CartItemDraft::new("Soap", "2").with_store("Rossmann"))
        .await
        .expect("add item");
    sqlx::query("UPDATE cart_items SET image_url = '/uploads/soap.jpg' WHERE id = $1")
        .bind(item.id)
        .execute(&pool)
        .await
        .expect("write legacy url");

    let report = state.images().backfill(10_000).await.expect("backfill");
    assert!(report.items >= 1);

    let mut conn = pool.acquire().await.expect("connection");
    let records = db::images::list_for(&mut conn, ImageOwner::CartItem(item.id))
        .await
        .expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, "/uploads/soap.jpg");
    assert!(records[0].is_main);
}
