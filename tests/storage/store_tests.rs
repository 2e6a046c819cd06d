//! Store interface tests.
//!
//! These tests verify the contract of the Store trait.
//! Each storage implementation should run these tests against an empty store.

use futures::TryStreamExt;

use changefeed::codec;
use changefeed::storage::{BatchOp, IterOptions, Record, Store};

fn put(n: u64, value: &str) -> BatchOp {
    BatchOp::Put {
        key: codec::encode(n),
        value: value.as_bytes().to_vec(),
    }
}

async fn keys<S: Store>(store: &S, options: IterOptions) -> Vec<u64> {
    let records: Vec<Record> = store
        .iter(options)
        .await
        .expect("iter should open")
        .try_collect()
        .await
        .expect("iter should succeed");
    records
        .into_iter()
        .map(|r| codec::decode(&r.key.expect("key requested")).expect("valid key"))
        .collect()
}

async fn clear<S: Store>(store: &S) {
    let existing = keys(store, IterOptions::default()).await;
    let ops = existing
        .into_iter()
        .map(|n| BatchOp::Del {
            key: codec::encode(n),
        })
        .collect();
    store.batch(ops).await.expect("clear should succeed");
}

// =============================================================================
// Store::get / Store::batch tests
// =============================================================================

pub async fn test_batch_then_get<S: Store>(store: &S) {
    clear(store).await;

    store
        .batch(vec![put(1, "hello"), put(2, "world")])
        .await
        .expect("batch should succeed");

    assert_eq!(store.get(&codec::encode(1)).await.unwrap(), b"hello");
    assert_eq!(store.get(&codec::encode(2)).await.unwrap(), b"world");
}

pub async fn test_get_missing_is_not_found<S: Store>(store: &S) {
    clear(store).await;

    let err = store
        .get(&codec::encode(42))
        .await
        .expect_err("missing key should fail");
    assert!(err.is_not_found(), "expected NotFound, got {:?}", err);
}

pub async fn test_batch_overwrites<S: Store>(store: &S) {
    clear(store).await;

    store.batch(vec![put(1, "first")]).await.unwrap();
    store.batch(vec![put(1, "second")]).await.unwrap();

    assert_eq!(store.get(&codec::encode(1)).await.unwrap(), b"second");
}

pub async fn test_empty_batch<S: Store>(store: &S) {
    clear(store).await;

    store.batch(vec![]).await.expect("empty batch should succeed");
    assert!(keys(store, IterOptions::default()).await.is_empty());
}

pub async fn test_batch_mixes_put_and_del<S: Store>(store: &S) {
    clear(store).await;

    store.batch(vec![put(1, "a"), put(2, "b")]).await.unwrap();
    store
        .batch(vec![
            BatchOp::Del {
                key: codec::encode(1),
            },
            put(3, "c"),
        ])
        .await
        .unwrap();

    assert_eq!(keys(store, IterOptions::default()).await, vec![2, 3]);
}

// =============================================================================
// Store::del tests
// =============================================================================

pub async fn test_del<S: Store>(store: &S) {
    clear(store).await;

    store.batch(vec![put(7, "gone")]).await.unwrap();
    store.del(&codec::encode(7)).await.expect("del should succeed");

    assert!(store.get(&codec::encode(7)).await.unwrap_err().is_not_found());
}

pub async fn test_del_missing_is_ok<S: Store>(store: &S) {
    clear(store).await;

    store
        .del(&codec::encode(99))
        .await
        .expect("deleting a missing key should succeed");
}

// =============================================================================
// Store::iter tests
// =============================================================================

pub async fn test_iter_follows_numeric_order<S: Store>(store: &S) {
    clear(store).await;

    // Crosses the one-byte / multi-byte key boundary.
    store
        .batch(vec![put(300, "c"), put(9, "a"), put(250, "b"), put(70_000, "d")])
        .await
        .unwrap();

    assert_eq!(
        keys(store, IterOptions::default()).await,
        vec![9, 250, 300, 70_000]
    );
}

pub async fn test_iter_reverse_limit<S: Store>(store: &S) {
    clear(store).await;

    store
        .batch(vec![put(1, "a"), put(2, "b"), put(3, "c")])
        .await
        .unwrap();

    let options = IterOptions {
        reverse: true,
        limit: Some(1),
        ..IterOptions::default()
    };
    assert_eq!(keys(store, options).await, vec![3]);
}

pub async fn test_iter_gt_is_exclusive<S: Store>(store: &S) {
    clear(store).await;

    store
        .batch(vec![put(1, "a"), put(2, "b"), put(3, "c")])
        .await
        .unwrap();

    let options = IterOptions {
        gt: Some(codec::encode(1)),
        ..IterOptions::default()
    };
    assert_eq!(keys(store, options).await, vec![2, 3]);
}

pub async fn test_iter_keys_and_values_flags<S: Store>(store: &S) {
    clear(store).await;

    store.batch(vec![put(1, "a")]).await.unwrap();

    let records: Vec<Record> = store
        .iter(IterOptions {
            keys: false,
            ..IterOptions::default()
        })
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        records,
        vec![Record {
            key: None,
            value: Some(b"a".to_vec())
        }]
    );

    let records: Vec<Record> = store
        .iter(IterOptions {
            values: false,
            ..IterOptions::default()
        })
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        records,
        vec![Record {
            key: Some(codec::encode(1)),
            value: None
        }]
    );
}

pub async fn test_iter_empty<S: Store>(store: &S) {
    clear(store).await;

    let options = IterOptions {
        reverse: true,
        limit: Some(1),
        values: false,
        ..IterOptions::default()
    };
    assert!(keys(store, options).await.is_empty());
}

/// Run all Store tests against an implementation.
#[macro_export]
macro_rules! run_store_tests {
    ($store:expr) => {
        use $crate::storage::store_tests::*;

        // get / batch tests
        test_batch_then_get($store).await;
        println!("  test_batch_then_get: PASSED");

        test_get_missing_is_not_found($store).await;
        println!("  test_get_missing_is_not_found: PASSED");

        test_batch_overwrites($store).await;
        println!("  test_batch_overwrites: PASSED");

        test_empty_batch($store).await;
        println!("  test_empty_batch: PASSED");

        test_batch_mixes_put_and_del($store).await;
        println!("  test_batch_mixes_put_and_del: PASSED");

        // del tests
        test_del($store).await;
        println!("  test_del: PASSED");

        test_del_missing_is_ok($store).await;
        println!("  test_del_missing_is_ok: PASSED");

        // iter tests
        test_iter_follows_numeric_order($store).await;
        println!("  test_iter_follows_numeric_order: PASSED");

        test_iter_reverse_limit($store).await;
        println!("  test_iter_reverse_limit: PASSED");

        test_iter_gt_is_exclusive($store).await;
        println!("  test_iter_gt_is_exclusive: PASSED");

        test_iter_keys_and_values_flags($store).await;
        println!("  test_iter_keys_and_values_flags: PASSED");

        test_iter_empty($store).await;
        println!("  test_iter_empty: PASSED");
    };
}
