use bytes::Bytes;
use std::time::Duration;
use zircondb::core::cluster::slot::get_slot;
use zircondb::core::storage::Store;

#[tokio::test]
async fn test_set_get_delete_exists() {
    let store = Store::new();
    let key = Bytes::from_static(b"k1");

    assert_eq!(store.get(&key).await, None);
    store.set(key.clone(), Bytes::from_static(b"v1"), None).await;
    assert_eq!(store.get(&key).await, Some(Bytes::from_static(b"v1")));
    assert!(store.exists(&key).await);

    assert_eq!(store.delete(&[key.clone()]).await, 1);
    assert!(!store.exists(&key).await);
    assert_eq!(store.delete(&[key]).await, 0);
}

#[tokio::test]
async fn test_expired_key_is_absent() {
    let store = Store::new();
    let key = Bytes::from_static(b"ephemeral");
    store
        .set(key.clone(), Bytes::from_static(b"v"), Some(Duration::from_millis(20)))
        .await;
    assert!(store.exists(&key).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.get(&key).await, None);
    assert!(!store.exists(&key).await);
}

#[tokio::test]
async fn test_keys_in_slot_filters_by_hash_slot() {
    let store = Store::new();
    // Hash tags pin these keys to one slot; the third key lands elsewhere.
    let a = Bytes::from_static(b"{grp}:a");
    let b = Bytes::from_static(b"{grp}:b");
    let other = Bytes::from_static(b"{elsewhere}:c");
    let slot = get_slot(&a);
    assert_ne!(slot, get_slot(&other));

    for key in [&a, &b, &other] {
        store.set(key.clone(), Bytes::from_static(b"v"), None).await;
    }

    let mut keys = store.keys_in_slot(slot, 100).await;
    keys.sort();
    assert_eq!(keys, vec![a, b]);
    assert_eq!(store.count_keys_in_slot(slot).await, 2);

    // The count argument bounds the enumeration.
    assert_eq!(store.keys_in_slot(slot, 1).await.len(), 1);
}

#[tokio::test]
async fn test_restore_is_idempotent_with_replace() {
    let store = Store::new();
    let key = Bytes::from_static(b"restored");

    store
        .restore(key.clone(), Bytes::from_static(b"v1"), 0, true)
        .await
        .unwrap();
    // Re-sending the same key (an at-least-once retry) must be a no-op apply.
    store
        .restore(key.clone(), Bytes::from_static(b"v1"), 0, true)
        .await
        .unwrap();
    assert_eq!(store.get(&key).await, Some(Bytes::from_static(b"v1")));
}

#[tokio::test]
async fn test_restore_without_replace_rejects_existing_key() {
    let store = Store::new();
    let key = Bytes::from_static(b"busy");
    store.set(key.clone(), Bytes::from_static(b"v1"), None).await;

    let err = store
        .restore(key.clone(), Bytes::from_static(b"v2"), 0, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("BUSYKEY"));
    assert_eq!(store.get(&key).await, Some(Bytes::from_static(b"v1")));
}

#[tokio::test]
async fn test_dump_reports_ttl() {
    let store = Store::new();
    let key = Bytes::from_static(b"with-ttl");
    store
        .set(key.clone(), Bytes::from_static(b"v"), Some(Duration::from_secs(60)))
        .await;

    let (payload, ttl_ms) = store.dump(&key).await.unwrap();
    assert_eq!(payload, Bytes::from_static(b"v"));
    assert!(ttl_ms > 0 && ttl_ms <= 60_000);

    assert!(store.dump(&Bytes::from_static(b"missing")).await.is_none());
}

#[tokio::test]
async fn test_keys_matching_glob() {
    let store = Store::new();
    for name in ["user:1", "user:2", "order:1"] {
        store
            .set(Bytes::from(name.to_string()), Bytes::from_static(b"v"), None)
            .await;
    }

    let mut users = store.keys_matching("user:*").await;
    users.sort();
    assert_eq!(
        users,
        vec![Bytes::from_static(b"user:1"), Bytes::from_static(b"user:2")]
    );
    assert_eq!(store.keys_matching("*").await.len(), 3);
    assert_eq!(store.key_count().await, 3);
}
