//! Batch Tests
//!
//! These tests verify:
//! - Results come back in input order, present and absent mixed
//! - Chunked entries are reassembled
//! - One failing item does not affect the others
//! - A lost connection fails the whole batch

use std::sync::Arc;

use serde_json::{json, Value};

use cacheproxy::{
    multi_get, BatchReader, CacheConfig, CacheProxy, KeyDescriptor, MemoryStore, Profile,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (Arc<MemoryStore>, CacheProxy) {
    let store = Arc::new(MemoryStore::new());
    let proxy = CacheProxy::new(store.clone(), CacheConfig::for_profile(Profile::Test)).unwrap();
    (store, proxy)
}

fn page_key(page: u32) -> KeyDescriptor {
    KeyDescriptor::fields([("site", json!("example")), ("page", json!(page))])
}

fn noisy_text(len: usize) -> String {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            char::from(b'a' + (state % 26) as u8)
        })
        .collect()
}

// =============================================================================
// Batch Read Tests
// =============================================================================

#[tokio::test]
async fn test_mixed_present_and_absent() {
    let (_store, proxy) = setup();
    proxy.set(page_key(1), &json!({"n": 1})).await.unwrap();
    proxy.set(page_key(3), &json!({"n": 3})).await.unwrap();

    let keys = vec![page_key(1), page_key(2), page_key(3)];
    let result = multi_get::<Value>(&proxy, &keys).await.unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.hits(), 2);
    assert_eq!(result.get(&page_key(1)).unwrap().value, json!({"n": 1}));
    assert!(result.get(&page_key(2)).is_none());
    assert_eq!(result.get(&page_key(3)).unwrap().value, json!({"n": 3}));

    let order: Vec<KeyDescriptor> = result.into_iter().map(|(k, _)| k).collect();
    assert_eq!(order, keys);
}

#[tokio::test]
async fn test_lookup_ignores_field_order() {
    let (_store, proxy) = setup();
    let written = KeyDescriptor::fields([("a", json!(1)), ("b", json!(2))]);
    let asked = KeyDescriptor::fields([("b", json!(2)), ("a", json!(1))]);
    proxy.set(written, &"v").await.unwrap();

    let result = BatchReader::new(&proxy)
        .read::<String>(&[asked.clone()])
        .await
        .unwrap();
    assert_eq!(result.get(&asked).unwrap().value, "v");
}

#[tokio::test]
async fn test_empty_batch() {
    let (_store, proxy) = setup();
    let result = multi_get::<Value>(&proxy, &[]).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_chunked_entries_are_reassembled() {
    let (store, proxy) = setup();
    let long = noisy_text(5000);
    let other = noisy_text(3000);
    proxy.set(page_key(1), &long).await.unwrap();
    proxy.set(page_key(2), &"short").await.unwrap();
    proxy.set(page_key(3), &other).await.unwrap();

    let hashed = proxy.hash_key(&page_key(1));
    assert!(!store.keys_matching(&format!("{}#*", hashed)).is_empty());

    let keys = vec![page_key(1), page_key(2), page_key(3)];
    let result = multi_get::<String>(&proxy, &keys).await.unwrap();
    assert_eq!(result.hits(), 3);
    assert_eq!(result.get(&page_key(1)).unwrap().value, long);
    assert_eq!(result.get(&page_key(2)).unwrap().value, "short");
    assert_eq!(result.get(&page_key(3)).unwrap().value, other);
}

// =============================================================================
// Failure Isolation Tests
// =============================================================================

#[tokio::test]
async fn test_poisoned_item_is_isolated() {
    let (store, proxy) = setup();
    for page in 1..=3 {
        proxy.set(page_key(page), &page).await.unwrap();
    }
    store.poison_key(proxy.hash_key(&page_key(2)).into_string());

    let keys = vec![page_key(1), page_key(2), page_key(3)];
    let result = multi_get::<u32>(&proxy, &keys).await.unwrap();
    assert_eq!(result.get(&page_key(1)).unwrap().value, 1);
    assert!(result.get(&page_key(2)).is_none());
    assert_eq!(result.get(&page_key(3)).unwrap().value, 3);
}

#[tokio::test]
async fn test_torn_chunk_set_is_isolated() {
    let (store, proxy) = setup();
    proxy.set(page_key(1), &noisy_text(5000)).await.unwrap();
    proxy.set(page_key(2), &"intact").await.unwrap();

    let hashed = proxy.hash_key(&page_key(1));
    store.poison_key(hashed.fragment(0));

    let keys = vec![page_key(1), page_key(2)];
    let result = multi_get::<String>(&proxy, &keys).await.unwrap();
    assert!(result.get(&page_key(1)).is_none());
    assert_eq!(result.get(&page_key(2)).unwrap().value, "intact");
}

#[tokio::test]
async fn test_undecodable_item_is_isolated() {
    let (store, proxy) = setup();
    proxy.set(page_key(1), &"ok").await.unwrap();
    proxy.set(page_key(2), &"soon corrupt").await.unwrap();
    store.poke(proxy.hash_key(&page_key(2)).as_str(), vec![0xff; 8]);

    let keys = vec![page_key(1), page_key(2)];
    let result = multi_get::<String>(&proxy, &keys).await.unwrap();
    assert_eq!(result.hits(), 1);
    assert!(result.get(&page_key(2)).is_none());
}

#[tokio::test]
async fn test_offline_store_fails_batch() {
    let (store, proxy) = setup();
    proxy.set(page_key(1), &1).await.unwrap();
    store.set_offline(true);

    let err = multi_get::<u32>(&proxy, &[page_key(1)]).await.unwrap_err();
    assert!(err.is_connectivity());
}
