//! Proxy Tests
//!
//! These tests verify:
//! - Keys are hashed and values packed transparently
//! - Large values are compressed
//! - The default expiry applies unless the caller gives one
//! - Misses, corrupt records and torn chunk sets read as `None`
//! - Connection failures are surfaced
//! - Dynamic routing by command name

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use cacheproxy::chunk::Record;
use cacheproxy::codec::Envelope;
use cacheproxy::protocol::Command;
use cacheproxy::{
    CacheConfig, CacheError, CacheProxy, CommandRole, Expiry, KeyDescriptor, MemoryStore,
    Profile, ProxyReply, Reply, Store,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(config: CacheConfig) -> (Arc<MemoryStore>, CacheProxy) {
    let store = Arc::new(MemoryStore::new());
    let proxy = CacheProxy::new(store.clone(), config).unwrap();
    (store, proxy)
}

fn setup_test_profile() -> (Arc<MemoryStore>, CacheProxy) {
    setup(CacheConfig::for_profile(Profile::Test))
}

fn listing_key(page: u32) -> KeyDescriptor {
    KeyDescriptor::fields([
        ("url", json!("https://example.com/listing")),
        ("page", json!(page)),
    ])
}

/// Poorly compressible numbers so values stay large after packing
fn noisy(count: usize) -> Vec<u32> {
    let mut state: u32 = 0x2545_f491;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            state
        })
        .collect()
}

/// TTL of a physical record, read straight from the store
async fn physical_ttl(store: &MemoryStore, key: &str) -> i64 {
    let command = Command::Raw {
        name: "TTL".into(),
        args: vec![key.as_bytes().to_vec()],
    };
    match store.execute(command).await.unwrap() {
        Reply::Integer(n) => n,
        other => panic!("Expected an integer TTL, got {:?}", other),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Listing {
    title: String,
    items: Vec<u32>,
}

// =============================================================================
// Write / Read Tests
// =============================================================================

#[tokio::test]
async fn test_set_then_get_typed_value() {
    let (_store, proxy) = setup_test_profile();
    let listing = Listing {
        title: "first".into(),
        items: vec![1, 2, 3],
    };

    let ack = proxy.set(listing_key(1), &listing).await.unwrap();
    assert!(ack.is_ok());

    let record = proxy.get::<Listing>(listing_key(1)).await.unwrap().unwrap();
    assert_eq!(record.value, listing);
    assert!(record.hashed_key.as_str().starts_with("test:"));
    assert!(record.age() < chrono::Duration::seconds(5));
}

#[tokio::test]
async fn test_physical_key_is_hashed() {
    let (store, proxy) = setup_test_profile();
    proxy.set("plain-key", &"v").await.unwrap();

    let keys = store.keys_matching("*");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].len(), "test:".len() + 64);
    assert!(!keys[0].contains("plain-key"));
}

#[tokio::test]
async fn test_field_order_does_not_change_key() {
    let (_store, proxy) = setup_test_profile();
    let a = KeyDescriptor::fields([("a", json!(1)), ("b", json!(2))]);
    let b = KeyDescriptor::fields([("b", json!(2)), ("a", json!(1))]);

    proxy.set(a, &"shared").await.unwrap();
    let record = proxy.get::<String>(b).await.unwrap().unwrap();
    assert_eq!(record.value, "shared");
}

#[tokio::test]
async fn test_get_absent_key_is_none() {
    let (_store, proxy) = setup_test_profile();
    assert!(proxy.get::<Value>("nothing-here").await.unwrap().is_none());
}

#[tokio::test]
async fn test_large_value_is_compressed_and_round_trips() {
    let config = CacheConfig::builder()
        .profile(Profile::Test)
        .compress_threshold(800)
        .max_chunk(None)
        .build();
    let (store, proxy) = setup(config);
    let value = json!({ "abc": "x".repeat(1000) });

    proxy.set("big", &value).await.unwrap();

    let hashed = proxy.hash_key(&"big".into());
    let raw = store.peek(hashed.as_str()).unwrap();
    match Record::from_bytes(&raw).unwrap() {
        Record::Single(payload) => assert!(Envelope::from_bytes(&payload).unwrap().is_compressed()),
        Record::Head(_) => panic!("Expected a single record"),
    }

    let record = proxy.get::<Value>("big").await.unwrap().unwrap();
    assert_eq!(record.value, value);

    assert_eq!(proxy.del("big").await.unwrap(), 1);
    assert!(proxy.get::<Value>("big").await.unwrap().is_none());
}

// =============================================================================
// Chunking Tests
// =============================================================================

#[tokio::test]
async fn test_chunked_value_round_trips_and_deletes() {
    let (store, proxy) = setup_test_profile();
    let items = noisy(2000);
    let listing = Listing {
        title: "long".into(),
        items,
    };

    proxy.set(listing_key(7), &listing).await.unwrap();
    let hashed = proxy.hash_key(&listing_key(7));
    let fragments = store.keys_matching(&format!("{}#*", hashed));
    assert!(fragments.len() > 1);

    let record = proxy.get::<Listing>(listing_key(7)).await.unwrap().unwrap();
    assert_eq!(record.value, listing);

    let removed = proxy.del(listing_key(7)).await.unwrap();
    assert_eq!(removed, fragments.len() as u64 + 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_torn_chunk_set_reads_as_miss() {
    let (store, proxy) = setup_test_profile();
    let value = noisy(2000);
    proxy.set("torn", &value).await.unwrap();

    let hashed = proxy.hash_key(&"torn".into());
    store.poke(&hashed.fragment(0), Vec::new());
    assert!(proxy.get::<Vec<u32>>("torn").await.unwrap().is_none());

    store.del(vec![hashed.fragment(1)]).await.unwrap();
    assert!(proxy.get::<Vec<u32>>("torn").await.unwrap().is_none());
}

#[tokio::test]
async fn test_overwrite_with_smaller_value_removes_stale_fragments() {
    let (store, proxy) = setup_test_profile();
    let big = noisy(3000);
    proxy.set("shrinks", &big).await.unwrap();

    let hashed = proxy.hash_key(&"shrinks".into());
    assert!(store.keys_matching(&format!("{}#*", hashed)).len() > 2);

    proxy.set("shrinks", &vec![1u32]).await.unwrap();
    assert!(store.keys_matching(&format!("{}#*", hashed)).is_empty());

    let record = proxy.get::<Vec<u32>>("shrinks").await.unwrap().unwrap();
    assert_eq!(record.value, vec![1]);
}

// =============================================================================
// Expiry Tests
// =============================================================================

#[tokio::test]
async fn test_default_expiry_is_applied() {
    let (_store, proxy) = setup_test_profile();
    proxy.set("ttl", &1).await.unwrap();

    let ttl = proxy.ttl("ttl").await.unwrap();
    assert!((7195..=7200).contains(&ttl), "ttl was {}", ttl);
}

#[tokio::test]
async fn test_explicit_expiry_replaces_default() {
    let (_store, proxy) = setup_test_profile();
    proxy.set_with("short", &1, Some(Expiry::Ex(30))).await.unwrap();

    let ttl = proxy.ttl("short").await.unwrap();
    assert!((25..=30).contains(&ttl), "ttl was {}", ttl);
}

#[tokio::test]
async fn test_no_default_expiry_means_persistent() {
    let config = CacheConfig::builder()
        .profile(Profile::Test)
        .expiration(None)
        .build();
    let (_store, proxy) = setup(config);
    proxy.set("forever", &1).await.unwrap();

    assert_eq!(proxy.ttl("forever").await.unwrap(), -1);
    assert_eq!(proxy.ttl("missing").await.unwrap(), -2);
}

#[tokio::test]
async fn test_zero_expiration_means_persistent() {
    let config = CacheConfig::builder()
        .profile(Profile::Test)
        .expiration(Some(0))
        .build();
    let (_store, proxy) = setup(config);
    assert_eq!(proxy.default_expiry(), None);

    proxy.set("zero", &1).await.unwrap();
    assert_eq!(proxy.get::<u32>("zero").await.unwrap().unwrap().value, 1);
    assert_eq!(proxy.ttl("zero").await.unwrap(), -1);
}

#[tokio::test]
async fn test_expiry_commands_reach_every_fragment() {
    let (store, proxy) = setup_test_profile();
    proxy.set("big", &noisy(2000)).await.unwrap();

    let hashed = proxy.hash_key(&"big".into());
    let fragments = store.keys_matching(&format!("{}#*", hashed));
    assert!(fragments.len() > 1);

    assert!(proxy.persist("big").await.unwrap());
    assert_eq!(physical_ttl(&store, hashed.as_str()).await, -1);
    for fragment in &fragments {
        assert_eq!(physical_ttl(&store, fragment).await, -1, "{}", fragment);
    }

    assert!(proxy.expire("big", 100).await.unwrap());
    for fragment in &fragments {
        assert_eq!(physical_ttl(&store, fragment).await, 100, "{}", fragment);
    }

    let reply = proxy.call("expire", "big", &[json!(30)]).await.unwrap();
    assert_eq!(reply, ProxyReply::Forwarded(Reply::Integer(1)));
    assert_eq!(physical_ttl(&store, hashed.as_str()).await, 30);
    for fragment in &fragments {
        assert_eq!(physical_ttl(&store, fragment).await, 30, "{}", fragment);
    }

    let record = proxy.get::<Vec<u32>>("big").await.unwrap().unwrap();
    assert_eq!(record.value, noisy(2000));
}

#[tokio::test]
async fn test_passthrough_commands_use_hashed_key() {
    let (_store, proxy) = setup_test_profile();
    proxy.set("k", &"v").await.unwrap();

    assert!(proxy.exists("k").await.unwrap());
    assert!(proxy.persist("k").await.unwrap());
    assert_eq!(proxy.expire_time("k").await.unwrap(), -1);
    assert!(proxy.expire("k", 100).await.unwrap());
    assert!(proxy.expire_time("k").await.unwrap() > chrono::Utc::now().timestamp());
    assert!(!proxy.exists("other").await.unwrap());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_corrupt_record_reads_as_miss() {
    let (store, proxy) = setup_test_profile();
    proxy.set("corrupt", &"v").await.unwrap();

    let hashed = proxy.hash_key(&"corrupt".into());
    store.poke(hashed.as_str(), b"not a record".to_vec());
    assert!(proxy.get::<String>("corrupt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_error_on_read_is_miss() {
    let (store, proxy) = setup_test_profile();
    proxy.set("poisoned", &"v").await.unwrap();

    store.poison_key(proxy.hash_key(&"poisoned".into()).into_string());
    assert!(proxy.get::<String>("poisoned").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_error_on_write_propagates() {
    let (store, proxy) = setup_test_profile();
    store.poison_key(proxy.hash_key(&"poisoned".into()).into_string());

    let err = proxy.set("poisoned", &"v").await.unwrap_err();
    assert!(matches!(err, CacheError::Store(_)));
}

#[tokio::test]
async fn test_offline_store_is_connectivity_error() {
    let (store, proxy) = setup_test_profile();
    store.set_offline(true);

    let err = proxy.get::<Value>("k").await.unwrap_err();
    assert!(err.is_connectivity());
    assert!(proxy.set("k", &1).await.unwrap_err().is_connectivity());
    assert!(proxy.del("k").await.unwrap_err().is_connectivity());

    store.set_offline(false);
    assert!(proxy.get::<Value>("k").await.unwrap().is_none());
}

#[tokio::test]
async fn test_connectivity_probe() {
    let (store, proxy) = setup_test_profile();
    proxy.check_connectivity().await.unwrap();
    assert!(store.is_empty());

    store.set_offline(true);
    assert!(proxy.check_connectivity().await.is_err());
}

// =============================================================================
// Dynamic Routing Tests
// =============================================================================

#[tokio::test]
async fn test_call_routes_by_role() {
    let (_store, proxy) = setup_test_profile();

    let ack = proxy
        .call("set", "dyn", &[json!({"n": 1}), json!("EX"), json!(60)])
        .await
        .unwrap();
    assert_eq!(ack, ProxyReply::Ack(Reply::ok()));

    match proxy.call("get", "dyn", &[]).await.unwrap() {
        ProxyReply::Record(Some(record)) => assert_eq!(record.value, json!({"n": 1})),
        other => panic!("Expected a record, got {:?}", other),
    }

    match proxy.call("ttl", "dyn", &[]).await.unwrap() {
        ProxyReply::Forwarded(Reply::Integer(ttl)) => assert!((55..=60).contains(&ttl)),
        other => panic!("Expected a forwarded integer, got {:?}", other),
    }

    assert_eq!(
        proxy.call("del", "dyn", &[]).await.unwrap(),
        ProxyReply::Deleted(1)
    );
}

#[tokio::test]
async fn test_call_with_configured_alias() {
    let config = CacheConfig::builder()
        .profile(Profile::Test)
        .command_role("store", CommandRole::Write)
        .build();
    let (_store, proxy) = setup(config);

    proxy.call("store", "aliased", &[json!(5)]).await.unwrap();
    let record = proxy.get::<u32>("aliased").await.unwrap().unwrap();
    assert_eq!(record.value, 5);
}

#[tokio::test]
async fn test_renamed_roles_still_delete_chunk_sets() {
    let mut config = CacheConfig::for_profile(Profile::Test);
    config.command_roles = BTreeMap::from([
        ("put".to_string(), CommandRole::Write),
        ("fetch".to_string(), CommandRole::Read),
        ("remove".to_string(), CommandRole::Delete),
    ]);
    let (store, proxy) = setup(config);

    proxy.call("put", "renamed", &[json!(noisy(2000))]).await.unwrap();
    let hashed = proxy.hash_key(&"renamed".into());
    let fragments = store.keys_matching(&format!("{}#*", hashed)).len();
    assert!(fragments > 1);

    match proxy.call("fetch", "renamed", &[]).await.unwrap() {
        ProxyReply::Record(Some(record)) => assert_eq!(record.value, json!(noisy(2000))),
        other => panic!("Expected a record, got {:?}", other),
    }
    assert_eq!(
        proxy.call("remove", "renamed", &[]).await.unwrap(),
        ProxyReply::Deleted(fragments as u64 + 1)
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_call_write_without_value_is_rejected() {
    let (_store, proxy) = setup_test_profile();
    let err = proxy.call("set", "k", &[]).await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_call_rejects_unknown_write_option() {
    let (_store, proxy) = setup_test_profile();
    let err = proxy
        .call("set", "k", &[json!(1), json!("NX")])
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidArgument(_)));
}
