// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `LocalCache`.

use std::time::Duration;

use larder_memory::{LocalCache, LocalCacheBuilder};
use larder_tier::{CacheTier, DynamicCacheExt};
use tick::{Clock, ClockControl};

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn key(name: &str) -> String {
    name.to_string()
}

fn controlled(capacity: usize) -> (ClockControl, LocalCache<String, i32>) {
    let control = ClockControl::new();
    let cache = LocalCache::builder(control.to_clock()).capacity(capacity).build();
    (control, cache)
}

#[test]
fn get_returns_none_for_missing_key() {
    block_on(async {
        let cache = LocalCache::<String, i32>::new(Clock::new_frozen(), 10);
        assert!(cache.get(&key("missing")).await.expect("get failed").is_none());
    });
}

#[test]
fn set_overwrites_existing_value() {
    block_on(async {
        let cache = LocalCache::<String, i32>::new(Clock::new_frozen(), 10);
        cache.set(&key("k"), 42, None).await.expect("set failed");
        cache.set(&key("k"), 100, None).await.expect("set failed");

        assert_eq!(cache.get(&key("k")).await.expect("get failed"), Some(100));
        assert_eq!(cache.len(), Some(1));
    });
}

#[test]
fn value_is_returned_until_ttl_elapses() {
    block_on(async {
        let (control, cache) = controlled(10);
        cache.set(&key("k"), 7, Some(Duration::from_millis(500))).await.expect("set failed");

        control.advance_millis(499);
        assert_eq!(cache.get(&key("k")).await.expect("get failed"), Some(7));

        control.advance_millis(1);
        assert_eq!(cache.get(&key("k")).await.expect("get failed"), None);
        assert_eq!(cache.len(), Some(0), "expired entry is removed on read");
    });
}

#[test]
fn default_ttl_applies_when_ttl_is_omitted() {
    block_on(async {
        let control = ClockControl::new();
        let cache = LocalCacheBuilder::<String, i32>::new(control.to_clock())
            .default_ttl(Duration::from_secs(60))
            .build();

        cache.set(&key("default"), 1, None).await.expect("set failed");
        cache.set(&key("explicit"), 2, Some(Duration::from_secs(120))).await.expect("set failed");

        control.advance(Duration::from_secs(60));

        assert!(!cache.has(&key("default")).await.expect("has failed"));
        assert!(cache.has(&key("explicit")).await.expect("has failed"));
    });
}

#[test]
fn inserting_past_capacity_evicts_least_recently_accessed() {
    block_on(async {
        let (_control, cache) = controlled(3);
        for (name, value) in [("a", 1), ("b", 2), ("c", 3)] {
            cache.set(&key(name), value, None).await.expect("set failed");
        }

        cache.set(&key("d"), 4, None).await.expect("set failed");

        assert!(!cache.has(&key("a")).await.expect("has failed"));
        for name in ["b", "c", "d"] {
            assert!(cache.has(&key(name)).await.expect("has failed"), "{name} should survive");
        }
        assert_eq!(cache.len(), Some(3));
    });
}

#[test]
fn access_before_insert_protects_from_eviction() {
    block_on(async {
        let (_control, cache) = controlled(3);
        for (name, value) in [("a", 1), ("b", 2), ("c", 3)] {
            cache.set(&key(name), value, None).await.expect("set failed");
        }

        cache.get(&key("a")).await.expect("get failed");
        cache.set(&key("d"), 4, None).await.expect("set failed");

        assert!(cache.has(&key("a")).await.expect("has failed"));
        assert!(!cache.has(&key("b")).await.expect("has failed"));
    });
}

#[test]
fn has_does_not_refresh_recency() {
    block_on(async {
        let (_control, cache) = controlled(2);
        cache.set(&key("a"), 1, None).await.expect("set failed");
        cache.set(&key("b"), 2, None).await.expect("set failed");

        assert!(cache.has(&key("a")).await.expect("has failed"));
        cache.set(&key("c"), 3, None).await.expect("set failed");

        assert!(!cache.has(&key("a")).await.expect("has failed"));
    });
}

#[test]
fn expired_entries_count_towards_capacity_until_touched() {
    block_on(async {
        let (control, cache) = controlled(2);
        cache.set(&key("a"), 1, Some(Duration::from_secs(1))).await.expect("set failed");
        cache.set(&key("b"), 2, None).await.expect("set failed");

        control.advance(Duration::from_secs(2));
        assert_eq!(cache.len(), Some(2));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), Some(1));
    });
}

#[test]
fn delete_and_clear() {
    block_on(async {
        let cache = LocalCache::<String, i32>::new(Clock::new_frozen(), 10);
        cache.delete(&key("nonexistent")).await.expect("delete failed");

        cache.set(&key("a"), 1, None).await.expect("set failed");
        cache.set(&key("b"), 2, None).await.expect("set failed");
        cache.delete(&key("a")).await.expect("delete failed");
        assert!(!cache.has(&key("a")).await.expect("has failed"));

        cache.clear().await.expect("clear failed");
        assert_eq!(cache.is_empty(), Some(true));
    });
}

#[test]
fn zero_capacity_is_treated_as_one() {
    block_on(async {
        let cache = LocalCache::<String, i32>::new(Clock::new_frozen(), 0);
        assert_eq!(cache.capacity(), 1);

        cache.set(&key("a"), 1, None).await.expect("set failed");
        cache.set(&key("b"), 2, None).await.expect("set failed");

        assert_eq!(cache.len(), Some(1));
        assert_eq!(cache.get(&key("b")).await.expect("get failed"), Some(2));
    });
}

#[test]
fn works_behind_dynamic_cache() {
    block_on(async {
        let cache = LocalCache::<String, i32>::builder(Clock::new_frozen()).name("dyn").build().into_dynamic();
        cache.set(&key("a"), 1, None).await.expect("set failed");

        assert_eq!(cache.get(&key("a")).await.expect("get failed"), Some(1));
        assert_eq!(cache.len(), Some(1));
    });
}
