// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `TieredCache` tier selection, degradation and promotion.

use std::time::Duration;

use larder::{ActiveTier, CacheMode, TieredCache};
use larder_remote::DistributedCache;
use larder_remote::testing::FakeRemoteStore;
use larder_tier::CacheTier;
use tick::{Clock, ClockControl};

const INTERVAL: Duration = Duration::from_secs(30);

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn key(name: &str) -> String {
    name.to_string()
}

struct Harness {
    control: ClockControl,
    store: FakeRemoteStore,
}

impl Harness {
    fn new() -> Self {
        Self::with_control(ClockControl::new())
    }

    fn with_control(control: ClockControl) -> Self {
        let store = FakeRemoteStore::new(control.to_clock());
        Self { control, store }
    }

    fn distributed(&self) -> DistributedCache<String, i32, FakeRemoteStore> {
        DistributedCache::builder(self.store.clone(), self.clock())
            .namespace("test")
            .build()
    }

    fn clock(&self) -> Clock {
        self.control.to_clock()
    }

    async fn build(&self) -> TieredCache<String, i32, FakeRemoteStore> {
        TieredCache::builder(self.clock())
            .distributed(self.distributed())
            .reprobe_interval(Some(INTERVAL))
            .build()
            .await
    }
}

#[test]
fn healthy_store_serves_from_distributed_tier() {
    block_on(async {
        let harness = Harness::new();
        let cache = harness.build().await;

        assert_eq!(cache.mode(), CacheMode::Distributed);
        assert!(!cache.is_degraded());
        assert_eq!(cache.active_tier(), ActiveTier::Distributed);
        assert_eq!(harness.store.probe_count(), 1);

        cache.set(&key("a"), 1, None).await.expect("set failed");

        assert_eq!(harness.store.keys(), vec!["test:a".to_string()]);
        assert_eq!(cache.local().len(), Some(0));
        assert_eq!(cache.get(&key("a")).await.expect("get failed"), Some(1));
        assert!(cache.has(&key("a")).await.expect("has failed"));
    });
}

#[test]
fn memory_mode_never_touches_the_store() {
    block_on(async {
        let harness = Harness::new();
        let cache = TieredCache::builder(harness.clock())
            .distributed(harness.distributed())
            .mode(CacheMode::Memory)
            .build()
            .await;

        cache.set(&key("a"), 1, None).await.expect("set failed");

        assert_eq!(cache.active_tier(), ActiveTier::Local);
        assert!(!cache.is_degraded());
        assert!(!cache.reprobe_now().await);
        assert_eq!(harness.store.probe_count(), 0);
        assert!(harness.store.keys().is_empty());
        assert_eq!(cache.get(&key("a")).await.expect("get failed"), Some(1));
    });
}

#[test]
fn failed_probe_starts_degraded_on_local_tier() {
    block_on(async {
        let harness = Harness::new();
        harness.store.set_available(false);
        let cache = harness.build().await;

        assert!(cache.is_degraded());
        assert_eq!(cache.active_tier(), ActiveTier::Local);

        cache.set(&key("a"), 1, None).await.expect("set failed");

        assert_eq!(cache.get(&key("a")).await.expect("get failed"), Some(1));
        assert_eq!(cache.local().len(), Some(1));
        assert!(harness.store.keys().is_empty());
    });
}

#[test]
fn hanging_probe_is_bounded_by_probe_timeout() {
    block_on(async {
        let harness = Harness::with_control(ClockControl::new().auto_advance_timers(true));
        harness.store.set_hanging(true);
        let watch = harness.clock().stopwatch();

        let cache = TieredCache::builder(harness.clock())
            .distributed(harness.distributed())
            .probe_timeout(Duration::from_millis(250))
            .build()
            .await;

        assert!(cache.is_degraded());
        assert_eq!(watch.elapsed(), Duration::from_millis(250));
    });
}

#[test]
fn reprobe_waits_for_interval_then_promotes() {
    block_on(async {
        let harness = Harness::new();
        harness.store.set_available(false);
        let cache = harness.build().await;
        assert_eq!(harness.store.probe_count(), 1);

        harness.store.set_available(true);
        harness.control.advance(INTERVAL - Duration::from_secs(1));
        cache.get(&key("a")).await.expect("get failed");

        assert!(cache.is_degraded(), "re-probe must wait for the interval");
        assert_eq!(harness.store.probe_count(), 1);

        harness.control.advance(Duration::from_secs(1));
        cache.set(&key("a"), 1, None).await.expect("set failed");

        assert_eq!(harness.store.probe_count(), 2);
        assert!(!cache.is_degraded());
        assert_eq!(harness.store.keys(), vec!["test:a".to_string()]);
    });
}

#[test]
fn failed_reprobe_waits_another_interval() {
    block_on(async {
        let harness = Harness::new();
        harness.store.set_available(false);
        let cache = harness.build().await;

        harness.control.advance(INTERVAL);
        cache.get(&key("a")).await.expect("get failed");
        assert_eq!(harness.store.probe_count(), 2);

        for _ in 0..5 {
            cache.get(&key("a")).await.expect("get failed");
        }
        assert_eq!(harness.store.probe_count(), 2, "probes are periodic, not per operation");
        assert!(cache.is_degraded());
    });
}

#[test]
fn promotion_does_not_migrate_local_entries() {
    block_on(async {
        let harness = Harness::new();
        harness.store.set_available(false);
        let cache = harness.build().await;
        cache.set(&key("a"), 1, None).await.expect("set failed");

        harness.store.set_available(true);
        assert!(cache.reprobe_now().await);

        assert_eq!(cache.get(&key("a")).await.expect("get failed"), None);
        assert_eq!(cache.local().get(&key("a")).await.expect("get failed"), Some(1));
    });
}

#[test]
fn runtime_failure_falls_back_and_demotes() {
    block_on(async {
        let harness = Harness::new();
        let cache = harness.build().await;
        cache.set(&key("a"), 1, None).await.expect("set failed");

        harness.store.set_available(false);

        assert_eq!(cache.get(&key("a")).await.expect("get failed"), None);
        assert!(cache.is_degraded());

        cache.set(&key("b"), 2, None).await.expect("set failed");
        assert_eq!(cache.get(&key("b")).await.expect("get failed"), Some(2));
        assert_eq!(cache.local().len(), Some(1));
    });
}

#[test]
fn runtime_failure_without_demotion_keeps_distributed_tier() {
    block_on(async {
        let harness = Harness::new();
        let cache = TieredCache::builder(harness.clock())
            .distributed(harness.distributed())
            .demote_on_error(false)
            .build()
            .await;

        harness.store.set_available(false);
        cache.set(&key("a"), 1, None).await.expect("set failed");

        assert!(!cache.is_degraded());
        assert_eq!(cache.local().len(), Some(1), "the failed write lands on the local tier");

        harness.store.set_available(true);
        cache.set(&key("b"), 2, None).await.expect("set failed");
        assert_eq!(harness.store.keys(), vec!["test:b".to_string()]);
        assert_eq!(cache.distributed().map(|d| d.health().consecutive_failures), Some(0));
    });
}

#[test]
fn disabled_reprobe_stays_degraded_until_forced() {
    block_on(async {
        let harness = Harness::new();
        harness.store.set_available(false);
        let cache = TieredCache::builder(harness.clock())
            .distributed(harness.distributed())
            .reprobe_interval(None)
            .build()
            .await;

        harness.store.set_available(true);
        harness.control.advance(Duration::from_secs(3600));
        cache.get(&key("a")).await.expect("get failed");

        assert!(cache.is_degraded());
        assert_eq!(harness.store.probe_count(), 1);

        assert!(cache.reprobe_now().await);
        assert_eq!(cache.active_tier(), ActiveTier::Distributed);
    });
}

#[test]
fn delete_reaches_both_tiers() {
    block_on(async {
        let harness = Harness::new();
        harness.store.set_available(false);
        let cache = harness.build().await;
        cache.set(&key("a"), 1, None).await.expect("set failed");

        harness.store.set_available(true);
        assert!(cache.reprobe_now().await);
        cache.set(&key("a"), 2, None).await.expect("set failed");

        cache.delete(&key("a")).await.expect("delete failed");

        assert!(harness.store.keys().is_empty());
        assert_eq!(cache.local().len(), Some(0));
    });
}

#[test]
fn distributed_write_drops_the_local_copy() {
    block_on(async {
        let harness = Harness::new();
        harness.store.set_available(false);
        let cache = harness.build().await;
        cache.set(&key("a"), 1, None).await.expect("set failed");

        harness.store.set_available(true);
        assert!(cache.reprobe_now().await);
        cache.set(&key("a"), 2, None).await.expect("set failed");

        assert_eq!(cache.local().len(), Some(0));

        harness.store.set_available(false);

        assert_eq!(cache.get(&key("a")).await.expect("get failed"), None, "the overwritten local value is gone");
        assert!(cache.is_degraded());
    });
}

#[test]
fn clear_only_removes_own_namespace() {
    block_on(async {
        let harness = Harness::new();
        let cache = harness.build().await;
        let other = DistributedCache::<String, i32, _>::builder(harness.store.clone(), harness.clock())
            .namespace("other")
            .build();

        cache.set(&key("a"), 1, None).await.expect("set failed");
        other.set(&key("b"), 2, None).await.expect("set failed");

        cache.clear().await.expect("clear failed");

        assert_eq!(harness.store.keys(), vec!["other:b".to_string()]);
    });
}

#[test]
fn distributed_ttl_is_enforced_by_the_store() {
    block_on(async {
        let harness = Harness::new();
        let cache = harness.build().await;

        cache.set(&key("a"), 1, Some(Duration::from_secs(10))).await.expect("set failed");
        harness.control.advance(Duration::from_secs(10));

        assert_eq!(cache.get(&key("a")).await.expect("get failed"), None);
    });
}

#[test]
fn len_reports_the_active_tier() {
    block_on(async {
        let harness = Harness::new();
        let cache = harness.build().await;
        assert_eq!(cache.len(), None);

        harness.store.set_available(false);
        cache.set(&key("a"), 1, None).await.expect("set failed");

        assert_eq!(cache.len(), Some(1));
    });
}

#[test]
fn explicit_local_tier_is_used() {
    block_on(async {
        let clock = Clock::new_frozen();
        let local = larder::LocalCache::<String, i32>::new(clock.clone(), 1);
        let cache = TieredCache::builder(clock).local(local.clone()).build().await;

        cache.set(&key("a"), 1, None).await.expect("set failed");
        cache.set(&key("b"), 2, None).await.expect("set failed");

        assert_eq!(local.len(), Some(1));
        assert_eq!(local.get(&key("b")).await.expect("get failed"), Some(2));
    });
}
