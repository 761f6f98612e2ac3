// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `CacheEntry`.

use std::time::{Duration, Instant};

use larder_tier::CacheEntry;

#[test]
fn new_entry_never_expires() {
    let now = Instant::now();
    let entry = CacheEntry::new("value", now);

    assert_eq!(*entry.value(), "value");
    assert!(entry.expires_at().is_none());
    assert!(!entry.is_expired(now + Duration::from_secs(86_400)));
    assert!(entry.remaining_ttl(now).is_none());
}

#[test]
fn with_ttl_expires_when_ttl_elapses() {
    let now = Instant::now();
    let entry = CacheEntry::with_ttl(7, now, Duration::from_millis(100));

    assert_eq!(entry.expires_at(), Some(now + Duration::from_millis(100)));
    assert!(!entry.is_expired(now + Duration::from_millis(99)));
    assert!(entry.is_expired(now + Duration::from_millis(100)));
}

#[test]
fn zero_ttl_is_expired_immediately() {
    let now = Instant::now();
    let entry = CacheEntry::with_ttl(7, now, Duration::ZERO);
    assert!(entry.is_expired(now));
}

#[test]
fn unrepresentable_ttl_never_expires() {
    let now = Instant::now();
    let entry = CacheEntry::with_ttl(7, now, Duration::MAX);
    assert!(entry.expires_at().is_none());
}

#[test]
fn remaining_ttl_saturates_at_zero() {
    let now = Instant::now();
    let entry = CacheEntry::with_ttl(7, now, Duration::from_secs(10));

    assert_eq!(entry.remaining_ttl(now + Duration::from_secs(4)), Some(Duration::from_secs(6)));
    assert_eq!(entry.remaining_ttl(now + Duration::from_secs(40)), Some(Duration::ZERO));
}

#[test]
fn touch_updates_last_accessed_at() {
    let now = Instant::now();
    let mut entry = CacheEntry::with_expiry("value", now, None);
    assert_eq!(entry.last_accessed_at(), now);

    let later = now + Duration::from_secs(3);
    entry.touch(later);

    assert_eq!(entry.last_accessed_at(), later);
    assert_eq!(*entry, "value");
    assert_eq!(entry.into_value(), "value");
}
