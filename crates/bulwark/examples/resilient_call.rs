// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Protects a flaky upstream with a cache, a rate limiter and a circuit breaker.
//!
//! Run with `RUST_LOG=debug` to see every cache hit, miss and breaker transition.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bulwark::{Admission, CallOptions, Resilience, ResilienceConfig, ResilienceError};
use larder::{CacheMode, TieredCache};
use larder_memory::LocalCache;
use tick::Clock;
use tracing_subscriber::EnvFilter;

static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

/// Fails every call after the second one, like a service that has just gone down.
async fn summarize(document: &str) -> Result<String, std::io::Error> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if ATTEMPTS.fetch_add(1, Ordering::SeqCst) >= 2 {
        return Err(std::io::Error::other("inference backend unavailable"));
    }
    Ok(format!("summary of {document}"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let clock = Clock::new_tokio();
    let cache = TieredCache::<String, String>::builder(clock.clone())
        .mode(CacheMode::Memory)
        .local(
            LocalCache::builder(clock.clone())
                .capacity(100)
                .default_ttl(Duration::from_secs(60))
                .build(),
        )
        .build()
        .await;

    let config = ResilienceConfig::platform_defaults().with_transition_logging(true);
    let resilience = Resilience::new(cache, config, clock);
    let options = CallOptions::new()
        .admission(Admission::WaitFor(Duration::from_secs(1)))
        .timeout(Duration::from_secs(2));

    for document in ["a", "b", "a", "c", "d", "e", "f", "b"] {
        let result = resilience
            .call_with(document, "inference", options, || summarize(document))
            .await;

        match result {
            Ok(summary) => println!("{document}: {summary}"),
            Err(ResilienceError::CircuitOpen { retry_after, .. }) => {
                println!("{document}: inference is down, retry in {retry_after:?}");
            }
            Err(error) => println!("{document}: {error}"),
        }
    }

    let snapshot = resilience.breaker_snapshot("inference");
    println!(
        "inference breaker: {} after {} trip(s), {} call(s) rejected",
        snapshot.state, snapshot.trips, snapshot.rejected
    );
}
