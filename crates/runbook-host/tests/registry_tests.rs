//! Snapshot consistency under concurrent readers

use chrono::{TimeZone, Utc};
use runbook_host::{ListFilter, Script, ScriptRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SET_SIZE: usize = 50;

/// Every script of generation `gen` carries the same label
fn generation(gen: usize) -> Vec<Script> {
    (0..SET_SIZE)
        .map(|i| Script {
            name: format!("script-{}", i),
            label: Some(format!("gen-{}", gen)),
            updated_at: Utc.timestamp_opt(1_700_000_000 + gen as i64, 0).single(),
            ..Default::default()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_mixed_sets() {
    let registry = Arc::new(ScriptRegistry::new());
    registry.update(generation(0));

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();

    for _ in 0..4 {
        let registry = registry.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut reads = 0usize;
            while !done.load(Ordering::SeqCst) {
                let scripts = registry.list(&ListFilter::new());
                assert_eq!(scripts.len(), SET_SIZE);
                let first = scripts[0].label.clone();
                assert!(
                    scripts.iter().all(|s| s.label == first),
                    "mixed snapshot observed"
                );
                reads += 1;
                tokio::task::yield_now().await;
            }
            reads
        }));
    }

    let writer = {
        let registry = registry.clone();
        tokio::task::spawn_blocking(move || {
            for gen in 1..=200 {
                registry.update(generation(gen));
            }
        })
    };

    writer.await.unwrap();
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }

    assert_eq!(
        registry.get("script-0").unwrap().label.as_deref(),
        Some("gen-200")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_updated_is_monotonic_under_concurrent_writers() {
    let registry = Arc::new(ScriptRegistry::new());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let registry = registry.clone();
            tokio::task::spawn_blocking(move || {
                for gen in 0..50 {
                    // Interleave old and new timestamps
                    let g = if gen % 2 == 0 { w * 50 + gen } else { gen };
                    registry.update(generation(g));
                }
            })
        })
        .collect();

    let mut last = registry.last_updated();
    while !writers.iter().all(|w| w.is_finished()) {
        let now = registry.last_updated();
        assert!(now >= last);
        last = now;
        tokio::task::yield_now().await;
    }

    for writer in writers {
        writer.await.unwrap();
    }

    let max = Utc.timestamp_opt(1_700_000_000 + (3 * 50 + 48) as i64, 0).unwrap();
    assert_eq!(registry.last_updated(), max);
}
