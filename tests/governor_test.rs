//! Allocation governor behavior observed through engine statistics.

mod common;

use rosie_engine::{RosieError, ERR_ENGINE_CALL_FAILED};

const MIB: usize = 1024 * 1024;

#[test]
fn test_limit_floor() {
    let engine = common::engine();
    let err = engine.set_alloc_limit(9).unwrap_err();
    assert!(matches!(err, RosieError::AllocLimitTooLow(9)));
    assert_eq!(err.status(), ERR_ENGINE_CALL_FAILED);
    assert_eq!(engine.set_alloc_limit(0).unwrap().limit_mb, 0);
    assert_eq!(engine.set_alloc_limit(10).unwrap().limit_mb, 10);
}

#[test]
fn test_query_returns_relative_limit() {
    let engine = common::engine();
    assert_eq!(engine.alloc_limit().unwrap().limit_mb, 0);
    engine.set_alloc_limit(32).unwrap();
    let report = engine.alloc_limit().unwrap();
    assert_eq!(report.limit_mb, 32);
}

#[test]
fn test_query_collects_twice() {
    let engine = common::engine();
    let before = engine.stats().unwrap().collections;
    engine.alloc_limit().unwrap();
    assert_eq!(engine.stats().unwrap().collections, before + 2);
}

#[test]
fn test_unlimited_engine_heap_stays_bounded() {
    let engine = common::engine();
    let handle = engine.compile(b"[:alpha:]+").unwrap().handle;
    let baseline = engine.stats().unwrap().heap_bytes;
    let input = vec![b'a'; MIB];
    let mut peak = 0;
    for _ in 0..200 {
        engine.match_pattern(handle, 1, "line", &input).unwrap();
        peak = peak.max(engine.stats().unwrap().heap_bytes);
    }
    let stats = engine.stats().unwrap();
    assert_eq!(stats.governor_collections, 0);
    assert!(stats.collections >= 1);
    assert!(peak <= baseline + 40 * MIB, "peak {peak} baseline {baseline}");
}

#[test]
fn test_crossing_ceiling_triggers_collection() {
    let engine = common::engine();
    let handle = engine.compile(b"[:alpha:]+").unwrap().handle;
    engine.set_alloc_limit(10).unwrap();
    let baseline = engine.stats().unwrap().heap_bytes;

    let input = vec![b'a'; MIB];
    let mut usage = Vec::new();
    for _ in 0..20 {
        engine.match_pattern(handle, 1, "line", &input).unwrap();
        usage.push(engine.stats().unwrap().heap_bytes);
    }

    let stats = engine.stats().unwrap();
    assert!(stats.governor_collections >= 1);
    assert!(
        usage.windows(2).any(|w| w[1] < w[0]),
        "heap usage never dropped: {usage:?}"
    );
    let peak = usage.iter().copied().max().unwrap();
    assert!(peak <= baseline + 13 * MIB, "peak {peak} baseline {baseline}");
}

#[test]
fn test_limits_are_per_engine() {
    let limited = common::engine();
    let unlimited = common::engine();
    limited.set_alloc_limit(10).unwrap();
    assert_eq!(unlimited.alloc_limit().unwrap().limit_mb, 0);

    let handle = unlimited.compile(b"[:alpha:]+").unwrap().handle;
    let input = vec![b'a'; MIB];
    for _ in 0..15 {
        unlimited.match_pattern(handle, 1, "line", &input).unwrap();
    }
    assert_eq!(unlimited.stats().unwrap().governor_collections, 0);
    assert_eq!(limited.stats().unwrap().governor_collections, 0);
}
