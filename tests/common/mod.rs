//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;

use rosie_engine::{Engine, EngineConfig};

/// The install tree shipped with the repository.
pub fn home() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rosie")
}

pub fn config() -> EngineConfig {
    EngineConfig::new().with_home(home())
}

pub fn engine() -> Engine {
    Engine::with_config(config()).expect("engine boots from the repository install tree")
}

pub fn json(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes).expect("valid JSON")
}
