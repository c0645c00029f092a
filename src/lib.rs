//! # Rosie Engine
//!
//! An embedding layer that hosts RPL pattern-matching runtimes inside
//! isolated engines and exposes them through a Rust API and a stable C
//! API.
//!
//! Each [`Engine`] owns one runtime instance behind a mutex. Patterns are
//! compiled into small integer handles, matched with a named output
//! encoder, and released explicitly. Native encoders (`json`, `line`,
//! `byte`, `bool`) take the runtime's fast path; any other name goes
//! through the general path.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rosie_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::with_config(EngineConfig::new().with_home("/usr/local/lib/rosie"))?;
//!
//! let compiled = engine.compile(b"[:digit:]+")?;
//! assert!(compiled.is_compiled());
//!
//! let result = engine.match_pattern(compiled.handle, 1, "json", b"123 abcdef")?;
//! assert_eq!(result.leftover, 7);
//!
//! engine.free_pattern(compiled.handle)?;
//! # Ok::<(), rosie_engine::RosieError>(())
//! ```
//!
//! ## Packages
//!
//! ```rust,ignore
//! let outcome = engine.import("num", None)?;
//! assert!(outcome.ok);
//! let compiled = engine.compile(b"num.int")?;
//! ```
//!
//! ## Threads
//!
//! Engines are independent. Give each thread its own engine, or use an
//! [`EnginePool`] to spread a batch over several.
//!
//! ```rust,ignore
//! use rosie_engine::{EnginePool, PoolConfig};
//!
//! let pool = EnginePool::new(b"[:alpha:]+", PoolConfig::default().with_engines(4))?;
//! let results = pool.match_batch("matches", &inputs)?;
//! ```
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod boot;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod file;
pub mod governor;
pub mod handles;
pub mod pool;
pub mod registry;
pub mod rstr;
pub mod runtime;
pub mod violation;

pub use config::{EngineConfig, ResultOwnership};
pub use dispatch::{FastEncoder, MatchData, MatchPath, MatchResult};
pub use engine::{CompileOutcome, Engine, EngineBuilder, EngineStats, LoadOutcome, TraceResult};
pub use error::{
    Result, RosieError, Sentinel, ERR_ENGINE_CALL_FAILED, ERR_NO_ENCODER, ERR_NO_FILE,
    ERR_NO_MATCH, ERR_NO_PATTERN, ERR_OUT_OF_MEMORY, ERR_SYSCALL_FAILED, SUCCESS,
};
pub use ffi::RosieMatch;
pub use file::{FileMatchReport, FileMatchRequest};
pub use governor::AllocReport;
pub use pool::{EnginePool, PoolConfig};
pub use rstr::RosieString;
pub use runtime::{PatternRuntime, RplRuntime, RuntimeFactory};
pub use violation::{Severity, Violation};
