//! The pattern runtime hosted by each engine.
//!
//! The embedding layer talks to the runtime only through
//! [`PatternRuntime`]. A runtime instance is single-threaded: the engine
//! serializes every call behind its mutex. [`RplRuntime`] is the bundled
//! implementation of the RPL pattern language.

use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::boot::BootImage;
use crate::config::ConfigEntry;
use crate::dispatch::FastEncoder;
use crate::violation::{Violation, ViolationFormatter};

pub mod compiler;
pub mod encode;
pub mod heap;
pub mod ir;
pub mod parser;
mod rpl;
pub mod trace;
pub mod vm;

pub use encode::encode_json;
pub use rpl::RplRuntime;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("boot failed: {0}")]
    Boot(String),

    #[error("internal runtime failure: {0}")]
    Internal(String),

    #[error("cannot encode output: {0}")]
    Encode(String),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Encodes a JSON value to text.
pub type JsonEncoder = fn(&serde_json::Value) -> RuntimeResult<String>;

/// A compiled pattern owned by the runtime that produced it.
pub trait CompiledPattern: Send + Sync + fmt::Debug {
    /// Source text of the expression.
    fn expression(&self) -> &str;

    /// Bytes charged to the runtime heap while the pattern is alive.
    fn footprint(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

pub type PatternRef = Arc<dyn CompiledPattern>;

#[derive(Debug, Default)]
pub struct Compiled {
    /// `None` when the expression has errors.
    pub pattern: Option<PatternRef>,
    pub violations: Vec<Violation>,
}

/// Outcome of `load`, `load_file` and `import`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loaded {
    pub ok: bool,
    pub pkgname: Option<String>,
    pub violations: Vec<Violation>,
}

impl Loaded {
    pub fn failed(violations: Vec<Violation>) -> Self {
        Self {
            ok: false,
            pkgname: None,
            violations,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Input bytes after the end of the match.
    pub leftover: usize,
    pub abend: bool,
    /// Microseconds for the whole call, encoding included.
    pub total_ticks: u64,
    /// Microseconds spent running the pattern.
    pub match_ticks: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FastPayload<'a> {
    /// Runtime-owned buffer, valid until the next match or collection.
    Buffer(&'a [u8]),
    NoMatch,
    /// Output too large for the native buffer, handed over as an allocation.
    Owned(Vec<u8>),
}

#[derive(Debug)]
pub struct FastMatch<'a> {
    pub payload: FastPayload<'a>,
    pub stats: MatchStats,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GeneralPayload {
    Text(String),
    NoMatch,
    UnknownEncoder,
}

#[derive(Debug)]
pub struct GeneralMatch {
    pub payload: GeneralPayload,
    pub stats: MatchStats,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TraceOutcome {
    Trace { matched: bool, text: String },
    UnknownStyle,
}

/// The functional interface an engine consumes.
///
/// Soft outcomes (violations, no match, unknown encoder) are values;
/// `Err` is reserved for failures the embedding layer reports as
/// `ERR_ENGINE_CALL_FAILED`.
pub trait PatternRuntime: Send {
    fn compile(&mut self, expression: &str) -> RuntimeResult<Compiled>;

    /// Hand a pattern back for reclamation by later collections.
    fn release(&mut self, pattern: PatternRef);

    /// Match with one of the natively encoded outputs. `start` is a 0-based
    /// byte offset.
    fn fast_match(
        &mut self,
        pattern: &PatternRef,
        encoder: FastEncoder,
        input: &[u8],
        start: usize,
    ) -> RuntimeResult<FastMatch<'_>>;

    /// Match through the general entry point with a named text encoder.
    fn general_match(
        &mut self,
        pattern: &PatternRef,
        encoder: &str,
        input: &[u8],
        start: usize,
    ) -> RuntimeResult<GeneralMatch>;

    fn trace(
        &mut self,
        pattern: &PatternRef,
        style: &str,
        input: &[u8],
        start: usize,
    ) -> RuntimeResult<TraceOutcome>;

    fn load(&mut self, source: &str, origin: Option<&str>) -> RuntimeResult<Loaded>;

    fn load_file(&mut self, path: &Path) -> RuntimeResult<Loaded>;

    fn import(&mut self, pkgname: &str, alias: Option<&str>) -> RuntimeResult<Loaded>;

    fn json_encoder(&self) -> JsonEncoder;

    /// Encoder names accepted by [`PatternRuntime::general_match`].
    fn general_encoders(&self) -> &[&'static str];

    fn violation_formatter(&self) -> ViolationFormatter;

    /// Colon-separated package search path.
    fn libpath(&self) -> String;

    fn set_libpath(&mut self, libpath: &str);

    /// Bytes currently held by the runtime heap.
    fn heap_usage(&self) -> usize;

    /// Run one full, synchronous collection cycle.
    fn collect(&mut self);

    /// Collection cycles run so far.
    fn collections(&self) -> u64;

    fn config_entries(&self) -> Vec<ConfigEntry>;
}

/// Boot entry point of a runtime implementation.
pub trait RuntimeFactory {
    fn boot(image: &BootImage) -> RuntimeResult<Box<dyn PatternRuntime>>;
}

/// A factory's boot function, as stored by the engine builder.
pub type RuntimeBoot = fn(&BootImage) -> RuntimeResult<Box<dyn PatternRuntime>>;
