//! Engine lifecycle and public operations.
//!
//! An [`Engine`] owns one pattern runtime, its registry and handle table,
//! all behind a single mutex. Every operation takes the lock for its full
//! duration, so one engine may be shared between threads and calls on it
//! serialize. Separate engines share nothing and run in parallel.

use std::panic::Location;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::boot::{load_image, process_home, with_boot_lock};
use crate::config::{ConfigEntry, EngineConfig, ResultOwnership};
use crate::dispatch::{dispatch, MatchData, MatchResult};
use crate::error::{Result, RosieError, Sentinel};
use crate::file::{self, FileMatchReport, FileMatchRequest};
use crate::governor::AllocReport;
use crate::handles::{HandleTable, NO_HANDLE};
use crate::registry::Registry;
use crate::rstr::{PendingString, RosieString};
use crate::runtime::{
    Loaded, PatternRuntime, RplRuntime, RuntimeBoot, RuntimeFactory, TraceOutcome,
};
use crate::violation::{render, Violation};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of [`Engine::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    /// Non-zero on success; `0` when the expression has errors.
    pub handle: i32,
    /// JSON array of violations, `None` when there is nothing to report.
    pub messages: Option<String>,
}

impl CompileOutcome {
    pub fn is_compiled(&self) -> bool {
        self.handle != NO_HANDLE
    }
}

/// Outcome of [`Engine::load`], [`Engine::load_file`] and [`Engine::import`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub ok: bool,
    /// Declared name of the loaded or imported package.
    pub pkgname: Option<String>,
    pub messages: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceResult {
    pub matched: bool,
    /// Trace text, or a sentinel for a missing pattern or unknown style.
    pub trace: MatchData,
}

/// Heap and table figures, read without collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub heap_bytes: usize,
    pub collections: u64,
    pub governor_collections: u64,
    pub live_handles: usize,
}

/// A match result in C form. `data` follows the engine's
/// [`ResultOwnership`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawMatch {
    pub data: RosieString,
    pub leftover: usize,
    pub abend: bool,
    pub total_ticks: u64,
    pub match_ticks: u64,
}

pub(crate) struct EngineState {
    pub runtime: Box<dyn PatternRuntime>,
    pub registry: Registry,
    pub handles: HandleTable,
    pub config: EngineConfig,
}

impl EngineState {
    pub fn messages(&self, violations: &[Violation]) -> Result<Option<String>> {
        render(
            violations,
            self.registry.violation_formatter,
            self.registry.json_encoder,
        )
    }

    pub fn match_once(
        &mut self,
        handle: i32,
        start: i32,
        encoder: &str,
        input: &[u8],
    ) -> Result<MatchResult> {
        self.registry.governor.checkpoint(self.runtime.as_mut());
        dispatch(
            self.runtime.as_mut(),
            self.handles.get(handle),
            start,
            encoder,
            input,
            self.config.max_encoder_name_len,
        )
    }

    fn loaded(&self, loaded: Loaded) -> Result<LoadOutcome> {
        Ok(LoadOutcome {
            ok: loaded.ok,
            pkgname: loaded.pkgname,
            messages: self.messages(&loaded.violations)?,
        })
    }

    fn teardown(mut self, engine: u64) {
        let patterns = self.handles.drain();
        let count = patterns.len();
        for pattern in patterns {
            self.runtime.release(pattern);
        }
        self.registry.clear_pending();
        debug!(engine, released = count, "engine torn down");
    }
}

/// Builder for engines with a custom configuration or runtime.
///
/// ```rust,ignore
/// use rosie_engine::{EngineBuilder, EngineConfig};
///
/// let engine = EngineBuilder::new()
///     .config(EngineConfig::new().with_home("/usr/local/lib/rosie"))
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    boot: RuntimeBoot,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            boot: RplRuntime::boot,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Boot a different runtime implementation.
    pub fn runtime(mut self, boot: RuntimeBoot) -> Self {
        self.boot = boot;
        self
    }

    /// Boot a runtime and populate the registry. Any failure discards
    /// everything built so far.
    pub fn build(self) -> Result<Engine> {
        let EngineBuilder { config, boot } = self;
        config.validate()?;
        let home = match &config.home {
            Some(home) => home.clone(),
            None => process_home()?,
        };

        let (image, mut runtime) = with_boot_lock(|| -> Result<_> {
            let image = load_image(&home)?;
            let runtime = boot(&image)?;
            Ok((image, runtime))
        })?;

        if let Some(libpath) = &config.libpath {
            runtime.set_libpath(libpath);
        }
        let mut registry = Registry::populate(&image, runtime.as_ref());
        if config.alloc_limit_mb != 0 {
            registry
                .governor
                .configure(runtime.as_mut(), Some(config.alloc_limit_mb))?;
        }

        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            engine = id,
            home = %image.home.display(),
            version = %registry.root.version,
            "engine created"
        );
        Ok(Engine {
            id,
            state: Mutex::new(Some(EngineState {
                runtime,
                registry,
                handles: HandleTable::new(),
                config,
            })),
            finalizing: AtomicBool::new(false),
        })
    }
}

/// An isolated pattern-matching engine.
///
/// # Examples
///
/// ```rust,ignore
/// use rosie_engine::Engine;
///
/// let engine = Engine::new()?;
/// let compiled = engine.compile(b"[:digit:]+")?;
/// let result = engine.match_pattern(compiled.handle, 1, "json", b"123 abcdef")?;
/// assert_eq!(result.leftover, 7);
/// ```
///
/// # Threading
///
/// `Engine` is `Send + Sync`. Calls on one engine from several threads
/// are serialized by its lock; for parallel matching give each thread
/// its own engine, or use [`crate::EnginePool`].
pub struct Engine {
    id: u64,
    state: Mutex<Option<EngineState>>,
    finalizing: AtomicBool,
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new() -> Result<Self> {
        EngineBuilder::new().build()
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new().config(config).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Process-unique engine id, as logged.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run `f` on the engine state under the lock.
    #[track_caller]
    fn with_state<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut EngineState) -> Result<T>,
    ) -> Result<T> {
        let caller = Location::caller();
        if self.finalizing.load(Ordering::Acquire) {
            return Err(RosieError::EngineFinalized);
        }
        let mut guard = self.state.lock().map_err(|_| RosieError::LockPoisoned)?;
        let state = guard.as_mut().ok_or(RosieError::EngineFinalized)?;
        let result = f(state);
        if let Err(err @ RosieError::EngineCall(_)) = &result {
            self.report(op, err, caller);
        }
        result
    }

    fn report(&self, op: &str, err: &RosieError, caller: &Location<'_>) {
        #[cfg(debug_assertions)]
        error!(
            engine = self.id,
            op,
            file = caller.file(),
            line = caller.line(),
            backtrace = %std::backtrace::Backtrace::force_capture(),
            "{err}"
        );
        #[cfg(not(debug_assertions))]
        error!(
            engine = self.id,
            op,
            file = caller.file(),
            line = caller.line(),
            "{err}"
        );
    }

    /// Tear the engine down. Irreversible.
    ///
    /// The lock is held for the whole teardown. Afterwards every operation
    /// fails with [`RosieError::EngineFinalized`], except
    /// [`Engine::free_pattern`], which does nothing.
    pub fn finalize(&self) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.finalizing.store(true, Ordering::Release);
        if let Some(state) = guard.take() {
            state.teardown(self.id);
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalizing.load(Ordering::Acquire)
    }

    /// Configuration as a JSON array of `{name, value, description}`.
    pub fn config(&self) -> Result<String> {
        self.with_state("config", |state| {
            let root = &state.registry.root;
            let mut entries = state.runtime.config_entries();
            entries.extend([
                ConfigEntry::new(
                    "ROSIE_HOME",
                    root.home.display().to_string(),
                    "install directory",
                ),
                ConfigEntry::new(
                    "ROSIE_LIBDIR",
                    root.libdir.display().to_string(),
                    "directory of the boot program",
                ),
                ConfigEntry::new(
                    "ALLOC_LIMIT_MB",
                    state.registry.governor.limit_mb().to_string(),
                    "allocation limit above the baseline heap, 0 for unlimited",
                ),
                ConfigEntry::new(
                    "RESULT_OWNERSHIP",
                    state.config.result_ownership.as_str(),
                    "who releases match results",
                ),
            ]);
            let value = serde_json::to_value(&entries)
                .map_err(|e| RosieError::EngineCall(format!("cannot encode config: {e}")))?;
            Ok((state.registry.json_encoder)(&value)?)
        })
    }

    pub fn libpath(&self) -> Result<String> {
        self.with_state("libpath", |state| Ok(state.runtime.libpath()))
    }

    pub fn set_libpath(&self, libpath: &str) -> Result<()> {
        self.with_state("libpath", |state| {
            state.runtime.set_libpath(libpath);
            debug!(engine = self.id, libpath, "libpath set");
            Ok(())
        })
    }

    /// Current limit and heap usage. Collects twice before measuring.
    pub fn alloc_limit(&self) -> Result<AllocReport> {
        self.with_state("alloc_limit", |state| {
            state.registry.governor.configure(state.runtime.as_mut(), None)
        })
    }

    /// Set the limit in MB above current usage. `0` means unlimited;
    /// anything else below the 10 MB floor is rejected.
    pub fn set_alloc_limit(&self, limit_mb: u32) -> Result<AllocReport> {
        self.with_state("alloc_limit", |state| {
            state
                .registry
                .governor
                .configure(state.runtime.as_mut(), Some(limit_mb))
        })
    }

    /// Compile an expression into a new handle.
    ///
    /// Violations are a normal outcome: the handle is `0` and `messages`
    /// holds the JSON list.
    pub fn compile(&self, expression: &[u8]) -> Result<CompileOutcome> {
        self.with_state("compile", |state| {
            let Ok(expression) = std::str::from_utf8(expression) else {
                let violation = Violation::error("parser", "expression is not valid UTF-8");
                return Ok(CompileOutcome {
                    handle: NO_HANDLE,
                    messages: state.messages(&[violation])?,
                });
            };
            let compiled = state.runtime.compile(expression)?;
            let messages = state.messages(&compiled.violations)?;
            let Some(pattern) = compiled.pattern else {
                return Ok(CompileOutcome {
                    handle: NO_HANDLE,
                    messages,
                });
            };
            match state.handles.insert(pattern.clone()) {
                Some(handle) => {
                    debug!(engine = self.id, handle, expression, "pattern compiled");
                    Ok(CompileOutcome { handle, messages })
                }
                None => {
                    state.runtime.release(pattern);
                    Err(RosieError::OutOfMemory("pattern handle table is full".to_string()))
                }
            }
        })
    }

    /// Release a handle. Unknown handles, and calls on an engine that is
    /// finalized or being finalized, do nothing.
    pub fn free_pattern(&self, handle: i32) -> Result<()> {
        if self.finalizing.load(Ordering::Acquire) {
            warn!(engine = self.id, handle, "free after finalize ignored");
            return Ok(());
        }
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(engine = self.id, handle, "engine lock unavailable, free ignored");
                return Ok(());
            }
        };
        let Some(state) = guard.as_mut() else {
            return Ok(());
        };
        match state.handles.remove(handle) {
            Some(pattern) => {
                state.runtime.release(pattern);
                debug!(engine = self.id, handle, "pattern freed");
            }
            None => warn!(engine = self.id, handle, "free of unknown handle"),
        }
        Ok(())
    }

    /// Match `input` from the 1-based `start` with the named encoder.
    pub fn match_pattern(
        &self,
        handle: i32,
        start: i32,
        encoder: &str,
        input: &[u8],
    ) -> Result<MatchResult> {
        self.with_state("match", |state| state.match_once(handle, start, encoder, input))
    }

    /// Match and convert the payload to a RosieString according to the
    /// configured [`ResultOwnership`].
    pub(crate) fn match_raw(
        &self,
        handle: i32,
        start: i32,
        encoder: &str,
        input: &[u8],
    ) -> Result<RawMatch> {
        self.with_state("match", |state| {
            let result = state.match_once(handle, start, encoder, input)?;
            let data = match result.data {
                MatchData::Sentinel(sentinel) => RosieString::sentinel(sentinel),
                MatchData::Bytes(bytes) => match state.config.result_ownership {
                    ResultOwnership::CallerOwned => RosieString::from_vec(bytes)?,
                    ResultOwnership::EngineCached => {
                        state.registry.stash(PendingString::new(bytes)?)
                    }
                },
            };
            Ok(RawMatch {
                data,
                leftover: result.leftover,
                abend: result.abend,
                total_ticks: result.total_ticks,
                match_ticks: result.match_ticks,
            })
        })
    }

    /// Trace a match in one of the styles `condensed`, `full` or `json`.
    pub fn trace(&self, handle: i32, start: i32, style: &str, input: &[u8]) -> Result<TraceResult> {
        self.with_state("trace", |state| {
            let Some(pattern) = state.handles.get(handle).cloned() else {
                return Ok(TraceResult {
                    matched: false,
                    trace: MatchData::Sentinel(Sentinel::NoPattern),
                });
            };
            if style.len() > state.config.max_encoder_name_len {
                return Ok(TraceResult {
                    matched: false,
                    trace: MatchData::Sentinel(Sentinel::NoEncoder),
                });
            }
            let start = crate::dispatch::normalize_start(start, input.len());
            Ok(match state.runtime.trace(&pattern, style, input, start)? {
                TraceOutcome::Trace { matched, text } => TraceResult {
                    matched,
                    trace: MatchData::Bytes(text.into_bytes()),
                },
                TraceOutcome::UnknownStyle => TraceResult {
                    matched: false,
                    trace: MatchData::Sentinel(Sentinel::NoEncoder),
                },
            })
        })
    }

    /// Match every record of a file. Empty names select the standard
    /// streams.
    pub fn match_file(&self, handle: i32, request: &FileMatchRequest<'_>) -> Result<FileMatchReport> {
        self.with_state("match_file", |state| file::match_file(state, handle, request))
    }

    /// Load RPL source into the engine's environment.
    pub fn load(&self, source: &[u8]) -> Result<LoadOutcome> {
        self.with_state("load", |state| {
            let Ok(source) = std::str::from_utf8(source) else {
                let violation = Violation::error("loader", "source is not valid UTF-8");
                return state.loaded(Loaded::failed(vec![violation]));
            };
            let loaded = state.runtime.load(source, None)?;
            debug!(engine = self.id, ok = loaded.ok, "source loaded");
            state.loaded(loaded)
        })
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<LoadOutcome> {
        let path = path.as_ref();
        self.with_state("load_file", |state| {
            let loaded = state.runtime.load_file(path)?;
            debug!(engine = self.id, path = %path.display(), ok = loaded.ok, "file loaded");
            state.loaded(loaded)
        })
    }

    /// Import a package from the libpath, optionally under another name.
    pub fn import(&self, pkgname: &str, alias: Option<&str>) -> Result<LoadOutcome> {
        self.with_state("import", |state| {
            let loaded = state.runtime.import(pkgname, alias)?;
            debug!(engine = self.id, pkgname, ok = loaded.ok, "import");
            state.loaded(loaded)
        })
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.with_state("stats", |state| {
            Ok(EngineStats {
                heap_bytes: state.runtime.heap_usage(),
                collections: state.runtime.collections(),
                governor_collections: state.registry.governor.triggered(),
                live_handles: state.handles.len(),
            })
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(state) = state {
            state.teardown(self.id);
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}
