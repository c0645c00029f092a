//! Allocation governor.
//!
//! A configured limit becomes an absolute ceiling: heap usage measured
//! right after two full collections, plus the limit. Before each match
//! the governor compares usage against the ceiling and runs one
//! synchronous collection when it is exceeded. Nothing runs in the
//! background. Without a limit the runtime still reclaims memory on its
//! own schedule.

use tracing::debug;

use crate::config::check_alloc_limit;
use crate::error::Result;
use crate::runtime::PatternRuntime;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Result of querying or setting the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocReport {
    /// The relative limit in MB; `0` means unlimited.
    pub limit_mb: u32,
    /// Heap usage after collecting, in KB.
    pub usage_kb: usize,
}

#[derive(Debug, Default)]
pub struct AllocationGovernor {
    limit_mb: u32,
    /// `0` means no ceiling.
    ceiling_bytes: usize,
    triggered: u64,
}

impl AllocationGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit_mb(&self) -> u32 {
        self.limit_mb
    }

    pub fn ceiling_bytes(&self) -> usize {
        self.ceiling_bytes
    }

    /// Collections this governor has triggered at checkpoints.
    pub fn triggered(&self) -> u64 {
        self.triggered
    }

    /// Checkpoint run before a match. Returns whether a collection ran.
    pub fn checkpoint(&mut self, runtime: &mut dyn PatternRuntime) -> bool {
        if self.ceiling_bytes == 0 {
            return false;
        }
        let usage = runtime.heap_usage();
        if usage <= self.ceiling_bytes {
            return false;
        }
        runtime.collect();
        self.triggered += 1;
        debug!(
            usage,
            ceiling = self.ceiling_bytes,
            after = runtime.heap_usage(),
            "heap over ceiling, collected"
        );
        true
    }

    /// Query (`None`) or set the limit. Both collect twice first, so the
    /// second cycle reclaims what the first finalized.
    pub fn configure(
        &mut self,
        runtime: &mut dyn PatternRuntime,
        limit_mb: Option<u32>,
    ) -> Result<AllocReport> {
        if let Some(mb) = limit_mb {
            check_alloc_limit(mb)?;
        }
        runtime.collect();
        runtime.collect();
        let usage = runtime.heap_usage();
        if let Some(mb) = limit_mb {
            self.limit_mb = mb;
            self.ceiling_bytes = if mb == 0 {
                0
            } else {
                usage + mb as usize * BYTES_PER_MB
            };
            debug!(limit_mb = mb, ceiling = self.ceiling_bytes, "allocation limit set");
        }
        Ok(AllocReport {
            limit_mb: self.limit_mb,
            usage_kb: usage / 1024,
        })
    }
}
