//! A pool of independent engines for multi-threaded matching.
//!
//! Each engine compiles the same expression once. A batch of inputs is
//! split into contiguous chunks and each chunk is matched on its own
//! engine on the rayon thread pool, so no engine lock is ever contended.

use rayon::prelude::*;
use tracing::debug;

use crate::config::EngineConfig;
use crate::dispatch::MatchResult;
use crate::engine::Engine;
use crate::error::{Result, RosieError};

/// Configuration for an [`EnginePool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of engines to create
    pub num_engines: usize,
    /// Batches smaller than this are matched on the first engine only
    pub min_batch_size_for_parallelism: usize,
    pub engine: EngineConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_engines: rayon::current_num_threads(),
            min_batch_size_for_parallelism: 16,
            engine: EngineConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn with_engines(mut self, n: usize) -> Self {
        self.num_engines = n;
        self
    }

    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

struct Member {
    engine: Engine,
    handle: i32,
}

pub struct EnginePool {
    members: Vec<Member>,
    config: PoolConfig,
}

impl EnginePool {
    /// Create the engines and compile `expression` on each. Fails with the
    /// compile messages if the expression does not compile.
    pub fn new(expression: &[u8], config: PoolConfig) -> Result<Self> {
        let n = config.num_engines.max(1);
        let members = (0..n)
            .into_par_iter()
            .map(|_| {
                let engine = Engine::with_config(config.engine.clone())?;
                let compiled = engine.compile(expression)?;
                if !compiled.is_compiled() {
                    return Err(RosieError::InvalidArgument(
                        compiled
                            .messages
                            .unwrap_or_else(|| "expression did not compile".to_string()),
                    ));
                }
                Ok(Member {
                    engine,
                    handle: compiled.handle,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(engines = members.len(), "engine pool ready");
        Ok(Self { members, config })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Match every input from the beginning. Results keep input order.
    pub fn match_batch(&self, encoder: &str, inputs: &[&[u8]]) -> Result<Vec<MatchResult>> {
        if inputs.len() < self.config.min_batch_size_for_parallelism || self.members.len() == 1 {
            let member = &self.members[0];
            return inputs
                .iter()
                .map(|input| member.engine.match_pattern(member.handle, 1, encoder, input))
                .collect();
        }

        let chunk = (inputs.len() + self.members.len() - 1) / self.members.len();
        let chunks: Vec<Vec<MatchResult>> = inputs
            .par_chunks(chunk)
            .zip(self.members.par_iter())
            .map(|(chunk, member)| {
                chunk
                    .iter()
                    .map(|input| member.engine.match_pattern(member.handle, 1, encoder, input))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(chunks.into_iter().flatten().collect())
    }

    /// Engines in the pool, e.g. to load extra packages into each.
    pub fn engines(&self) -> impl Iterator<Item = &Engine> {
        self.members.iter().map(|m| &m.engine)
    }
}
