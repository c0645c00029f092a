//! One engine per thread, and a pool for batches.

use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use rosie_engine::{Engine, EngineConfig, EnginePool, PoolConfig};

fn config() -> EngineConfig {
    EngineConfig::new().with_home(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rosie"))
}

fn inputs(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("{i} requests served").into_bytes()).collect()
}

fn main() -> Result<()> {
    let data = inputs(20_000);

    let started = Instant::now();
    let workers: Vec<_> = data
        .chunks(5_000)
        .map(|chunk| {
            let chunk = chunk.to_vec();
            thread::spawn(move || -> Result<usize> {
                let engine = Engine::with_config(config())?;
                let handle = engine.compile(b"[:digit:]+")?.handle;
                let mut matched = 0;
                for input in &chunk {
                    if engine.match_pattern(handle, 1, "bool", input)?.data.is_match() {
                        matched += 1;
                    }
                }
                Ok(matched)
            })
        })
        .collect();
    let mut total = 0;
    for worker in workers {
        total += worker.join().map_err(|_| anyhow!("worker panicked"))??;
    }
    println!("threads: {total} matches in {:?}", started.elapsed());

    let pool = EnginePool::new(b"[:digit:]+", PoolConfig::default().with_engine_config(config()))?;
    let refs: Vec<&[u8]> = data.iter().map(Vec::as_slice).collect();
    let started = Instant::now();
    let results = pool.match_batch("bool", &refs)?;
    let matched = results.iter().filter(|r| r.data.is_match()).count();
    println!(
        "pool of {}: {matched} matches in {:?}",
        pool.len(),
        started.elapsed()
    );
    Ok(())
}
