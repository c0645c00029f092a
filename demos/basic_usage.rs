//! Basic engine usage.
//!
//! Run from the repository root so the bundled install tree is found:
//!
//! ```text
//! cargo run --example basic_usage
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rosie_engine::{Engine, EngineConfig, MatchData};

fn main() -> Result<()> {
    println!("Rosie Engine Basic Usage");
    println!("========================\n");

    let home = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rosie");
    let engine = Engine::with_config(EngineConfig::new().with_home(&home))
        .with_context(|| format!("cannot boot from {}", home.display()))?;

    compile_and_match(&engine)?;
    println!();
    packages(&engine)?;
    println!();
    diagnostics(&engine)?;

    engine.finalize();
    Ok(())
}

fn show(data: &MatchData) -> String {
    match data {
        MatchData::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        MatchData::Sentinel(reason) => format!("<{reason}>"),
    }
}

/// Compile one expression and match it with several encoders.
fn compile_and_match(engine: &Engine) -> Result<()> {
    println!("=== Compile and Match ===");
    let compiled = engine.compile(b"[:digit:]+")?;
    if !compiled.is_compiled() {
        bail!("compile failed: {:?}", compiled.messages);
    }

    for encoder in ["json", "matches", "line", "bool"] {
        let result = engine.match_pattern(compiled.handle, 1, encoder, b"123 abcdef")?;
        println!(
            "{encoder:>8}: {}  (leftover {}, {:?} path)",
            show(&result.data),
            result.leftover,
            result.path
        );
    }

    let miss = engine.match_pattern(compiled.handle, 1, "json", b"no digits")?;
    println!("no match: {}", show(&miss.data));

    engine.free_pattern(compiled.handle)?;
    Ok(())
}

/// Import a package and load some RPL of our own.
fn packages(engine: &Engine) -> Result<()> {
    println!("=== Packages ===");
    let imported = engine.import("num", None)?;
    println!("import num: ok={} name={:?}", imported.ok, imported.pkgname);

    let loaded = engine.load(b"measure = num.any [:alpha:]+")?;
    println!("load: ok={}", loaded.ok);

    let handle = engine.compile(b"measure")?.handle;
    let result = engine.match_pattern(handle, 1, "data", b"2.5 kg of flour")?;
    println!("{}", show(&result.data));
    Ok(())
}

/// Show what compile errors look like.
fn diagnostics(engine: &Engine) -> Result<()> {
    println!("=== Diagnostics ===");
    let compiled = engine.compile(b"num.int [:bogus:]")?;
    println!("handle: {}", compiled.handle);
    if let Some(messages) = compiled.messages {
        let value: serde_json::Value = serde_json::from_str(&messages)?;
        for violation in value.as_array().into_iter().flatten() {
            println!("{}", violation["formatted"].as_str().unwrap_or_default());
        }
    }
    Ok(())
}
