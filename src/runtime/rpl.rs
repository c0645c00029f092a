use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::compiler::{Binding, Compiler, Package};
use super::heap::Heap;
use super::ir::Node;
use super::parser::{parse_block, parse_expression, Stmt, SyntaxError};
use super::{
    encode, trace, vm, CompiledPattern, Compiled, FastMatch, FastPayload, GeneralMatch,
    GeneralPayload, JsonEncoder, Loaded, MatchStats, PatternRef, PatternRuntime, RuntimeError,
    RuntimeFactory, RuntimeResult, TraceOutcome,
};
use crate::boot::BootImage;
use crate::config::ConfigEntry;
use crate::dispatch::{FastEncoder, FAST_ENCODERS};
use crate::violation::{has_errors, Violation, ViolationFormatter};

/// Output larger than this is handed to the caller instead of being kept
/// in the runtime's reusable buffer.
pub const NATIVE_BUFFER_LIMIT: usize = 4 * 1024 * 1024;

/// File extension of RPL package files.
const RPL_EXTENSION: &str = "rpl";

#[derive(Debug)]
struct RplPattern {
    expression: String,
    node: Node,
    footprint: usize,
}

impl CompiledPattern for RplPattern {
    fn expression(&self) -> &str {
        &self.expression
    }

    fn footprint(&self) -> usize {
        self.footprint
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn downcast(pattern: &PatternRef) -> RuntimeResult<&RplPattern> {
    pattern.as_any().downcast_ref::<RplPattern>().ok_or_else(|| {
        RuntimeError::Internal(format!(
            "pattern {:?} was not compiled by the RPL runtime",
            pattern.expression()
        ))
    })
}

fn syntax_violation(src: &str, origin: Option<&str>, err: &SyntaxError) -> Violation {
    let v = Violation::error("parser", err.message.clone()).with_source(
        src,
        err.span.start + 1,
        err.span.end + 1,
    );
    match origin {
        Some(origin) => v.with_origin(origin),
        None => v,
    }
}

fn micros(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// A compiled block, not yet committed to the environment.
struct Unit {
    package: Option<String>,
    bindings: Vec<(String, Binding)>,
    imports: HashMap<String, Arc<Package>>,
    warnings: Vec<Violation>,
    weight: usize,
}

/// The bundled RPL runtime.
pub struct RplRuntime {
    rosie_version: String,
    rpl_version: String,
    /// Bindings visible to top-level expressions.
    top: HashMap<String, Binding>,
    /// Prelude bindings, also visible inside packages.
    prelude: HashMap<String, Binding>,
    /// Packages visible to top-level expressions, by local name.
    imports: HashMap<String, Arc<Package>>,
    /// Packages read from the libpath, by import path.
    loaded: HashMap<String, Arc<Package>>,
    importing: Vec<String>,
    libpath: Vec<PathBuf>,
    heap: Heap,
    out: Vec<u8>,
}

impl RplRuntime {
    pub fn new(image: &BootImage) -> Self {
        Self {
            rosie_version: image.manifest.rosie_version.clone(),
            rpl_version: image.manifest.rpl_version.clone(),
            top: HashMap::new(),
            prelude: HashMap::new(),
            imports: HashMap::new(),
            loaded: HashMap::new(),
            importing: Vec::new(),
            libpath: image.libpath.clone(),
            heap: Heap::new(),
            out: Vec::new(),
        }
    }

    fn compile_unit(
        &mut self,
        src: &str,
        origin: Option<&str>,
    ) -> RuntimeResult<std::result::Result<Unit, Vec<Violation>>> {
        let stmts = match parse_block(src) {
            Ok(stmts) => stmts,
            Err(err) => return Ok(Err(vec![syntax_violation(src, origin, &err)])),
        };

        let mut violations = Vec::new();
        let mut package = None;
        for (i, stmt) in stmts.iter().enumerate() {
            match stmt {
                Stmt::Version {
                    major,
                    minor,
                    span,
                } if *major != 1 => violations.push(
                    Violation::error(
                        "loader",
                        format!("unsupported rpl version {major}.{minor}"),
                    )
                    .with_source(src, span.start + 1, span.end + 1),
                ),
                Stmt::Package { name, span } => {
                    let misplaced = stmts[..i]
                        .iter()
                        .any(|s| !matches!(s, Stmt::Version { .. }));
                    if package.is_some() || misplaced {
                        violations.push(
                            Violation::error(
                                "loader",
                                "package declaration must come first and appear once",
                            )
                            .with_source(src, span.start + 1, span.end + 1),
                        );
                    } else {
                        package = Some(name.clone());
                    }
                }
                _ => {}
            }
        }

        let mut imports = HashMap::new();
        for stmt in &stmts {
            let Stmt::Import(specs) = stmt else {
                continue;
            };
            for spec in specs {
                match self.import_package(&spec.path)? {
                    Ok((pkg, warnings)) => {
                        violations.extend(warnings);
                        let local = spec.alias.clone().unwrap_or_else(|| pkg.name.clone());
                        imports.insert(local, pkg);
                    }
                    Err(errors) => {
                        violations.extend(errors);
                        violations.push(
                            Violation::error("loader", format!("cannot import '{}'", spec.path))
                                .with_source(src, spec.span.start + 1, spec.span.end + 1),
                        );
                    }
                }
            }
        }
        if has_errors(&violations) {
            return Ok(Err(violations));
        }

        let (visible, scope) = match package {
            Some(_) => (&self.prelude, imports.clone()),
            None => {
                let mut scope = self.imports.clone();
                scope.extend(imports.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
                (&self.top, scope)
            }
        };
        let (bindings, compile_violations) = Compiler::new(src, visible, &scope)
            .with_origin(origin)
            .with_package(package.as_deref())
            .compile_block(&stmts);
        violations.extend(compile_violations);
        if has_errors(&violations) {
            return Ok(Err(violations));
        }

        let weight = src.len()
            + bindings
                .iter()
                .map(|(name, b)| name.len() + b.node.weight())
                .sum::<usize>();
        Ok(Ok(Unit {
            package,
            bindings,
            imports,
            warnings: violations,
            weight,
        }))
    }

    /// Find, read and compile a package from the libpath. Packages are
    /// cached by import path.
    fn import_package(
        &mut self,
        path: &str,
    ) -> RuntimeResult<std::result::Result<(Arc<Package>, Vec<Violation>), Vec<Violation>>> {
        if let Some(pkg) = self.loaded.get(path) {
            return Ok(Ok((Arc::clone(pkg), Vec::new())));
        }
        if self.importing.iter().any(|p| p == path) {
            let cycle = self.importing.join(" -> ");
            return Ok(Err(vec![Violation::error(
                "loader",
                format!("import cycle: {cycle} -> {path}"),
            )]));
        }
        let Some(file) = self
            .libpath
            .iter()
            .map(|dir| dir.join(format!("{path}.{RPL_EXTENSION}")))
            .find(|candidate| candidate.is_file())
        else {
            return Ok(Err(vec![Violation::error(
                "loader",
                format!(
                    "cannot find package '{path}' in libpath {}",
                    self.libpath()
                ),
            )]));
        };
        let origin = file.display().to_string();
        let src = match fs::read_to_string(&file) {
            Ok(src) => src,
            Err(e) => {
                return Ok(Err(vec![Violation::error(
                    "loader",
                    format!("cannot read {origin}: {e}"),
                )]))
            }
        };

        self.importing.push(path.to_string());
        let unit = self.compile_unit(&src, Some(origin.as_str()));
        self.importing.pop();

        let unit = match unit? {
            Ok(unit) => unit,
            Err(violations) => return Ok(Err(violations)),
        };
        let Some(name) = unit.package else {
            return Ok(Err(vec![Violation::error(
                "loader",
                format!("{origin} does not declare a package"),
            )
            .with_origin(origin)]));
        };
        let package = Arc::new(Package {
            name,
            origin: Some(origin),
            bindings: unit.bindings.into_iter().collect(),
            weight: unit.weight,
        });
        self.heap.charge_environment(package.weight);
        self.loaded.insert(path.to_string(), Arc::clone(&package));
        debug!(package = %package.name, path, "package imported");
        Ok(Ok((package, unit.warnings)))
    }

    fn load_source(&mut self, src: &str, origin: Option<&str>) -> RuntimeResult<Loaded> {
        let unit = match self.compile_unit(src, origin)? {
            Ok(unit) => unit,
            Err(violations) => return Ok(Loaded::failed(violations)),
        };
        self.heap.charge_environment(unit.weight);
        match unit.package {
            Some(name) => {
                let package = Arc::new(Package {
                    name: name.clone(),
                    origin: origin.map(str::to_string),
                    bindings: unit.bindings.into_iter().collect(),
                    weight: unit.weight,
                });
                self.imports.insert(name.clone(), package);
                Ok(Loaded {
                    ok: true,
                    pkgname: Some(name),
                    violations: unit.warnings,
                })
            }
            None => {
                self.imports.extend(unit.imports);
                self.top.extend(unit.bindings);
                Ok(Loaded {
                    ok: true,
                    pkgname: None,
                    violations: unit.warnings,
                })
            }
        }
    }

    fn start_match(&mut self) {
        let previous = mem::take(&mut self.out);
        self.heap.retire_buffer(previous);
        self.collect_if_needed();
    }

    fn collect_if_needed(&mut self) {
        if self.heap.should_collect() {
            let before = self.heap.usage();
            self.heap.collect();
            debug!(before, after = self.heap.usage(), "runtime heap collected");
        }
    }
}

impl RuntimeFactory for RplRuntime {
    fn boot(image: &BootImage) -> RuntimeResult<Box<dyn PatternRuntime>> {
        let mut runtime = RplRuntime::new(image);
        let loaded = runtime.load_source(&image.manifest.prelude, Some("prelude"))?;
        if !loaded.ok {
            let reasons: Vec<String> = loaded
                .violations
                .iter()
                .map(|v| v.message.clone())
                .collect();
            return Err(RuntimeError::Boot(format!(
                "prelude failed to load: {}",
                reasons.join("; ")
            )));
        }
        runtime.prelude = runtime.top.clone();
        debug!(
            version = %runtime.rosie_version,
            bindings = runtime.prelude.len(),
            "RPL runtime booted"
        );
        Ok(Box::new(runtime))
    }
}

impl PatternRuntime for RplRuntime {
    fn compile(&mut self, expression: &str) -> RuntimeResult<Compiled> {
        let exp = match parse_expression(expression) {
            Ok(exp) => exp,
            Err(err) => {
                return Ok(Compiled {
                    pattern: None,
                    violations: vec![syntax_violation(expression, None, &err)],
                })
            }
        };
        let (node, violations) =
            Compiler::new(expression, &self.top, &self.imports).compile_expression(&exp);
        let pattern = node.map(|node| {
            let footprint = node.weight() + expression.len();
            Arc::new(RplPattern {
                expression: expression.to_string(),
                node,
                footprint,
            }) as PatternRef
        });
        if let Some(pattern) = &pattern {
            self.heap.charge_pattern(pattern);
        }
        Ok(Compiled {
            pattern,
            violations,
        })
    }

    fn release(&mut self, pattern: PatternRef) {
        self.heap.release_pattern(pattern);
        self.collect_if_needed();
    }

    fn fast_match(
        &mut self,
        pattern: &PatternRef,
        encoder: FastEncoder,
        input: &[u8],
        start: usize,
    ) -> RuntimeResult<FastMatch<'_>> {
        let began = Instant::now();
        let rpl = downcast(pattern)?;
        let outcome = vm::execute(&rpl.node, input, start, false);
        self.start_match();

        let mut stats = MatchStats {
            leftover: input.len().saturating_sub(start),
            abend: outcome.abend,
            total_ticks: 0,
            match_ticks: micros(outcome.elapsed),
        };
        let (Some(capture), Some(end)) = (outcome.capture, outcome.end) else {
            stats.total_ticks = micros(began.elapsed());
            return Ok(FastMatch {
                payload: FastPayload::NoMatch,
                stats,
            });
        };
        stats.leftover = input.len().saturating_sub(end);

        let mut out = Vec::new();
        match encoder {
            FastEncoder::Json => encode::json(&capture, input, &mut out)?,
            FastEncoder::Line => encode::line(input, &mut out),
            FastEncoder::Byte => encode::byte(&capture, &mut out)?,
            FastEncoder::Bool => encode::boolean(&mut out),
        }
        stats.total_ticks = micros(began.elapsed());

        if out.len() > NATIVE_BUFFER_LIMIT {
            return Ok(FastMatch {
                payload: FastPayload::Owned(out),
                stats,
            });
        }
        self.out = out;
        Ok(FastMatch {
            payload: FastPayload::Buffer(&self.out),
            stats,
        })
    }

    fn general_match(
        &mut self,
        pattern: &PatternRef,
        encoder: &str,
        input: &[u8],
        start: usize,
    ) -> RuntimeResult<GeneralMatch> {
        let began = Instant::now();
        if !self.general_encoders().contains(&encoder) {
            return Ok(GeneralMatch {
                payload: GeneralPayload::UnknownEncoder,
                stats: MatchStats::default(),
            });
        }
        let rpl = downcast(pattern)?;
        let outcome = vm::execute(&rpl.node, input, start, false);
        let mut stats = MatchStats {
            leftover: input.len().saturating_sub(outcome.end.unwrap_or(start)),
            abend: outcome.abend,
            total_ticks: 0,
            match_ticks: micros(outcome.elapsed),
        };
        let payload = match outcome.capture {
            Some(capture) => {
                match encode::general(encoder, &capture, input) {
                    Some(text) => GeneralPayload::Text(text),
                    None => GeneralPayload::UnknownEncoder,
                }
            }
            None => GeneralPayload::NoMatch,
        };
        stats.total_ticks = micros(began.elapsed());
        Ok(GeneralMatch { payload, stats })
    }

    fn trace(
        &mut self,
        pattern: &PatternRef,
        style: &str,
        input: &[u8],
        start: usize,
    ) -> RuntimeResult<TraceOutcome> {
        if !trace::TRACE_STYLES.contains(&style) {
            return Ok(TraceOutcome::UnknownStyle);
        }
        let rpl = downcast(pattern)?;
        let outcome = vm::execute(&rpl.node, input, start, true);
        let matched = outcome.end.is_some();
        let text = trace::render(style, &rpl.expression, &outcome.trace, input, matched)?;
        Ok(match text {
            Some(text) => TraceOutcome::Trace { matched, text },
            None => TraceOutcome::UnknownStyle,
        })
    }

    fn load(&mut self, source: &str, origin: Option<&str>) -> RuntimeResult<Loaded> {
        self.load_source(source, origin)
    }

    fn load_file(&mut self, path: &Path) -> RuntimeResult<Loaded> {
        let origin = path.display().to_string();
        match fs::read_to_string(path) {
            Ok(src) => self.load_source(&src, Some(origin.as_str())),
            Err(e) => Ok(Loaded::failed(vec![Violation::error(
                "loader",
                format!("cannot read file: {e}"),
            )
            .with_origin(origin)])),
        }
    }

    fn import(&mut self, pkgname: &str, alias: Option<&str>) -> RuntimeResult<Loaded> {
        match self.import_package(pkgname)? {
            Ok((package, warnings)) => {
                let local = alias.unwrap_or(&package.name).to_string();
                let name = package.name.clone();
                self.imports.insert(local, package);
                Ok(Loaded {
                    ok: true,
                    pkgname: Some(name),
                    violations: warnings,
                })
            }
            Err(violations) => Ok(Loaded::failed(violations)),
        }
    }

    fn json_encoder(&self) -> JsonEncoder {
        encode::encode_json
    }

    fn general_encoders(&self) -> &[&'static str] {
        encode::GENERAL_ENCODERS
    }

    fn violation_formatter(&self) -> ViolationFormatter {
        crate::violation::format_violation
    }

    fn libpath(&self) -> String {
        self.libpath
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    fn set_libpath(&mut self, libpath: &str) {
        self.libpath = libpath
            .split(':')
            .filter(|entry| !entry.is_empty())
            .map(PathBuf::from)
            .collect();
    }

    fn heap_usage(&self) -> usize {
        self.heap.usage()
    }

    fn collect(&mut self) {
        // The reusable buffer is garbage once a collection runs.
        let previous = mem::take(&mut self.out);
        drop(previous);
        self.heap.collect();
    }

    fn collections(&self) -> u64 {
        self.heap.collections()
    }

    fn config_entries(&self) -> Vec<ConfigEntry> {
        let encoders: Vec<&str> = FAST_ENCODERS
            .iter()
            .map(|(name, _)| *name)
            .chain(self.general_encoders().iter().copied())
            .collect();
        vec![
            ConfigEntry::new("ROSIE_VERSION", &self.rosie_version, "version of the runtime"),
            ConfigEntry::new("RPL_VERSION", &self.rpl_version, "version of the RPL language"),
            ConfigEntry::new("ROSIE_LIBPATH", self.libpath(), "directories searched by import"),
            ConfigEntry::new("ENCODERS", encoders.join(","), "available output encoders"),
            ConfigEntry::new(
                "TRACE_STYLES",
                trace::TRACE_STYLES.join(","),
                "available trace styles",
            ),
        ]
    }
}
