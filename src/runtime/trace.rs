//! Rendering of match traces.

use std::fmt::Write as _;

use serde::Serialize;

use super::vm::TraceEvent;
use super::{RuntimeError, RuntimeResult};

pub const TRACE_STYLES: &[&str] = &["condensed", "full", "json"];

#[derive(Serialize)]
struct JsonEvent<'a> {
    depth: usize,
    #[serde(rename = "type")]
    kind: &'a str,
    s: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    e: Option<usize>,
    matched: bool,
}

#[derive(Serialize)]
struct JsonTrace<'a> {
    expression: &'a str,
    matched: bool,
    events: Vec<JsonEvent<'a>>,
}

/// Render `events` in `style`. Returns `Ok(None)` for an unknown style.
pub fn render(
    style: &str,
    expression: &str,
    events: &[TraceEvent],
    input: &[u8],
    matched: bool,
) -> RuntimeResult<Option<String>> {
    let text = match style {
        "condensed" => condensed(events),
        "full" => full(expression, events, input, matched),
        "json" => {
            let trace = JsonTrace {
                expression,
                matched,
                events: events
                    .iter()
                    .map(|event| JsonEvent {
                        depth: event.depth,
                        kind: &event.name,
                        s: event.start + 1,
                        e: event.end.map(|e| e + 1),
                        matched: event.end.is_some(),
                    })
                    .collect(),
            };
            serde_json::to_string(&trace).map_err(|e| RuntimeError::Encode(e.to_string()))?
        }
        _ => return Ok(None),
    };
    Ok(Some(text))
}

fn outcome(event: &TraceEvent) -> String {
    match event.end {
        Some(end) => format!("Matched {}..{}", event.start + 1, end + 1),
        None => format!("FAILED at {}", event.start + 1),
    }
}

fn condensed(events: &[TraceEvent]) -> String {
    let mut out = String::new();
    for event in events {
        let _ = writeln!(
            out,
            "{}{}  {}",
            "  ".repeat(event.depth),
            event.name,
            outcome(event)
        );
    }
    out
}

fn excerpt(input: &[u8], from: usize) -> String {
    const WIDTH: usize = 30;
    let from = from.min(input.len());
    let to = (from + WIDTH).min(input.len());
    let mut text = String::from_utf8_lossy(&input[from..to]).into_owned();
    if to < input.len() {
        text.push_str("...");
    }
    text
}

fn full(expression: &str, events: &[TraceEvent], input: &[u8], matched: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Expression: {expression}");
    let _ = writeln!(out, "Input: {:?}", excerpt(input, 0));
    for event in events {
        let indent = "  ".repeat(event.depth);
        let _ = writeln!(out, "{indent}Expression: {}", event.name);
        let _ = writeln!(out, "{indent}Looking at: {:?} (input pos = {})", excerpt(input, event.start), event.start + 1);
        let _ = writeln!(out, "{indent}{}", outcome(event));
    }
    let _ = writeln!(out, "{}", if matched { "Match succeeded" } else { "No match" });
    out
}
