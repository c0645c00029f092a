//! Output encoders for match results.
//!
//! Fast encoders write into a reusable byte buffer; general encoders
//! produce text.

use std::borrow::Cow;

use serde::Serialize;

use super::vm::Capture;
use super::{RuntimeError, RuntimeResult};

/// Encode a JSON value to text. Installed as the engine's JSON encoder.
pub fn encode_json(value: &serde_json::Value) -> RuntimeResult<String> {
    serde_json::to_string(value).map_err(|e| RuntimeError::Encode(e.to_string()))
}

#[derive(Serialize)]
struct JsonCapture<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    s: usize,
    e: usize,
    data: Cow<'a, str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subs: Vec<JsonCapture<'a>>,
}

impl<'a> JsonCapture<'a> {
    fn new(capture: &'a Capture, input: &'a [u8]) -> Self {
        Self {
            kind: &capture.name,
            s: capture.start + 1,
            e: capture.end + 1,
            data: String::from_utf8_lossy(capture.text(input)),
            subs: capture
                .subs
                .iter()
                .map(|sub| JsonCapture::new(sub, input))
                .collect(),
        }
    }
}

/// `{"type", "s", "e", "data", "subs"}` with 1-based positions.
pub fn json(capture: &Capture, input: &[u8], out: &mut Vec<u8>) -> RuntimeResult<()> {
    serde_json::to_writer(out, &JsonCapture::new(capture, input))
        .map_err(|e| RuntimeError::Encode(e.to_string()))
}

/// The whole input line.
pub fn line(input: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(input);
}

/// Compact binary form, little endian:
/// `[-s: i32][name_len: i16][name][subs...][e: i32]` with 1-based positions.
pub fn byte(capture: &Capture, out: &mut Vec<u8>) -> RuntimeResult<()> {
    let position = |p: usize| {
        i32::try_from(p + 1)
            .map_err(|_| RuntimeError::Encode(format!("position {p} too large for byte encoder")))
    };
    out.extend_from_slice(&(-position(capture.start)?).to_le_bytes());
    let name_len = i16::try_from(capture.name.len())
        .map_err(|_| RuntimeError::Encode("capture name too long for byte encoder".to_string()))?;
    out.extend_from_slice(&name_len.to_le_bytes());
    out.extend_from_slice(capture.name.as_bytes());
    for sub in &capture.subs {
        byte(sub, out)?;
    }
    out.extend_from_slice(&position(capture.end)?.to_le_bytes());
    Ok(())
}

/// Matched or not, no data.
pub fn boolean(_out: &mut Vec<u8>) {}

/// Names accepted by [`general`].
pub const GENERAL_ENCODERS: &[&str] = &["matches", "subs", "color", "data"];

/// Text encoders reached through the general match path.
/// Returns `None` for an unknown encoder name.
pub fn general(encoder: &str, capture: &Capture, input: &[u8]) -> Option<String> {
    Some(match encoder {
        "matches" => String::from_utf8_lossy(capture.text(input)).into_owned(),
        "subs" => capture
            .subs
            .iter()
            .map(|sub| String::from_utf8_lossy(sub.text(input)).into_owned())
            .collect::<Vec<_>>()
            .join("\n"),
        "color" => color(capture, input),
        "data" => {
            let mut out = String::new();
            data(capture, input, 0, &mut out);
            out
        }
        _ => return None,
    })
}

fn data(capture: &Capture, input: &[u8], depth: usize, out: &mut String) {
    if depth > 0 {
        out.push('\n');
    }
    out.push_str(&"  ".repeat(depth));
    out.push_str(&capture.name);
    out.push_str(": ");
    out.push_str(&String::from_utf8_lossy(capture.text(input)));
    for sub in &capture.subs {
        data(sub, input, depth + 1, out);
    }
}

const RESET: &str = "\x1b[0m";

/// ANSI color for a capture type, by package prefix.
pub fn color_for(name: &str) -> &'static str {
    let package = name.split_once('.').map(|(pkg, _)| pkg).unwrap_or("");
    match package {
        "num" => "\x1b[33m",
        "word" => "\x1b[34m",
        "net" => "\x1b[31m",
        "date" | "time" => "\x1b[32m",
        _ if name == "*" => "\x1b[1m",
        _ => "\x1b[36m",
    }
}

/// Leaf captures colored by type; text between them left plain.
fn color(capture: &Capture, input: &[u8]) -> String {
    let mut out = String::new();
    let mut cursor = capture.start;
    paint(capture, input, &mut cursor, &mut out);
    out.push_str(&String::from_utf8_lossy(&input[cursor.min(capture.end)..capture.end.min(input.len())]));
    out
}

fn paint(capture: &Capture, input: &[u8], cursor: &mut usize, out: &mut String) {
    if capture.subs.is_empty() {
        out.push_str(&String::from_utf8_lossy(&input[*cursor..capture.start]));
        out.push_str(color_for(&capture.name));
        out.push_str(&String::from_utf8_lossy(capture.text(input)));
        out.push_str(RESET);
        *cursor = capture.end;
        return;
    }
    for sub in &capture.subs {
        paint(sub, input, cursor, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample() -> (Capture, &'static [u8]) {
        let input = b"42 apples";
        let capture = Capture {
            name: Arc::from("*"),
            start: 0,
            end: 9,
            subs: vec![
                Capture {
                    name: Arc::from("num.int"),
                    start: 0,
                    end: 2,
                    subs: vec![],
                },
                Capture {
                    name: Arc::from("word.any"),
                    start: 3,
                    end: 9,
                    subs: vec![],
                },
            ],
        };
        (capture, input)
    }

    #[test]
    fn test_json_shape() {
        let (capture, input) = sample();
        let mut out = Vec::new();
        json(&capture, input, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["type"], "*");
        assert_eq!(value["s"], 1);
        assert_eq!(value["e"], 10);
        assert_eq!(value["data"], "42 apples");
        assert_eq!(value["subs"][0]["type"], "num.int");
        assert_eq!(value["subs"][1]["s"], 4);
        assert!(value["subs"][0].get("subs").is_none());
    }

    #[test]
    fn test_byte_layout() {
        let capture = Capture {
            name: Arc::from("ab"),
            start: 0,
            end: 3,
            subs: vec![],
        };
        let mut out = Vec::new();
        byte(&capture, &mut out).unwrap();
        assert_eq!(&out[0..4], &(-1i32).to_le_bytes());
        assert_eq!(&out[4..6], &2i16.to_le_bytes());
        assert_eq!(&out[6..8], b"ab");
        assert_eq!(&out[8..12], &4i32.to_le_bytes());
    }

    #[test]
    fn test_general_encoders() {
        let (capture, input) = sample();
        assert_eq!(general("matches", &capture, input).unwrap(), "42 apples");
        assert_eq!(general("subs", &capture, input).unwrap(), "42\napples");
        assert_eq!(
            general("data", &capture, input).unwrap(),
            "*: 42 apples\n  num.int: 42\n  word.any: apples"
        );
        assert_eq!(general("nosuch", &capture, input), None);
    }

    #[test]
    fn test_color_wraps_leaves() {
        let (capture, input) = sample();
        let text = general("color", &capture, input).unwrap();
        assert_eq!(text, "\x1b[33m42\x1b[0m \x1b[34mapples\x1b[0m");
    }

    #[test]
    fn test_line_copies_input() {
        let mut out = Vec::new();
        line(b"the whole line", &mut out);
        assert_eq!(out, b"the whole line");
    }
}
