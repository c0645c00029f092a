//! Compile, load and import diagnostics.
//!
//! The runtime reports problems as a list of [`Violation`] records. Before
//! the list crosses the C boundary each record is rendered to text with
//! the runtime's violation formatter, and the whole list is JSON-encoded
//! with the runtime's JSON encoder into one string. An empty list renders
//! to `None`, which the FFI layer turns into a NULL/zero-length string.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosieError};
use crate::runtime::JsonEncoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Where in the pattern source a violation was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// The source text being processed.
    pub text: String,
    /// 1-based start position in `text`.
    pub s: usize,
    /// 1-based exclusive end position.
    pub e: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub severity: Severity,
    /// Stage that produced the violation: `parser`, `compiler`, `loader`.
    pub who: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
}

impl Violation {
    pub fn error(who: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            who: who.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub fn warning(who: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            who: who.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, text: &str, s: usize, e: usize) -> Self {
        self.source = Some(SourceRef {
            text: text.to_string(),
            s,
            e,
            origin: None,
        });
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        if let Some(source) = self.source.as_mut() {
            source.origin = Some(origin.into());
        } else {
            self.source = Some(SourceRef {
                text: String::new(),
                s: 1,
                e: 1,
                origin: Some(origin.into()),
            });
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

pub fn has_errors(violations: &[Violation]) -> bool {
    violations.iter().any(Violation::is_error)
}

/// Renders one violation as human-readable text.
pub type ViolationFormatter = fn(&Violation) -> String;

/// Default text rendering.
///
/// ```text
/// Syntax error
///     [parser]: unterminated literal
///     line 1: "abc
///             ^^^^
/// ```
pub fn format_violation(v: &Violation) -> String {
    let heading = match (v.severity, v.who.as_str()) {
        (Severity::Error, "parser") => "Syntax error",
        (Severity::Error, "loader") => "Loader error",
        (Severity::Error, _) => "Compile error",
        (Severity::Warning, _) => "Warning",
    };
    let mut out = String::new();
    let _ = write!(out, "{heading}\n\t[{}]: {}", v.who, v.message);
    if let Some(src) = &v.source {
        if let Some(origin) = &src.origin {
            let _ = write!(out, "\n\tfile: {origin}");
        }
        if !src.text.is_empty() {
            let (line_no, line, col) = locate(&src.text, src.s);
            let _ = write!(out, "\n\tline {line_no}: {line}");
            let width = src.e.saturating_sub(src.s).max(1);
            let _ = write!(
                out,
                "\n\t{}{}",
                " ".repeat(col + 7 + digits(line_no)),
                "^".repeat(width.min(line.len().saturating_sub(col).max(1)))
            );
        }
    }
    out
}

fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

/// Line number (1-based), line text and 0-based column of the 1-based
/// position `pos` in `text`.
fn locate(text: &str, pos: usize) -> (usize, &str, usize) {
    let offset = pos.saturating_sub(1).min(text.len());
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = text[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(text.len());
    let line_no = text[..line_start].matches('\n').count() + 1;
    (line_no, &text[line_start..line_end], offset - line_start)
}

#[derive(Serialize)]
struct Rendered<'a> {
    #[serde(flatten)]
    violation: &'a Violation,
    formatted: String,
}

/// Format each violation and JSON-encode the list.
///
/// Returns `Ok(None)` for an empty list.
pub fn render(
    violations: &[Violation],
    formatter: ViolationFormatter,
    encode: JsonEncoder,
) -> Result<Option<String>> {
    if violations.is_empty() {
        return Ok(None);
    }
    let rendered: Vec<Rendered<'_>> = violations
        .iter()
        .map(|violation| Rendered {
            violation,
            formatted: formatter(violation),
        })
        .collect();
    let value = serde_json::to_value(&rendered)
        .map_err(|e| RosieError::EngineCall(format!("cannot encode violations: {e}")))?;
    let text = encode(&value)?;
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::encode_json;

    #[test]
    fn test_empty_list_renders_to_none() {
        assert_eq!(render(&[], format_violation, encode_json).unwrap(), None);
    }

    #[test]
    fn test_render_includes_formatted_text() {
        let violations = vec![
            Violation::error("parser", "unterminated literal").with_source("\"abc", 1, 5),
            Violation::warning("compiler", "pattern can match the empty string"),
        ];
        let json = render(&violations, format_violation, encode_json)
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let list = value.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["who"], "parser");
        assert_eq!(list[0]["severity"], "error");
        assert_eq!(list[0]["source"]["s"], 1);
        assert!(list[0]["formatted"]
            .as_str()
            .unwrap()
            .starts_with("Syntax error"));
        assert_eq!(list[1]["severity"], "warning");
        assert!(list[1].get("source").is_none());
    }

    #[test]
    fn test_format_points_at_offending_line() {
        let src = "a = \"x\"\nb = [:bogus:]\n";
        let v = Violation::error("compiler", "unknown character class").with_source(src, 13, 22);
        let text = format_violation(&v);
        assert!(text.contains("line 2: b = [:bogus:]"));
        assert!(text.contains('^'));
    }

    #[test]
    fn test_with_origin() {
        let v = Violation::error("loader", "cannot open file").with_origin("/tmp/x.rpl");
        assert_eq!(
            v.source.as_ref().and_then(|s| s.origin.as_deref()),
            Some("/tmp/x.rpl")
        );
        assert!(format_violation(&v).contains("file: /tmp/x.rpl"));
    }

    #[test]
    fn test_has_errors() {
        assert!(!has_errors(&[Violation::warning("compiler", "w")]));
        assert!(has_errors(&[
            Violation::warning("compiler", "w"),
            Violation::error("compiler", "e"),
        ]));
    }
}
