//! Match dispatch.
//!
//! Encoder names resolve through a static table: names with a native
//! encoding go to the runtime's fast entry point, every other name goes
//! through the general one. Start offsets arrive 1-based, as at the
//! public boundary, and are normalized here.

use tracing::trace;

use crate::error::{Result, Sentinel};
use crate::runtime::{FastPayload, GeneralPayload, MatchStats, PatternRef, PatternRuntime};

/// Output encoders with a native implementation in the runtime.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FastEncoder {
    Json = 1,
    Line = 2,
    Byte = 3,
    Bool = 4,
}

impl FastEncoder {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            FastEncoder::Json => "json",
            FastEncoder::Line => "line",
            FastEncoder::Byte => "byte",
            FastEncoder::Bool => "bool",
        }
    }
}

/// Encoder name to fast variant.
pub const FAST_ENCODERS: &[(&str, FastEncoder)] = &[
    ("json", FastEncoder::Json),
    ("line", FastEncoder::Line),
    ("byte", FastEncoder::Byte),
    ("bool", FastEncoder::Bool),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Fast(FastEncoder),
    Slow(&'a str),
}

pub fn route(encoder: &str) -> Route<'_> {
    FAST_ENCODERS
        .iter()
        .find(|(name, _)| *name == encoder)
        .map_or(Route::Slow(encoder), |(_, fast)| Route::Fast(*fast))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPath {
    Fast,
    Slow,
}

/// Payload of a match as seen by the embedding layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchData {
    Bytes(Vec<u8>),
    Sentinel(Sentinel),
}

impl MatchData {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            MatchData::Bytes(bytes) => Some(bytes),
            MatchData::Sentinel(_) => None,
        }
    }

    pub fn sentinel(&self) -> Option<Sentinel> {
        match self {
            MatchData::Bytes(_) => None,
            MatchData::Sentinel(s) => Some(*s),
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchData::Bytes(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub data: MatchData,
    pub leftover: usize,
    pub abend: bool,
    pub total_ticks: u64,
    pub match_ticks: u64,
    /// Which entry point produced the result. `None` for sentinels
    /// decided before reaching the runtime.
    pub path: Option<MatchPath>,
}

impl MatchResult {
    pub fn sentinel(sentinel: Sentinel) -> Self {
        Self {
            data: MatchData::Sentinel(sentinel),
            leftover: 0,
            abend: false,
            total_ticks: 0,
            match_ticks: 0,
            path: None,
        }
    }

    fn with_stats(data: MatchData, stats: MatchStats, path: MatchPath) -> Self {
        Self {
            data,
            leftover: stats.leftover,
            abend: stats.abend,
            total_ticks: stats.total_ticks,
            match_ticks: stats.match_ticks,
            path: Some(path),
        }
    }
}

/// Convert a 1-based start offset to a 0-based byte position.
///
/// `0` and `1` both mean the beginning. Negative values count back from
/// the end of the input. Offsets past the end clamp to the end.
pub fn normalize_start(start: i32, len: usize) -> usize {
    if start > 0 {
        (start as usize - 1).min(len)
    } else if start == 0 {
        0
    } else {
        len.saturating_sub(start.unsigned_abs() as usize)
    }
}

/// Run one match. A missing pattern or an over-long encoder name is a
/// sentinel result, not an error.
pub fn dispatch(
    runtime: &mut dyn PatternRuntime,
    pattern: Option<&PatternRef>,
    start: i32,
    encoder: &str,
    input: &[u8],
    max_encoder_name_len: usize,
) -> Result<MatchResult> {
    let Some(pattern) = pattern else {
        return Ok(MatchResult::sentinel(Sentinel::NoPattern));
    };
    if encoder.len() > max_encoder_name_len {
        return Ok(MatchResult::sentinel(Sentinel::NoEncoder));
    }
    let start = normalize_start(start, input.len());

    match route(encoder) {
        Route::Fast(fast) => {
            trace!(encoder = fast.name(), start, len = input.len(), "fast match");
            let m = runtime.fast_match(pattern, fast, input, start)?;
            let data = match m.payload {
                FastPayload::Buffer(buf) => MatchData::Bytes(buf.to_vec()),
                FastPayload::Owned(buf) => MatchData::Bytes(buf),
                FastPayload::NoMatch => MatchData::Sentinel(Sentinel::NoMatch),
            };
            Ok(MatchResult::with_stats(data, m.stats, MatchPath::Fast))
        }
        Route::Slow(name) => {
            trace!(encoder = name, start, len = input.len(), "general match");
            let m = runtime.general_match(pattern, name, input, start)?;
            let data = match m.payload {
                GeneralPayload::Text(text) => MatchData::Bytes(text.into_bytes()),
                GeneralPayload::NoMatch => MatchData::Sentinel(Sentinel::NoMatch),
                GeneralPayload::UnknownEncoder => MatchData::Sentinel(Sentinel::NoEncoder),
            };
            Ok(MatchResult::with_stats(data, m.stats, MatchPath::Slow))
        }
    }
}
