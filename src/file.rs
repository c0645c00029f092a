//! Whole-file matching.
//!
//! Records (lines, or the entire file in whole-file mode) are read from
//! the input and matched one by one. Encoded matches go to the output,
//! records that do not match go to the error stream. An empty file name
//! selects the corresponding standard stream.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

use anyhow::Context;
use tracing::debug;

use crate::dispatch::{route, MatchData, Route};
use crate::engine::EngineState;
use crate::error::{Result, RosieError, Sentinel};
use crate::violation::Violation;

#[derive(Debug, Clone, Copy, Default)]
pub struct FileMatchRequest<'a> {
    pub encoder: &'a str,
    /// Match the whole file as one record instead of line by line.
    pub wholefile: bool,
    pub infile: &'a str,
    pub outfile: &'a str,
    pub errfile: &'a str,
}

/// Record counts, or on failure `cin == -1` with the reason code in
/// `cout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatchReport {
    pub cin: i32,
    pub cout: i32,
    pub cerr: i32,
    pub messages: Option<String>,
}

impl FileMatchReport {
    pub fn failed(&self) -> Option<Sentinel> {
        if self.cin == -1 {
            u32::try_from(self.cout).ok().and_then(Sentinel::from_code)
        } else {
            None
        }
    }
}

fn open_input(name: &str) -> anyhow::Result<Box<dyn BufRead>> {
    if name.is_empty() {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(name).with_context(|| format!("cannot open input file {name}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(name: &str, stderr: bool) -> anyhow::Result<Box<dyn Write>> {
    if name.is_empty() {
        return Ok(if stderr {
            Box::new(io::stderr())
        } else {
            Box::new(BufWriter::new(io::stdout()))
        });
    }
    let file = File::create(name).with_context(|| format!("cannot open output file {name}"))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn failure(state: &EngineState, reason: Sentinel, message: String) -> Result<FileMatchReport> {
    let violation = Violation::error("match_file", message);
    Ok(FileMatchReport {
        cin: -1,
        cout: reason.code() as i32,
        cerr: 0,
        messages: state.messages(&[violation])?,
    })
}

fn syscall(err: io::Error, what: &str) -> RosieError {
    RosieError::Syscall(format!("{what}: {err}"))
}

fn next_record(input: &mut dyn BufRead, wholefile: bool, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if wholefile {
        let n = input.read_to_end(buf)?;
        return Ok(n > 0);
    }
    if input.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

pub(crate) fn match_file(
    state: &mut EngineState,
    handle: i32,
    request: &FileMatchRequest<'_>,
) -> Result<FileMatchReport> {
    if state.handles.get(handle).is_none() {
        return failure(state, Sentinel::NoPattern, format!("invalid pattern handle {handle}"));
    }
    if request.encoder.len() > state.config.max_encoder_name_len {
        return failure(state, Sentinel::NoEncoder, "encoder name too long".to_string());
    }
    if let Route::Slow(name) = route(request.encoder) {
        if !state.runtime.general_encoders().contains(&name) {
            return failure(state, Sentinel::NoEncoder, format!("unknown encoder '{name}'"));
        }
    }

    let streams = open_input(request.infile).and_then(|input| {
        Ok((
            input,
            open_output(request.outfile, false)?,
            open_output(request.errfile, true)?,
        ))
    });
    let (mut input, mut out, mut err) = match streams {
        Ok(streams) => streams,
        Err(e) => return failure(state, Sentinel::NoFile, format!("{e:#}")),
    };

    let (mut cin, mut cout, mut cerr) = (0i32, 0i32, 0i32);
    let mut record = Vec::new();
    while next_record(input.as_mut(), request.wholefile, &mut record)
        .map_err(|e| syscall(e, "read failed"))?
    {
        cin += 1;
        let result = state.match_once(handle, 1, request.encoder, &record)?;
        match result.data {
            MatchData::Bytes(bytes) => {
                out.write_all(&bytes)
                    .and_then(|_| out.write_all(b"\n"))
                    .map_err(|e| syscall(e, "write failed"))?;
                cout += 1;
            }
            MatchData::Sentinel(Sentinel::NoMatch) => {
                err.write_all(&record)
                    .and_then(|_| err.write_all(b"\n"))
                    .map_err(|e| syscall(e, "write failed"))?;
                cerr += 1;
            }
            MatchData::Sentinel(reason) => {
                let message = format!("cannot match with encoder '{}': {reason}", request.encoder);
                return failure(state, reason, message);
            }
        }
    }
    out.flush().map_err(|e| syscall(e, "flush failed"))?;
    err.flush().map_err(|e| syscall(e, "flush failed"))?;
    debug!(cin, cout, cerr, infile = request.infile, "file matched");

    Ok(FileMatchReport {
        cin,
        cout,
        cerr,
        messages: None,
    })
}
