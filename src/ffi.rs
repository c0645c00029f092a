//! C API.
//!
//! Every function returns a status code (`SUCCESS` or a negative error)
//! unless it constructs or releases a value. Strings written through
//! output pointers are fresh allocations the caller releases with
//! `rosie_free_string`; input strings are borrowed for the duration of
//! the call only. A written string with a NULL `ptr` is either "nothing
//! to report" (`len == 0`) or a sentinel reason code.

use std::ffi::{c_char, c_int, CStr};
use std::ptr;
use std::slice;

use tracing::warn;

use crate::dispatch::MatchData;
use crate::engine::Engine;
use crate::error::{Result, RosieError, SUCCESS};
use crate::file::FileMatchRequest;
use crate::rstr::RosieString;

/// Match result as seen from C.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RosieMatch {
    pub data: RosieString,
    pub leftover: c_int,
    pub abend: c_int,
    /// Microseconds for the whole call.
    pub ttotal: c_int,
    /// Microseconds spent matching.
    pub tmatch: c_int,
}

fn clamp(n: impl TryInto<c_int>) -> c_int {
    n.try_into().unwrap_or(c_int::MAX)
}

fn status(op: &str, result: Result<()>) -> c_int {
    match result {
        Ok(()) => SUCCESS,
        Err(err) => {
            warn!(op, status = err.status(), "{err}");
            err.status()
        }
    }
}

fn null_argument(what: &str) -> RosieError {
    RosieError::InvalidArgument(format!("{what} is NULL"))
}

unsafe fn engine<'a>(e: *mut Engine) -> Result<&'a Engine> {
    e.as_ref().ok_or_else(|| null_argument("engine"))
}

/// Borrow the bytes of an input string. A NULL data pointer reads as
/// empty.
unsafe fn input<'a>(s: *const RosieString, what: &str) -> Result<&'a [u8]> {
    let s = s.as_ref().ok_or_else(|| null_argument(what))?;
    Ok(s.as_bytes().unwrap_or(&[]))
}

unsafe fn text<'a>(s: *const RosieString, what: &str) -> Result<&'a str> {
    std::str::from_utf8(input(s, what)?)
        .map_err(|_| RosieError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

unsafe fn c_str<'a>(p: *const c_char, what: &str) -> Result<&'a str> {
    if p.is_null() {
        return Err(null_argument(what));
    }
    CStr::from_ptr(p)
        .to_str()
        .map_err(|_| RosieError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

unsafe fn write<T>(out: *mut T, value: T, what: &str) -> Result<()> {
    if out.is_null() {
        return Err(null_argument(what));
    }
    out.write(value);
    Ok(())
}

/// Write an optional message: `None` becomes the NULL/zero-length string.
unsafe fn write_text(out: *mut RosieString, value: Option<String>, what: &str) -> Result<()> {
    let s = match value {
        Some(text) => RosieString::from_vec(text.into_bytes())?,
        None => RosieString::null(),
    };
    write(out, s, what)
}

unsafe fn write_data(out: *mut RosieString, data: MatchData, what: &str) -> Result<()> {
    let s = match data {
        MatchData::Bytes(bytes) => RosieString::from_vec(bytes)?,
        MatchData::Sentinel(sentinel) => RosieString::sentinel(sentinel),
    };
    write(out, s, what)
}

/// Copy `len` bytes into a new owned string. Returns a NULL string when
/// allocation fails.
///
/// # Safety
/// `msg` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn rosie_new_string(msg: *const u8, len: usize) -> RosieString {
    let bytes = if msg.is_null() {
        &[][..]
    } else {
        slice::from_raw_parts(msg, len)
    };
    RosieString::new_owned(bytes).unwrap_or(RosieString::null())
}

/// Like [`rosie_new_string`], but the string itself is heap allocated.
/// Release with `rosie_free_string_ptr`.
///
/// # Safety
/// `msg` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn rosie_new_string_ptr(msg: *const u8, len: usize) -> *mut RosieString {
    let s = rosie_new_string(msg, len);
    if s.is_null() {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(s))
}

/// Heap-allocated string holding a copy of `msg`, the pointer form of
/// [`rosie_string_from`]. Release with `rosie_free_string_ptr`.
///
/// # Safety
/// `msg` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn rosie_string_ptr_from(msg: *const u8, len: usize) -> *mut RosieString {
    rosie_new_string_ptr(msg, len)
}

/// A borrowed view of caller memory. Never pass it to a free function.
///
/// # Safety
/// `msg` must stay valid for as long as the view is used.
#[no_mangle]
pub unsafe extern "C" fn rosie_string_from(msg: *const u8, len: usize) -> RosieString {
    if msg.is_null() {
        return RosieString::null();
    }
    RosieString::view(slice::from_raw_parts(msg, len))
}

/// # Safety
/// `s` must come from this library and be released at most once.
#[no_mangle]
pub unsafe extern "C" fn rosie_free_string(s: RosieString) {
    s.free();
}

/// # Safety
/// `s` must come from `rosie_new_string_ptr` and be released at most once.
#[no_mangle]
pub unsafe extern "C" fn rosie_free_string_ptr(s: *mut RosieString) {
    if !s.is_null() {
        let owned = *Box::from_raw(s);
        owned.free();
    }
}

/// Create an engine. On failure returns NULL and writes the reason to
/// `messages`.
///
/// # Safety
/// `messages` must be NULL or writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_new(messages: *mut RosieString) -> *mut Engine {
    match Engine::new() {
        Ok(engine) => {
            if !messages.is_null() {
                messages.write(RosieString::null());
            }
            Box::into_raw(Box::new(engine))
        }
        Err(err) => {
            warn!("engine construction failed: {err}");
            if !messages.is_null() {
                let text = RosieString::new_owned(err.to_string().as_bytes())
                    .unwrap_or(RosieString::null());
                messages.write(text);
            }
            ptr::null_mut()
        }
    }
}

/// Tear down and free an engine.
///
/// # Safety
/// `e` must come from `rosie_new` and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn rosie_finalize(e: *mut Engine) {
    if e.is_null() {
        return;
    }
    let engine = Box::from_raw(e);
    engine.finalize();
}

/// # Safety
/// `e` must be a live engine and `retval` writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_config(e: *mut Engine, retval: *mut RosieString) -> c_int {
    status("config", (|| {
        let config = engine(e)?.config()?;
        write_text(retval, Some(config), "retval")
    })())
}

/// Get or set the libpath. When `newpath` has a NULL data pointer the
/// current path is written into it, otherwise it is the path to set.
///
/// # Safety
/// `e` must be a live engine and `newpath` readable and writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_libpath(e: *mut Engine, newpath: *mut RosieString) -> c_int {
    status("libpath", (|| {
        let engine = engine(e)?;
        let current = newpath.as_ref().ok_or_else(|| null_argument("newpath"))?;
        if current.is_null() {
            write_text(newpath, Some(engine.libpath()?), "newpath")
        } else {
            engine.set_libpath(text(newpath, "newpath")?)
        }
    })())
}

/// Query (`*newlimit == -1`) or set the allocation limit in MB. Writes
/// the limit back to `newlimit` and heap usage in KB to `usage`.
///
/// # Safety
/// `e` must be a live engine; both pointers readable and writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_alloc_limit(
    e: *mut Engine,
    newlimit: *mut c_int,
    usage: *mut c_int,
) -> c_int {
    status("alloc_limit", (|| {
        let engine = engine(e)?;
        let requested = newlimit.as_ref().copied().ok_or_else(|| null_argument("newlimit"))?;
        let report = match requested {
            -1 => engine.alloc_limit()?,
            mb if mb >= 0 => engine.set_alloc_limit(mb as u32)?,
            mb => {
                return Err(RosieError::InvalidArgument(format!(
                    "allocation limit {mb} is negative"
                )))
            }
        };
        write(newlimit, clamp(report.limit_mb), "newlimit")?;
        write(usage, clamp(report.usage_kb), "usage")
    })())
}

/// # Safety
/// `e` must be a live engine; `expression` readable; `pat` and
/// `messages` writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_compile(
    e: *mut Engine,
    expression: *mut RosieString,
    pat: *mut c_int,
    messages: *mut RosieString,
) -> c_int {
    status("compile", (|| {
        let outcome = engine(e)?.compile(input(expression, "expression")?)?;
        write(pat, outcome.handle, "pat")?;
        write_text(messages, outcome.messages, "messages")
    })())
}

/// # Safety
/// `e` must be NULL or a live engine.
#[no_mangle]
pub unsafe extern "C" fn rosie_free_rplx(e: *mut Engine, pat: c_int) -> c_int {
    status("free_rplx", (|| engine(e)?.free_pattern(pat))())
}

/// # Safety
/// `e` must be a live engine; `encoder` a NUL-terminated string; `input`
/// readable; `m` writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_match(
    e: *mut Engine,
    pat: c_int,
    start: c_int,
    encoder: *const c_char,
    input_str: *mut RosieString,
    m: *mut RosieMatch,
) -> c_int {
    status("match", (|| {
        let engine = engine(e)?;
        let raw = engine.match_raw(
            pat,
            start,
            c_str(encoder, "encoder")?,
            input(input_str, "input")?,
        )?;
        let result = RosieMatch {
            data: raw.data,
            leftover: clamp(raw.leftover),
            abend: c_int::from(raw.abend),
            ttotal: clamp(raw.total_ticks),
            tmatch: clamp(raw.match_ticks),
        };
        write(m, result, "match")
    })())
}

/// Match a file record by record. Empty file names mean the standard
/// streams.
///
/// # Safety
/// `e` must be a live engine; string arguments NUL-terminated; counters
/// and `err` writable.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn rosie_matchfile(
    e: *mut Engine,
    pat: c_int,
    encoder: *const c_char,
    wholefileflag: c_int,
    infilename: *const c_char,
    outfilename: *const c_char,
    errfilename: *const c_char,
    cin: *mut c_int,
    cout: *mut c_int,
    cerr: *mut c_int,
    err: *mut RosieString,
) -> c_int {
    status("matchfile", (|| {
        let request = FileMatchRequest {
            encoder: c_str(encoder, "encoder")?,
            wholefile: wholefileflag != 0,
            infile: c_str(infilename, "infilename")?,
            outfile: c_str(outfilename, "outfilename")?,
            errfile: c_str(errfilename, "errfilename")?,
        };
        let report = engine(e)?.match_file(pat, &request)?;
        write(cin, report.cin, "cin")?;
        write(cout, report.cout, "cout")?;
        write(cerr, report.cerr, "cerr")?;
        write_text(err, report.messages, "err")
    })())
}

/// # Safety
/// `e` must be a live engine; `trace_style` NUL-terminated; `input`
/// readable; `matched` and `trace` writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_trace(
    e: *mut Engine,
    pat: c_int,
    start: c_int,
    trace_style: *const c_char,
    input_str: *mut RosieString,
    matched: *mut c_int,
    trace: *mut RosieString,
) -> c_int {
    status("trace", (|| {
        let result = engine(e)?.trace(
            pat,
            start,
            c_str(trace_style, "trace_style")?,
            input(input_str, "input")?,
        )?;
        write(matched, c_int::from(result.matched), "matched")?;
        write_data(trace, result.trace, "trace")
    })())
}

/// # Safety
/// `e` must be a live engine; `src` readable; the rest writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_load(
    e: *mut Engine,
    ok: *mut c_int,
    src: *mut RosieString,
    pkgname: *mut RosieString,
    messages: *mut RosieString,
) -> c_int {
    status("load", (|| {
        let outcome = engine(e)?.load(input(src, "src")?)?;
        write(ok, c_int::from(outcome.ok), "ok")?;
        write_text(pkgname, outcome.pkgname, "pkgname")?;
        write_text(messages, outcome.messages, "messages")
    })())
}

/// # Safety
/// `e` must be a live engine; `filename` readable; the rest writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_loadfile(
    e: *mut Engine,
    ok: *mut c_int,
    filename: *mut RosieString,
    pkgname: *mut RosieString,
    messages: *mut RosieString,
) -> c_int {
    status("loadfile", (|| {
        let outcome = engine(e)?.load_file(text(filename, "filename")?)?;
        write(ok, c_int::from(outcome.ok), "ok")?;
        write_text(pkgname, outcome.pkgname, "pkgname")?;
        write_text(messages, outcome.messages, "messages")
    })())
}

/// Import a package. `as_name` may be NULL or have a NULL data pointer
/// to import under the package's own name.
///
/// # Safety
/// `e` must be a live engine; `pkgname` readable; `as_name` NULL or
/// readable; the rest writable.
#[no_mangle]
pub unsafe extern "C" fn rosie_import(
    e: *mut Engine,
    ok: *mut c_int,
    pkgname: *mut RosieString,
    as_name: *mut RosieString,
    actual_pkgname: *mut RosieString,
    messages: *mut RosieString,
) -> c_int {
    status("import", (|| {
        let alias = match as_name.as_ref() {
            Some(s) if !s.is_null() => Some(text(as_name, "as")?),
            _ => None,
        };
        let outcome = engine(e)?.import(text(pkgname, "pkgname")?, alias)?;
        write(ok, c_int::from(outcome.ok), "ok")?;
        write_text(actual_pkgname, outcome.pkgname, "actual_pkgname")?;
        write_text(messages, outcome.messages, "messages")
    })())
}
