//! The C API driven from Rust, the way a C host would call it.

use std::ffi::{c_int, CString};
use std::ptr;

use rosie_engine::ffi::*;
use rosie_engine::{Engine, RosieMatch, RosieString, Sentinel, SUCCESS};

fn boot() -> *mut Engine {
    std::env::set_var("ROSIE_HOME", concat!(env!("CARGO_MANIFEST_DIR"), "/rosie"));
    let mut messages = RosieString::null();
    let engine = unsafe { rosie_new(&mut messages) };
    assert!(!engine.is_null(), "engine failed to boot");
    assert!(messages.is_null());
    engine
}

fn text(s: &RosieString) -> String {
    let bytes = unsafe { s.as_bytes() }.expect("non-NULL string");
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn empty_match() -> RosieMatch {
    RosieMatch {
        data: RosieString::null(),
        leftover: 0,
        abend: 0,
        ttotal: 0,
        tmatch: 0,
    }
}

#[test]
fn test_compile_match_free_cycle() {
    let engine = boot();
    let source = b"[:digit:]+";
    let mut expression = unsafe { rosie_string_from(source.as_ptr(), source.len()) };
    let mut pat: c_int = 0;
    let mut messages = RosieString::null();
    let status = unsafe { rosie_compile(engine, &mut expression, &mut pat, &mut messages) };
    assert_eq!(status, SUCCESS);
    assert_ne!(pat, 0);
    assert!(messages.is_null());

    let subject = b"123 abcdef";
    let mut input = unsafe { rosie_string_from(subject.as_ptr(), subject.len()) };
    let encoder = CString::new("json").unwrap();
    let mut m = empty_match();
    let status = unsafe { rosie_match(engine, pat, 1, encoder.as_ptr(), &mut input, &mut m) };
    assert_eq!(status, SUCCESS);
    assert_eq!(m.leftover, 7);
    assert_eq!(m.abend, 0);
    let value: serde_json::Value = serde_json::from_str(&text(&m.data)).unwrap();
    assert_eq!(value["data"], "123");
    unsafe { rosie_free_string(m.data) };

    assert_eq!(unsafe { rosie_free_rplx(engine, pat) }, SUCCESS);
    let mut m = empty_match();
    let status = unsafe { rosie_match(engine, pat, 1, encoder.as_ptr(), &mut input, &mut m) };
    assert_eq!(status, SUCCESS);
    assert_eq!(m.data.sentinel_code(), Some(Sentinel::NoPattern));

    unsafe { rosie_finalize(engine) };
}

#[test]
fn test_compile_failure_messages() {
    let engine = boot();
    let source = b"[:digit:";
    let mut expression = unsafe { rosie_string_from(source.as_ptr(), source.len()) };
    let mut pat: c_int = -1;
    let mut messages = RosieString::null();
    let status = unsafe { rosie_compile(engine, &mut expression, &mut pat, &mut messages) };
    assert_eq!(status, SUCCESS);
    assert_eq!(pat, 0);
    assert!(text(&messages).contains("Syntax error"));
    unsafe {
        rosie_free_string(messages);
        rosie_finalize(engine);
    }
}

#[test]
fn test_no_match_is_null_data() {
    let engine = boot();
    let source = b"[:digit:]+";
    let mut expression = unsafe { rosie_string_from(source.as_ptr(), source.len()) };
    let mut pat: c_int = 0;
    let mut messages = RosieString::null();
    unsafe { rosie_compile(engine, &mut expression, &mut pat, &mut messages) };

    let subject = b"hi";
    let mut input = unsafe { rosie_string_from(subject.as_ptr(), subject.len()) };
    let encoder = CString::new("matches").unwrap();
    let mut m = empty_match();
    let status = unsafe { rosie_match(engine, pat, 1, encoder.as_ptr(), &mut input, &mut m) };
    assert_eq!(status, SUCCESS);
    assert!(m.data.ptr.is_null());
    assert_eq!(m.data.sentinel_code(), Some(Sentinel::NoMatch));
    unsafe { rosie_finalize(engine) };
}

#[test]
fn test_import_nonexistent() {
    let engine = boot();
    let name = b"nonexistent_package";
    let mut pkgname = unsafe { rosie_string_from(name.as_ptr(), name.len()) };
    let mut ok: c_int = 1;
    let mut actual = RosieString::null();
    let mut messages = RosieString::null();
    let status = unsafe {
        rosie_import(
            engine,
            &mut ok,
            &mut pkgname,
            ptr::null_mut(),
            &mut actual,
            &mut messages,
        )
    };
    assert_eq!(status, SUCCESS);
    assert_eq!(ok, 0);
    assert!(actual.is_null());
    let value: serde_json::Value = serde_json::from_str(&text(&messages)).unwrap();
    assert!(!value.as_array().unwrap().is_empty());
    unsafe {
        rosie_free_string(messages);
        rosie_finalize(engine);
    }
}

#[test]
fn test_alloc_limit_and_libpath() {
    let engine = boot();
    let mut limit: c_int = -1;
    let mut usage: c_int = -1;
    assert_eq!(unsafe { rosie_alloc_limit(engine, &mut limit, &mut usage) }, SUCCESS);
    assert_eq!(limit, 0);
    assert!(usage >= 0);

    let mut limit: c_int = 5;
    assert_ne!(unsafe { rosie_alloc_limit(engine, &mut limit, &mut usage) }, SUCCESS);

    let mut limit: c_int = 20;
    assert_eq!(unsafe { rosie_alloc_limit(engine, &mut limit, &mut usage) }, SUCCESS);
    assert_eq!(limit, 20);

    let mut current = RosieString::null();
    assert_eq!(unsafe { rosie_libpath(engine, &mut current) }, SUCCESS);
    assert!(text(&current).ends_with("rpl"));
    unsafe { rosie_free_string(current) };

    let path = b"/tmp/rpl";
    let mut newpath = unsafe { rosie_string_from(path.as_ptr(), path.len()) };
    assert_eq!(unsafe { rosie_libpath(engine, &mut newpath) }, SUCCESS);
    let mut current = RosieString::null();
    unsafe { rosie_libpath(engine, &mut current) };
    assert_eq!(text(&current), "/tmp/rpl");
    unsafe {
        rosie_free_string(current);
        rosie_finalize(engine);
    }
}

#[test]
fn test_config_and_trace() {
    let engine = boot();
    let mut config = RosieString::null();
    assert_eq!(unsafe { rosie_config(engine, &mut config) }, SUCCESS);
    let value: serde_json::Value = serde_json::from_str(&text(&config)).unwrap();
    assert!(value.as_array().unwrap().len() >= 5);
    unsafe { rosie_free_string(config) };

    let source = b"[:alpha:]+";
    let mut expression = unsafe { rosie_string_from(source.as_ptr(), source.len()) };
    let mut pat: c_int = 0;
    let mut messages = RosieString::null();
    unsafe { rosie_compile(engine, &mut expression, &mut pat, &mut messages) };

    let subject = b"abc";
    let mut input = unsafe { rosie_string_from(subject.as_ptr(), subject.len()) };
    let style = CString::new("condensed").unwrap();
    let mut matched: c_int = 0;
    let mut trace = RosieString::null();
    let status = unsafe {
        rosie_trace(engine, pat, 1, style.as_ptr(), &mut input, &mut matched, &mut trace)
    };
    assert_eq!(status, SUCCESS);
    assert_eq!(matched, 1);
    assert!(text(&trace).contains("Matched"));
    unsafe { rosie_free_string(trace) };

    let bogus = CString::new("sparkly").unwrap();
    let mut trace = RosieString::null();
    unsafe { rosie_trace(engine, pat, 1, bogus.as_ptr(), &mut input, &mut matched, &mut trace) };
    assert_eq!(trace.sentinel_code(), Some(Sentinel::NoEncoder));
    unsafe { rosie_finalize(engine) };
}

#[test]
fn test_load_through_c_api() {
    let engine = boot();
    let src = b"package demo\nword = [:alpha:]+";
    let mut source = unsafe { rosie_string_from(src.as_ptr(), src.len()) };
    let mut ok: c_int = 0;
    let mut pkgname = RosieString::null();
    let mut messages = RosieString::null();
    let status = unsafe { rosie_load(engine, &mut ok, &mut source, &mut pkgname, &mut messages) };
    assert_eq!(status, SUCCESS);
    assert_eq!(ok, 1);
    assert_eq!(text(&pkgname), "demo");
    assert!(messages.is_null());
    unsafe {
        rosie_free_string(pkgname);
        rosie_finalize(engine);
    }
}

#[test]
fn test_null_arguments_fail_cleanly() {
    let engine = boot();
    let mut pat: c_int = 0;
    let mut messages = RosieString::null();
    let status = unsafe { rosie_compile(engine, ptr::null_mut(), &mut pat, &mut messages) };
    assert!(status < 0);
    unsafe { rosie_finalize(engine) };
}
