//! Whole-file matching.

mod common;

use std::fs;

use rosie_engine::{FileMatchRequest, Sentinel};

#[test]
fn test_lines_split_between_out_and_err() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("in.txt");
    let outfile = dir.path().join("out.txt");
    let errfile = dir.path().join("err.txt");
    fs::write(&infile, "42 apples\nno number\n7\r\n").unwrap();

    let engine = common::engine();
    let handle = engine.compile(b"[:digit:]+").unwrap().handle;
    let report = engine
        .match_file(
            handle,
            &FileMatchRequest {
                encoder: "matches",
                wholefile: false,
                infile: infile.to_str().unwrap(),
                outfile: outfile.to_str().unwrap(),
                errfile: errfile.to_str().unwrap(),
            },
        )
        .unwrap();
    assert_eq!((report.cin, report.cout, report.cerr), (3, 2, 1));
    assert_eq!(report.messages, None);
    assert_eq!(fs::read_to_string(&outfile).unwrap(), "42\n7\n");
    assert_eq!(fs::read_to_string(&errfile).unwrap(), "no number\n");
}

#[test]
fn test_wholefile_is_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("in.txt");
    let outfile = dir.path().join("out.txt");
    let errfile = dir.path().join("err.txt");
    fs::write(&infile, "abc\ndef\n").unwrap();

    let engine = common::engine();
    let handle = engine.compile(b"{[:alpha:]+ \"\\n\"}+").unwrap().handle;
    assert_ne!(handle, 0);
    let report = engine
        .match_file(
            handle,
            &FileMatchRequest {
                encoder: "json",
                wholefile: true,
                infile: infile.to_str().unwrap(),
                outfile: outfile.to_str().unwrap(),
                errfile: errfile.to_str().unwrap(),
            },
        )
        .unwrap();
    assert_eq!((report.cin, report.cout, report.cerr), (1, 1, 0));
    let out = fs::read_to_string(&outfile).unwrap();
    let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
    assert_eq!(value["e"], 9);
}

#[test]
fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine();
    let handle = engine.compile(b"[:digit:]+").unwrap().handle;
    let missing = dir.path().join("missing.txt");
    let outfile = dir.path().join("out.txt");
    let report = engine
        .match_file(
            handle,
            &FileMatchRequest {
                encoder: "json",
                wholefile: false,
                infile: missing.to_str().unwrap(),
                outfile: outfile.to_str().unwrap(),
                errfile: outfile.to_str().unwrap(),
            },
        )
        .unwrap();
    assert_eq!(report.cin, -1);
    assert_eq!(report.failed(), Some(Sentinel::NoFile));
    assert!(report.messages.unwrap().contains("cannot open input file"));
}

#[test]
fn test_bad_handle_and_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("in.txt");
    let outfile = dir.path().join("out.txt");
    fs::write(&infile, "1\n").unwrap();
    let engine = common::engine();
    let request = FileMatchRequest {
        encoder: "json",
        wholefile: false,
        infile: infile.to_str().unwrap(),
        outfile: outfile.to_str().unwrap(),
        errfile: outfile.to_str().unwrap(),
    };

    let report = engine.match_file(99, &request).unwrap();
    assert_eq!(report.failed(), Some(Sentinel::NoPattern));

    let handle = engine.compile(b"[:digit:]+").unwrap().handle;
    let report = engine
        .match_file(
            handle,
            &FileMatchRequest {
                encoder: "nosuch",
                ..request
            },
        )
        .unwrap();
    assert_eq!(report.failed(), Some(Sentinel::NoEncoder));
}

#[test]
fn test_unknown_encoder_rejected_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("empty.txt");
    let outfile = dir.path().join("out.txt");
    let errfile = dir.path().join("err.txt");
    fs::write(&infile, "").unwrap();

    let engine = common::engine();
    let handle = engine.compile(b"[:digit:]+").unwrap().handle;
    let report = engine
        .match_file(
            handle,
            &FileMatchRequest {
                encoder: "bogus",
                wholefile: false,
                infile: infile.to_str().unwrap(),
                outfile: outfile.to_str().unwrap(),
                errfile: errfile.to_str().unwrap(),
            },
        )
        .unwrap();
    assert_eq!(report.cin, -1);
    assert_eq!(report.failed(), Some(Sentinel::NoEncoder));
    assert!(report.messages.unwrap().contains("bogus"));
    assert!(!outfile.exists());
}
