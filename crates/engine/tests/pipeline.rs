// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! End-to-end tests of the capture, transport and reconstruction pipeline

use std::sync::Arc;

use tbx_common::{ExceptionType, ExceptionValue, Table, Value, FAILED_VARIABLES_KEY};
use tbx_engine::{
    capture_error, decode_blob, encode_blob, to_live, to_snapshot, CapturedFrame, FrameView,
    SessionRegistry, TracebackView,
};

const SOURCE: &str = "\
fn compute(x: i64) -> i64 {
    let y = open_socket();
    let ratio = 10;
    let scaled = x * ratio;
    fail(scaled)
}

fn open_socket() {}

fn fail(_: i64) -> i64 { 0 }
";

fn failing_frame() -> CapturedFrame {
    CapturedFrame::new("src/compute.rs", 5, "app::compute", "compute")
        .with_source(SOURCE)
        .local("x", 42)
        .local("y", Value::opaque("std::net::TcpStream"))
        .global("LIMIT", 100)
}

#[test]
fn test_capture_transport_reconstruct() {
    tbx_common::logging::ensure_test_logging(None);

    let snapshot = to_snapshot(
        ExceptionType::new("app::ComputeError"),
        ExceptionValue::new("overflow"),
        &failing_frame(),
    )
    .unwrap();
    let blob = encode_blob(&snapshot).unwrap();

    let traceback = to_live(decode_blob(&blob).unwrap());
    assert_eq!(traceback.exception_line(), "ComputeError: overflow");

    let frames = traceback.frames();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.lineno(), 5);
    assert_eq!(frame.function_name(), "compute");
    assert_eq!(frame.filename(), "src/compute.rs");
    assert_eq!(frame.source_lines().len(), 10);
    assert_eq!(frame.current_line(), Some("    fail(scaled)"));

    let locals = frame.locals();
    assert_eq!(locals["x"], Value::Int(42));
    assert!(!locals.contains_key("y"));
    assert_eq!(locals[FAILED_VARIABLES_KEY], Value::List(vec!["y".into()]));
    assert_eq!(frame.globals()["LIMIT"], Value::Int(100));
    assert!(!frame.hide());
}

#[test]
fn test_capture_from_rust_error() {
    tbx_common::logging::ensure_test_logging(None);

    let err = "4x2".parse::<u8>().unwrap_err();
    let frame = tbx_engine::capture_frame!()
        .local("input", "4x2")
        .local("rows", Table::new().with_column("id", [1, 2]));
    let snapshot = capture_error(&err, &frame).unwrap();

    let traceback = to_live(snapshot);
    let live = &traceback.frames()[0];
    assert_eq!(live.function_name(), "test_capture_from_rust_error");
    assert!(live.current_line().unwrap().contains("capture_frame!"));
    assert_eq!(live.locals()["input"], Value::from("4x2"));
    assert!(matches!(&live.locals()["rows"], Value::Table(t) if t.num_rows() == 2));
    assert!(live.failed_locals().is_empty());
}

#[test]
fn test_sessions_over_reconstructed_tracebacks() {
    tbx_common::logging::ensure_test_logging(None);

    let registry = SessionRegistry::new();
    let blob = encode_blob(
        &to_snapshot(ExceptionType::new("E"), ExceptionValue::new("m"), &failing_frame()).unwrap(),
    )
    .unwrap();

    let first = Arc::new(to_live(decode_blob(&blob).unwrap()));
    let second = Arc::new(to_live(decode_blob(&blob).unwrap()));
    let a = registry.register("compute", Arc::clone(&first));
    let b = registry.register("compute", second);
    assert_ne!(a, b);
    assert_ne!(first.frames()[0].id(), registry.lookup(b).unwrap().frames()[0].id());

    registry.clear();
    assert!(registry.list().is_empty());
    assert!(registry.lookup(a).is_err());
    assert!(first.frames()[0].locals().is_empty());
}
