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

//! Snapshotting a live frame and rebuilding a viewable traceback from it.

use tbx_common::{CodeInfo, ExceptionType, ExceptionValue, FrameSnapshot, TracebackEntry, TracebackSnapshot};
use tracing::{debug, warn};

use super::variable::encode_variables;
use crate::{
    capture::{CaptureError, LiveFrame},
    reconstruct::Traceback,
};

/// Capture the exception and the frame it happened in.
///
/// The full source text of the frame's module must be obtainable; when the
/// frame has no loader or the loader fails, the capture fails as a whole.
/// Variables that cannot be encoded are recorded as such and never fail the
/// capture. Only `frame` is recorded, the resulting chain has one entry.
pub fn to_snapshot(
    exc_type: ExceptionType,
    exc_value: ExceptionValue,
    frame: &dyn LiveFrame,
) -> Result<TracebackSnapshot, CaptureError> {
    let module = frame.module();
    let loader = frame.loader().ok_or_else(|| CaptureError::SourceUnavailable {
        module: module.to_string(),
        reason: "module has no source loader".to_string(),
    })?;
    let source = loader.get_source(module).inspect_err(|e| warn!("Capture aborted: {e}"))?;

    let snapshot = FrameSnapshot {
        code: CodeInfo { name: frame.function_name().to_string() },
        lineno: frame.lineno(),
        filename: frame.filename().to_string(),
        module: module.to_string(),
        source,
        locals: encode_variables(frame.locals()),
        globals: encode_variables(frame.globals()),
    };
    debug!(
        "Captured {} at {}:{} ({} locals, {} globals)",
        exc_type.name,
        snapshot.filename,
        snapshot.lineno,
        snapshot.locals.len(),
        snapshot.globals.len()
    );

    Ok(TracebackSnapshot {
        exc_type,
        exc_value,
        tb: TracebackEntry { frame: snapshot, next: None },
    })
}

/// Capture a Rust error raised in `frame`.
///
/// The exception type is the error's type name; the exception value holds its
/// message and the messages of its source chain.
pub fn capture_error<E>(error: &E, frame: &dyn LiveFrame) -> Result<TracebackSnapshot, CaptureError>
where
    E: std::error::Error + 'static,
{
    to_snapshot(ExceptionType::of::<E>(), ExceptionValue::from_error(error), frame)
}

/// Rebuild a traceback whose frames can be rendered and inspected
pub fn to_live(snapshot: TracebackSnapshot) -> Traceback {
    Traceback::from_snapshot(snapshot)
}
