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

//! Frames and tracebacks rebuilt from snapshots.
//!
//! [`FrameView`] and [`TracebackView`] are everything a renderer may rely on.
//! The concrete [`Frame`] keeps its variable maps behind locks so that values
//! can be released while other owners still hold the traceback.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::{RwLock, RwLockReadGuard};
use tbx_common::{
    CodeInfo, ExceptionType, ExceptionValue, FrameSnapshot, TracebackSnapshot, Value,
    VariableMap, TRACEBACK_HIDE_KEY,
};
use tracing::trace;

use crate::codec::decode_variables;

/// Identifier of a reconstructed frame, unique within the process
pub type FrameId = u64;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Read access to one frame, as needed by a renderer
pub trait FrameView {
    /// Unique id of the frame
    fn id(&self) -> FrameId;

    /// Code information
    fn code(&self) -> &CodeInfo;

    /// Name of the function
    fn function_name(&self) -> &str {
        &self.code().name
    }

    /// Current line number (1-based)
    fn lineno(&self) -> u32;

    /// Source file name
    fn filename(&self) -> &str;

    /// Module path
    fn module(&self) -> &str;

    /// Full source text of the module
    fn source(&self) -> &str;

    /// Source split into lines
    fn source_lines(&self) -> Vec<&str> {
        self.source().lines().collect()
    }

    /// The line being executed, if it lies within the source
    fn current_line(&self) -> Option<&str> {
        let index = usize::try_from(self.lineno()).ok()?.checked_sub(1)?;
        self.source().lines().nth(index)
    }

    /// Source lines at most `context` lines away from the current one, paired
    /// with their 1-based numbers
    fn source_window(&self, context: u32) -> Vec<(u32, &str)> {
        let current = self.lineno();
        let first = current.saturating_sub(context).max(1);
        let last = current.saturating_add(context);
        (1u32..)
            .zip(self.source().lines())
            .skip_while(|(number, _)| *number < first)
            .take_while(|(number, _)| *number <= last)
            .collect()
    }

    /// Decoded local variables, including the list of failed names
    fn locals(&self) -> RwLockReadGuard<'_, VariableMap>;

    /// Decoded global variables, including the list of failed names
    fn globals(&self) -> RwLockReadGuard<'_, VariableMap>;

    /// Names of locals that could not be transmitted
    fn failed_locals(&self) -> &[String];

    /// Names of globals that could not be transmitted
    fn failed_globals(&self) -> &[String];

    /// Whether the frame asked to be hidden from tracebacks
    fn hide(&self) -> bool {
        self.locals().get(TRACEBACK_HIDE_KEY).is_some_and(Value::is_truthy)
    }
}

/// Read access to a whole traceback
pub trait TracebackView {
    /// Frame type
    type Frame: FrameView;

    /// Type of the exception
    fn exc_type(&self) -> &ExceptionType;

    /// Value of the exception
    fn exc_value(&self) -> &ExceptionValue;

    /// Frames, outermost first
    fn frames(&self) -> &[Arc<Self::Frame>];

    /// One-line summary such as `KeyError: 'user'`
    fn exception_line(&self) -> String {
        let message = &self.exc_value().message;
        if message.is_empty() {
            self.exc_type().short_name().to_string()
        } else {
            format!("{}: {message}", self.exc_type().short_name())
        }
    }
}

/// A frame rebuilt from a [`FrameSnapshot`]
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    code: CodeInfo,
    lineno: u32,
    filename: String,
    module: String,
    source: String,
    locals: RwLock<VariableMap>,
    globals: RwLock<VariableMap>,
    failed_locals: Vec<String>,
    failed_globals: Vec<String>,
}

impl Frame {
    /// Decode the variables of `snapshot` and assign a fresh id
    pub fn from_snapshot(snapshot: FrameSnapshot) -> Self {
        let (locals, failed_locals) = decode_variables(&snapshot.locals).into_parts();
        let (globals, failed_globals) = decode_variables(&snapshot.globals).into_parts();
        Self {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            code: snapshot.code,
            lineno: snapshot.lineno,
            filename: snapshot.filename,
            module: snapshot.module,
            source: snapshot.source,
            locals: RwLock::new(locals),
            globals: RwLock::new(globals),
            failed_locals,
            failed_globals,
        }
    }

    /// Release every variable value held by the frame.
    ///
    /// Tables, lists and shared nodes are emptied before the maps are
    /// cleared, so memory is returned even where values are aliased elsewhere.
    pub fn release(&self) {
        for map in [&self.locals, &self.globals] {
            let mut map = map.write();
            for value in map.values_mut() {
                value.release();
            }
            map.clear();
        }
        trace!(frame = self.id, "Released frame variables");
    }
}

impl FrameView for Frame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn code(&self) -> &CodeInfo {
        &self.code
    }

    fn lineno(&self) -> u32 {
        self.lineno
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn locals(&self) -> RwLockReadGuard<'_, VariableMap> {
        self.locals.read()
    }

    fn globals(&self) -> RwLockReadGuard<'_, VariableMap> {
        self.globals.read()
    }

    fn failed_locals(&self) -> &[String] {
        &self.failed_locals
    }

    fn failed_globals(&self) -> &[String] {
        &self.failed_globals
    }
}

/// A traceback rebuilt from a [`TracebackSnapshot`]
#[derive(Debug)]
pub struct Traceback {
    exc_type: ExceptionType,
    exc_value: ExceptionValue,
    frames: Vec<Arc<Frame>>,
}

impl Traceback {
    /// Rebuild every frame of the snapshot's chain
    pub fn from_snapshot(snapshot: TracebackSnapshot) -> Self {
        let mut frames = Vec::new();
        let mut entry = Some(snapshot.tb);
        while let Some(current) = entry {
            frames.push(Arc::new(Frame::from_snapshot(current.frame)));
            entry = current.next.map(|next| *next);
        }
        Self { exc_type: snapshot.exc_type, exc_value: snapshot.exc_value, frames }
    }

    /// Frame with the given id
    pub fn frame(&self, id: FrameId) -> Option<&Arc<Frame>> {
        self.frames.iter().find(|frame| frame.id() == id)
    }

    /// Release the variables of every frame
    pub fn release(&self) {
        for frame in &self.frames {
            frame.release();
        }
    }
}

impl TracebackView for Traceback {
    type Frame = Frame;

    fn exc_type(&self) -> &ExceptionType {
        &self.exc_type
    }

    fn exc_value(&self) -> &ExceptionValue {
        &self.exc_value
    }

    fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_variables;
    use tbx_common::{Table, TracebackEntry, FAILED_VARIABLES_KEY};

    fn frame_snapshot(lineno: u32, locals: VariableMap) -> FrameSnapshot {
        FrameSnapshot {
            code: CodeInfo { name: "handler".to_string() },
            lineno,
            filename: "src/handler.rs".to_string(),
            module: "app::handler".to_string(),
            source: "one\ntwo\nthree".to_string(),
            locals: encode_variables(&locals),
            globals: encode_variables(&VariableMap::new()),
        }
    }

    fn traceback(frames: Vec<FrameSnapshot>) -> Traceback {
        Traceback::from_snapshot(TracebackSnapshot {
            exc_type: ExceptionType::new("app::Error"),
            exc_value: ExceptionValue::new("bad input"),
            tb: TracebackEntry::from_frames(frames).unwrap(),
        })
    }

    #[test]
    fn test_source_window() {
        let frame = Frame::from_snapshot(frame_snapshot(2, VariableMap::new()));
        assert_eq!(frame.source_window(0), [(2, "two")]);
        assert_eq!(frame.source_window(1), [(1, "one"), (2, "two"), (3, "three")]);
        assert_eq!(frame.source_window(10).len(), 3);

        let past_end = Frame::from_snapshot(frame_snapshot(9, VariableMap::new()));
        assert!(past_end.source_window(2).is_empty());
        assert_eq!(past_end.source_window(6), [(3, "three")]);
    }

    #[test]
    fn test_current_line() {
        let frame = Frame::from_snapshot(frame_snapshot(2, VariableMap::new()));
        assert_eq!(frame.current_line(), Some("two"));
        assert_eq!(frame.source_lines(), ["one", "two", "three"]);

        let out_of_range = Frame::from_snapshot(frame_snapshot(9, VariableMap::new()));
        assert_eq!(out_of_range.current_line(), None);
        let zero = Frame::from_snapshot(frame_snapshot(0, VariableMap::new()));
        assert_eq!(zero.current_line(), None);
    }

    #[test]
    fn test_frames_get_distinct_ids() {
        let a = Frame::from_snapshot(frame_snapshot(1, VariableMap::new()));
        let b = Frame::from_snapshot(frame_snapshot(1, VariableMap::new()));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_hide_follows_marker_local() {
        let hidden = VariableMap::from([(TRACEBACK_HIDE_KEY.to_string(), Value::Bool(true))]);
        assert!(Frame::from_snapshot(frame_snapshot(1, hidden)).hide());

        let shown = VariableMap::from([(TRACEBACK_HIDE_KEY.to_string(), Value::Int(0))]);
        assert!(!Frame::from_snapshot(frame_snapshot(1, shown)).hide());
        assert!(!Frame::from_snapshot(frame_snapshot(1, VariableMap::new())).hide());
    }

    #[test]
    fn test_chain_is_flattened_in_order() {
        let tb = traceback(vec![frame_snapshot(1, VariableMap::new()), frame_snapshot(3, VariableMap::new())]);
        let linenos: Vec<_> = tb.frames().iter().map(|frame| frame.lineno()).collect();
        assert_eq!(linenos, [1, 3]);

        let second = tb.frames()[1].id();
        assert_eq!(tb.frame(second).map(|f| f.lineno()), Some(3));
        assert!(tb.frame(u64::MAX).is_none());
    }

    #[test]
    fn test_exception_line() {
        let tb = traceback(vec![frame_snapshot(1, VariableMap::new())]);
        assert_eq!(tb.exception_line(), "Error: bad input");
    }

    #[test]
    fn test_release_empties_values_seen_by_other_owners() {
        let table = Table::new().with_column("a", [1, 2, 3]);
        let locals = VariableMap::from([
            ("df".to_string(), Value::Table(table)),
            ("items".to_string(), Value::List(vec![Value::Int(1)])),
        ]);
        let tb = Arc::new(traceback(vec![frame_snapshot(1, locals)]));
        let other_owner = Arc::clone(&tb);

        assert!(tb.frames()[0].locals().contains_key(FAILED_VARIABLES_KEY));
        tb.release();

        let frame = &other_owner.frames()[0];
        assert!(frame.locals().is_empty());
        assert!(frame.globals().is_empty());
    }
}
