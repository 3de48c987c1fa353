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

//! Transmissible traceback snapshots.
//!
//! These types are what travels between the capturing process and the viewer.
//! Variables are stored pre-encoded per name (see `tbx_engine::codec`) so that a
//! single unserializable value only costs its own entry.

use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Name under which decoded variable maps list the names that failed to decode
pub const FAILED_VARIABLES_KEY: &str = "__decoding_failed__";

/// Maximum number of frames accepted when decoding a traceback chain
pub const MAX_TRACEBACK_DEPTH: usize = 1024;

/// Local whose truthy value asks renderers to hide the frame
pub const TRACEBACK_HIDE_KEY: &str = "__traceback_hide__";

/// Mapping from variable name to its encoded form
pub type EncodedVariableMap = BTreeMap<String, EncodedVariable>;

/// One encoded variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedVariable {
    /// Successfully encoded value bytes
    Encoded(Vec<u8>),
    /// The value could not be encoded when captured
    Unserializable,
}

impl EncodedVariable {
    /// Encoded bytes, if any
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Encoded(bytes) => Some(bytes),
            Self::Unserializable => None,
        }
    }
}

/// Type of the captured error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionType {
    /// Fully qualified type name, e.g. `std::num::ParseIntError`
    pub name: String,
}

impl ExceptionType {
    /// Create an exception type from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Exception type of the Rust type `E`
    pub fn of<E: ?Sized>() -> Self {
        Self::new(std::any::type_name::<E>())
    }

    /// Last path segment of the type name
    pub fn short_name(&self) -> &str {
        let base = self.name.split('<').next().unwrap_or(&self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

/// Value of the captured error
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExceptionValue {
    /// Display message of the error
    pub message: String,
    /// Display messages of the source chain, outermost first
    pub causes: Vec<String>,
}

impl ExceptionValue {
    /// Create an exception value with no causes
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), causes: Vec::new() }
    }

    /// Capture message and source chain of an error
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self { message: error.to_string(), causes }
    }
}

/// Code information of a frame (what a code object offers a renderer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeInfo {
    /// Function name
    pub name: String,
}

/// Captured state of one stack frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Code information
    pub code: CodeInfo,
    /// Current line number (1-based)
    pub lineno: u32,
    /// Source file name
    pub filename: String,
    /// Module path of the frame
    pub module: String,
    /// Full text of the source file
    pub source: String,
    /// Encoded local variables
    pub locals: EncodedVariableMap,
    /// Encoded global variables
    pub globals: EncodedVariableMap,
}

/// One link of a traceback chain
///
/// The chain is serialized as a flat sequence of frames, outermost first, and
/// decoding rejects chains longer than [`MAX_TRACEBACK_DEPTH`].
#[derive(Debug, Clone, PartialEq)]
pub struct TracebackEntry {
    /// Frame of this link
    pub frame: FrameSnapshot,
    /// Next (inner) link. Captures currently record a single frame, so this is
    /// always `None` for snapshots produced by `tbx_engine::capture`.
    pub next: Option<Box<TracebackEntry>>,
}

impl TracebackEntry {
    /// Iterate over this link and every link after it
    pub fn iter(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |entry| entry.next.as_deref())
    }

    /// Build a chain from its frames, outermost first
    pub fn from_frames(frames: impl IntoIterator<Item = FrameSnapshot>) -> Option<Self> {
        let frames: Vec<_> = frames.into_iter().collect();
        frames
            .into_iter()
            .rev()
            .fold(None, |next, frame| Some(Self { frame, next: next.map(Box::new) }))
    }
}

impl Serialize for TracebackEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let frames: Vec<&FrameSnapshot> = self.iter().map(|entry| &entry.frame).collect();
        frames.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TracebackEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let frames = Vec::<FrameSnapshot>::deserialize(deserializer)?;
        if frames.len() > MAX_TRACEBACK_DEPTH {
            return Err(de::Error::invalid_length(
                frames.len(),
                &"a traceback of at most 1024 frames",
            ));
        }
        Self::from_frames(frames)
            .ok_or_else(|| de::Error::invalid_length(0, &"a traceback of at least one frame"))
    }
}

/// Complete snapshot of a captured error, as stored in a `.dump` blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracebackSnapshot {
    /// Type of the error
    pub exc_type: ExceptionType,
    /// Value of the error
    pub exc_value: ExceptionValue,
    /// Head of the traceback chain
    pub tb: TracebackEntry,
}

impl TracebackSnapshot {
    /// Iterate over the frames of the chain, outermost first
    pub fn frames(&self) -> impl Iterator<Item = &FrameSnapshot> {
        self.tb.iter().map(|entry| &entry.frame)
    }

    /// Number of frames in the chain
    pub fn depth(&self) -> usize {
        self.frames().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(Inner);
    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer failed")
        }
    }
    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "inner failed")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }
    impl std::error::Error for Inner {}

    fn frame(name: &str) -> FrameSnapshot {
        FrameSnapshot {
            code: CodeInfo { name: name.to_string() },
            lineno: 1,
            filename: "main.rs".to_string(),
            module: "demo".to_string(),
            source: "fn main() {}\n".to_string(),
            locals: EncodedVariableMap::new(),
            globals: EncodedVariableMap::new(),
        }
    }

    #[test]
    fn test_exception_value_walks_source_chain() {
        let value = ExceptionValue::from_error(&Outer(Inner));
        assert_eq!(value.message, "outer failed");
        assert_eq!(value.causes, vec!["inner failed".to_string()]);
    }

    #[test]
    fn test_exception_type_short_name() {
        let ty = ExceptionType::of::<std::num::ParseIntError>();
        assert!(ty.name.ends_with("::ParseIntError"));
        assert_eq!(ty.short_name(), "ParseIntError");
        assert_eq!(ExceptionType::new("a::b::Wrapper<c::D>").short_name(), "Wrapper");
    }

    #[test]
    fn test_frames_follow_chain() {
        let snapshot = TracebackSnapshot {
            exc_type: ExceptionType::new("E"),
            exc_value: ExceptionValue::new("boom"),
            tb: TracebackEntry::from_frames([frame("outer"), frame("inner")]).unwrap(),
        };
        let names: Vec<_> = snapshot.frames().map(|f| f.code.name.as_str()).collect();
        assert_eq!(names, ["outer", "inner"]);
        assert_eq!(snapshot.depth(), 2);
    }

    #[test]
    fn test_snapshot_survives_bincode() {
        let mut frame = frame("f");
        frame.locals.insert("x".to_string(), EncodedVariable::Encoded(vec![1, 2, 3]));
        frame.locals.insert("y".to_string(), EncodedVariable::Unserializable);
        let snapshot = TracebackSnapshot {
            exc_type: ExceptionType::new("E"),
            exc_value: ExceptionValue::new("boom"),
            tb: TracebackEntry { frame, next: None },
        };
        let bytes = bincode::serialize(&snapshot).unwrap();
        let back: TracebackSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_chain_survives_bincode() {
        let snapshot = TracebackSnapshot {
            exc_type: ExceptionType::new("E"),
            exc_value: ExceptionValue::new("boom"),
            tb: TracebackEntry::from_frames(["a", "b", "c"].map(frame)).unwrap(),
        };
        let bytes = bincode::serialize(&snapshot).unwrap();
        let back: TracebackSnapshot = bincode::deserialize(&bytes).unwrap();
        let names: Vec<_> = back.frames().map(|f| f.code.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_overlong_chain_is_rejected() {
        // same layout as a snapshot: type, value, then the frame sequence
        let frames = vec![frame("f"); MAX_TRACEBACK_DEPTH + 1];
        let bytes =
            bincode::serialize(&(ExceptionType::new("E"), ExceptionValue::new("boom"), frames))
                .unwrap();
        assert!(bincode::deserialize::<TracebackSnapshot>(&bytes).is_err());
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let frames: Vec<FrameSnapshot> = Vec::new();
        let bytes =
            bincode::serialize(&(ExceptionType::new("E"), ExceptionValue::new("boom"), frames))
                .unwrap();
        assert!(bincode::deserialize::<TracebackSnapshot>(&bytes).is_err());
    }
}
