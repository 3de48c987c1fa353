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

//! Whole-snapshot blobs, the unit that is uploaded and stored as a dump.

use tbx_common::TracebackSnapshot;
use thiserror::Error;

/// Errors of the blob codec
#[derive(Debug, Error)]
pub enum BlobError {
    /// The snapshot could not be turned into bytes
    #[error("failed to encode traceback blob: {0}")]
    Encode(#[source] bincode::Error),
    /// The bytes are not a traceback blob
    #[error("corrupt traceback blob: {0}")]
    Decode(#[source] bincode::Error),
}

/// Serialize a snapshot into a blob
pub fn encode_blob(snapshot: &TracebackSnapshot) -> Result<Vec<u8>, BlobError> {
    bincode::serialize(snapshot).map_err(BlobError::Encode)
}

/// Deserialize a blob produced by [`encode_blob`]
pub fn decode_blob(bytes: &[u8]) -> Result<TracebackSnapshot, BlobError> {
    bincode::deserialize(bytes).map_err(BlobError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capture::CapturedFrame, codec::to_snapshot};
    use tbx_common::{ExceptionType, ExceptionValue};

    #[test]
    fn test_blob_round_trip() {
        let frame = CapturedFrame::new("main.rs", 1, "main", "main")
            .with_source("fn main() {}")
            .local("count", 7);
        let snapshot =
            to_snapshot(ExceptionType::new("Boom"), ExceptionValue::new("boom"), &frame).unwrap();

        let blob = encode_blob(&snapshot).unwrap();
        assert_eq!(decode_blob(&blob).unwrap(), snapshot);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = decode_blob(b"definitely not a blob").unwrap_err();
        assert!(matches!(err, BlobError::Decode(_)));
        assert!(err.to_string().starts_with("corrupt traceback blob"));
    }

    #[test]
    fn test_truncated_blob_is_corrupt() {
        let frame = CapturedFrame::new("main.rs", 1, "main", "main").with_source("fn main() {}");
        let snapshot =
            to_snapshot(ExceptionType::new("Boom"), ExceptionValue::new("boom"), &frame).unwrap();
        let blob = encode_blob(&snapshot).unwrap();

        assert!(decode_blob(&blob[..blob.len() / 2]).is_err());
    }
}
