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

//! Best-effort, per-variable value codec.
//!
//! Every variable is encoded on its own so that one value that cannot leave
//! its process (a socket, a cyclic graph, ...) only costs its own entry. The
//! only condition absorbed is [`NotSerializable`]; on decode, every name that
//! did not come back is listed under [`FAILED_VARIABLES_KEY`].

use tbx_common::{EncodedVariable, EncodedVariableMap, Value, VariableMap, FAILED_VARIABLES_KEY};
use thiserror::Error;
use tracing::debug;

use super::wire::{WireEncoder, WireValue};

/// Reason a value cannot be encoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotSerializable {
    /// The value is bound to a resource of the producing process
    #[error("values of type `{type_name}` cannot leave their process")]
    Unsupported {
        /// Type name of the offending value
        type_name: String,
    },
    /// The value graph refers back to a shared node it is contained in
    #[error("value graph contains a cycle")]
    Cycle,
    /// The value is nested deeper than the encoder accepts
    #[error("value nesting exceeds {limit} levels")]
    TooDeep {
        /// Maximum accepted depth
        limit: usize,
    },
    /// A shared node was locked for writing while being captured
    #[error("shared value is locked for writing")]
    Locked,
    /// The byte encoder rejected the value
    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// Reason a variable could not be decoded
#[derive(Debug, Error)]
pub enum DecodeFailure {
    /// The variable was marked unserializable at capture time
    #[error("variable was not serializable when captured")]
    NotEncoded,
    /// The stored bytes are not a valid value
    #[error("malformed value bytes: {0}")]
    Malformed(#[from] bincode::Error),
}

/// Encode a single value
pub fn encode_value(value: &Value) -> Result<Vec<u8>, NotSerializable> {
    let wire = WireEncoder::encode(value)?;
    bincode::serialize(&wire).map_err(|e| NotSerializable::Encoding(e.to_string()))
}

/// Decode a single value
pub fn decode_value(bytes: &[u8]) -> Result<Value, DecodeFailure> {
    let wire: WireValue = bincode::deserialize(bytes)?;
    Ok(wire.into())
}

/// Encode every variable of `variables` independently.
///
/// Never fails: variables that cannot be encoded are stored as
/// [`EncodedVariable::Unserializable`].
pub fn encode_variables(variables: &VariableMap) -> EncodedVariableMap {
    variables
        .iter()
        .map(|(name, value)| {
            let encoded = match encode_value(value) {
                Ok(bytes) => EncodedVariable::Encoded(bytes),
                Err(reason) => {
                    debug!(variable = %name, %reason, "Variable is not serializable, omitting it");
                    EncodedVariable::Unserializable
                }
            };
            (name.clone(), encoded)
        })
        .collect()
}

/// Decode every variable of `encoded` independently. Never fails.
pub fn decode_variables(encoded: &EncodedVariableMap) -> DecodedVariables {
    let mut values = VariableMap::new();
    let mut failed = Vec::new();

    for (name, entry) in encoded {
        match entry.bytes().ok_or(DecodeFailure::NotEncoded).and_then(decode_value) {
            Ok(value) => {
                values.insert(name.clone(), value);
            }
            Err(reason) => {
                debug!(variable = %name, %reason, "Variable could not be decoded");
                failed.push(name.clone());
            }
        }
    }

    DecodedVariables { values, failed }
}

/// Outcome of [`decode_variables`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedVariables {
    values: VariableMap,
    failed: Vec<String>,
}

impl DecodedVariables {
    /// Successfully decoded variables, without the failed-names entry
    pub fn values(&self) -> &VariableMap {
        &self.values
    }

    /// Names that failed to decode, in map order
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// The decoded map with the failed names merged in under
    /// [`FAILED_VARIABLES_KEY`]. The entry is always present, even when empty.
    ///
    /// A captured variable that is itself named [`FAILED_VARIABLES_KEY`] is
    /// overwritten by the failed-names entry.
    pub fn into_map(self) -> VariableMap {
        self.into_parts().0
    }

    /// Same as [`Self::into_map`], also returning the failed names
    pub fn into_parts(self) -> (VariableMap, Vec<String>) {
        let Self { mut values, failed } = self;
        let listed = failed.iter().cloned().map(Value::Str).collect();
        values.insert(FAILED_VARIABLES_KEY.to_string(), Value::List(listed));
        (values, failed)
    }
}
