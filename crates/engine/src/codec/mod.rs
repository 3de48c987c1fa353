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

//! Encoding of captured state for transport.
//!
//! Three layers, innermost first:
//!
//! - [`variable`] - best-effort encoding of single values and variable maps.
//!   Failures are recorded per variable and never abort the map.
//! - [`traceback`] - conversion between a live frame and a
//!   [`TracebackSnapshot`](tbx_common::TracebackSnapshot), and back to a
//!   reconstructed [`Traceback`](crate::Traceback).
//! - [`blob`] - the single opaque byte blob that is uploaded and stored.

pub mod blob;
pub mod traceback;
pub mod variable;
mod wire;

pub use wire::MAX_ENCODE_DEPTH;

pub use blob::*;
pub use traceback::*;
pub use variable::*;
