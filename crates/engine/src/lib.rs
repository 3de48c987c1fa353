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

//! TBX Engine - traceback capture, transport encoding and reconstruction
//!
//! The engine implements the pipeline between a failing program and the viewer:
//!
//! - **Capture** ([`capture`]) - describe the frame an error happened in
//! - **Codec** ([`codec`]) - per-variable encoding, snapshot construction and
//!   the outer blob format
//! - **Reconstruction** ([`reconstruct`]) - rebuild frames a renderer can consume
//! - **Registry** ([`registry`]) - sessions of reconstructed tracebacks kept
//!   alive by the viewing server

pub mod capture;
pub use capture::*;

pub mod codec;
pub use codec::*;

pub mod reconstruct;
pub use reconstruct::*;

pub mod registry;
pub use registry::*;
