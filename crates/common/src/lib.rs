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

//! TBX Common - Shared types and utilities for TBX components
//!
//! This crate holds the data model shared by the capturing side (uploader) and
//! the viewing side (web UI server): the dynamic [`Value`] model, the
//! transmissible snapshot types, and the logging setup used by every binary.

/// Data model: runtime values and traceback snapshots
pub mod types;

/// Logging setup and utilities for consistent logging across TBX components
pub mod logging;
/// Human-readable byte sizes
pub mod size;

pub use logging::*;
pub use size::*;
pub use types::*;
