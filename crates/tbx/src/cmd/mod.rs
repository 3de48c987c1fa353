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

//! Command modules for the TBX CLI

use std::env;

use eyre::Result;
use tbx_common::{init_logging, init_simple_logging};
use tracing::Level;

pub mod demo;
pub mod inspect;
pub mod serve;
pub mod upload;

pub use demo::demo;
pub use inspect::inspect;
pub use serve::serve;
pub use upload::{upload_dataframe, upload_traceback};

/// Map the `-v` count onto a level, starting from `base`
fn verbosity_level(verbose: u8, base: Level) -> Level {
    let levels = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];
    let start = levels.iter().position(|level| *level == base).unwrap_or(1);
    levels[(start + verbose as usize).min(levels.len() - 1)]
}

/// Set up logging for a command.
///
/// The server logs at `info` to the console and, with `file_logging` set to
/// `Some(true)`, to a rolling file. One-shot commands only report warnings
/// unless asked for more. `RUST_LOG` always wins.
pub fn init_logging_for(verbose: u8, file_logging: Option<bool>) -> Result<()> {
    match file_logging {
        Some(enable_file_logging) => {
            if env::var("RUST_LOG").is_err() && verbose > 0 {
                env::set_var("RUST_LOG", verbosity_level(verbose, Level::INFO).as_str());
            }
            init_logging("tbx", enable_file_logging)
        }
        None => init_simple_logging(verbosity_level(verbose, Level::WARN)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_level() {
        assert_eq!(verbosity_level(0, Level::WARN), Level::WARN);
        assert_eq!(verbosity_level(1, Level::WARN), Level::INFO);
        assert_eq!(verbosity_level(2, Level::INFO), Level::TRACE);
        assert_eq!(verbosity_level(9, Level::WARN), Level::TRACE);
    }
}
