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

//! Logging setup shared by the TBX binary and tests
//!
//! `RUST_LOG` always wins over the default level. The explorer server logs to
//! the console and, optionally, to a daily rolling file under
//! `$TMPDIR/tbx-logs/<component>/`.

use eyre::{eyre, Result};
use std::{env, fs, path::PathBuf, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Crates whose request-level chatter is kept out of the console
const QUIET_TARGETS: [&str; 3] = ["tower_http=warn", "hyper=warn", "reqwest=warn"];

/// Initialize console logging, plus file logging when `file_logging` is set
///
/// # Examples
/// ```rust,ignore
/// tbx_common::logging::init_logging("tbx-webui", true)?;
/// tracing::info!("Explorer started");
/// ```
pub fn init_logging(component: &str, file_logging: bool) -> Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_timer(LocalTime::rfc_3339())
        .pretty()
        .with_filter(console_filter()?);

    let (file_layer, log_dir) = if file_logging {
        let log_dir = log_directory(component)?;
        let (writer, guard) = non_blocking(rolling::daily(&log_dir, format!("{component}.log")));
        // the writer lives as long as the process
        std::mem::forget(guard);

        let layer = fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(default_env_filter("info")?);
        (Some(layer), Some(log_dir))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize tracing subscriber: {e}"))?;

    tracing::info!(
        component,
        log_dir = ?log_dir.as_ref().map(|dir| dir.display().to_string()),
        "Logging initialized"
    );
    Ok(())
}

/// Initialize compact console logging at `level` unless `RUST_LOG` is set
pub fn init_simple_logging(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(default_env_filter(level.as_str())?)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre!("Failed to initialize simple logging: {e}"))
}

fn default_env_filter(default_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| eyre!("Failed to create environment filter: {e}"))
}

fn console_filter() -> Result<EnvFilter> {
    Ok(QUIET_TARGETS
        .into_iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(default_env_filter("info")?, |filter, directive| filter.add_directive(directive)))
}

fn log_directory(component: &str) -> Result<PathBuf> {
    let log_dir = env::temp_dir().join("tbx-logs").join(component);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Install test logging once per process; later calls are no-ops
///
/// ```rust
/// tbx_common::logging::ensure_test_logging(None);
/// tracing::info!("logged from a test");
/// ```
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        // another harness may have installed a subscriber already
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info};

    #[test]
    fn test_log_directory_is_per_component() {
        let log_dir = log_directory("test-component").unwrap();
        assert!(log_dir.is_dir());
        assert!(log_dir.ends_with("tbx-logs/test-component"));
    }

    #[test]
    fn test_console_filter_quiets_http_stack() {
        let filter = console_filter().unwrap().to_string();
        for target in QUIET_TARGETS {
            assert!(filter.contains(target), "{filter}");
        }
    }

    #[test]
    fn test_second_initialization_fails_gracefully() {
        ensure_test_logging(None);
        ensure_test_logging(Some(Level::DEBUG));

        assert!(init_logging("test-component", false).is_err());
        assert!(init_simple_logging(Level::DEBUG).is_err());
        info!("still logging");
        debug!("still logging");
    }
}
