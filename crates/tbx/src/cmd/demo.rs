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

//! Capture a sample failure

use std::path::Path;

use eyre::{Result, WrapErr};
use tbx_common::{Table, TracebackSnapshot, Value};
use tbx_engine::{capture_error, capture_frame, encode_blob, CaptureError};
use tbx_uploader::upload_tb;
use thiserror::Error;
use tracing::info;

/// Error raised by the sample computation
#[derive(Debug, Error)]
pub enum DemoError {
    /// The denominator was zero
    #[error("division by zero")]
    DivisionByZero,
}

/// Outcome of the sample computation
enum Outcome {
    Value(i64),
    Failed(Box<TracebackSnapshot>),
}

/// `1 / (2x - 2x)`, which always fails.
///
/// On failure the frame is captured with its locals, including a value that
/// cannot leave the process.
fn ratio(x: i64) -> Result<Outcome, CaptureError> {
    let y = x * 2;
    let denominator = y - 2 * x;
    let Some(value) = 1i64.checked_div(denominator) else {
        let frame = capture_frame!()
            .with_source(include_str!("demo.rs"))
            .local("x", x)
            .local("y", y)
            .local("denominator", denominator)
            .local("history", Table::new().with_column("x", [x]).with_column("y", [y]))
            .local("stdout", Value::opaque("std::io::Stdout"));
        let snapshot = capture_error(&DemoError::DivisionByZero, &frame)?;
        return Ok(Outcome::Failed(Box::new(snapshot)));
    };
    Ok(Outcome::Value(value))
}

/// Capture the sample failure
pub fn capture_demo() -> Result<TracebackSnapshot> {
    match ratio(42)? {
        Outcome::Value(value) => {
            Err(eyre::eyre!("the sample computation unexpectedly returned {value}"))
        }
        Outcome::Failed(snapshot) => Ok(*snapshot),
    }
}

/// Capture the sample failure, then write it to `output` or upload it
pub async fn demo(output: Option<&Path>, id: &str, host: Option<&str>) -> Result<()> {
    let snapshot = capture_demo()?;
    info!("Captured {}", snapshot.exc_type.name);

    match output {
        Some(path) => {
            std::fs::write(path, encode_blob(&snapshot)?)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            println!("Traceback written to {}", path.display());
        }
        None => {
            let url = upload_tb(&snapshot, id, host).await?;
            println!("Traceback will be accessible at {url}");
        }
    }
    Ok(())
}
