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

//! Print a traceback dump to the terminal

use std::{fmt::Write, path::Path};

use eyre::{Result, WrapErr};
use tbx_common::{VariableMap, FAILED_VARIABLES_KEY};
use tbx_engine::{decode_blob, to_live, FrameView, TracebackView};

/// Decode `file` and print its traceback
pub fn inspect(file: &Path, context: u32) -> Result<()> {
    let bytes = std::fs::read(file).wrap_err_with(|| format!("failed to read {}", file.display()))?;
    let traceback = to_live(decode_blob(&bytes)?);
    print!("{}", render_text(&traceback, context));
    Ok(())
}

fn write_variables(out: &mut String, title: &str, variables: &VariableMap, failed: &[String]) {
    let shown = variables.iter().filter(|(name, _)| name.as_str() != FAILED_VARIABLES_KEY);
    let mut shown = shown.peekable();
    if shown.peek().is_none() && failed.is_empty() {
        return;
    }
    let _ = writeln!(out, "    {title}:");
    for (name, value) in shown {
        let _ = writeln!(out, "      {name} = {value} ({})", value.type_name());
    }
    if !failed.is_empty() {
        let _ = writeln!(out, "      not transmitted: {}", failed.join(", "));
    }
}

/// Plain-text rendering in the usual `Traceback (most recent call last)` layout
pub fn render_text<T: TracebackView>(traceback: &T, context: u32) -> String {
    let mut out = String::from("Traceback (most recent call last):\n");
    for frame in traceback.frames() {
        let hidden = if frame.hide() { " [hidden]" } else { "" };
        let _ = writeln!(
            out,
            "  File \"{}\", line {}, in {}{hidden}",
            frame.filename(),
            frame.lineno(),
            frame.function_name()
        );

        for (number, text) in frame.source_window(context) {
            let marker = if number == frame.lineno() { '>' } else { ' ' };
            let _ = writeln!(out, "  {marker}{number:>5} | {text}");
        }

        write_variables(&mut out, "locals", &frame.locals(), frame.failed_locals());
        write_variables(&mut out, "globals", &frame.globals(), frame.failed_globals());
    }
    let _ = writeln!(out, "{}", traceback.exception_line());
    for cause in &traceback.exc_value().causes {
        let _ = writeln!(out, "  caused by: {cause}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbx_common::{ExceptionType, ExceptionValue, Value};
    use tbx_engine::{to_snapshot, CapturedFrame};

    #[test]
    fn test_render_text() {
        let frame = CapturedFrame::new("src/calc.rs", 3, "calc", "divide")
            .with_source("fn divide() {\n    let a = 1;\n    a / 0\n}\n")
            .local("a", 1)
            .local("out", Value::opaque("Stdout"));
        let snapshot =
            to_snapshot(ExceptionType::new("calc::MathError"), ExceptionValue::new("division by zero"), &frame)
                .unwrap();

        let text = render_text(&to_live(snapshot), 1);
        assert!(text.starts_with("Traceback (most recent call last):\n"));
        assert!(text.contains("  File \"src/calc.rs\", line 3, in divide\n"));
        assert!(text.contains("  >    3 |     a / 0\n"));
        assert!(text.contains("       2 |     let a = 1;\n"));
        assert!(!text.contains("fn divide"));
        assert!(text.contains("      a = 1 (int)\n"));
        assert!(text.contains("      not transmitted: out\n"));
        assert!(!text.contains("globals:"));
        assert!(text.ends_with("MathError: division by zero\n"));
    }
}
