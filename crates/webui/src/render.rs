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

//! HTML pages
//!
//! Tracebacks are rendered through [`TracebackView`] and [`FrameView`] only,
//! so any traceback implementation can be displayed.

use askama::Template;
use tbx_common::{VariableMap, FAILED_VARIABLES_KEY};
use tbx_engine::{FrameView, SessionId, SessionSummary, TracebackView};

use crate::storage::DumpInfo;

/// Number of source lines shown on each side of the current line
pub const CONTEXT_LINES: u32 = 5;

struct SourceLine {
    number: u32,
    text: String,
    current: bool,
}

struct VariableRow {
    name: String,
    type_name: String,
    value: String,
}

struct FrameContext {
    id: u64,
    function: String,
    filename: String,
    module: String,
    lineno: u32,
    hidden: bool,
    lines: Vec<SourceLine>,
    locals: Vec<VariableRow>,
    globals: Vec<VariableRow>,
    failed_locals: Vec<String>,
    failed_globals: Vec<String>,
}

#[derive(Template)]
#[template(path = "traceback.html")]
struct TracebackPage {
    session_id: SessionId,
    exception: String,
    exc_type: String,
    causes: Vec<String>,
    frames: Vec<FrameContext>,
}

struct SessionRow {
    id: SessionId,
    tb_id: String,
    created: String,
    exception: String,
}

struct DumpRow {
    name: String,
    modified: String,
    size: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexPage {
    sessions: Vec<SessionRow>,
    tracebacks: Vec<DumpRow>,
    dataframes: Vec<DumpRow>,
}

fn variable_rows(variables: &VariableMap) -> Vec<VariableRow> {
    variables
        .iter()
        .filter(|(name, _)| name.as_str() != FAILED_VARIABLES_KEY)
        .map(|(name, value)| VariableRow {
            name: name.clone(),
            type_name: value.type_name().to_string(),
            value: value.to_string(),
        })
        .collect()
}

fn source_context(frame: &impl FrameView) -> Vec<SourceLine> {
    frame
        .source_window(CONTEXT_LINES)
        .into_iter()
        .map(|(number, text)| SourceLine {
            number,
            text: text.to_string(),
            current: number == frame.lineno(),
        })
        .collect()
}

fn frame_context(frame: &impl FrameView) -> FrameContext {
    FrameContext {
        id: frame.id(),
        function: frame.function_name().to_string(),
        filename: frame.filename().to_string(),
        module: frame.module().to_string(),
        lineno: frame.lineno(),
        hidden: frame.hide(),
        lines: source_context(frame),
        locals: variable_rows(&frame.locals()),
        globals: variable_rows(&frame.globals()),
        failed_locals: frame.failed_locals().to_vec(),
        failed_globals: frame.failed_globals().to_vec(),
    }
}

/// Render the page of a session
pub fn render_traceback<T: TracebackView>(
    session_id: SessionId,
    traceback: &T,
) -> Result<String, askama::Error> {
    TracebackPage {
        session_id,
        exception: traceback.exception_line(),
        exc_type: traceback.exc_type().name.clone(),
        causes: traceback.exc_value().causes.clone(),
        frames: traceback.frames().iter().map(|frame| frame_context(frame.as_ref())).collect(),
    }
    .render()
}

/// Render the home page
pub fn render_index(
    sessions: &[SessionSummary],
    tracebacks: &[DumpInfo],
    dataframes: &[DumpInfo],
) -> Result<String, askama::Error> {
    let dump_rows = |dumps: &[DumpInfo]| {
        dumps
            .iter()
            .map(|dump| DumpRow {
                name: dump.name.clone(),
                modified: dump.modified.format("%Y-%m-%d %H:%M").to_string(),
                size: dump.pretty_size(),
            })
            .collect()
    };
    IndexPage {
        sessions: sessions
            .iter()
            .map(|session| SessionRow {
                id: session.id,
                tb_id: session.tb_id.clone(),
                created: session.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                exception: session.exception.clone(),
            })
            .collect(),
        tracebacks: dump_rows(tracebacks),
        dataframes: dump_rows(dataframes),
    }
    .render()
}
