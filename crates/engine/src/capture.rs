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

//! Describing the frame an error happened in.
//!
//! Rust offers no frame introspection, so the producing program describes its
//! frame itself through [`LiveFrame`]. [`CapturedFrame`] is the ready-made
//! implementation, usually created with [`capture_frame!`](crate::capture_frame):
//!
//! ```rust,ignore
//! use tbx_engine::{capture_frame, capture_error};
//!
//! fn parse(input: &str) -> Result<u32, std::num::ParseIntError> {
//!     input.parse().map_err(|err| {
//!         let frame = capture_frame!().local("input", input);
//!         if let Ok(snapshot) = capture_error(&err, &frame) {
//!             // upload `snapshot`
//!         }
//!         err
//!     })
//! }
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tbx_common::{Value, VariableMap};
use thiserror::Error;

/// Errors raised while capturing a frame
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The source text of the frame's module cannot be obtained. Without it a
    /// snapshot cannot be rendered, so the whole capture fails.
    #[error("source of module `{module}` is unavailable: {reason}")]
    SourceUnavailable {
        /// Module whose source was requested
        module: String,
        /// Why the source could not be loaded
        reason: String,
    },
}

/// Provides the full source text of a module
pub trait SourceLoader: Send + Sync {
    /// Load the source of `module`
    fn get_source(&self, module: &str) -> Result<String, CaptureError>;
}

/// Loads source text from a file on disk.
///
/// Relative paths are tried against the working directory and each of its
/// ancestors, so paths produced by `file!()` resolve from anywhere inside the
/// workspace.
#[derive(Debug, Clone)]
pub struct FileSourceLoader {
    path: PathBuf,
}

impl FileSourceLoader {
    /// Create a loader for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn resolve(&self) -> Option<PathBuf> {
        if self.path.is_absolute() {
            return self.path.is_file().then(|| self.path.clone());
        }
        let cwd = env::current_dir().ok()?;
        cwd.ancestors().map(|dir| dir.join(&self.path)).find(|candidate| candidate.is_file())
    }
}

impl SourceLoader for FileSourceLoader {
    fn get_source(&self, module: &str) -> Result<String, CaptureError> {
        let unavailable = |reason: String| CaptureError::SourceUnavailable {
            module: module.to_string(),
            reason,
        };
        let path = self
            .resolve()
            .ok_or_else(|| unavailable(format!("file {} not found", self.path.display())))?;
        fs::read_to_string(&path).map_err(|e| unavailable(format!("{}: {e}", path.display())))
    }
}

/// Source text held in memory
#[derive(Debug, Clone)]
pub struct InlineSource(pub String);

impl SourceLoader for InlineSource {
    fn get_source(&self, _module: &str) -> Result<String, CaptureError> {
        Ok(self.0.clone())
    }
}

/// A frame of the running program, as seen by the capturing code
pub trait LiveFrame {
    /// Current line number (1-based)
    fn lineno(&self) -> u32;
    /// Name of the executing function
    fn function_name(&self) -> &str;
    /// Source file of the function
    fn filename(&self) -> &str;
    /// Module path of the function
    fn module(&self) -> &str;
    /// Local variables
    fn locals(&self) -> &VariableMap;
    /// Global (module-level) variables
    fn globals(&self) -> &VariableMap;
    /// Loader for the module source, if the module has one
    fn loader(&self) -> Option<&dyn SourceLoader>;
}

/// Frame description assembled by the program itself
pub struct CapturedFrame {
    filename: String,
    lineno: u32,
    module: String,
    function: String,
    locals: VariableMap,
    globals: VariableMap,
    loader: Option<Box<dyn SourceLoader>>,
}

impl CapturedFrame {
    /// Describe a frame. Its source is loaded from `filename` unless another
    /// loader is set.
    pub fn new(
        filename: impl Into<String>,
        lineno: u32,
        module: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        let loader: Box<dyn SourceLoader> = Box::new(FileSourceLoader::new(&filename));
        Self {
            filename,
            lineno,
            module: module.into(),
            function: function.into(),
            locals: VariableMap::new(),
            globals: VariableMap::new(),
            loader: Some(loader),
        }
    }

    /// Use `loader` to obtain the module source
    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Use the given text as the module source
    pub fn with_source(self, source: impl Into<String>) -> Self {
        self.with_loader(InlineSource(source.into()))
    }

    /// Drop the source loader, e.g. for code whose source is not shipped
    pub fn without_loader(mut self) -> Self {
        self.loader = None;
        self
    }

    /// Add a local variable
    pub fn local(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_local(name, value);
        self
    }

    /// Add a global variable
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_global(name, value);
        self
    }

    /// Insert or replace a local variable
    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.locals.insert(name.into(), value.into());
    }

    /// Insert or replace a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }
}

impl LiveFrame for CapturedFrame {
    fn lineno(&self) -> u32 {
        self.lineno
    }

    fn function_name(&self) -> &str {
        &self.function
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn locals(&self) -> &VariableMap {
        &self.locals
    }

    fn globals(&self) -> &VariableMap {
        &self.globals
    }

    fn loader(&self) -> Option<&dyn SourceLoader> {
        self.loader.as_deref()
    }
}

/// Last meaningful segment of a function path as produced by
/// [`capture_frame!`](crate::capture_frame), skipping closure segments.
#[doc(hidden)]
pub fn function_name_from_path(path: &str) -> &str {
    let path = path.strip_suffix("::__tbx_here").unwrap_or(path);
    path.rsplit("::").find(|segment| *segment != "{{closure}}").unwrap_or(path)
}

/// Whether `path` names an existing file, resolved like [`FileSourceLoader`]
pub fn source_exists(path: impl AsRef<Path>) -> bool {
    FileSourceLoader::new(path.as_ref()).resolve().is_some()
}

/// Create a [`CapturedFrame`] for the current location: file, line, module
/// and enclosing function name.
#[macro_export]
macro_rules! capture_frame {
    () => {{
        fn __tbx_here() {}
        fn __tbx_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::capture::CapturedFrame::new(
            file!(),
            line!(),
            module_path!(),
            $crate::capture::function_name_from_path(__tbx_name_of(__tbx_here)),
        )
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_function_name_from_path() {
        assert_eq!(function_name_from_path("app::orders::load::__tbx_here"), "load");
        assert_eq!(function_name_from_path("app::main::{{closure}}::__tbx_here"), "main");
        assert_eq!(function_name_from_path("plain"), "plain");
    }

    #[test]
    fn test_capture_frame_macro_records_location() {
        let frame = capture_frame!().local("x", 1);
        assert_eq!(frame.function_name(), "test_capture_frame_macro_records_location");
        assert_eq!(frame.module(), module_path!());
        assert!(frame.filename().ends_with("capture.rs"));
        assert_eq!(frame.lineno(), line!() - 4);
        assert_eq!(frame.locals()["x"], Value::Int(1));
    }

    #[test]
    fn test_file_loader_reads_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fn main() {{}}").unwrap();

        let source = FileSourceLoader::new(file.path()).get_source("demo").unwrap();
        assert_eq!(source, "fn main() {}\n");
    }

    #[test]
    fn test_file_loader_reports_missing_source() {
        let err = FileSourceLoader::new("/definitely/not/here.rs").get_source("demo").unwrap_err();
        let CaptureError::SourceUnavailable { module, .. } = err;
        assert_eq!(module, "demo");
    }

    #[test]
    fn test_macro_filename_resolves_from_crate_dir() {
        let frame = capture_frame!();
        assert!(source_exists(frame.filename()));
        let source = frame.loader().unwrap().get_source(frame.module()).unwrap();
        assert!(source.contains("test_macro_filename_resolves_from_crate_dir"));
    }
}
