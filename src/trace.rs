//! Caller location attached to log entries when traceback is enabled.

use std::{panic::Location, path::Path};

use crate::engine::{FieldMap, Value};

/// Source position of a log call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    /// Enclosing function path. Empty means "resolve it from the stack when needed".
    pub func: &'static str,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32, func: &'static str) -> Self {
        CallSite { file, line, func }
    }

    pub fn from_location(loc: &'static Location<'static>) -> Self {
        CallSite::new(loc.file(), loc.line(), "")
    }
}

/// Returns `file`, `line` and `func` for `site`, or nothing when `enabled` is false.
///
/// `site` must already point at the user's call; every emission method in this crate is
/// `#[track_caller]` and resolves it on entry. Without a function name from a macro, the
/// frame executing `site` is looked up on the current stack.
pub(crate) fn capture_if_enabled(enabled: bool, site: CallSite) -> FieldMap {
    let mut fields = FieldMap::new();
    if enabled {
        let func = match site.func {
            "" => function_at(site.file, site.line).unwrap_or_default(),
            func => func.to_string(),
        };
        fields.insert("file".into(), Value::Str(site.file.to_string()));
        fields.insert("line".into(), Value::Uint(u64::from(site.line)));
        fields.insert("func".into(), Value::Str(func));
    }
    fields
}

/// Path of the function whose frame is currently executing `file:line`.
///
/// Needs debug info; returns `None` when symbols cannot be resolved.
fn function_at(file: &str, line: u32) -> Option<String> {
    let mut found = None;
    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            if found.is_some() || symbol.lineno() != Some(line) {
                return;
            }
            if symbol.filename().is_some_and(|f| f.ends_with(Path::new(file))) {
                found = symbol.name().map(|name| format!("{name:#}"));
            }
        });
        found.is_none()
    });
    found.map(|path| enclosing_function(&path).to_string())
}

/// Strips the helper item name appended by [`function_name!`](crate::function_name).
#[doc(hidden)]
pub fn enclosing_function(helper_path: &str) -> &str {
    let path = helper_path.strip_suffix("::__f").unwrap_or(helper_path);
    // closures nest as `{{closure}}` segments; report the function that owns them
    let mut path = path;
    while let Some(stripped) = path.strip_suffix("::{{closure}}") {
        path = stripped;
    }
    path
}
