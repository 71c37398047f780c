//! Wrappers around tokio task spawning that log unhandled failures, plus
//! call-stack introspection for attributing fire-and-forget scheduling sites

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Duration;

use futures::future::try_join_all;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::error;

/// One frame of the call stack at a task-scheduling site.
///
/// `module` is the file-stem qualifier of the frame's source file, `function`
/// the trailing path segment of the demangled symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerFrame {
    pub symbol: String,
    pub module: String,
    pub function: String,
}

/// Walk the current call stack outward from the immediate caller, innermost
/// frame first.
///
/// Used purely for diagnostic log messages; frame capture is expensive and
/// should stay behind [`TaskContext::with_inspection`].
#[inline(never)]
pub fn get_callers() -> Vec<CallerFrame> {
    let rendered = Backtrace::force_capture().to_string();
    let mut frames = parse_backtrace(&rendered);

    // Drop the capture machinery up to and including our own frame, so the
    // first entry is the immediate caller.
    if let Some(pos) = frames
        .iter()
        .position(|f| f.symbol.contains("async_utils::get_callers"))
    {
        frames.drain(..=pos);
    }

    for frame in &mut frames {
        if frame.module.is_empty() {
            frame.module = frame
                .symbol
                .split("::")
                .next()
                .unwrap_or_default()
                .to_string();
        }
    }
    frames
}

/// Explicit scheduling context for guarded task spawning.
///
/// Caller-stack inspection defaults to off; opt in per context when a
/// fire-and-forget failure needs to be attributed to its scheduling site.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskContext {
    inspect: bool,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable caller-stack capture on every spawned task.
    pub fn with_inspection(mut self, inspect: bool) -> Self {
        self.inspect = inspect;
        self
    }

    pub fn should_inspect(&self) -> bool {
        self.inspect
    }

    /// Spawn `future` fire-and-forget, converting any failure into an
    /// error-level log line instead of letting it propagate.
    ///
    /// An `Err` completion or a panic inside the task is logged and swallowed;
    /// the join handle then yields `None`. Aborting the handle drops the
    /// future without logging, since cancellation is not a failure. The
    /// handle is returned so the caller may still await, abort or inspect
    /// the task.
    pub fn safe_ensure_future<F, T, E>(&self, future: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let callers = if self.inspect {
            Some(get_callers())
        } else {
            None
        };
        tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => Some(value),
                Ok(Err(err)) => {
                    match &callers {
                        Some(callers) => error!(
                            callers = ?callers,
                            "Unhandled error in scheduled task: {err}"
                        ),
                        None => error!("Unhandled error in scheduled task: {err}"),
                    }
                    None
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    match &callers {
                        Some(callers) => error!(
                            callers = ?callers,
                            "Scheduled task panicked: {message}"
                        ),
                        None => error!("Scheduled task panicked: {message}"),
                    }
                    None
                }
            }
        })
    }
}

/// [`TaskContext::safe_ensure_future`] with a default (no-inspection) context.
pub fn safe_ensure_future<F, T, E>(future: F) -> JoinHandle<Option<T>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    TaskContext::new().safe_ensure_future(future)
}

/// Run all given units of work to completion and propagate the first failure
/// to the caller.
///
/// The single gather entry point for the codebase, so cross-cutting behavior
/// stays centralized instead of scattered over direct scheduler calls.
pub async fn safe_gather<I, F, T, E>(tasks: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    try_join_all(tasks).await
}

/// Cooperatively suspend the calling task, yielding to the scheduler for at
/// least `seconds` (a non-positive value yields once without guaranteed
/// delay).
pub async fn wait_til_next_tick(seconds: f64) {
    // NaN must fall through to the yield path, not reach Duration
    if seconds > 0.0 && seconds.is_finite() {
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    } else {
        tokio::task::yield_now().await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Parse the rendered std backtrace into frames.
///
/// Frame lines look like `   2: crate::module::function`, optionally followed
/// by `             at ./src/file.rs:40:19`.
fn parse_backtrace(rendered: &str) -> Vec<CallerFrame> {
    let mut frames: Vec<CallerFrame> = Vec::new();
    for line in rendered.lines() {
        let trimmed = line.trim_start();
        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                if frame.module.is_empty() {
                    frame.module = module_qualifier(location);
                }
            }
        } else if let Some((index, symbol)) = trimmed.split_once(": ") {
            if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
                frames.push(CallerFrame {
                    symbol: symbol.to_string(),
                    module: String::new(),
                    function: function_qualifier(symbol),
                });
            }
        }
    }
    frames
}

/// File-stem qualifier from a `path:line:column` location.
fn module_qualifier(location: &str) -> String {
    let path = match location.rsplitn(3, ':').nth(2) {
        Some(path) => path,
        None => location,
    };
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Trailing function segment of a demangled symbol, ignoring closure wrappers
/// and mangling hashes.
fn function_qualifier(symbol: &str) -> String {
    symbol
        .rsplit("::")
        .find(|segment| !segment.starts_with("{{closure}}") && !is_mangling_hash(segment))
        .unwrap_or_default()
        .to_string()
}

fn is_mangling_hash(segment: &str) -> bool {
    segment.len() == 17
        && segment.starts_with('h')
        && segment[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_and_location_lines() {
        let rendered = "   0: std::backtrace::Backtrace::force_capture\n\
                        \x20  1: groundwork::async_utils::get_callers\n\
                        \x20            at ./src/async_utils.rs:40:19\n\
                        \x20  2: my_app::worker::schedule\n\
                        \x20            at ./src/worker.rs:12:5\n";
        let frames = parse_backtrace(rendered);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].module, "async_utils");
        assert_eq!(frames[2].function, "schedule");
        assert_eq!(frames[2].module, "worker");
    }

    #[test]
    fn function_qualifier_takes_trailing_segment() {
        assert_eq!(
            function_qualifier("groundwork::async_utils::get_callers"),
            "get_callers".to_string()
        );
    }

    #[test]
    fn function_qualifier_skips_closures_and_hashes() {
        assert_eq!(
            function_qualifier("my_app::run::{{closure}}"),
            "run".to_string()
        );
        assert_eq!(
            function_qualifier("my_app::run::h0123456789abcdef"),
            "run".to_string()
        );
        assert_eq!(function_qualifier("main"), "main".to_string());
    }

    #[test]
    fn inspection_defaults_off() {
        assert!(!TaskContext::new().should_inspect());
        assert!(TaskContext::new().with_inspection(true).should_inspect());
    }
}
