//! Per-invocation context and the logging collaborator.
//!
//! An [`InvocationContext`] is created by the shell immediately before a
//! handler runs. It carries the invocation id, a deadline fixed at creation,
//! and a [`CancelSignal`] that only the shell can raise. The platform can ask
//! the shell to raise it early through an [`AbortHandle`].
//!
//! The [`Logger`] trait is the injected logging interface. It is sealed; use
//! [`TracingLogger`] (the default), or build one from closures with
//! [`custom_logger`] / [`simple_custom_logger`].

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::sealed::Sealed;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared between the shell and one handler.
///
/// Handlers can only observe the flag. Raising it is reserved to the shell.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelState>,
}

impl CancelSignal {
    /// Returns true once cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once cancellation has been signalled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel() cannot be missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Raises the flag. Returns true if this call was the one that raised it.
    pub(crate) fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }
}

/// Platform-side trigger for aborting an invocation before its deadline.
///
/// Attach a clone to the [`PlatformContext`](crate::lambda::PlatformContext)
/// and call [`abort`](Self::abort) from anywhere. The shell then cancels the
/// handler and reports `TimeoutError` exactly as if the deadline had passed.
/// Aborting an invocation that has already completed has no effect.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    signal: CancelSignal,
}

impl AbortHandle {
    /// Creates a handle that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the abort. Returns true if this call triggered it.
    pub fn abort(&self) -> bool {
        self.signal.cancel()
    }

    /// Returns true once the abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub(crate) async fn aborted(&self) {
        self.signal.cancelled().await
    }
}

impl PartialEq for AbortHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.signal.inner, &other.signal.inner)
    }
}

impl Eq for AbortHandle {}

/// Metadata for a single invocation.
///
/// Clones share the same cancel signal, so a handler may pass the context to
/// its own subtasks.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    invocation_id: String,
    trace_id: Option<String>,
    deadline: Instant,
    deadline_at: DateTime<Utc>,
    signal: CancelSignal,
}

impl InvocationContext {
    /// Creates a context whose deadline is `budget` from now.
    ///
    /// The shell builds contexts itself; this constructor exists so handlers
    /// can be exercised in isolation.
    pub fn new(invocation_id: impl Into<String>, budget: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(budget)
            .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64));
        let deadline_at = chrono::Duration::from_std(budget)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            invocation_id: invocation_id.into(),
            trace_id: None,
            deadline,
            deadline_at,
            signal: CancelSignal::default(),
        }
    }

    /// Attaches a trace id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Returns the opaque invocation identifier.
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Returns the platform trace id, if one was supplied.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Returns the wall-clock deadline.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline_at
    }

    /// Returns the time left until the deadline, clamped to zero.
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns true once the shell has signalled cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Resolves once the shell has signalled cancellation.
    pub async fn cancelled(&self) {
        self.signal.cancelled().await
    }

    pub(crate) fn deadline_instant(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn signal(&self) -> &CancelSignal {
        &self.signal
    }
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured fields attached to a log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogInfo {
    /// The invocation the entry belongs to
    pub invocation_id: Option<String>,
    /// The platform trace id
    pub trace_id: Option<String>,
    /// Truncated rendering of the raw input
    pub input: Option<String>,
    /// Final outcome, set on completion entries
    pub outcome: Option<String>,
    /// Additional key/value pairs
    pub extra: Vec<(String, String)>,
}

impl LogInfo {
    /// Creates a LogInfo for the given invocation.
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: Some(invocation_id.into()),
            ..Default::default()
        }
    }

    /// Sets the trace id.
    pub fn with_trace_id(mut self, trace_id: Option<&str>) -> Self {
        self.trace_id = trace_id.map(str::to_string);
        self
    }

    /// Sets the input summary.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Sets the outcome.
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    /// Appends an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra.push((key.into(), value.to_string()));
        self
    }

    fn format_extra(&self) -> String {
        self.extra
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Logging interface injected into the shell.
///
/// This trait is sealed.
pub trait Logger: Sealed + Send + Sync {
    /// Logs a debug message.
    fn debug(&self, message: &str, info: &LogInfo);
    /// Logs an info message.
    fn info(&self, message: &str, info: &LogInfo);
    /// Logs a warning.
    fn warn(&self, message: &str, info: &LogInfo);
    /// Logs an error.
    fn error(&self, message: &str, info: &LogInfo);

    /// Logs at the given level.
    fn log(&self, level: LogLevel, message: &str, info: &LogInfo) {
        match level {
            LogLevel::Debug => self.debug(message, info),
            LogLevel::Info => self.info(message, info),
            LogLevel::Warn => self.warn(message, info),
            LogLevel::Error => self.error(message, info),
        }
    }
}

/// Shared logger handle.
pub type SharedLogger = Arc<dyn Logger>;

macro_rules! tracing_event {
    ($level:ident, $message:expr, $info:expr) => {
        tracing::$level!(
            invocation_id = $info.invocation_id.as_deref().unwrap_or(""),
            trace_id = $info.trace_id.as_deref().unwrap_or(""),
            input = $info.input.as_deref().unwrap_or(""),
            outcome = $info.outcome.as_deref().unwrap_or(""),
            extra = %$info.format_extra(),
            "{}",
            $message
        )
    };
}

/// Logger that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Sealed for TracingLogger {}

impl Logger for TracingLogger {
    fn debug(&self, message: &str, info: &LogInfo) {
        tracing_event!(debug, message, info);
    }

    fn info(&self, message: &str, info: &LogInfo) {
        tracing_event!(info, message, info);
    }

    fn warn(&self, message: &str, info: &LogInfo) {
        tracing_event!(warn, message, info);
    }

    fn error(&self, message: &str, info: &LogInfo) {
        tracing_event!(error, message, info);
    }
}

type LogFn = Arc<dyn Fn(&str, &LogInfo) + Send + Sync>;

/// Logger backed by user-supplied closures.
#[derive(Clone)]
pub struct CustomLogger {
    debug: LogFn,
    info: LogFn,
    warn: LogFn,
    error: LogFn,
}

impl fmt::Debug for CustomLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomLogger").finish_non_exhaustive()
    }
}

impl Sealed for CustomLogger {}

impl Logger for CustomLogger {
    fn debug(&self, message: &str, info: &LogInfo) {
        (self.debug)(message, info)
    }

    fn info(&self, message: &str, info: &LogInfo) {
        (self.info)(message, info)
    }

    fn warn(&self, message: &str, info: &LogInfo) {
        (self.warn)(message, info)
    }

    fn error(&self, message: &str, info: &LogInfo) {
        (self.error)(message, info)
    }
}

/// Builds a logger with one closure per level.
pub fn custom_logger<D, I, W, E>(debug: D, info: I, warn: W, error: E) -> CustomLogger
where
    D: Fn(&str, &LogInfo) + Send + Sync + 'static,
    I: Fn(&str, &LogInfo) + Send + Sync + 'static,
    W: Fn(&str, &LogInfo) + Send + Sync + 'static,
    E: Fn(&str, &LogInfo) + Send + Sync + 'static,
{
    CustomLogger {
        debug: Arc::new(debug),
        info: Arc::new(info),
        warn: Arc::new(warn),
        error: Arc::new(error),
    }
}

/// Builds a logger from a single closure that receives the level.
pub fn simple_custom_logger<F>(f: F) -> CustomLogger
where
    F: Fn(LogLevel, &str, &LogInfo) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let (d, i, w, e) = (f.clone(), f.clone(), f.clone(), f);
    custom_logger(
        move |msg, info| d(LogLevel::Debug, msg, info),
        move |msg, info| i(LogLevel::Info, msg, info),
        move |msg, info| w(LogLevel::Warn, msg, info),
        move |msg, info| e(LogLevel::Error, msg, info),
    )
}

/// Calls the logger, swallowing any panic it raises.
///
/// Returns false if the logger panicked.
pub(crate) fn log_guarded(
    logger: &dyn Logger,
    level: LogLevel,
    message: &str,
    info: &LogInfo,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| logger.log(level, message, info))).is_ok()
}
