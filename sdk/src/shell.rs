//! The invocation shell.
//!
//! [`InvocationShell::invoke`] owns the lifecycle of one invocation:
//!
//! 1. decode the raw input (`InputError` if malformed; the handler is not called)
//! 2. build an [`InvocationContext`] whose deadline comes from the platform budget
//! 3. run the handler off the caller's task while a watcher task waits for the
//!    deadline or a platform abort
//! 4. commit exactly one outcome through [`Lifecycle`] (first writer wins)
//! 5. return a [`CompletionRecord`]
//!
//! When the watcher wins, it raises the context's cancel signal. The shell then
//! waits at most [`ShellConfig::grace_period`] for the handler to settle and
//! reports `TimeoutError` either way. The handler is detached, never aborted.
//! By default it runs on a blocking-pool thread (see [`HandlerExecution`]), so
//! a handler that blocks its thread cannot hold the shell past the grace
//! period.
//!
//! Invocations rejected before the handler starts (malformed input, an
//! already elapsed budget, an abort requested up front) never create a
//! [`Lifecycle`]. Their completion log entry reports `Failed` for input errors
//! and `NotStarted` otherwise.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::config::{HandlerExecution, ShellConfig};
use crate::context::{
    log_guarded, InvocationContext, LogInfo, LogLevel, SharedLogger, TracingLogger,
};
use crate::error::{BoxError, ErrorObject, ShellError};
use crate::handler::HandlerContract;
use crate::lambda::{CompletionRecord, PlatformContext};

/// Future returned by the `invoke*` methods.
///
/// It is boxed and `Send`, so a platform can drive many invocations in
/// parallel with `tokio::spawn`.
pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = CompletionRecord> + Send + 'a>>;

/// Outcome label logged for invocations whose handler never started.
const NOT_STARTED: &str = "NotStarted";

/// Phase of an invocation.
///
/// `Created → Running → {Completed, TimedOut, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InvocationPhase {
    /// Context built, handler not yet started
    Created = 0,
    /// Handler running
    Running = 1,
    /// Handler returned a usable result in time
    Completed = 2,
    /// Deadline elapsed (or the platform aborted) first
    TimedOut = 3,
    /// Handler failed in time
    Failed = 4,
}

impl InvocationPhase {
    /// Returns true for `Completed`, `TimedOut` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::TimedOut,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for InvocationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::TimedOut => write!(f, "TimedOut"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Lock-free state machine for one invocation.
#[derive(Debug)]
pub struct Lifecycle {
    phase: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a lifecycle in the `Created` phase.
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(InvocationPhase::Created as u8),
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> InvocationPhase {
        InvocationPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Moves `Created → Running`.
    pub fn start(&self) -> Result<(), ShellError> {
        self.phase
            .compare_exchange(
                InvocationPhase::Created as u8,
                InvocationPhase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|current| ShellError::InvalidTransition {
                from: InvocationPhase::from_u8(current),
                to: InvocationPhase::Running,
            })
    }

    /// Attempts to move `Running → outcome`.
    ///
    /// Returns `Ok(true)` if this call committed the outcome and `Ok(false)` if
    /// another outcome was committed first. Non-terminal targets and commits
    /// from `Created` are errors.
    pub fn commit(&self, outcome: InvocationPhase) -> Result<bool, ShellError> {
        if !outcome.is_terminal() {
            return Err(ShellError::InvalidTransition {
                from: self.phase(),
                to: outcome,
            });
        }

        match self.phase.compare_exchange(
            InvocationPhase::Running as u8,
            outcome as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(true),
            Err(current) => {
                let current = InvocationPhase::from_u8(current);
                if current.is_terminal() {
                    Ok(false)
                } else {
                    Err(ShellError::InvalidTransition {
                        from: current,
                        to: outcome,
                    })
                }
            }
        }
    }
}

/// Why the watcher ended the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Deadline,
    Aborted,
}

/// What [`InvocationShell::execute`] hands back to the logging step.
struct Execution {
    /// Committed phase; `None` if the handler never started
    phase: Option<InvocationPhase>,
    record: CompletionRecord,
    /// For timed-out invocations, whether the handler settled within the grace period
    settled: Option<bool>,
}

impl Execution {
    fn not_started(record: CompletionRecord) -> Self {
        Self {
            phase: None,
            record,
            settled: None,
        }
    }
}

/// Orchestrates invocations of a single handler.
///
/// Cloning is cheap; clones share the handler and logger.
pub struct InvocationShell<H> {
    handler: Arc<H>,
    logger: SharedLogger,
    config: ShellConfig,
}

impl<H> Clone for InvocationShell<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            logger: Arc::clone(&self.logger),
            config: self.config.clone(),
        }
    }
}

impl<H> fmt::Debug for InvocationShell<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationShell")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<H: HandlerContract> InvocationShell<H> {
    /// Creates a shell with the default configuration and a [`TracingLogger`].
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            logger: Arc::new(TracingLogger),
            config: ShellConfig::default(),
        }
    }

    /// Replaces the logger.
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Runs one invocation from raw JSON bytes.
    ///
    /// The input is decoded before the returned future is first polled.
    pub fn invoke(&self, raw_input: &[u8], platform: PlatformContext) -> InvokeFuture<'_> {
        let summary = summarize(
            &String::from_utf8_lossy(raw_input),
            self.config.input_summary_limit,
        );
        let decoded = serde_json::from_slice::<H::Input>(raw_input);
        Box::pin(self.run(decoded, summary, platform))
    }

    /// Runs one invocation from an already parsed JSON document.
    pub fn invoke_value(&self, raw_input: Value, platform: PlatformContext) -> InvokeFuture<'_> {
        let summary = summarize(&raw_input.to_string(), self.config.input_summary_limit);
        let decoded = serde_json::from_value::<H::Input>(raw_input);
        Box::pin(self.run(decoded, summary, platform))
    }

    async fn run(
        &self,
        decoded: Result<H::Input, serde_json::Error>,
        summary: String,
        platform: PlatformContext,
    ) -> CompletionRecord {
        let started = Instant::now();

        let generated_id = platform.invocation_id.trim().is_empty();
        let invocation_id = if generated_id {
            uuid::Uuid::new_v4().to_string()
        } else {
            platform.invocation_id.clone()
        };
        let info = LogInfo::new(&invocation_id).with_trace_id(platform.trace_id());

        let mut receipt = info.clone().with_input(summary);
        if generated_id {
            receipt = receipt.with_extra("generated_invocation_id", true);
        }
        self.log(LogLevel::Info, "Invocation received", &receipt);

        let execution = match decoded {
            Err(error) => Execution {
                phase: Some(InvocationPhase::Failed),
                record: CompletionRecord::failure(
                    &invocation_id,
                    ErrorObject::input(format!("Invalid input: {}", error)),
                ),
                settled: None,
            },
            Ok(input) => self.execute(input, &invocation_id, &platform).await,
        };
        let record = execution.record.with_duration(started.elapsed());

        let outcome = execution
            .phase
            .map_or_else(|| NOT_STARTED.to_string(), |phase| phase.to_string());
        let mut completion = info
            .with_outcome(outcome)
            .with_extra("duration_ms", record.duration().as_millis());
        if let Some(error) = record.error() {
            completion = completion.with_extra("error_kind", error.kind);
        }
        if let Some(settled) = execution.settled {
            completion = completion.with_extra("handler_settled", settled);
        }
        let level = match execution.phase {
            Some(InvocationPhase::Completed) => LogLevel::Info,
            Some(InvocationPhase::TimedOut) | None => LogLevel::Warn,
            _ => LogLevel::Error,
        };
        self.log(level, "Invocation completed", &completion);

        record
    }

    /// Runs the handler against the deadline and the platform abort.
    async fn execute(
        &self,
        input: H::Input,
        invocation_id: &str,
        platform: &PlatformContext,
    ) -> Execution {
        let budget = platform.remaining_or(self.config.default_timeout);
        if budget.is_zero() {
            return Execution::not_started(CompletionRecord::failure(
                invocation_id,
                ErrorObject::timeout("Deadline already elapsed before the handler could start"),
            ));
        }
        if platform.abort.as_ref().is_some_and(|abort| abort.is_aborted()) {
            let record = self.timeout_record(invocation_id, budget, Expiry::Aborted);
            return Execution::not_started(record);
        }

        let mut ctx = InvocationContext::new(invocation_id, budget);
        if let Some(trace_id) = platform.trace_id() {
            ctx = ctx.with_trace_id(trace_id);
        }

        let lifecycle = Arc::new(Lifecycle::new());
        if let Err(error) = lifecycle.start() {
            return Execution {
                phase: Some(InvocationPhase::Failed),
                record: CompletionRecord::failure(
                    invocation_id,
                    ErrorObject::handler(error.to_string()),
                ),
                settled: None,
            };
        }

        let watcher = {
            let lifecycle = Arc::clone(&lifecycle);
            let ctx = ctx.clone();
            let abort = platform.abort.clone();
            tokio::spawn(async move {
                let expiry = match abort {
                    Some(abort) => tokio::select! {
                        _ = tokio::time::sleep_until(ctx.deadline_instant()) => Expiry::Deadline,
                        _ = abort.aborted() => Expiry::Aborted,
                    },
                    None => {
                        tokio::time::sleep_until(ctx.deadline_instant()).await;
                        Expiry::Deadline
                    }
                };
                if matches!(lifecycle.commit(InvocationPhase::TimedOut), Ok(true)) {
                    ctx.signal().cancel();
                }
                expiry
            })
        };

        let mut task = self.spawn_handler(input, ctx.clone());

        let joined = tokio::select! {
            biased;
            joined = &mut task => Some(joined),
            _ = ctx.cancelled() => None,
        };

        if let Some(joined) = joined {
            let (outcome, record) = self.capture(joined, invocation_id);
            if matches!(lifecycle.commit(outcome), Ok(true)) {
                watcher.abort();
                return Execution {
                    phase: Some(outcome),
                    record,
                    settled: None,
                };
            }
            // The watcher committed TimedOut while the result was being captured.
            let expiry = watcher.await.unwrap_or(Expiry::Deadline);
            return Execution {
                phase: Some(InvocationPhase::TimedOut),
                record: self.timeout_record(invocation_id, budget, expiry),
                settled: Some(true),
            };
        }

        // The watcher has committed and cancelled; it finishes without waiting.
        let expiry = watcher.await.unwrap_or(Expiry::Deadline);
        let settled = tokio::time::timeout(self.config.grace_period, &mut task)
            .await
            .is_ok();
        drop(task);

        Execution {
            phase: Some(InvocationPhase::TimedOut),
            record: self.timeout_record(invocation_id, budget, expiry),
            settled: Some(settled),
        }
    }

    fn spawn_handler(
        &self,
        input: H::Input,
        ctx: InvocationContext,
    ) -> JoinHandle<Result<H::Output, BoxError>> {
        let handler = Arc::clone(&self.handler);
        match self.config.handler_execution {
            HandlerExecution::Isolated => {
                let runtime = Handle::current();
                tokio::task::spawn_blocking(move || runtime.block_on(handler.handle(input, ctx)))
            }
            HandlerExecution::Task => {
                tokio::spawn(async move { handler.handle(input, ctx).await })
            }
        }
    }

    fn capture(
        &self,
        joined: Result<Result<H::Output, BoxError>, JoinError>,
        invocation_id: &str,
    ) -> (InvocationPhase, CompletionRecord) {
        let failed = |error: ErrorObject| {
            (InvocationPhase::Failed, CompletionRecord::failure(invocation_id, error))
        };

        match joined {
            Ok(Ok(output)) => match self.encode(&output) {
                Ok(value) => (
                    InvocationPhase::Completed,
                    CompletionRecord::success(invocation_id, value),
                ),
                Err(error) => failed(error),
            },
            Ok(Err(error)) => failed(ErrorObject::from(error)),
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                failed(ErrorObject::handler(format!("Handler panicked: {}", message)))
            }
            Err(join_error) => failed(ErrorObject::handler(format!(
                "Handler task did not complete: {}",
                join_error
            ))),
        }
    }

    fn encode(&self, output: &H::Output) -> Result<Value, ErrorObject> {
        let serialize_error = |e: serde_json::Error| {
            ErrorObject::handler(format!("Failed to serialize handler result: {}", e))
        };
        let value = serde_json::to_value(output).map_err(serialize_error)?;
        let size = serde_json::to_vec(&value)
            .map(|bytes| bytes.len())
            .map_err(serialize_error)?;

        if size > self.config.max_response_size {
            return Err(ErrorObject::handler(format!(
                "Response size {} bytes exceeds maximum {} bytes",
                size, self.config.max_response_size
            )));
        }
        Ok(value)
    }

    fn timeout_record(
        &self,
        invocation_id: &str,
        budget: Duration,
        expiry: Expiry,
    ) -> CompletionRecord {
        let message = match expiry {
            Expiry::Deadline => {
                format!("Handler did not complete within {} ms", budget.as_millis())
            }
            Expiry::Aborted => "Invocation aborted by the platform".to_string(),
        };
        CompletionRecord::failure(invocation_id, ErrorObject::timeout(message))
    }

    fn log(&self, level: LogLevel, message: &str, info: &LogInfo) {
        let _ = log_guarded(self.logger.as_ref(), level, message, info);
    }
}

/// Truncates `raw` to `limit` characters, marking the cut.
fn summarize(raw: &str, limit: usize) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
