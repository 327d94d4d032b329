//! # Invocation Shell
//!
//! A small runtime layer that sits between a serverless platform and user
//! handler code. For every invocation it:
//!
//! - decodes the raw input into the handler's input type,
//! - builds an [`InvocationContext`] with an id, a fixed deadline and a
//!   cooperative cancel signal,
//! - calls the handler exactly once while racing it against the deadline,
//! - turns whatever happens (result, error, panic, timeout) into a single
//!   [`CompletionRecord`].
//!
//! Nothing escapes the shell as an unstructured fault: malformed input becomes
//! `InputError`, handler failures become `HandlerError`, and an overrun
//! deadline becomes `TimeoutError`.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use invocation_shell::{handler_fn, BoxError, InvocationContext, InvocationShell};
//! use serde_json::{Map, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     lambda_runtime::tracing::init_default_subscriber();
//!
//!     let shell = InvocationShell::new(handler_fn(
//!         |input: Map<String, Value>, ctx: InvocationContext| async move {
//!             tracing::info!(invocation_id = ctx.invocation_id(), "received: {:?}", input);
//!             Ok::<_, BoxError>("ok")
//!         },
//!     ));
//!
//!     invocation_shell::lambda::run(shell).await
//! }
//! ```
//!
//! ## Driving the shell directly
//!
//! ```rust
//! use std::time::Duration;
//! use invocation_shell::{handler_fn, BoxError, InvocationShell, PlatformContext};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let shell = InvocationShell::new(handler_fn(|n: i64, _ctx| async move {
//!     Ok::<_, BoxError>(n * 2)
//! }));
//!
//! let record = shell
//!     .invoke(b"21", PlatformContext::new("req-1").with_remaining(Duration::from_secs(1)))
//!     .await;
//!
//! assert_eq!(record.result(), Some(&serde_json::json!(42)));
//! # }
//! ```
//!
//! ## Timeouts and cancellation
//!
//! The handler runs on a blocking-pool thread by default ([`HandlerExecution`]),
//! so even a handler that never yields cannot starve the shell. A watcher task
//! sleeps until the deadline or until the platform triggers the invocation's
//! [`AbortHandle`]; if it fires first it commits the `TimedOut` outcome and
//! raises the cancel signal. Handlers observe it through
//! [`InvocationContext::is_cancelled`] or [`InvocationContext::cancelled`]. The
//! shell then waits at most [`ShellConfig::grace_period`] before returning, and
//! never aborts the handler: its remaining work is abandoned.
//!
//! ## Logging
//!
//! The shell logs exactly twice per invocation (receipt and completion)
//! through an injected [`Logger`]. The default is [`TracingLogger`]; closures
//! can be plugged in with [`custom_logger`] or [`simple_custom_logger`]. A
//! panicking logger is contained and never affects the outcome.
//!
//! ## Module Organization
//!
//! - [`config`]: Shell configuration
//! - [`context`]: InvocationContext, cancel signal and loggers
//! - [`error`]: Error kinds, error descriptors and shell errors
//! - [`handler`]: The handler contract and closure adapter
//! - [`lambda`]: Platform context, completion records and the Lambda runtime adapter
//! - [`shell`]: The invocation shell and its lifecycle state machine

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod lambda;
pub mod shell;

mod sealed;

pub use config::{HandlerExecution, ShellConfig};
pub use context::{
    custom_logger, simple_custom_logger, AbortHandle, CancelSignal, CustomLogger,
    InvocationContext, LogInfo, LogLevel, Logger, SharedLogger, TracingLogger,
};
pub use error::{BoxError, ErrorKind, ErrorObject, ShellError};
pub use handler::{handler_fn, HandlerContract, HandlerFn};
pub use lambda::{Budget, CompletionRecord, CompletionStatus, PlatformContext};
pub use shell::{InvocationPhase, InvocationShell, InvokeFuture, Lifecycle};
