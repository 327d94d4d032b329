//! Platform integration types.
//!
//! This module defines what the invoking platform hands the shell
//! ([`PlatformContext`]), what the shell hands back ([`CompletionRecord`]),
//! and an adapter that drives an [`InvocationShell`] from the AWS Lambda
//! runtime API.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use lambda_runtime::{service_fn, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::AbortHandle;
use crate::error::{ErrorKind, ErrorObject};
use crate::handler::HandlerContract;
use crate::shell::{InvocationShell, InvokeFuture};

/// Time budget supplied by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Time left, measured from when the shell receives the invocation.
    Remaining(Duration),
    /// Absolute deadline as milliseconds since the Unix epoch (Lambda's format).
    DeadlineEpochMillis(u64),
}

impl Budget {
    /// Returns the time left as of now, clamped to zero.
    pub fn remaining(&self) -> Duration {
        match self {
            Self::Remaining(d) => *d,
            Self::DeadlineEpochMillis(ms) => {
                let deadline = i64::try_from(*ms).unwrap_or(i64::MAX);
                let left = deadline.saturating_sub(Utc::now().timestamp_millis());
                Duration::from_millis(u64::try_from(left).unwrap_or(0))
            }
        }
    }
}

/// Per-invocation metadata supplied by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformContext {
    /// Platform request identifier. An empty id is replaced with a generated one.
    pub invocation_id: String,
    /// Time budget; `None` falls back to [`ShellConfig::default_timeout`](crate::ShellConfig).
    pub budget: Option<Budget>,
    /// Trace header value, if tracing is active.
    pub trace_id: Option<String>,
    /// Lets the platform abort the invocation before its deadline.
    pub abort: Option<AbortHandle>,
}

impl PlatformContext {
    /// Creates a context with no budget.
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            budget: None,
            trace_id: None,
            abort: None,
        }
    }

    /// Sets a relative budget.
    pub fn with_remaining(mut self, remaining: Duration) -> Self {
        self.budget = Some(Budget::Remaining(remaining));
        self
    }

    /// Sets an absolute epoch-millisecond deadline.
    pub fn with_deadline_epoch_millis(mut self, deadline_ms: u64) -> Self {
        self.budget = Some(Budget::DeadlineEpochMillis(deadline_ms));
        self
    }

    /// Sets the trace id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Attaches an abort handle.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Returns the trace id.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub(crate) fn remaining_or(&self, default: Duration) -> Duration {
        self.budget.map(|b| b.remaining()).unwrap_or(default)
    }
}

impl From<&lambda_runtime::Context> for PlatformContext {
    fn from(ctx: &lambda_runtime::Context) -> Self {
        Self {
            invocation_id: ctx.request_id.clone(),
            // A zero deadline means the runtime API did not send one.
            budget: (ctx.deadline > 0).then_some(Budget::DeadlineEpochMillis(ctx.deadline)),
            trace_id: ctx.xray_trace_id.clone().filter(|t| !t.is_empty()),
            abort: None,
        }
    }
}

/// Outcome status of a completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    /// The handler returned a result
    Success,
    /// The invocation failed; see the error descriptor
    Failure,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// The single structured outcome of one invocation.
///
/// Exactly one of `result` and `error` is populated; the constructors are the
/// only way to build a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRecord {
    status: CompletionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorObject>,
    invocation_id: String,
    duration_ms: u64,
}

impl CompletionRecord {
    /// Creates a successful record.
    pub fn success(invocation_id: impl Into<String>, result: Value) -> Self {
        Self {
            status: CompletionStatus::Success,
            result: Some(result),
            error: None,
            invocation_id: invocation_id.into(),
            duration_ms: 0,
        }
    }

    /// Creates a failed record.
    pub fn failure(invocation_id: impl Into<String>, error: ErrorObject) -> Self {
        Self {
            status: CompletionStatus::Failure,
            result: None,
            error: Some(error),
            invocation_id: invocation_id.into(),
            duration_ms: 0,
        }
    }

    /// Sets the measured duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the status.
    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    /// Returns true if the invocation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.status, CompletionStatus::Success)
    }

    /// Returns true if the invocation failed.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, CompletionStatus::Failure)
    }

    /// Returns the result of a successful invocation.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Returns the error of a failed invocation.
    pub fn error(&self) -> Option<&ErrorObject> {
        self.error.as_ref()
    }

    /// Returns the error kind of a failed invocation.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Returns the invocation id.
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Returns how long the invocation took.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Converts the record into a `Result`.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Ok(Value::Null),
        }
    }

    /// Converts the record into the platform response body: the result value
    /// on success, the error object (`kind`, `message`, `causes`) on failure.
    pub fn into_response(self) -> Value {
        match self.into_result() {
            Ok(value) => value,
            Err(error) => serde_json::to_value(&error)
                .unwrap_or_else(|_| Value::String(error.to_string())),
        }
    }
}

impl<H: HandlerContract> InvocationShell<H> {
    /// Runs one Lambda event through the shell.
    pub fn invoke_event(&self, event: LambdaEvent<Value>) -> InvokeFuture<'_> {
        let (payload, ctx) = event.into_parts();
        self.invoke_value(payload, PlatformContext::from(&ctx))
    }
}

/// Serves Lambda invocations with the given shell until the runtime stops.
///
/// Each invocation's [`CompletionRecord`] is returned to the runtime API as
/// the response body (see [`CompletionRecord::into_response`]).
pub async fn run<H: HandlerContract>(
    shell: InvocationShell<H>,
) -> Result<(), lambda_runtime::Error> {
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let shell = shell.clone();
        async move {
            let record = shell.invoke_event(event).await;
            Ok::<Value, lambda_runtime::Error>(record.into_response())
        }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_remaining_relative() {
        let budget = Budget::Remaining(Duration::from_millis(250));
        assert_eq!(budget.remaining(), Duration::from_millis(250));
    }

    #[test]
    fn test_budget_remaining_absolute() {
        let now = Utc::now().timestamp_millis() as u64;

        let budget = Budget::DeadlineEpochMillis(now + 60_000);
        let left = budget.remaining();
        assert!(left > Duration::from_secs(55));
        assert!(left <= Duration::from_secs(60));

        let expired = Budget::DeadlineEpochMillis(now - 1_000);
        assert_eq!(expired.remaining(), Duration::ZERO);

        let far = Budget::DeadlineEpochMillis(u64::MAX);
        assert!(far.remaining() > Duration::from_secs(3600));
    }

    #[test]
    fn test_platform_context_builder() {
        let abort = AbortHandle::new();
        let ctx = PlatformContext::new("req-1")
            .with_remaining(Duration::from_secs(2))
            .with_trace_id("Root=1-abc")
            .with_abort_handle(abort.clone());

        assert_eq!(ctx.invocation_id, "req-1");
        assert_eq!(ctx.budget, Some(Budget::Remaining(Duration::from_secs(2))));
        assert_eq!(ctx.trace_id(), Some("Root=1-abc"));
        assert_eq!(ctx.abort, Some(abort));
        assert_eq!(ctx.remaining_or(Duration::from_secs(9)), Duration::from_secs(2));

        let no_budget = PlatformContext::new("req-2");
        assert_eq!(no_budget.remaining_or(Duration::from_secs(9)), Duration::from_secs(9));
    }

    #[test]
    fn test_platform_context_from_lambda_context() {
        let mut lambda_ctx = lambda_runtime::Context::default();
        lambda_ctx.request_id = "52fdfc07-2182-154f-163f-5f0f9a621d72".to_string();
        lambda_ctx.deadline = 1_700_000_000_000;
        lambda_ctx.xray_trace_id = Some("Root=1-5759e988-bd862e3fe1be46a994272793".to_string());

        let ctx = PlatformContext::from(&lambda_ctx);
        assert_eq!(ctx.invocation_id, "52fdfc07-2182-154f-163f-5f0f9a621d72");
        assert_eq!(ctx.budget, Some(Budget::DeadlineEpochMillis(1_700_000_000_000)));
        assert_eq!(ctx.trace_id(), Some("Root=1-5759e988-bd862e3fe1be46a994272793"));
    }

    #[test]
    fn test_platform_context_from_lambda_context_without_deadline() {
        let lambda_ctx = lambda_runtime::Context::default();
        let ctx = PlatformContext::from(&lambda_ctx);
        assert!(ctx.budget.is_none());
        assert!(ctx.trace_id.is_none());
        assert!(ctx.abort.is_none());
    }

    #[test]
    fn test_success_record() {
        let record = CompletionRecord::success("inv-1", serde_json::json!(42))
            .with_duration(Duration::from_millis(7));

        assert!(record.is_success());
        assert!(!record.is_failure());
        assert_eq!(record.status(), CompletionStatus::Success);
        assert_eq!(record.result(), Some(&serde_json::json!(42)));
        assert!(record.error().is_none());
        assert!(record.error_kind().is_none());
        assert_eq!(record.invocation_id(), "inv-1");
        assert_eq!(record.duration(), Duration::from_millis(7));
        assert_eq!(record.into_result().unwrap(), serde_json::json!(42));
    }

    #[test]
    fn test_failure_record() {
        let record = CompletionRecord::failure("inv-2", ErrorObject::handler("divide by zero"));

        assert!(record.is_failure());
        assert!(record.result().is_none());
        assert_eq!(record.error_kind(), Some(ErrorKind::Handler));
        assert_eq!(record.into_result().unwrap_err().message, "divide by zero");
    }

    #[test]
    fn test_completion_status_serialization() {
        assert_eq!(serde_json::to_string(&CompletionStatus::Success).unwrap(), r#""SUCCESS""#);
        assert_eq!(serde_json::to_string(&CompletionStatus::Failure).unwrap(), r#""FAILURE""#);
        assert_eq!(CompletionStatus::Success.to_string(), "SUCCESS");
        assert_eq!(CompletionStatus::Failure.to_string(), "FAILURE");
    }

    #[test]
    fn test_record_serialization() {
        let record = CompletionRecord::success("inv-3", serde_json::json!(42));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["result"], 42);
        assert!(json.get("error").is_none());

        let record = CompletionRecord::failure("inv-4", ErrorObject::timeout("deadline exceeded"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "FAILURE");
        assert_eq!(json["error"]["kind"], "TimeoutError");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_null_result_is_still_populated() {
        let record = CompletionRecord::success("inv-5", Value::Null);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""result":null"#));
    }

    #[test]
    fn test_into_response() {
        let ok = CompletionRecord::success("inv-6", serde_json::json!("ok"));
        assert_eq!(ok.into_response(), serde_json::json!("ok"));

        let failed = CompletionRecord::failure("inv-7", ErrorObject::input("missing field `op`"));
        assert_eq!(
            failed.into_response(),
            serde_json::json!({"kind": "InputError", "message": "missing field `op`"})
        );
    }
}
