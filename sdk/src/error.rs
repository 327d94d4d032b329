//! Error types for the invocation shell.
//!
//! Two layers live here:
//!
//! - [`ErrorObject`] / [`ErrorKind`]: the structured descriptor placed inside a
//!   failed [`CompletionRecord`](crate::lambda::CompletionRecord). Every failure
//!   an invocation can produce is converted into one of these before it leaves
//!   the shell.
//! - [`ShellError`]: errors of the shell itself (configuration, lifecycle misuse).
//!   These are returned from constructors and helpers, never from
//!   [`InvocationShell::invoke`](crate::shell::InvocationShell::invoke).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error type handlers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message used when a failure carries no text of its own.
pub(crate) const EMPTY_MESSAGE_PLACEHOLDER: &str = "handler failed without an error message";

/// The main error type for shell-level failures.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A configuration value could not be parsed.
    #[error("Configuration error: {key}={value:?}: {message}")]
    Config {
        /// The configuration key (environment variable name)
        key: String,
        /// The offending raw value
        value: String,
        /// Why the value was rejected
        message: String,
    },

    /// An invocation lifecycle transition that the state machine forbids.
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        /// The phase the invocation was in
        from: crate::shell::InvocationPhase,
        /// The phase that was requested
        to: crate::shell::InvocationPhase,
    },
}

impl ShellError {
    /// Creates a new Config error.
    pub fn config(
        key: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Config {
            key: key.into(),
            value: value.into(),
            message: message.into(),
        }
    }
}

/// Category of a failed invocation.
///
/// Serialized as `InputError`, `HandlerError` and `TimeoutError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or unparseable input. The handler was not invoked.
    #[serde(rename = "InputError")]
    Input,
    /// The handler failed (returned an error, panicked, or produced an
    /// unusable result).
    #[serde(rename = "HandlerError")]
    Handler,
    /// The deadline elapsed before the handler returned.
    #[serde(rename = "TimeoutError")]
    Timeout,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "InputError",
            Self::Handler => "HandlerError",
            Self::Timeout => "TimeoutError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error descriptor carried by a failed completion record.
///
/// The message is never empty; constructors substitute a placeholder when the
/// underlying failure has no text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error category
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// Messages of the underlying causes, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorObject {
    /// Creates a new ErrorObject.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            EMPTY_MESSAGE_PLACEHOLDER.to_string()
        } else {
            message
        };
        Self {
            kind,
            message,
            causes: Vec::new(),
        }
    }

    /// Creates an `InputError` descriptor.
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, message)
    }

    /// Creates a `HandlerError` descriptor.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handler, message)
    }

    /// Creates a `TimeoutError` descriptor.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Builds a descriptor from an error value, walking its `source()` chain.
    pub fn from_error(kind: ErrorKind, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut obj = Self::new(kind, error.to_string());
        let mut source = error.source();
        while let Some(cause) = source {
            obj.causes.push(cause.to_string());
            source = cause.source();
        }
        obj
    }

    /// Replaces the cause chain.
    pub fn with_causes<I, S>(mut self, causes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.causes = causes.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for cause in &self.causes {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl From<serde_json::Error> for ErrorObject {
    fn from(error: serde_json::Error) -> Self {
        Self::input(error.to_string())
    }
}

impl From<BoxError> for ErrorObject {
    fn from(error: BoxError) -> Self {
        Self::from_error(ErrorKind::Handler, error.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: Inner,
    }

    #[derive(Debug, Error)]
    #[error("inner failure")]
    struct Inner {
        #[source]
        io: std::io::Error,
    }

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(serde_json::to_string(&ErrorKind::Input).unwrap(), r#""InputError""#);
        assert_eq!(serde_json::to_string(&ErrorKind::Handler).unwrap(), r#""HandlerError""#);
        assert_eq!(serde_json::to_string(&ErrorKind::Timeout).unwrap(), r#""TimeoutError""#);

        let kind: ErrorKind = serde_json::from_str(r#""TimeoutError""#).unwrap();
        assert_eq!(kind, ErrorKind::Timeout);
        assert_eq!(ErrorKind::Handler.to_string(), "HandlerError");
    }

    #[test]
    fn test_empty_message_is_replaced() {
        let obj = ErrorObject::handler("");
        assert_eq!(obj.message, EMPTY_MESSAGE_PLACEHOLDER);

        let obj = ErrorObject::handler("   ");
        assert!(!obj.message.trim().is_empty());
    }

    #[test]
    fn test_from_error_collects_cause_chain() {
        let error = Outer {
            inner: Inner {
                io: std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged"),
            },
        };

        let obj = ErrorObject::from_error(ErrorKind::Handler, &error);
        assert_eq!(obj.kind, ErrorKind::Handler);
        assert_eq!(obj.message, "outer failure");
        assert_eq!(obj.causes, vec!["inner failure", "disk unplugged"]);
        assert_eq!(
            obj.to_string(),
            "HandlerError: outer failure: inner failure: disk unplugged"
        );
    }

    #[test]
    fn test_from_boxed_error() {
        let error: BoxError = "divide by zero".into();
        let obj: ErrorObject = error.into();
        assert_eq!(obj.kind, ErrorKind::Handler);
        assert_eq!(obj.message, "divide by zero");
        assert!(obj.causes.is_empty());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<String>("invalid").unwrap_err();
        let obj: ErrorObject = json_error.into();
        assert_eq!(obj.kind, ErrorKind::Input);
    }

    #[test]
    fn test_error_object_serialization() {
        let obj = ErrorObject::handler("divide by zero");
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "HandlerError", "message": "divide by zero"})
        );

        let obj = obj.with_causes(["root cause"]);
        let json = serde_json::to_string(&obj).unwrap();
        assert!(json.contains(r#""causes":["root cause"]"#));
    }

    #[test]
    fn test_config_error_display() {
        let error = ShellError::config("INVOCATION_SHELL_GRACE_PERIOD_MS", "soon", "not a number");
        assert_eq!(
            error.to_string(),
            r#"Configuration error: INVOCATION_SHELL_GRACE_PERIOD_MS="soon": not a number"#
        );
    }
}
