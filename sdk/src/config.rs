//! Configuration for the invocation shell.
//!
//! [`ShellConfig`] holds the tunables that bound an invocation: the budget
//! used when the platform supplies none, the grace period granted to a
//! handler after its deadline, where the handler runs, and limits on
//! response and log sizes.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use invocation_shell::ShellConfig;
//!
//! let config = ShellConfig::default()
//!     .with_default_timeout(Duration::from_secs(10))
//!     .with_grace_period(Duration::from_millis(50));
//!
//! assert_eq!(config.default_timeout, Duration::from_secs(10));
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ShellError;

/// Environment variable overriding [`ShellConfig::default_timeout`] (milliseconds).
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "INVOCATION_SHELL_DEFAULT_TIMEOUT_MS";
/// Environment variable overriding [`ShellConfig::grace_period`] (milliseconds).
pub const ENV_GRACE_PERIOD_MS: &str = "INVOCATION_SHELL_GRACE_PERIOD_MS";
/// Environment variable overriding [`ShellConfig::max_response_size`] (bytes).
pub const ENV_MAX_RESPONSE_BYTES: &str = "INVOCATION_SHELL_MAX_RESPONSE_BYTES";
/// Environment variable overriding [`ShellConfig::input_summary_limit`] (characters).
pub const ENV_INPUT_SUMMARY_LIMIT: &str = "INVOCATION_SHELL_INPUT_SUMMARY_LIMIT";
/// Environment variable overriding [`ShellConfig::handler_execution`] (`isolated` or `task`).
pub const ENV_HANDLER_EXECUTION: &str = "INVOCATION_SHELL_HANDLER_EXECUTION";

/// Where the shell runs a handler.
///
/// # Choosing a mode
///
/// - `Isolated` runs the handler on a thread of the blocking pool, driving its
///   future with the current runtime handle. A handler that blocks its thread
///   cannot starve the deadline watcher, even on a `current_thread` runtime.
/// - `Task` spawns the handler as an ordinary Tokio task. The deadline is only
///   enforced if the handler yields, but the handler shares the runtime clock,
///   so paused-clock tests (`tokio::time::pause`) can drive it. A blocking-pool
///   thread stops a paused clock from auto-advancing, so `Isolated` handlers
///   that wait on Tokio timers never wake under a paused clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerExecution {
    /// Dedicated blocking-pool thread (default)
    #[default]
    Isolated,
    /// Ordinary Tokio task on the runtime workers
    Task,
}

impl fmt::Display for HandlerExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated => write!(f, "isolated"),
            Self::Task => write!(f, "task"),
        }
    }
}

impl FromStr for HandlerExecution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolated" => Ok(Self::Isolated),
            "task" => Ok(Self::Task),
            other => Err(format!("expected `isolated` or `task`, got `{}`", other)),
        }
    }
}

/// Tunables for an [`InvocationShell`](crate::shell::InvocationShell).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Budget applied when the platform context carries no deadline.
    pub default_timeout: Duration,
    /// How long the shell keeps waiting for a handler after signalling
    /// cancellation, before it reports the timeout regardless.
    pub grace_period: Duration,
    /// Largest serialized result accepted in a successful record.
    pub max_response_size: usize,
    /// Maximum number of characters of raw input included in the receipt log entry.
    pub input_summary_limit: usize,
    /// Where the handler runs.
    pub handler_execution: HandlerExecution,
}

impl ShellConfig {
    /// Lambda's default function timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
    /// Default grace period after the deadline.
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(25);
    /// Maximum response size in bytes (6MB Lambda limit)
    pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 6 * 1024 * 1024;
    /// Default input summary length.
    pub const DEFAULT_INPUT_SUMMARY_LIMIT: usize = 256;

    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Sets the maximum response size.
    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    /// Sets the input summary limit.
    pub fn with_input_summary_limit(mut self, chars: usize) -> Self {
        self.input_summary_limit = chars;
        self
    }

    /// Sets where the handler runs.
    pub fn with_handler_execution(mut self, execution: HandlerExecution) -> Self {
        self.handler_execution = execution;
        self
    }

    /// Loads the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; a set but unparseable variable is
    /// an error.
    pub fn from_env() -> Result<Self, ShellError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ShellError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var(&lookup, ENV_DEFAULT_TIMEOUT_MS)? {
            config.default_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, ENV_GRACE_PERIOD_MS)? {
            config.grace_period = Duration::from_millis(ms);
        }
        if let Some(bytes) = parse_var(&lookup, ENV_MAX_RESPONSE_BYTES)? {
            config.max_response_size = to_usize(ENV_MAX_RESPONSE_BYTES, bytes)?;
        }
        if let Some(chars) = parse_var(&lookup, ENV_INPUT_SUMMARY_LIMIT)? {
            config.input_summary_limit = to_usize(ENV_INPUT_SUMMARY_LIMIT, chars)?;
        }
        if let Some(raw) = lookup(ENV_HANDLER_EXECUTION) {
            config.handler_execution = raw.parse().map_err(|message: String| {
                ShellError::config(ENV_HANDLER_EXECUTION, raw.as_str(), message)
            })?;
        }

        Ok(config)
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_timeout: Self::DEFAULT_TIMEOUT,
            grace_period: Self::DEFAULT_GRACE_PERIOD,
            max_response_size: Self::DEFAULT_MAX_RESPONSE_SIZE,
            input_summary_limit: Self::DEFAULT_INPUT_SUMMARY_LIMIT,
            handler_execution: HandlerExecution::default(),
        }
    }
}

fn parse_var<F>(lookup: &F, key: &str) -> Result<Option<u64>, ShellError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ShellError::config(key, raw.as_str(), e.to_string())),
    }
}

fn to_usize(key: &str, value: u64) -> Result<usize, ShellError> {
    usize::try_from(value).map_err(|e| ShellError::config(key, value.to_string(), e.to_string()))
}
