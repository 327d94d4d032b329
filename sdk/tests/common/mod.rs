//! Shared test utilities for integration tests.
//!
//! This module provides handlers, loggers and proptest strategies used across
//! the integration test files.

#![allow(dead_code)] // These utilities are used by other integration test files

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use invocation_shell::{
    simple_custom_logger, BoxError, HandlerContract, HandlerExecution, InvocationContext, LogInfo,
    LogLevel, PlatformContext, SharedLogger, ShellConfig,
};
use proptest::prelude::*;
use serde::Deserialize;
use serde_json::Value;

pub const TEST_INVOCATION_ID: &str = "8476a536-e9f4-11e8-9739-2dfe598c3fcd";

/// Builds a platform context with a relative budget.
pub fn platform(budget: Duration) -> PlatformContext {
    PlatformContext::new(TEST_INVOCATION_ID).with_remaining(budget)
}

/// Runs handlers as runtime tasks so paused-clock tests can drive their timers.
pub fn task_config() -> ShellConfig {
    ShellConfig::default().with_handler_execution(HandlerExecution::Task)
}

// =============================================================================
// Recording logger
// =============================================================================

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub info: LogInfo,
}

/// Returns a logger that records every entry, and the shared entry list.
pub fn recording_logger() -> (SharedLogger, Arc<Mutex<Vec<LogEntry>>>) {
    let entries = Arc::new(Mutex::new(Vec::new()));
    let sink = entries.clone();
    let logger = simple_custom_logger(move |level, message, info| {
        sink.lock().unwrap().push(LogEntry {
            level,
            message: message.to_string(),
            info: info.clone(),
        });
    });
    (Arc::new(logger), entries)
}

// =============================================================================
// Test handlers
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OpRequest {
    pub op: String,
    pub value: i64,
    #[serde(default)]
    pub divisor: Option<i64>,
}

/// Handler supporting `echo` and `divide`, counting its calls.
#[derive(Debug, Default)]
pub struct OpHandler {
    calls: Arc<AtomicUsize>,
}

impl OpHandler {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl HandlerContract for OpHandler {
    type Input = OpRequest;
    type Output = i64;

    async fn handle(&self, input: OpRequest, _ctx: InvocationContext) -> Result<i64, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match input.op.as_str() {
            "echo" => Ok(input.value),
            "divide" => match input.divisor.unwrap_or(0) {
                0 => Err("divide by zero".into()),
                d => Ok(input.value / d),
            },
            other => Err(format!("unsupported op: {}", other).into()),
        }
    }
}

/// Handler that sleeps for a fixed time, ignoring cancellation.
#[derive(Debug, Clone, Copy)]
pub struct SleepyHandler {
    pub sleep: Duration,
}

#[async_trait]
impl HandlerContract for SleepyHandler {
    type Input = Value;
    type Output = &'static str;

    async fn handle(
        &self,
        _input: Value,
        _ctx: InvocationContext,
    ) -> Result<&'static str, BoxError> {
        tokio::time::sleep(self.sleep).await;
        Ok("woke up")
    }
}

// =============================================================================
// Proptest strategies
// =============================================================================

/// Arbitrary JSON values of bounded depth.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Non-empty error messages.
pub fn error_message_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9 ]{0,40}"
}
