//! Calculator Example
//!
//! A typed handler built on [`HandlerContract`]. Requests name an operation and
//! its operands; failures use a domain error type that the shell reports as a
//! `HandlerError`. An optional delay shows how a handler cooperates with the
//! cancel signal.

use std::time::Duration;

use async_trait::async_trait;
use invocation_shell::{BoxError, HandlerContract, InvocationContext};
use serde::{Deserialize, Serialize};

/// Supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Echo,
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Calculator request.
#[derive(Debug, Clone, Deserialize)]
pub struct CalcRequest {
    pub op: Op,
    pub value: i64,
    #[serde(default)]
    pub operand: Option<i64>,
    /// Simulated work before answering, in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// Calculator response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcResponse {
    pub op: Op,
    pub result: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CalcError {
    #[error("divide by zero")]
    DivideByZero,

    #[error("operation {0:?} requires an operand")]
    MissingOperand(Op),

    #[error("integer overflow in {0:?}")]
    Overflow(Op),

    #[error("cancelled before finishing")]
    Cancelled,
}

/// Evaluates a request without any delay.
pub fn evaluate(request: &CalcRequest) -> Result<i64, CalcError> {
    let operand = || request.operand.ok_or(CalcError::MissingOperand(request.op));
    let value = request.value;

    match request.op {
        Op::Echo => Ok(value),
        Op::Add => value.checked_add(operand()?).ok_or(CalcError::Overflow(Op::Add)),
        Op::Subtract => value.checked_sub(operand()?).ok_or(CalcError::Overflow(Op::Subtract)),
        Op::Multiply => value.checked_mul(operand()?).ok_or(CalcError::Overflow(Op::Multiply)),
        Op::Divide => match request.operand.unwrap_or(0) {
            0 => Err(CalcError::DivideByZero),
            d => value.checked_div(d).ok_or(CalcError::Overflow(Op::Divide)),
        },
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

#[async_trait]
impl HandlerContract for Calculator {
    type Input = CalcRequest;
    type Output = CalcResponse;

    async fn handle(
        &self,
        input: CalcRequest,
        ctx: InvocationContext,
    ) -> Result<CalcResponse, BoxError> {
        if let Some(delay) = input.delay_ms {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = ctx.cancelled() => {
                    tracing::warn!(invocation_id = ctx.invocation_id(), "calculation cancelled");
                    return Err(CalcError::Cancelled.into());
                }
            }
        }

        let result = evaluate(&input)?;
        tracing::debug!(invocation_id = ctx.invocation_id(), op = ?input.op, result, "calculated");
        Ok(CalcResponse { op: input.op, result })
    }
}
