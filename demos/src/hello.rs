//! Hello World Example
//!
//! The smallest useful handler: log the event and acknowledge it.
//! Wrap it with [`handler_fn`](invocation_shell::handler_fn) to serve it.

use invocation_shell::{BoxError, InvocationContext};
use serde_json::{Map, Value};

/// Logs the received event and returns `"ok"`.
pub async fn handler(
    event: Map<String, Value>,
    ctx: InvocationContext,
) -> Result<&'static str, BoxError> {
    tracing::info!(invocation_id = ctx.invocation_id(), "received: {:?}", event);
    Ok("ok")
}
