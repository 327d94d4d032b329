//! The contract user handlers implement.
//!
//! A handler has exactly one operation, [`HandlerContract::handle`]. The shell
//! decodes the input into [`HandlerContract::Input`], calls `handle` at most
//! once with a non-expired [`InvocationContext`], and captures the returned
//! value or error.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use invocation_shell::{BoxError, HandlerContract, InvocationContext};
//! use serde_json::{Map, Value};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl HandlerContract for Hello {
//!     type Input = Map<String, Value>;
//!     type Output = String;
//!
//!     async fn handle(
//!         &self,
//!         input: Self::Input,
//!         _ctx: InvocationContext,
//!     ) -> Result<String, BoxError> {
//!         Ok(format!("received {} keys", input.len()))
//!     }
//! }
//! ```
//!
//! Closures can be adapted with [`handler_fn`]:
//!
//! ```rust
//! use invocation_shell::{handler_fn, BoxError, InvocationContext};
//!
//! let echo = handler_fn(|value: serde_json::Value, _ctx: InvocationContext| async move {
//!     Ok::<_, BoxError>(value)
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::context::InvocationContext;
use crate::error::BoxError;

/// Capability every user handler provides.
///
/// Handlers should check [`InvocationContext::is_cancelled`] (or await
/// [`InvocationContext::cancelled`]) during long work and stop once the shell
/// has given up on them. Cancellation is advisory; the shell never aborts a
/// running handler.
#[async_trait]
pub trait HandlerContract: Send + Sync + 'static {
    /// Shape the raw input is decoded into.
    type Input: DeserializeOwned + Send + 'static;
    /// Value produced on success.
    type Output: Serialize + Send + 'static;

    /// Processes one invocation.
    async fn handle(
        &self,
        input: Self::Input,
        ctx: InvocationContext,
    ) -> Result<Self::Output, BoxError>;
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct HandlerFn<F, I, O> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<F, I, O> fmt::Debug for HandlerFn<F, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// Wraps an async closure `(input, ctx) -> Result<O, E>` as a handler.
pub fn handler_fn<F, Fut, I, O, E>(f: F) -> HandlerFn<F, I, O>
where
    F: Fn(I, InvocationContext) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    HandlerFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, I, O, E> HandlerContract for HandlerFn<F, I, O>
where
    F: Fn(I, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    E: Into<BoxError>,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn handle(&self, input: I, ctx: InvocationContext) -> Result<O, BoxError> {
        (self.f)(input, ctx).await.map_err(Into::into)
    }
}
