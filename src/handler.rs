//! The work a job does: a single async trait for an opaque callable looked
//! up by name, rather than a family of fixed-arity function pointers.

use async_trait::async_trait;
use std::fmt;

/// A job's handler: the code actually run by the Job Executor.
///
/// `Ok(())` is a `finished` outcome; `Err(message)` is a `failed` outcome
/// with the given plaintext message.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self) -> Result<(), String>;
}

impl fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler(..)")
    }
}

/// Wrap a plain async closure as a [`Handler`].
///
/// ```
/// # use momo::handler::{Handler, FnHandler};
/// let handler = FnHandler::new(|| async { Ok(()) });
/// ```
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: std::marker::PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), String>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), String>> + Send,
{
    async fn call(&self) -> Result<(), String> {
        (self.f)().await
    }
}
