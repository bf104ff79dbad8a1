use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use super::TaskContext;
use crate::domain::TaskError;

/// The work a task performs.
///
/// `Ok` finishes the task with the value as its result, `Err` fails it.
/// Long-running work should watch `ctx.cancelled()` and return promptly once
/// it fires; whatever it returns after cancellation is discarded.
///
/// A panic inside `run` fails the task with a `Panicked` error.
#[async_trait]
pub trait TaskWork: Send + Sync + 'static {
    async fn run(&self, ctx: TaskContext) -> Result<Value, TaskError>;
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<Value, TaskError>> + Send>>;

/// Work backed by a closure.
pub struct FnWork {
    f: Box<dyn Fn(TaskContext) -> BoxFuture + Send + Sync>,
}

impl FnWork {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }
}

#[async_trait]
impl TaskWork for FnWork {
    async fn run(&self, ctx: TaskContext) -> Result<Value, TaskError> {
        (self.f)(ctx).await
    }
}
