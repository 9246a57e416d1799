//! Job handlers and the handler registry.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{HandlerError, PoolError};

/// What a handler gets to see about the run it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_name: String,
    pub scheduled_for: DateTime<Utc>,
    /// Zero on the first attempt.
    pub attempt: u32,
    pub payload: Vec<u8>,
}

impl JobContext {
    /// Payload as text, with invalid UTF-8 replaced.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Executes one kind of job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: JobContext) -> Result<(), HandlerError>;
}

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// Adapts an async closure into a [`JobHandler`].
pub struct FnHandler {
    func: Box<dyn Fn(JobContext) -> BoxedHandlerFuture + Send + Sync>,
}

impl FnHandler {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            func: Box::new(move |ctx| Box::pin(func(ctx))),
        }
    }
}

#[async_trait]
impl JobHandler for FnHandler {
    async fn handle(&self, ctx: JobContext) -> Result<(), HandlerError> {
        (self.func)(ctx).await
    }
}

/// Maps handler identifiers to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    ///
    /// Returns an error if the name is taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), PoolError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(PoolError::AlreadyRegistered(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, func: F) -> Result<(), PoolError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler::new(func)))
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
