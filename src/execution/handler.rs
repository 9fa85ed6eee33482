//! Step Handlers
//!
//! A step's work is provided by a [`StepHandler`] registered under the
//! step's name. The registry is shared between the orchestrator and the
//! tasks it spawns, and is read at dispatch time.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::context::RunContext;
use crate::error::HandlerError;
use crate::workflow::WorkflowStep;

/// The work behind a named step.
///
/// `step` is a snapshot of the run-local record at the start of the
/// attempt (`step.attempts` is the current attempt number). The context
/// is shared with every other step of the same run.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, step: &WorkflowStep, context: &RunContext)
        -> Result<Value, HandlerError>;
}

/// Adapts an async closure into a [`StepHandler`].
///
/// The closure receives owned clones, so the returned future can be
/// `'static` without borrowing from the orchestrator.
pub struct FnHandler<F> {
    f: F,
}

/// Wraps `f` as a handler.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use steprunner::execution::handler_fn;
///
/// let handler = handler_fn(|step, ctx| async move {
///     ctx.insert(step.name.clone(), json!(true));
///     Ok(json!({ "step": step.name }))
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(WorkflowStep, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> StepHandler for FnHandler<F>
where
    F: Fn(WorkflowStep, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn execute(
        &self,
        step: &WorkflowStep,
        context: &RunContext,
    ) -> Result<Value, HandlerError> {
        (self.f)(step.clone(), context.clone()).await
    }
}

/// Name → handler map. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn StepHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn StepHandler>>> {
        self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn StepHandler>>> {
        self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `handler` for `name`, returning the handler it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> Option<Arc<dyn StepHandler>> {
        let name = name.into();
        let previous = self.write().insert(name.clone(), handler);
        if previous.is_some() {
            debug!("Replaced handler for step '{}'", name);
        } else {
            debug!("Registered handler for step '{}'", name);
        }
        previous
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered step names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
