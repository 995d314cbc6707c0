//! Actions: named fan-out of side-effecting callbacks

use super::callbacks::{Callbacks, Entry};
use super::context::ContextStack;
use super::priorities;
use std::panic::Location;
use std::sync::Arc;
use tracing::error;

pub type ActionCallback<A> = Arc<dyn Fn(&A) -> anyhow::Result<()> + Send + Sync>;

/// Registry of callbacks invoked in priority order; return values are discarded
pub struct Action<A: ?Sized = ()> {
    name: String,
    contexts: Arc<ContextStack>,
    callbacks: Callbacks<ActionCallback<A>>,
}

impl<A: ?Sized> Action<A> {
    pub(crate) fn new(name: impl Into<String>, contexts: Arc<ContextStack>) -> Self {
        Self {
            name: name.into(),
            contexts,
            callbacks: Callbacks::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[track_caller]
    pub fn add<F>(&self, callback: F)
    where
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_with_priority(priorities::DEFAULT, callback);
    }

    #[track_caller]
    pub fn add_with_priority<F>(&self, priority: i32, callback: F)
    where
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: ActionCallback<A> = Arc::new(callback);
        self.callbacks.insert(Entry::new(
            callback,
            priority,
            &self.contexts,
            Location::caller(),
        ));
    }

    /// Invoke every callback. The first failure is logged, stops the
    /// remaining callbacks and is returned as-is.
    pub fn run(&self, args: &A) -> anyhow::Result<()> {
        self.run_from_context(None, args)
    }

    /// Same as [`Action::run`], restricted to callbacks registered in `context`
    pub fn run_from_context(&self, context: Option<&str>, args: &A) -> anyhow::Result<()> {
        for entry in self.callbacks.snapshot(context) {
            if let Err(err) = (entry.callback)(args) {
                error!(
                    action = %self.name,
                    callback = %entry.origin,
                    "Error applying action: {:#}",
                    err
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// Remove callbacks registered in `context`, or all of them when `None`
    pub fn clear(&self, context: Option<&str>) {
        self.callbacks.clear(context);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
