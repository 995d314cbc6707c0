//! Filters: named chains of value-transforming callbacks

use super::callbacks::{Callbacks, Entry};
use super::context::ContextStack;
use super::priorities;
use std::panic::Location;
use std::sync::Arc;
use tracing::error;

pub type FilterCallback<T, A> = Arc<dyn Fn(T, &A) -> anyhow::Result<T> + Send + Sync>;

/// Registry of callbacks composed as a chain: each callback receives the
/// previous callback's return value
pub struct Filter<T, A: ?Sized = ()> {
    name: String,
    contexts: Arc<ContextStack>,
    callbacks: Callbacks<FilterCallback<T, A>>,
}

impl<T, A: ?Sized> Filter<T, A> {
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
        F: Fn(T, &A) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.add_with_priority(priorities::DEFAULT, callback);
    }

    #[track_caller]
    pub fn add_with_priority<F>(&self, priority: i32, callback: F)
    where
        F: Fn(T, &A) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let callback: FilterCallback<T, A> = Arc::new(callback);
        self.callbacks.insert(Entry::new(
            callback,
            priority,
            &self.contexts,
            Location::caller(),
        ));
    }

    /// Feed `value` through the callback chain
    pub fn apply(&self, value: T, args: &A) -> anyhow::Result<T> {
        self.apply_from_context(None, value, args)
    }

    /// Same as [`Filter::apply`], restricted to callbacks registered in `context`
    pub fn apply_from_context(&self, context: Option<&str>, value: T, args: &A) -> anyhow::Result<T> {
        let mut value = value;
        for entry in self.callbacks.snapshot(context) {
            value = match (entry.callback)(value, args) {
                Ok(value) => value,
                Err(err) => {
                    error!(
                        filter = %self.name,
                        callback = %entry.origin,
                        "Error applying filter: {:#}",
                        err
                    );
                    return Err(err);
                }
            };
        }
        Ok(value)
    }

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

impl<E, A: ?Sized + 'static> Filter<Vec<E>, A>
where
    E: Clone + Send + Sync + 'static,
{
    #[track_caller]
    pub fn add_item(&self, item: E) {
        self.add_item_with_priority(priorities::DEFAULT, item);
    }

    #[track_caller]
    pub fn add_item_with_priority(&self, priority: i32, item: E) {
        self.add_with_priority(priority, move |mut items: Vec<E>, _: &A| {
            items.push(item.clone());
            Ok(items)
        });
    }

    #[track_caller]
    pub fn add_items(&self, items: Vec<E>) {
        self.add_items_with_priority(priorities::DEFAULT, items);
    }

    #[track_caller]
    pub fn add_items_with_priority(&self, priority: i32, items: Vec<E>) {
        self.add_with_priority(priority, move |mut current: Vec<E>, _: &A| {
            current.extend(items.iter().cloned());
            Ok(current)
        });
    }

    /// All items contributed to the list, in callback order
    pub fn iterate(&self, args: &A) -> anyhow::Result<Vec<E>> {
        self.apply(Vec::new(), args)
    }

    pub fn iterate_from_context(&self, context: Option<&str>, args: &A) -> anyhow::Result<Vec<E>> {
        self.apply_from_context(context, Vec::new(), args)
    }
}
