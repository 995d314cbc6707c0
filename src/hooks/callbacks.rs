//! Priority-ordered callback storage shared by actions and filters

use super::context::{ContextStack, Contextualized};
use std::panic::Location;
use std::sync::{PoisonError, RwLock};

#[derive(Clone)]
pub(crate) struct Entry<F> {
    pub callback: F,
    pub priority: i32,
    /// Registration site, used to identify the callback in error lines
    pub origin: String,
    pub context: Contextualized,
}

impl<F> Entry<F> {
    pub fn new(
        callback: F,
        priority: i32,
        contexts: &ContextStack,
        origin: &'static Location<'static>,
    ) -> Self {
        Self {
            callback,
            priority,
            origin: format!("{}:{}", origin.file(), origin.line()),
            context: Contextualized::capture(contexts),
        }
    }
}

pub(crate) struct Callbacks<F> {
    entries: RwLock<Vec<Entry<F>>>,
}

impl<F: Clone> Callbacks<F> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert after every entry of lower or equal priority.
    pub fn insert(&self, entry: Entry<F>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let index = entries.partition_point(|e| e.priority <= entry.priority);
        entries.insert(index, entry);
    }

    /// Clone the matching entries so callbacks may register new hooks while running.
    pub fn snapshot(&self, context: Option<&str>) -> Vec<Entry<F>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.context.is_in_context(context))
            .cloned()
            .collect()
    }

    pub fn clear(&self, context: Option<&str>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|e| !e.context.is_in_context(context));
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
