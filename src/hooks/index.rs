//! Named hook index and hook templates
//!
//! Every action, filter and template created through the index is recorded by
//! name so that [`HookIndex::clear_all`] can revoke the contributions of one
//! context across all of them.

use super::actions::Action;
use super::context::ContextStack;
use super::filters::Filter;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

pub(crate) trait ClearableHook: Send + Sync {
    fn hook_name(&self) -> &str;
    fn clear_hook(&self, context: Option<&str>);
}

impl<A: ?Sized + 'static> ClearableHook for Action<A> {
    fn hook_name(&self) -> &str {
        self.name()
    }

    fn clear_hook(&self, context: Option<&str>) {
        self.clear(context);
    }
}

impl<T: 'static, A: ?Sized + 'static> ClearableHook for Filter<T, A> {
    fn hook_name(&self) -> &str {
        self.name()
    }

    fn clear_hook(&self, context: Option<&str>) {
        self.clear(context);
    }
}

/// Factory of filters keyed on a name pattern such as `env:patches:{0}`
pub struct FilterTemplate<T, A: ?Sized = ()> {
    pattern: String,
    contexts: Arc<ContextStack>,
    instances: RwLock<BTreeMap<String, Arc<Filter<T, A>>>>,
}

impl<T, A: ?Sized> FilterTemplate<T, A> {
    fn new(pattern: impl Into<String>, contexts: Arc<ContextStack>) -> Self {
        Self {
            pattern: pattern.into(),
            contexts,
            instances: RwLock::new(BTreeMap::new()),
        }
    }

    /// Concrete filter for `arg`, created on first use
    pub fn get(&self, arg: &str) -> Arc<Filter<T, A>> {
        let name = self.pattern.replace("{0}", arg);
        if let Some(filter) = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            return Arc::clone(filter);
        }
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            instances
                .entry(name.clone())
                .or_insert_with(|| Arc::new(Filter::new(name, Arc::clone(&self.contexts)))),
        )
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Names of the filters instantiated so far
    pub fn instance_names(&self) -> Vec<String> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn clear(&self, context: Option<&str>) {
        for filter in self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            filter.clear(context);
        }
    }
}

/// Factory of actions keyed on a name pattern such as `plugins:loaded:{0}`
pub struct ActionTemplate<A: ?Sized = ()> {
    pattern: String,
    contexts: Arc<ContextStack>,
    instances: RwLock<BTreeMap<String, Arc<Action<A>>>>,
}

impl<A: ?Sized> ActionTemplate<A> {
    fn new(pattern: impl Into<String>, contexts: Arc<ContextStack>) -> Self {
        Self {
            pattern: pattern.into(),
            contexts,
            instances: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, arg: &str) -> Arc<Action<A>> {
        let name = self.pattern.replace("{0}", arg);
        if let Some(action) = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            return Arc::clone(action);
        }
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            instances
                .entry(name.clone())
                .or_insert_with(|| Arc::new(Action::new(name, Arc::clone(&self.contexts)))),
        )
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn clear(&self, context: Option<&str>) {
        for action in self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            action.clear(context);
        }
    }
}

impl<T: 'static, A: ?Sized + 'static> ClearableHook for FilterTemplate<T, A> {
    fn hook_name(&self) -> &str {
        self.pattern()
    }

    fn clear_hook(&self, context: Option<&str>) {
        self.clear(context);
    }
}

impl<A: ?Sized + 'static> ClearableHook for ActionTemplate<A> {
    fn hook_name(&self) -> &str {
        self.pattern()
    }

    fn clear_hook(&self, context: Option<&str>) {
        self.clear(context);
    }
}

/// Owner of the context stack and of every named hook
pub struct HookIndex {
    contexts: Arc<ContextStack>,
    hooks: RwLock<Vec<Arc<dyn ClearableHook>>>,
}

impl HookIndex {
    pub fn new(contexts: Arc<ContextStack>) -> Self {
        Self {
            contexts,
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn contexts(&self) -> &Arc<ContextStack> {
        &self.contexts
    }

    pub fn action<A: ?Sized + 'static>(&self, name: &str) -> Arc<Action<A>> {
        let action = Arc::new(Action::new(name, Arc::clone(&self.contexts)));
        self.register(Arc::clone(&action) as Arc<dyn ClearableHook>);
        action
    }

    pub fn filter<T: 'static, A: ?Sized + 'static>(&self, name: &str) -> Arc<Filter<T, A>> {
        let filter = Arc::new(Filter::new(name, Arc::clone(&self.contexts)));
        self.register(Arc::clone(&filter) as Arc<dyn ClearableHook>);
        filter
    }

    pub fn action_template<A: ?Sized + 'static>(&self, pattern: &str) -> Arc<ActionTemplate<A>> {
        let template = Arc::new(ActionTemplate::new(pattern, Arc::clone(&self.contexts)));
        self.register(Arc::clone(&template) as Arc<dyn ClearableHook>);
        template
    }

    pub fn filter_template<T: 'static, A: ?Sized + 'static>(
        &self,
        pattern: &str,
    ) -> Arc<FilterTemplate<T, A>> {
        let template = Arc::new(FilterTemplate::new(pattern, Arc::clone(&self.contexts)));
        self.register(Arc::clone(&template) as Arc<dyn ClearableHook>);
        template
    }

    /// Names of every registered hook, in creation order
    pub fn names(&self) -> Vec<String> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|hook| hook.hook_name().to_string())
            .collect()
    }

    /// Remove the callbacks registered in `context` from every hook
    pub fn clear_all(&self, context: Option<&str>) {
        for hook in self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            hook.clear_hook(context);
        }
    }

    fn register(&self, hook: Arc<dyn ClearableHook>) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }
}
