//! The store handle: global state, commit/dispatch routing and dynamic
//! module registration.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::definition::{ActionFuture, GetterValue, ModuleDefinition};
use crate::diagnostics::Diagnostics;
use crate::registry::Registry;
use crate::{tree, Error, Path};

/// Runs once against the freshly constructed store.
pub type Plugin = Box<dyn FnOnce(&Store) -> Result<(), Error>>;

/// Options for [`Store::new`].
#[derive(Default)]
pub struct StoreOptions {
    /// Plugins, run in order right after construction.
    pub plugins: Vec<Plugin>,
    pub diagnostics: Diagnostics,
}

impl StoreOptions {
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl FnOnce(&Store) -> Result<(), Error> + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("plugins", &self.plugins.len())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

/// Options for [`Store::register_module`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOptions {
    /// Keep whatever state already lives at the module path instead of
    /// installing the module's initial state.
    pub preserve_state: bool,
}

/// A committed mutation, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRecord {
    #[serde(rename = "type")]
    pub name: String,
    pub payload: Value,
}

/// A dispatched action, as seen by action subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type MutationSubscriber = Rc<dyn Fn(&MutationRecord, &Store)>;
type ActionSubscriber = Rc<dyn Fn(&ActionRecord, &Store)>;

struct StoreInner {
    state: RefCell<Value>,
    registry: RefCell<Registry>,
    subscribers: RefCell<Vec<(SubscriptionId, MutationSubscriber)>>,
    action_subscribers: RefCell<Vec<(SubscriptionId, ActionSubscriber)>>,
    next_subscription: Cell<u64>,
    diagnostics: Diagnostics,
}

/// A single-threaded store handle. Cloning shares the store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// A non-owning store handle.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Store {
    /// Build the store from a root definition and run its plugins.
    pub fn new(root: ModuleDefinition, options: StoreOptions) -> Result<Store, Error> {
        let registry = Registry::new(&root)?;
        let state = root.build_state()?;

        let store = Store {
            inner: Rc::new(StoreInner {
                state: RefCell::new(state),
                registry: RefCell::new(registry),
                subscribers: RefCell::new(Vec::new()),
                action_subscribers: RefCell::new(Vec::new()),
                next_subscription: Cell::new(0),
                diagnostics: options.diagnostics,
            }),
        };
        tracing::debug!(
            plugins = options.plugins.len(),
            diagnostics = store.inner.diagnostics.is_enabled(),
            "store constructed"
        );

        for plugin in options.plugins {
            plugin(&store)?;
        }
        Ok(store)
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    // ----- State -----

    /// A snapshot of the whole state tree.
    pub fn state(&self) -> Value {
        self.inner.state.borrow().clone()
    }

    /// Borrow the state tree for the duration of `f`.
    ///
    /// Committing from inside `f` fails with [`Error::Reentrant`].
    pub fn with_state<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    /// A snapshot of the state sub-tree at `path`.
    pub fn state_at(&self, path: &Path) -> Option<Value> {
        tree::get(&self.inner.state.borrow(), path).cloned()
    }

    /// Replace the whole state tree.
    pub fn replace_state(&self, state: Value) -> Result<(), Error> {
        let mut current = self
            .inner
            .state
            .try_borrow_mut()
            .map_err(|_| Error::Reentrant)?;
        *current = state;
        Ok(())
    }

    // ----- Getters -----

    pub fn getter_value(&self, name: &str) -> Result<GetterValue, Error> {
        let handler = self.inner.registry.borrow().getter(name);
        let handler = handler.ok_or_else(|| Error::UnknownGetter {
            name: name.to_string(),
        })?;
        handler()
    }

    /// Evaluate a computed getter.
    pub fn getter(&self, name: &str) -> Result<Value, Error> {
        self.getter_value(name)?.into_value(name)
    }

    /// Call a method-style getter with one argument.
    pub fn call_getter(&self, name: &str, arg: Value) -> Result<Value, Error> {
        self.getter_value(name)?.call(name, arg)
    }

    /// All flattened getter names, sorted.
    pub fn getter_names(&self) -> Vec<String> {
        self.inner.registry.borrow().getter_names()
    }

    pub fn has_mutation(&self, name: &str) -> bool {
        self.inner.registry.borrow().has_mutation(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.inner.registry.borrow().has_action(name)
    }

    // ----- Commit / dispatch -----

    /// Run the mutation registered under `name` against its module's state.
    pub fn commit(&self, name: &str, payload: Value) -> Result<(), Error> {
        let (entry, children) = {
            let registry = self.inner.registry.borrow();
            let entry = registry.mutation(name).ok_or_else(|| Error::UnknownMutation {
                name: name.to_string(),
            })?;
            let children = registry.child_keys(&entry.path);
            (entry, children)
        };
        tracing::trace!(mutation = name, module = %entry.path, "commit");

        let record = MutationRecord {
            name: name.to_string(),
            payload,
        };
        {
            let mut state = self
                .inner
                .state
                .try_borrow_mut()
                .map_err(|_| Error::Reentrant)?;
            let local = tree::get_mut(&mut state, &entry.path).ok_or_else(|| {
                Error::StateNotFound {
                    path: entry.path.clone(),
                }
            })?;
            // Nested module states are not part of the module's own state.
            let detached: Vec<(String, Value)> = match local.as_object_mut() {
                Some(object) => children
                    .iter()
                    .filter_map(|key| object.remove(key).map(|v| (key.clone(), v)))
                    .collect(),
                None => Vec::new(),
            };
            let snapshot = local.clone();
            let result = (entry.handler)(local, record.payload.clone()).and_then(|()| {
                if detached.is_empty() || local.is_object() {
                    Ok(())
                } else {
                    Err(Error::StateNotObject {
                        path: entry.path.clone(),
                    })
                }
            });
            // A failed mutation leaves the module state as it was.
            if result.is_err() {
                *local = snapshot;
            }
            if let Some(object) = local.as_object_mut() {
                object.extend(detached);
            }
            result?;
        }

        let subscribers: Vec<_> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&record, self);
        }
        Ok(())
    }

    /// Run the action registered under `name`.
    ///
    /// Action subscribers are notified before the action starts.
    pub fn dispatch(&self, name: &str, payload: Value) -> ActionFuture {
        let handler = self.inner.registry.borrow().action(name);
        let Some(handler) = handler else {
            let err = Error::UnknownAction {
                name: name.to_string(),
            };
            return Box::pin(async move { Err(err) });
        };
        tracing::trace!(action = name, "dispatch");

        let record = ActionRecord {
            name: name.to_string(),
            payload,
        };
        let subscribers: Vec<_> = self
            .inner
            .action_subscribers
            .borrow()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&record, self);
        }
        handler(record.payload)
    }

    // ----- Subscriptions -----

    fn next_subscription(&self) -> SubscriptionId {
        let id = self.inner.next_subscription.get();
        self.inner.next_subscription.set(id + 1);
        SubscriptionId(id)
    }

    /// Call `f` after every successful commit.
    pub fn subscribe(&self, f: impl Fn(&MutationRecord, &Store) + 'static) -> SubscriptionId {
        let id = self.next_subscription();
        self.inner.subscribers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    /// Call `f` before every dispatched action runs.
    pub fn subscribe_action(&self, f: impl Fn(&ActionRecord, &Store) + 'static) -> SubscriptionId {
        let id = self.next_subscription();
        self.inner.action_subscribers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.inner.subscribers.borrow_mut().retain(|(sid, _)| {
            let keep = *sid != id;
            removed |= !keep;
            keep
        });
        self.inner.action_subscribers.borrow_mut().retain(|(sid, _)| {
            let keep = *sid != id;
            removed |= !keep;
            keep
        });
        removed
    }

    // ----- Modules -----

    pub fn has_module(&self, path: &Path) -> bool {
        self.inner.registry.borrow().contains(path)
    }

    /// The flattened-name prefix of the module at `path`.
    pub fn namespace_of(&self, path: &Path) -> Option<String> {
        self.inner
            .registry
            .borrow()
            .namespace_of(path)
            .map(str::to_string)
    }

    /// Attach a module subtree below an existing module.
    ///
    /// `namespace` is the already-resolved prefix of the module itself;
    /// nested modules derive theirs from it.
    pub fn register_module(
        &self,
        path: &Path,
        namespace: &str,
        definition: &ModuleDefinition,
        options: RegisterOptions,
    ) -> Result<(), Error> {
        let initial = if options.preserve_state {
            None
        } else {
            Some(definition.build_state_at(path)?)
        };

        let mut state = self
            .inner
            .state
            .try_borrow_mut()
            .map_err(|_| Error::Reentrant)?;
        let mut registry = self.inner.registry.borrow_mut();
        registry.register(path, namespace.to_string(), definition)?;

        if let Some(initial) = initial {
            if let Err(e) = tree::insert(&mut state, path, initial) {
                registry.unregister(path)?;
                return Err(e);
            }
        }
        tracing::debug!(module = %path, namespace, preserve_state = options.preserve_state, "module registered");
        Ok(())
    }

    /// Detach the module subtree at `path` and drop its state.
    pub fn unregister_module(&self, path: &Path) -> Result<(), Error> {
        let mut state = self
            .inner
            .state
            .try_borrow_mut()
            .map_err(|_| Error::Reentrant)?;
        self.inner.registry.borrow_mut().unregister(path)?;
        tree::remove(&mut state, path);
        tracing::debug!(module = %path, "module unregistered");
        Ok(())
    }

    /// Swap in new handlers for every module in `definition`, keeping state.
    ///
    /// Modules new to the store are added; their state is created only if
    /// nothing already lives at their path.
    pub fn hot_update(&self, definition: ModuleDefinition) -> Result<(), Error> {
        let mut state = self
            .inner
            .state
            .try_borrow_mut()
            .map_err(|_| Error::Reentrant)?;
        let update = self.inner.registry.borrow().prepare_hot_update(&definition)?;

        let mut next = state.clone();
        for (path, module) in update.added() {
            if tree::get(&next, path).is_some() {
                continue;
            }
            let initial = module.build_state_at(path)?;
            tree::insert(&mut next, path, initial)?;
        }
        let added = update.added().len();
        self.inner.registry.borrow_mut().apply(update);
        *state = next;
        tracing::debug!(added, "hot update applied");
        Ok(())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("getters", &self.getter_names())
            .field("diagnostics", &self.inner.diagnostics)
            .finish()
    }
}
