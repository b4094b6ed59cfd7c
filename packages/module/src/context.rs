//! Accessor contexts: a module's view of the store.
//!
//! A [`Context`] is scoped to one module. It reads the module's state,
//! lists and reads the module's getters, and prefixes commit/dispatch names
//! with the module's namespace. The module's path and namespace are looked
//! up lazily, so a context can be created before its module is compiled and
//! only fails when used too early.

use std::future::{ready, Future};
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smartstore_engine::{GetterValue, HandlerKind, Path, Store, WeakStore};

use crate::blueprint::State;
use crate::module::{ModuleNode, StateType};
use crate::{Error, Result};

/// A deferred result, as returned by dispatches.
pub type Pending<T> = Pin<Box<dyn Future<Output = Result<T>>>>;

pub(crate) fn failed<T: 'static>(error: Error) -> Pending<T> {
    Box::pin(ready(Err::<T, Error>(error)))
}

/// What a context talks to: the live store, or a stand-in for tests.
///
/// Names passed in are already namespaced.
pub(crate) trait Backend {
    fn path(&self) -> Result<Path>;
    fn namespace(&self) -> Result<String>;
    fn state(&self) -> Result<Value>;
    fn getter_names(&self) -> Result<Vec<String>>;
    fn getter(&self, name: &str) -> Result<GetterValue>;
    fn commit(&self, name: &str, payload: Value) -> Result<()>;
    fn dispatch(&self, name: &str, payload: Value) -> Pending<Value>;
    /// Declared member names of the module, if known.
    fn declared(&self, kind: HandlerKind) -> Result<Option<Vec<String>>>;
    fn child(&self, key: &str, requested: StateType) -> Result<Rc<dyn Backend>>;
    fn store(&self) -> Result<Store>;
}

/// Backend for a compiled module in a live store.
pub(crate) struct StoreBackend {
    store: WeakStore,
    node: Rc<ModuleNode>,
}

impl StoreBackend {
    pub fn new(store: &Store, node: Rc<ModuleNode>) -> Self {
        Self {
            store: store.downgrade(),
            node,
        }
    }

    fn registered(&self) -> Result<(Store, Path)> {
        let store = self.store()?;
        let path = self.node.path()?;
        if !store.has_module(&path) {
            return Err(Error::NotRegistered { path });
        }
        Ok((store, path))
    }
}

impl Backend for StoreBackend {
    fn path(&self) -> Result<Path> {
        self.node.path()
    }

    fn namespace(&self) -> Result<String> {
        self.node.namespace()
    }

    fn state(&self) -> Result<Value> {
        let (store, path) = self.registered()?;
        store
            .state_at(&path)
            .ok_or(Error::NotRegistered { path })
    }

    fn getter_names(&self) -> Result<Vec<String>> {
        Ok(self.store()?.getter_names())
    }

    fn getter(&self, name: &str) -> Result<GetterValue> {
        Ok(self.store()?.getter_value(name)?)
    }

    fn commit(&self, name: &str, payload: Value) -> Result<()> {
        let (store, _) = self.registered()?;
        Ok(store.commit(name, payload)?)
    }

    fn dispatch(&self, name: &str, payload: Value) -> Pending<Value> {
        let store = match self.registered() {
            Ok((store, _)) => store,
            Err(e) => return failed(e),
        };
        let pending = store.dispatch(name, payload);
        Box::pin(async move { pending.await.map_err(Error::from) })
    }

    fn declared(&self, kind: HandlerKind) -> Result<Option<Vec<String>>> {
        self.node.declared(kind).map(Some)
    }

    fn child(&self, key: &str, requested: StateType) -> Result<Rc<dyn Backend>> {
        let child = self.node.child(key).ok_or_else(|| Error::UnknownChild {
            key: key.to_string(),
        })?;
        requested.check(key, child.state_type())?;
        Ok(Rc::new(StoreBackend {
            store: self.store.clone(),
            node: child.clone(),
        }))
    }

    fn store(&self) -> Result<Store> {
        self.store.upgrade().ok_or(Error::StoreDropped)
    }
}

/// Options for [`Context::commit_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// Address the mutation by its global name, without the namespace.
    pub root: bool,
}

/// Options for [`Context::dispatch_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    /// Address the action by its global name, without the namespace.
    pub root: bool,
}

/// A module-scoped view of the store.
pub struct Context<S = Value> {
    backend: Rc<dyn Backend>,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            _state: PhantomData,
        }
    }
}

impl<S> std::fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("path", &self.backend.path().ok())
            .field("namespace", &self.backend.namespace().ok())
            .finish()
    }
}

impl<S: State> Context<S> {
    pub(crate) fn new(backend: Rc<dyn Backend>) -> Self {
        Self {
            backend,
            _state: PhantomData,
        }
    }

    fn untyped(&self) -> Context<Value> {
        Context::new(self.backend.clone())
    }

    fn qualify(&self, name: &str) -> Result<String> {
        Ok(format!("{}{}", self.backend.namespace()?, name))
    }

    /// The module's path. Fails before the module is compiled.
    pub fn path(&self) -> Result<Path> {
        self.backend.path()
    }

    /// The module's namespace prefix. Fails before the module is compiled.
    pub fn namespace(&self) -> Result<String> {
        self.backend.namespace()
    }

    /// The module's state.
    ///
    /// Nested module states live in the same object under their keys; they
    /// are ignored unless `S` declares them.
    pub fn state(&self) -> Result<S> {
        Ok(serde_json::from_value(self.backend.state()?)?)
    }

    /// The module's state as a raw value.
    pub fn state_value(&self) -> Result<Value> {
        self.backend.state()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R> {
        let state = self.state()?;
        Ok(f(&state))
    }

    /// The getters under this module's namespace, keyed by local name.
    pub fn getters(&self) -> Result<ScopedGetters> {
        let namespace = self.backend.namespace()?;
        let names = self
            .backend
            .getter_names()?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&namespace).map(str::to_string))
            .collect();
        Ok(ScopedGetters {
            backend: self.backend.clone(),
            namespace,
            names,
        })
    }

    /// Read one of this module's getters.
    pub fn getter<R: DeserializeOwned>(&self, name: &str) -> Result<R> {
        let qualified = self.qualify(name)?;
        let value = self.backend.getter(&qualified)?.into_value(&qualified)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Commit one of this module's mutations. Use `()` for no payload.
    pub fn commit<P: Serialize>(&self, name: &str, payload: P) -> Result<()> {
        self.commit_with(name, payload, CommitOptions::default())
    }

    pub fn commit_with<P: Serialize>(
        &self,
        name: &str,
        payload: P,
        options: CommitOptions,
    ) -> Result<()> {
        let name = if options.root {
            name.to_string()
        } else {
            self.qualify(name)?
        };
        let payload = serde_json::to_value(payload)?;
        tracing::trace!(mutation = %name, "context commit");
        self.backend.commit(&name, payload)
    }

    /// Commit in object form: `{ "type": name, ..payload }`.
    ///
    /// The object itself is the payload, with its `type` namespaced.
    pub fn commit_object(&self, message: Value) -> Result<()> {
        let (name, payload) = self.qualify_message(message)?;
        self.backend.commit(&name, payload)
    }

    /// Dispatch one of this module's actions. Use `()` for no payload.
    pub fn dispatch<P: Serialize>(&self, name: &str, payload: P) -> Pending<Value> {
        self.dispatch_with(name, payload, DispatchOptions::default())
    }

    /// Dispatch and decode the action's result.
    pub fn dispatch_as<P: Serialize, R: DeserializeOwned + 'static>(
        &self,
        name: &str,
        payload: P,
    ) -> Pending<R> {
        let pending = self.dispatch(name, payload);
        Box::pin(async move {
            let value = pending.await?;
            serde_json::from_value(value).map_err(Error::from)
        })
    }

    pub fn dispatch_with<P: Serialize>(
        &self,
        name: &str,
        payload: P,
        options: DispatchOptions,
    ) -> Pending<Value> {
        let name = if options.root {
            name.to_string()
        } else {
            match self.qualify(name) {
                Ok(name) => name,
                Err(e) => return failed(e),
            }
        };
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => return failed(e.into()),
        };
        tracing::trace!(action = %name, "context dispatch");
        self.backend.dispatch(&name, payload)
    }

    /// Dispatch in object form: `{ "type": name, ..payload }`.
    pub fn dispatch_object(&self, message: Value) -> Pending<Value> {
        match self.qualify_message(message) {
            Ok((name, payload)) => self.backend.dispatch(&name, payload),
            Err(e) => failed(e),
        }
    }

    fn qualify_message(&self, message: Value) -> Result<(String, Value)> {
        let Value::Object(mut object) = message else {
            return Err(Error::InvalidMessage {
                reason: "expected an object",
            });
        };
        let Some(Value::String(name)) = object.get("type") else {
            return Err(Error::InvalidMessage {
                reason: "missing string field `type`",
            });
        };
        let qualified = self.qualify(name)?;
        object.insert("type".to_string(), Value::String(qualified.clone()));
        Ok((qualified, Value::Object(object)))
    }

    /// Call-map over this module's declared mutations.
    pub fn mutations(&self) -> Result<MutationMap> {
        Ok(MutationMap {
            names: self.backend.declared(HandlerKind::Mutation)?,
            context: self.untyped(),
        })
    }

    /// Call-map over this module's declared actions.
    pub fn actions(&self) -> Result<ActionMap> {
        Ok(ActionMap {
            names: self.backend.declared(HandlerKind::Action)?,
            context: self.untyped(),
        })
    }

    /// Context of the nested module under `key`.
    ///
    /// `C` must be the nested module's state type, or [`Value`].
    pub fn module<C: State>(&self, key: &str) -> Result<Context<C>> {
        let backend = self.backend.child(key, StateType::of::<C>())?;
        Ok(Context::new(backend))
    }

    /// The live store. Fails once the store is dropped.
    pub fn store(&self) -> Result<Store> {
        self.backend.store()
    }
}

/// Getters of one namespace, keyed by local name.
///
/// Names are taken when the view is created; values are read on access.
pub struct ScopedGetters {
    backend: Rc<dyn Backend>,
    namespace: String,
    names: Vec<String>,
}

impl ScopedGetters {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn raw(&self, name: &str) -> Result<(String, GetterValue)> {
        let qualified = format!("{}{}", self.namespace, name);
        let value = self.backend.getter(&qualified)?;
        Ok((qualified, value))
    }

    pub fn value(&self, name: &str) -> Result<Value> {
        let (qualified, value) = self.raw(name)?;
        Ok(value.into_value(&qualified)?)
    }

    pub fn get<R: DeserializeOwned>(&self, name: &str) -> Result<R> {
        Ok(serde_json::from_value(self.value(name)?)?)
    }

    /// Call a method-style getter.
    pub fn call<A: Serialize, R: DeserializeOwned>(&self, name: &str, arg: A) -> Result<R> {
        let (qualified, value) = self.raw(name)?;
        let result = value.call(&qualified, serde_json::to_value(arg)?)?;
        Ok(serde_json::from_value(result)?)
    }
}

impl std::fmt::Debug for ScopedGetters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedGetters")
            .field("namespace", &self.namespace)
            .field("names", &self.names)
            .finish()
    }
}

fn check_declared(names: &Option<Vec<String>>, kind: HandlerKind, name: &str) -> Result<()> {
    match names {
        Some(names) if !names.iter().any(|n| n == name) => Err(Error::UnknownMember {
            kind,
            name: name.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Commits a module's own mutations by name.
pub struct MutationMap {
    names: Option<Vec<String>>,
    context: Context<Value>,
}

impl MutationMap {
    /// Declared names. Empty when the module's members are unknown, as in
    /// stub contexts, where any name is accepted.
    pub fn names(&self) -> &[String] {
        self.names.as_deref().unwrap_or_default()
    }

    pub fn call<P: Serialize>(&self, name: &str, payload: P) -> Result<()> {
        check_declared(&self.names, HandlerKind::Mutation, name)?;
        self.context.commit(name, payload)
    }
}

/// Dispatches a module's own actions by name.
pub struct ActionMap {
    names: Option<Vec<String>>,
    context: Context<Value>,
}

impl ActionMap {
    /// Declared names. Empty when the module's members are unknown, as in
    /// stub contexts, where any name is accepted.
    pub fn names(&self) -> &[String] {
        self.names.as_deref().unwrap_or_default()
    }

    pub fn call<P: Serialize>(&self, name: &str, payload: P) -> Pending<Value> {
        if let Err(e) = check_declared(&self.names, HandlerKind::Action, name) {
            return failed(e);
        }
        self.context.dispatch(name, payload)
    }
}
