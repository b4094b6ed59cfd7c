//! Blueprint instances without a store, for unit-testing member logic.
//!
//! A [`Stub`] stands in for the store: it holds the module state, fixed
//! getter values and closures that receive commits and dispatches. Anything
//! the stub was not given fails with [`Error::NotProvided`] when used.
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use smartstore::{inject, Injected, MutationContext, MutationMembers, Mutations, Result, Stub};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Counter {
//!     value: i64,
//! }
//!
//! #[derive(Default)]
//! struct CounterMutations;
//!
//! impl CounterMutations {
//!     fn inc(&self, cx: &mut MutationContext<'_, Counter>, n: i64) -> Result<()> {
//!         cx.state.value += n;
//!         Ok(())
//!     }
//! }
//!
//! impl Mutations for CounterMutations {
//!     type State = Counter;
//!
//!     fn define(members: &mut MutationMembers<Self>) {
//!         members.mutation("inc", Self::inc);
//!     }
//! }
//!
//! let mutations: Injected<CounterMutations> =
//!     inject(Stub::new().state(Counter { value: 1 })?)?;
//! mutations.apply("inc", 2)?;
//! assert_eq!(mutations.state_as::<Counter>()?.value, 3);
//! # Ok::<(), smartstore::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::ready;
use std::ops::Deref;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smartstore_engine::{Diagnostics, GetterValue, HandlerKind, Path, Store};

use crate::actions::{boxed, ActionContext, ActionLive, ActionMembers, ActionResult};
use crate::blueprint::{Actions, Getters, Live, Mutations};
use crate::context::{failed, Backend, Context, Pending};
use crate::getters::{GetterContext, GetterLive, GetterMembers, LocalGetters};
use crate::module::StateType;
use crate::mutations::{MutationLive, MutationMembers};
use crate::{Error, Result};

type CommitFn = Rc<dyn Fn(&str, Value) -> Result<()>>;
type DispatchFn = Rc<dyn Fn(&str, Value) -> Result<Value>>;

/// Stand-ins for the store members a blueprint instance uses.
pub struct Stub {
    state: Option<Value>,
    getters: BTreeMap<String, Value>,
    commit: Option<CommitFn>,
    dispatch: Option<DispatchFn>,
    children: BTreeMap<String, Stub>,
    diagnostics: Diagnostics,
}

impl Stub {
    /// An empty stub with diagnostics off.
    pub fn new() -> Self {
        Self {
            state: None,
            getters: BTreeMap::new(),
            commit: None,
            dispatch: None,
            children: BTreeMap::new(),
            diagnostics: Diagnostics::off(),
        }
    }

    pub fn state(mut self, state: impl Serialize) -> Result<Self> {
        self.state = Some(serde_json::to_value(state)?);
        Ok(self)
    }

    /// A fixed getter value, by local name.
    pub fn getter(mut self, name: &str, value: Value) -> Self {
        self.getters.insert(name.to_string(), value);
        self
    }

    /// Receives every commit as `(name, payload)`.
    pub fn commit(mut self, f: impl Fn(&str, Value) -> Result<()> + 'static) -> Self {
        self.commit = Some(Rc::new(f));
        self
    }

    /// Receives every dispatch as `(name, payload)`.
    pub fn dispatch(mut self, f: impl Fn(&str, Value) -> Result<Value> + 'static) -> Self {
        self.dispatch = Some(Rc::new(f));
        self
    }

    /// Stand-in for the nested module under `key`.
    pub fn module(mut self, key: &str, stub: Stub) -> Self {
        self.children.insert(key.to_string(), stub);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    fn into_backend(
        self,
        mutations: Option<Vec<String>>,
        actions: Option<Vec<String>>,
    ) -> Rc<StubBackend> {
        Rc::new(StubBackend {
            state: RefCell::new(self.state),
            getters: self.getters,
            commit: self.commit,
            dispatch: self.dispatch,
            children: self
                .children
                .into_iter()
                .map(|(key, stub)| (key, stub.into_backend(None, None)))
                .collect(),
            mutations,
            actions,
        })
    }
}

impl Default for Stub {
    fn default() -> Self {
        Self::new()
    }
}

struct StubBackend {
    state: RefCell<Option<Value>>,
    getters: BTreeMap<String, Value>,
    commit: Option<CommitFn>,
    dispatch: Option<DispatchFn>,
    children: BTreeMap<String, Rc<StubBackend>>,
    mutations: Option<Vec<String>>,
    actions: Option<Vec<String>>,
}

fn not_provided(member: impl Into<String>) -> Error {
    Error::NotProvided {
        member: member.into(),
    }
}

impl Backend for StubBackend {
    fn path(&self) -> Result<Path> {
        Ok(Path::root())
    }

    fn namespace(&self) -> Result<String> {
        Ok(String::new())
    }

    fn state(&self) -> Result<Value> {
        self.state
            .borrow()
            .clone()
            .ok_or_else(|| not_provided("state"))
    }

    fn getter_names(&self) -> Result<Vec<String>> {
        Ok(self.getters.keys().cloned().collect())
    }

    fn getter(&self, name: &str) -> Result<GetterValue> {
        self.getters
            .get(name)
            .cloned()
            .map(GetterValue::Value)
            .ok_or_else(|| not_provided(format!("getter '{}'", name)))
    }

    fn commit(&self, name: &str, payload: Value) -> Result<()> {
        match &self.commit {
            Some(commit) => commit(name, payload),
            None => Err(not_provided("commit")),
        }
    }

    fn dispatch(&self, name: &str, payload: Value) -> Pending<Value> {
        match &self.dispatch {
            Some(dispatch) => Box::pin(ready(dispatch(name, payload))),
            None => failed(not_provided("dispatch")),
        }
    }

    fn declared(&self, kind: HandlerKind) -> Result<Option<Vec<String>>> {
        Ok(match kind {
            HandlerKind::Mutation => self.mutations.clone(),
            HandlerKind::Action => self.actions.clone(),
            HandlerKind::Getter => None,
        })
    }

    fn child(&self, key: &str, _requested: StateType) -> Result<Rc<dyn Backend>> {
        let child = self.children.get(key).ok_or_else(|| Error::UnknownChild {
            key: key.to_string(),
        })?;
        Ok(child.clone())
    }

    fn store(&self) -> Result<Store> {
        Err(not_provided("store"))
    }
}

/// Marker types selecting the blueprint kind in [`inject`].
pub mod kind {
    pub enum Getters {}
    pub enum Mutations {}
    pub enum Actions {}
}

/// Blueprints [`inject`] can bind to a [`Stub`]. Implemented for every
/// [`Getters`], [`Mutations`] and [`Actions`] type.
pub trait Injectable<K>: Sized + 'static {
    #[doc(hidden)]
    fn bind(instance: Self, stub: Stub) -> Result<Injected<Self>>;
}

impl<T: Getters> Injectable<kind::Getters> for T {
    fn bind(instance: T, stub: Stub) -> Result<Injected<T>> {
        let members = Rc::new(GetterMembers::<T>::collect()?);
        let diagnostics = stub.diagnostics.clone();
        let backend = stub.into_backend(None, None);
        let live = GetterLive::bind(instance, members, Context::new(backend.clone()), &diagnostics);
        Ok(Injected {
            live,
            stub: backend,
        })
    }
}

impl<T: Mutations> Injectable<kind::Mutations> for T {
    fn bind(instance: T, stub: Stub) -> Result<Injected<T>> {
        let members = Rc::new(MutationMembers::<T>::collect()?);
        let names = members.keys().cloned().collect();
        let diagnostics = stub.diagnostics.clone();
        let backend = stub.into_backend(Some(names), None);
        let live = MutationLive::bind(instance, members, &diagnostics);
        Ok(Injected {
            live,
            stub: backend,
        })
    }
}

impl<T: Actions> Injectable<kind::Actions> for T {
    fn bind(instance: T, stub: Stub) -> Result<Injected<T>> {
        let members = Rc::new(ActionMembers::<T>::collect()?);
        let names = members.keys().cloned().collect();
        let diagnostics = stub.diagnostics.clone();
        let backend = stub.into_backend(None, Some(names));
        let live = ActionLive::bind(instance, members, Context::new(backend.clone()), &diagnostics);
        Ok(Injected {
            live,
            stub: backend,
        })
    }
}

/// Build a default `T` bound to `stub`.
///
/// `init` is not called, since there is no store.
pub fn inject<T, K>(stub: Stub) -> Result<Injected<T>>
where
    T: Injectable<K> + Default,
{
    T::bind(T::default(), stub)
}

/// Bind an existing instance to `stub`.
pub fn inject_with<T, K>(instance: T, stub: Stub) -> Result<Injected<T>>
where
    T: Injectable<K>,
{
    T::bind(instance, stub)
}

/// An instance bound to a [`Stub`]. Dereferences to the instance.
pub struct Injected<T> {
    live: Rc<dyn Live<T>>,
    stub: Rc<StubBackend>,
}

impl<T> Deref for Injected<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.live.instance()
    }
}

impl<T: 'static> Injected<T> {
    fn live<L: 'static>(&self) -> Result<&L> {
        self.live
            .as_any()
            .downcast_ref::<L>()
            .ok_or(Error::NotInjected)
    }

    /// The stub state, as it stands now.
    pub fn state_value(&self) -> Result<Value> {
        self.stub.state()
    }

    pub fn state_as<S: DeserializeOwned>(&self) -> Result<S> {
        Ok(serde_json::from_value(self.stub.state()?)?)
    }
}

impl<T: Getters> Injected<T> {
    pub fn getter_context(&self) -> Result<&GetterContext<T::State>> {
        Ok(self.live::<GetterLive<T>>()?.context())
    }

    /// Evaluate a computed getter member.
    pub fn get<R: DeserializeOwned>(&self, name: &str) -> Result<R> {
        let value = self.live::<GetterLive<T>>()?.value(name)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Call a method-style getter member.
    pub fn call<A: Serialize, R: DeserializeOwned>(&self, name: &str, arg: A) -> Result<R> {
        let live = self.live::<GetterLive<T>>()?;
        let result = live.call(name, serde_json::to_value(arg)?)?;
        Ok(serde_json::from_value(result)?)
    }
}

impl<T: Mutations> Injected<T> {
    /// Run a mutation member against the stub state.
    pub fn apply<P: Serialize>(&self, name: &str, payload: P) -> Result<()> {
        let live = self.live::<MutationLive<T>>()?;
        let mut state = self.stub.state()?;
        live.apply(name, &mut state, serde_json::to_value(payload)?)?;
        *self.stub.state.borrow_mut() = Some(state);
        Ok(())
    }
}

impl<T: Actions> Injected<T> {
    pub fn context(&self) -> Result<&ActionContext<T::State>> {
        Ok(self.live::<ActionLive<T>>()?.context())
    }

    /// Run an action member.
    pub fn run<P: Serialize>(&self, name: &str, payload: P) -> ActionResult<'_, Value> {
        let live = match self.live::<ActionLive<T>>() {
            Ok(live) => live,
            Err(e) => return boxed(ready(Err(e))),
        };
        match serde_json::to_value(payload) {
            Ok(payload) => live.run(name, payload),
            Err(e) => boxed(ready(Err(e.into()))),
        }
    }
}
