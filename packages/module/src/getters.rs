//! Getter members, their context and the getter compiler.

use std::any::Any;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smartstore_engine::{
    Diagnostics, Error as EngineError, GetterHandler, GetterValue, HandlerKind, ModuleDefinition,
    Path, Store,
};

use crate::blueprint::{resolve, Blueprint, Candidate, Getters, Injection, Live, Slot, State};
use crate::context::{Context, ScopedGetters, StoreBackend};
use crate::guard::Guard;
use crate::module::ModuleNode;
use crate::{Error, Result};

type ValueFn<T> = dyn Fn(&T, &GetterContext<<T as Getters>::State>) -> Result<Value>;
type MethodFn<T> = dyn Fn(&T, &GetterContext<<T as Getters>::State>, Value) -> Result<Value>;

pub(crate) enum GetterMember<T: Getters> {
    Value(Rc<ValueFn<T>>),
    Method(Rc<MethodFn<T>>),
}

impl<T: Getters> Clone for GetterMember<T> {
    fn clone(&self) -> Self {
        match self {
            GetterMember::Value(f) => GetterMember::Value(f.clone()),
            GetterMember::Method(f) => GetterMember::Method(f.clone()),
        }
    }
}

impl<P: Getters> GetterMember<P> {
    fn project<T>(self, project: fn(&T) -> &P) -> GetterMember<T>
    where
        T: Getters<State = P::State>,
    {
        match self {
            GetterMember::Value(f) => GetterMember::Value(Rc::new(
                move |instance: &T, cx: &GetterContext<T::State>| f(project(instance), cx),
            )),
            GetterMember::Method(f) => GetterMember::Method(Rc::new(
                move |instance: &T, cx: &GetterContext<T::State>, arg: Value| {
                    f(project(instance), cx, arg)
                },
            )),
        }
    }
}

/// Member table of a [`Getters`] blueprint.
pub struct GetterMembers<T: Getters> {
    depth: usize,
    candidates: Vec<Candidate<GetterMember<T>>>,
}

impl<T: Getters> GetterMembers<T> {
    fn at_depth(depth: usize) -> Self {
        Self {
            depth,
            candidates: Vec::new(),
        }
    }

    pub(crate) fn collect() -> Result<BTreeMap<String, GetterMember<T>>> {
        let mut members = Self::at_depth(0);
        T::define(&mut members);
        resolve(HandlerKind::Getter, members.candidates)
    }

    fn push(&mut self, name: &str, member: GetterMember<T>) {
        self.candidates.push(Candidate {
            name: name.to_string(),
            depth: self.depth,
            member,
        });
    }

    /// Declare a computed getter.
    pub fn getter<R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        R: Serialize,
        F: Fn(&T, &GetterContext<T::State>) -> Result<R> + 'static,
    {
        let member = GetterMember::Value(Rc::new(
            move |instance: &T, cx: &GetterContext<T::State>| {
                Ok(serde_json::to_value(f(instance, cx)?)?)
            },
        ));
        self.push(name, member);
        self
    }

    /// Declare a method-style getter, called with one argument.
    pub fn method<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&T, &GetterContext<T::State>, A) -> Result<R> + 'static,
    {
        let member = GetterMember::Method(Rc::new(
            move |instance: &T, cx: &GetterContext<T::State>, arg: Value| {
                let arg = serde_json::from_value(arg)?;
                Ok(serde_json::to_value(f(instance, cx, arg)?)?)
            },
        ));
        self.push(name, member);
        self
    }

    /// Inherit the members of `P`, reached through `project`.
    pub fn extend<P>(&mut self, project: fn(&T) -> &P) -> &mut Self
    where
        P: Getters<State = T::State>,
    {
        let mut parent = GetterMembers::<P>::at_depth(self.depth + 1);
        P::define(&mut parent);
        for candidate in parent.candidates {
            self.candidates.push(Candidate {
                name: candidate.name,
                depth: candidate.depth,
                member: candidate.member.project(project),
            });
        }
        self
    }
}

/// Direct access to members of the same instance.
pub(crate) trait LocalGetters {
    fn value(&self, name: &str) -> Result<Value>;
    fn call(&self, name: &str, arg: Value) -> Result<Value>;
}

/// What a getter member sees: its module's state and getters.
pub struct GetterContext<S = Value> {
    context: Context<S>,
    local: Weak<dyn LocalGetters>,
}

impl<S: State> GetterContext<S> {
    pub fn state(&self) -> Result<S> {
        self.context.state()
    }

    pub fn state_value(&self) -> Result<Value> {
        self.context.state_value()
    }

    /// This module's getters, read through the store.
    pub fn getters(&self) -> Result<ScopedGetters> {
        self.context.getters()
    }

    pub fn getter<R: DeserializeOwned>(&self, name: &str) -> Result<R> {
        self.context.getter(name)
    }

    pub fn path(&self) -> Result<Path> {
        self.context.path()
    }

    pub fn namespace(&self) -> Result<String> {
        self.context.namespace()
    }

    pub fn store(&self) -> Result<Store> {
        self.context.store()
    }

    /// Evaluate a sibling member on this instance directly, bypassing the
    /// store. Reported as a diagnostic when called from another member.
    pub fn local<R: DeserializeOwned>(&self, name: &str) -> Result<R> {
        let local = self.local.upgrade().ok_or(Error::NotInjected)?;
        Ok(serde_json::from_value(local.value(name)?)?)
    }

    /// Like [`GetterContext::local`], for method-style members.
    pub fn local_call<A: Serialize, R: DeserializeOwned>(&self, name: &str, arg: A) -> Result<R> {
        let local = self.local.upgrade().ok_or(Error::NotInjected)?;
        let result = local.call(name, serde_json::to_value(arg)?)?;
        Ok(serde_json::from_value(result)?)
    }
}

/// A getters instance bound to its context.
pub(crate) struct GetterLive<T: Getters> {
    instance: T,
    cx: GetterContext<T::State>,
    members: Rc<BTreeMap<String, GetterMember<T>>>,
    guard: Guard,
}

impl<T: Getters> GetterLive<T> {
    pub fn bind(
        instance: T,
        members: Rc<BTreeMap<String, GetterMember<T>>>,
        context: Context<T::State>,
        diagnostics: &Diagnostics,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let local: Weak<dyn LocalGetters> = weak.clone();
            GetterLive {
                instance,
                cx: GetterContext { context, local },
                members,
                guard: Guard::new(HandlerKind::Getter, diagnostics),
            }
        })
    }

    pub fn context(&self) -> &GetterContext<T::State> {
        &self.cx
    }

    fn member(&self, name: &str) -> Result<&GetterMember<T>> {
        self.members.get(name).ok_or_else(|| Error::UnknownMember {
            kind: HandlerKind::Getter,
            name: name.to_string(),
        })
    }

    /// Evaluate a member the way the store does.
    pub fn evaluate(self: &Rc<Self>, name: &str) -> Result<GetterValue> {
        match self.member(name)? {
            GetterMember::Value(f) => {
                let _scope = self.guard.enter(name);
                Ok(GetterValue::Value(f(&self.instance, &self.cx)?))
            }
            GetterMember::Method(f) => {
                let f = f.clone();
                let live = self.clone();
                let name = name.to_string();
                Ok(GetterValue::Method(Rc::new(move |arg: Value| {
                    let _scope = live.guard.enter(&name);
                    f(&live.instance, &live.cx, arg).map_err(EngineError::from)
                })))
            }
        }
    }
}

impl<T: Getters> LocalGetters for GetterLive<T> {
    fn value(&self, name: &str) -> Result<Value> {
        self.guard.check_local(name);
        match self.member(name)? {
            GetterMember::Value(f) => {
                let _scope = self.guard.enter(name);
                f(&self.instance, &self.cx)
            }
            GetterMember::Method(_) => Err(EngineError::IsAMethod {
                name: name.to_string(),
            }
            .into()),
        }
    }

    fn call(&self, name: &str, arg: Value) -> Result<Value> {
        self.guard.check_local(name);
        match self.member(name)? {
            GetterMember::Method(f) => {
                let _scope = self.guard.enter(name);
                f(&self.instance, &self.cx, arg)
            }
            GetterMember::Value(_) => Err(EngineError::NotAMethod {
                name: name.to_string(),
            }
            .into()),
        }
    }
}

impl<T: Getters> Live<T> for GetterLive<T> {
    fn instance(&self) -> &T {
        &self.instance
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A [`Getters`] blueprint attached to a module.
pub(crate) struct GettersBlueprint<T> {
    factory: Rc<dyn Fn() -> T>,
}

impl<T: Getters> GettersBlueprint<T> {
    pub fn new(factory: impl Fn() -> T + 'static) -> Self {
        Self {
            factory: Rc::new(factory),
        }
    }
}

impl<T: Getters> Blueprint for GettersBlueprint<T> {
    fn compile(
        &self,
        node: &Rc<ModuleNode>,
        definition: &mut ModuleDefinition,
    ) -> Result<Injection> {
        let members = Rc::new(GetterMembers::<T>::collect()?);
        let slot: Slot<GetterLive<T>> = Slot::default();

        for name in members.keys() {
            let slot = slot.clone();
            let member = name.clone();
            let handler: GetterHandler = Rc::new(move || Ok(slot.get()?.evaluate(&member)?));
            definition.getters.insert(name.clone(), handler);
        }

        let mut instance = (self.factory)();
        let node = node.clone();
        Ok(Box::new(move |store: &Store| {
            instance.init(store)?;
            let context = Context::new(Rc::new(StoreBackend::new(store, node)));
            slot.fill(GetterLive::bind(instance, members, context, store.diagnostics()));
            Ok(())
        }))
    }
}
