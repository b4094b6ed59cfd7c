//! Action members, their context and the action compiler.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smartstore_engine::{
    ActionFuture, ActionHandler, Diagnostics, Error as EngineError, HandlerKind, ModuleDefinition,
    Store,
};

use crate::blueprint::{resolve, Actions, Blueprint, Candidate, Injection, Live, Slot};
use crate::context::{failed, Context, Pending, StoreBackend};
use crate::guard::Guard;
use crate::module::ModuleNode;
use crate::{Error, Result};

/// The deferred result of an action member, borrowing the instance and
/// its context.
pub type ActionResult<'a, R> = Pin<Box<dyn Future<Output = Result<R>> + 'a>>;

/// Box an action body.
///
/// ```rust
/// # use smartstore::{boxed, ActionContext, ActionResult};
/// # struct CounterActions;
/// impl CounterActions {
///     fn inc_later<'a>(&'a self, cx: &'a ActionContext, n: i64) -> ActionResult<'a, ()> {
///         boxed(async move { cx.commit("inc", n) })
///     }
/// }
/// ```
pub fn boxed<'a, R>(future: impl Future<Output = Result<R>> + 'a) -> ActionResult<'a, R> {
    Box::pin(future)
}

type MemberFn<T> = dyn for<'a> Fn(
    &'a T,
    &'a ActionContext<<T as Actions>::State>,
    Value,
) -> ActionResult<'a, Value>;

pub(crate) type ActionMember<T> = Rc<MemberFn<T>>;

/// Pins the higher-ranked signature for the closures below.
fn action_member<T, F>(f: F) -> ActionMember<T>
where
    T: Actions,
    F: for<'a> Fn(&'a T, &'a ActionContext<T::State>, Value) -> ActionResult<'a, Value> + 'static,
{
    Rc::new(f)
}

/// Member table of an [`Actions`] blueprint.
pub struct ActionMembers<T: Actions> {
    depth: usize,
    candidates: Vec<Candidate<ActionMember<T>>>,
}

impl<T: Actions> ActionMembers<T> {
    fn at_depth(depth: usize) -> Self {
        Self {
            depth,
            candidates: Vec::new(),
        }
    }

    pub(crate) fn collect() -> Result<BTreeMap<String, ActionMember<T>>> {
        let mut members = Self::at_depth(0);
        T::define(&mut members);
        resolve(HandlerKind::Action, members.candidates)
    }

    /// Declare an action taking a payload of type `P` and resolving to `R`.
    pub fn action<P, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        P: DeserializeOwned,
        R: Serialize + 'static,
        F: for<'a> Fn(&'a T, &'a ActionContext<T::State>, P) -> ActionResult<'a, R> + 'static,
    {
        let member = action_member(move |instance, cx, payload| {
            let payload: P = match serde_json::from_value(payload) {
                Ok(payload) => payload,
                Err(e) => return boxed(std::future::ready(Err(e.into()))),
            };
            let pending = f(instance, cx, payload);
            boxed(async move {
                let result = pending.await?;
                serde_json::to_value(result).map_err(Error::from)
            })
        });
        self.candidates.push(Candidate {
            name: name.to_string(),
            depth: self.depth,
            member,
        });
        self
    }

    /// Inherit the members of `P`, reached through `project`.
    pub fn extend<P>(&mut self, project: fn(&T) -> &P) -> &mut Self
    where
        P: Actions<State = T::State>,
    {
        let mut parent = ActionMembers::<P>::at_depth(self.depth + 1);
        P::define(&mut parent);
        for candidate in parent.candidates {
            let f = candidate.member;
            let member = action_member(move |instance, cx, payload| f(project(instance), cx, payload));
            self.candidates.push(Candidate {
                name: candidate.name,
                depth: candidate.depth,
                member,
            });
        }
        self
    }
}

/// Direct calls to sibling actions of the same instance.
pub(crate) trait LocalActions {
    fn run_local(self: Rc<Self>, name: String, payload: Value) -> Pending<Value>;
}

/// What an action member sees: the full module [`Context`] plus direct
/// access to its sibling actions.
pub struct ActionContext<S = Value> {
    context: Context<S>,
    local: Weak<dyn LocalActions>,
}

impl<S> Deref for ActionContext<S> {
    type Target = Context<S>;

    fn deref(&self) -> &Context<S> {
        &self.context
    }
}

impl<S> ActionContext<S> {
    /// Run a sibling action on this instance directly, bypassing the
    /// store. Reported as a diagnostic when called from another action.
    pub fn local<P: Serialize>(&self, name: &str, payload: P) -> Pending<Value> {
        let Some(local) = self.local.upgrade() else {
            return failed(Error::NotInjected);
        };
        match serde_json::to_value(payload) {
            Ok(payload) => local.run_local(name.to_string(), payload),
            Err(e) => failed(e.into()),
        }
    }
}

/// An actions instance bound to its context.
pub(crate) struct ActionLive<T: Actions> {
    instance: T,
    cx: ActionContext<T::State>,
    members: Rc<BTreeMap<String, ActionMember<T>>>,
    guard: Guard,
}

impl<T: Actions> ActionLive<T> {
    pub fn bind(
        instance: T,
        members: Rc<BTreeMap<String, ActionMember<T>>>,
        context: Context<T::State>,
        diagnostics: &Diagnostics,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let local: Weak<dyn LocalActions> = weak.clone();
            ActionLive {
                instance,
                cx: ActionContext { context, local },
                members,
                guard: Guard::new(HandlerKind::Action, diagnostics),
            }
        })
    }

    pub fn context(&self) -> &ActionContext<T::State> {
        &self.cx
    }

    pub fn run(&self, name: &str, payload: Value) -> ActionResult<'_, Value> {
        let Some(member) = self.members.get(name) else {
            let error = Error::UnknownMember {
                kind: HandlerKind::Action,
                name: name.to_string(),
            };
            return boxed(std::future::ready(Err(error)));
        };
        let scope = self.guard.enter(name);
        let pending = member(&self.instance, &self.cx, payload);
        boxed(async move {
            let _scope = scope;
            pending.await
        })
    }
}

impl<T: Actions> LocalActions for ActionLive<T> {
    fn run_local(self: Rc<Self>, name: String, payload: Value) -> Pending<Value> {
        self.guard.check_local(&name);
        Box::pin(async move { self.run(&name, payload).await })
    }
}

impl<T: Actions> Live<T> for ActionLive<T> {
    fn instance(&self) -> &T {
        &self.instance
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An [`Actions`] blueprint attached to a module.
pub(crate) struct ActionsBlueprint<T> {
    factory: Rc<dyn Fn() -> T>,
}

impl<T: Actions> ActionsBlueprint<T> {
    pub fn new(factory: impl Fn() -> T + 'static) -> Self {
        Self {
            factory: Rc::new(factory),
        }
    }
}

impl<T: Actions> Blueprint for ActionsBlueprint<T> {
    fn compile(
        &self,
        node: &Rc<ModuleNode>,
        definition: &mut ModuleDefinition,
    ) -> Result<Injection> {
        let members = Rc::new(ActionMembers::<T>::collect()?);
        let slot: Slot<ActionLive<T>> = Slot::default();

        for name in members.keys() {
            let slot = slot.clone();
            let member = name.clone();
            let handler: ActionHandler = Rc::new(move |payload: Value| -> ActionFuture {
                let live = slot.get();
                let name = member.clone();
                Box::pin(async move {
                    let live = live?;
                    live.run(&name, payload).await.map_err(EngineError::from)
                })
            });
            definition.actions.insert(name.clone(), handler);
        }

        let mut instance = (self.factory)();
        let node = node.clone();
        Ok(Box::new(move |store: &Store| {
            instance.init(store)?;
            let context = Context::new(Rc::new(StoreBackend::new(store, node)));
            slot.fill(ActionLive::bind(instance, members, context, store.diagnostics()));
            Ok(())
        }))
    }
}
