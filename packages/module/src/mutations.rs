//! Mutation members, their context and the mutation compiler.

use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smartstore_engine::{Diagnostics, HandlerKind, ModuleDefinition, MutationHandler, Store};

use crate::blueprint::{resolve, Blueprint, Candidate, Injection, Live, Mutations, Slot};
use crate::guard::Guard;
use crate::module::ModuleNode;
use crate::{Error, Result};

type MemberFn<T> =
    dyn Fn(&T, &mut MutationContext<'_, <T as Mutations>::State>, Value) -> Result<()>;

pub(crate) type MutationMember<T> = Rc<MemberFn<T>>;

/// Member table of a [`Mutations`] blueprint.
pub struct MutationMembers<T: Mutations> {
    depth: usize,
    candidates: Vec<Candidate<MutationMember<T>>>,
}

impl<T: Mutations> MutationMembers<T> {
    fn at_depth(depth: usize) -> Self {
        Self {
            depth,
            candidates: Vec::new(),
        }
    }

    pub(crate) fn collect() -> Result<BTreeMap<String, MutationMember<T>>> {
        let mut members = Self::at_depth(0);
        T::define(&mut members);
        resolve(HandlerKind::Mutation, members.candidates)
    }

    /// Declare a mutation taking a payload of type `P`.
    pub fn mutation<P, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        P: DeserializeOwned,
        F: Fn(&T, &mut MutationContext<'_, T::State>, P) -> Result<()> + 'static,
    {
        let member: MutationMember<T> = Rc::new(
            move |instance: &T, cx: &mut MutationContext<'_, T::State>, payload: Value| {
                let payload = serde_json::from_value(payload)?;
                f(instance, cx, payload)
            },
        );
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
        P: Mutations<State = T::State>,
    {
        let mut parent = MutationMembers::<P>::at_depth(self.depth + 1);
        P::define(&mut parent);
        for candidate in parent.candidates {
            let f = candidate.member;
            let member: MutationMember<T> = Rc::new(
                move |instance: &T, cx: &mut MutationContext<'_, T::State>, payload: Value| {
                    f(project(instance), cx, payload)
                },
            );
            self.candidates.push(Candidate {
                name: candidate.name,
                depth: candidate.depth,
                member,
            });
        }
        self
    }
}

/// Direct calls to sibling mutations of the same instance.
pub(crate) trait LocalMutations<S> {
    fn apply_local(&self, name: &str, state: &mut S, payload: Value) -> Result<()>;
}

/// What a mutation member sees: its module's own state, and nothing that
/// could commit further mutations.
pub struct MutationContext<'a, S> {
    pub state: &'a mut S,
    local: &'a dyn LocalMutations<S>,
}

impl<S> MutationContext<'_, S> {
    /// Run a sibling mutation on the same state directly. Reported as a
    /// diagnostic; mutations are meant to be committed one at a time.
    pub fn local<P: Serialize>(&mut self, name: &str, payload: P) -> Result<()> {
        let payload = serde_json::to_value(payload)?;
        self.local.apply_local(name, self.state, payload)
    }
}

/// A mutations instance ready to run.
pub(crate) struct MutationLive<T: Mutations> {
    instance: T,
    members: Rc<BTreeMap<String, MutationMember<T>>>,
    guard: Guard,
}

impl<T: Mutations> MutationLive<T> {
    pub fn bind(
        instance: T,
        members: Rc<BTreeMap<String, MutationMember<T>>>,
        diagnostics: &Diagnostics,
    ) -> Rc<Self> {
        Rc::new(MutationLive {
            instance,
            members,
            guard: Guard::new(HandlerKind::Mutation, diagnostics),
        })
    }

    /// Run `name` against a module state held as a raw value.
    pub fn apply(&self, name: &str, state: &mut Value, payload: Value) -> Result<()> {
        let mut typed: T::State = serde_json::from_value(state.clone())?;
        self.apply_typed(name, &mut typed, payload)?;
        *state = serde_json::to_value(&typed)?;
        Ok(())
    }

    fn apply_typed(&self, name: &str, state: &mut T::State, payload: Value) -> Result<()> {
        let member = self.members.get(name).ok_or_else(|| Error::UnknownMember {
            kind: HandlerKind::Mutation,
            name: name.to_string(),
        })?;
        let _scope = self.guard.enter(name);
        let mut cx = MutationContext { state, local: self };
        member(&self.instance, &mut cx, payload)
    }
}

impl<T: Mutations> LocalMutations<T::State> for MutationLive<T> {
    fn apply_local(&self, name: &str, state: &mut T::State, payload: Value) -> Result<()> {
        self.guard.check_local(name);
        self.apply_typed(name, state, payload)
    }
}

impl<T: Mutations> Live<T> for MutationLive<T> {
    fn instance(&self) -> &T {
        &self.instance
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A [`Mutations`] blueprint attached to a module.
pub(crate) struct MutationsBlueprint<T> {
    factory: Rc<dyn Fn() -> T>,
}

impl<T: Mutations> MutationsBlueprint<T> {
    pub fn new(factory: impl Fn() -> T + 'static) -> Self {
        Self {
            factory: Rc::new(factory),
        }
    }
}

impl<T: Mutations> Blueprint for MutationsBlueprint<T> {
    fn compile(
        &self,
        _node: &Rc<ModuleNode>,
        definition: &mut ModuleDefinition,
    ) -> Result<Injection> {
        let members = Rc::new(MutationMembers::<T>::collect()?);
        let slot: Slot<MutationLive<T>> = Slot::default();

        for name in members.keys() {
            let slot = slot.clone();
            let member = name.clone();
            let handler: MutationHandler = Rc::new(move |state: &mut Value, payload: Value| {
                Ok(slot.get()?.apply(&member, state, payload)?)
            });
            definition.mutations.insert(name.clone(), handler);
        }

        let instance = (self.factory)();
        Ok(Box::new(move |store: &Store| {
            slot.fill(MutationLive::bind(instance, members, store.diagnostics()));
            Ok(())
        }))
    }
}
