//! Blueprint traits and member collection.
//!
//! A blueprint is a plain struct whose members are declared in a member
//! table. Tables support inheritance through `extend`: a parent's members
//! are collected one level deeper, and for every name the shallowest
//! definition wins.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use smartstore_engine::{HandlerKind, ModuleDefinition, Store};

use crate::actions::ActionMembers;
use crate::getters::GetterMembers;
use crate::module::ModuleNode;
use crate::mutations::MutationMembers;
use crate::{Error, Result};

/// A module state type.
pub trait State: Serialize + DeserializeOwned + 'static {}

impl<T: Serialize + DeserializeOwned + 'static> State for T {}

/// Derived values of a module.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use smartstore::{GetterContext, GetterMembers, Getters, Result};
///
/// #[derive(Serialize, Deserialize)]
/// struct Counter {
///     value: i64,
/// }
///
/// #[derive(Default)]
/// struct CounterGetters;
///
/// impl CounterGetters {
///     fn double(&self, cx: &GetterContext<Counter>) -> Result<i64> {
///         Ok(cx.state()?.value * 2)
///     }
/// }
///
/// impl Getters for CounterGetters {
///     type State = Counter;
///
///     fn define(members: &mut GetterMembers<Self>) {
///         members.getter("double", Self::double);
///     }
/// }
/// ```
pub trait Getters: Sized + 'static {
    type State: State;

    fn define(members: &mut GetterMembers<Self>);

    /// Called once the store exists, before the instance is bound.
    fn init(&mut self, _store: &Store) -> Result<()> {
        Ok(())
    }
}

/// Synchronous state edits of a module.
pub trait Mutations: Sized + 'static {
    type State: State;

    fn define(members: &mut MutationMembers<Self>);
}

/// Asynchronous orchestration of a module.
pub trait Actions: Sized + 'static {
    type State: State;

    fn define(members: &mut ActionMembers<Self>);

    /// Called once the store exists, before the instance is bound.
    fn init(&mut self, _store: &Store) -> Result<()> {
        Ok(())
    }
}

/// A member found while collecting, with its inheritance depth.
pub(crate) struct Candidate<M> {
    pub name: String,
    pub depth: usize,
    pub member: M,
}

/// Pick the shallowest definition of every name.
pub(crate) fn resolve<M>(
    kind: HandlerKind,
    candidates: Vec<Candidate<M>>,
) -> Result<BTreeMap<String, M>> {
    let mut grouped: BTreeMap<String, Vec<(usize, M)>> = BTreeMap::new();
    for candidate in candidates {
        grouped
            .entry(candidate.name)
            .or_default()
            .push((candidate.depth, candidate.member));
    }

    let mut resolved = BTreeMap::new();
    for (name, definitions) in grouped {
        let Some(depth) = definitions.iter().map(|(d, _)| *d).min() else {
            continue;
        };
        let mut shallowest = definitions.into_iter().filter(|(d, _)| *d == depth);
        let Some((_, member)) = shallowest.next() else {
            continue;
        };
        if shallowest.next().is_some() {
            return Err(Error::DuplicateMember { kind, name });
        }
        resolved.insert(name, member);
    }
    Ok(resolved)
}

/// Where a live instance is published once the store exists.
pub(crate) struct Slot<L>(Rc<RefCell<Option<Rc<L>>>>);

impl<L> Slot<L> {
    pub fn get(&self) -> Result<Rc<L>> {
        self.0.borrow().clone().ok_or(Error::NotInjected)
    }

    pub fn fill(&self, live: Rc<L>) {
        *self.0.borrow_mut() = Some(live);
    }
}

impl<L> Clone for Slot<L> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<L> Default for Slot<L> {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }
}

/// A bound instance, seen from outside its kind.
pub(crate) trait Live<T> {
    fn instance(&self) -> &T;
    fn as_any(&self) -> &dyn Any;
}

/// Binds the instances of one compilation to a live store.
pub(crate) type Injection = Box<dyn FnOnce(&Store) -> Result<()>>;

/// One blueprint kind attached to a module node.
pub(crate) trait Blueprint {
    /// Add this blueprint's handlers to `definition` and return the step
    /// that binds the freshly created instance.
    fn compile(&self, node: &Rc<ModuleNode>, definition: &mut ModuleDefinition)
        -> Result<Injection>;
}
