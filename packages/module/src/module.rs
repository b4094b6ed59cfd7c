//! Module nodes and the module compiler.
//!
//! A [`Module`] pairs blueprints with nested modules. Compiling a module
//! assigns its path and namespace, produces the engine definition for the
//! whole subtree, and returns the injection step that binds fresh member
//! instances once the store exists.
//!
//! A module node may only ever live at one path. Compiling it again at the
//! same path is allowed (hot updates do this); compiling it at another path
//! fails. Use [`Module::duplicate`] to place the same shape twice.

use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde_json::Value;
use smartstore_engine::{
    child_namespace, Error as EngineError, HandlerKind, ModuleDefinition, Path, StateFactory,
    Store,
};

use crate::actions::ActionsBlueprint;
use crate::blueprint::{Actions, Blueprint, Getters, Injection, Mutations, State};
use crate::context::{Context, StoreBackend};
use crate::getters::GettersBlueprint;
use crate::mutations::MutationsBlueprint;
use crate::{Error, Result};

/// The state type a module was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateType {
    id: TypeId,
    name: &'static str,
}

impl StateType {
    pub fn of<S: 'static>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: type_name::<S>(),
        }
    }

    /// Whether a context typed as `self` may view a module declared with
    /// `actual`. Untyped views are always allowed.
    pub fn check(self, key: &str, actual: StateType) -> Result<()> {
        if self.id == TypeId::of::<Value>() || self == actual {
            return Ok(());
        }
        Err(Error::ChildType {
            key: key.to_string(),
            actual: actual.name,
            requested: self.name,
        })
    }
}

/// Where a compiled module lives, and what it declares.
#[derive(Debug, Clone)]
pub(crate) struct Position {
    pub path: Path,
    pub namespace: String,
    pub mutations: Vec<String>,
    pub actions: Vec<String>,
}

/// The result of compiling a subtree.
pub(crate) struct Compiled {
    pub definition: ModuleDefinition,
    pub injection: Injection,
}

pub(crate) struct ModuleNode {
    namespaced: bool,
    state: Option<StateFactory>,
    state_type: StateType,
    getters: Option<Rc<dyn Blueprint>>,
    mutations: Option<Rc<dyn Blueprint>>,
    actions: Option<Rc<dyn Blueprint>>,
    children: BTreeMap<String, Rc<ModuleNode>>,
    position: RefCell<Option<Position>>,
}

impl ModuleNode {
    fn position<R>(&self, what: &'static str, f: impl FnOnce(&Position) -> R) -> Result<R> {
        self.position
            .borrow()
            .as_ref()
            .map(f)
            .ok_or(Error::NotCompiled { what })
    }

    pub fn path(&self) -> Result<Path> {
        self.position("path", |p| p.path.clone())
    }

    pub fn namespace(&self) -> Result<String> {
        self.position("namespace", |p| p.namespace.clone())
    }

    pub fn declared(&self, kind: HandlerKind) -> Result<Vec<String>> {
        self.position("members", |p| match kind {
            HandlerKind::Mutation => p.mutations.clone(),
            HandlerKind::Action => p.actions.clone(),
            HandlerKind::Getter => Vec::new(),
        })
    }

    pub fn is_compiled(&self) -> bool {
        self.position.borrow().is_some()
    }

    pub fn child(&self, key: &str) -> Option<&Rc<ModuleNode>> {
        self.children.get(key)
    }

    pub fn state_type(&self) -> StateType {
        self.state_type
    }

    /// Compile this subtree at `path` under `namespace`.
    pub fn compile(self: &Rc<Self>, path: Path, namespace: String) -> Result<Compiled> {
        if let Some(existing) = self.position.borrow().as_ref() {
            if existing.path != path {
                return Err(Error::ModuleReused {
                    existing: existing.path.clone(),
                    requested: path,
                });
            }
        }
        *self.position.borrow_mut() = Some(Position {
            path: path.clone(),
            namespace: namespace.clone(),
            mutations: Vec::new(),
            actions: Vec::new(),
        });

        let mut definition = ModuleDefinition::new();
        definition.namespaced = self.namespaced;
        definition.state = self.state.clone();

        let mut injections = Vec::new();
        for (key, child) in &self.children {
            let child_ns = child_namespace(&namespace, self.namespaced, key, child.namespaced);
            let compiled = child.compile(path.child(key)?, child_ns)?;
            definition.modules.insert(key.clone(), compiled.definition);
            injections.push(compiled.injection);
        }

        for blueprint in [&self.getters, &self.mutations, &self.actions]
            .into_iter()
            .flatten()
        {
            injections.push(blueprint.compile(self, &mut definition)?);
        }

        if let Some(position) = self.position.borrow_mut().as_mut() {
            position.mutations = definition.mutations.keys().cloned().collect();
            position.actions = definition.actions.keys().cloned().collect();
        }
        tracing::trace!(module = %path, namespace = %namespace, "module compiled");

        Ok(Compiled {
            definition,
            injection: Box::new(move |store: &Store| {
                injections.into_iter().try_for_each(|inject| inject(store))
            }),
        })
    }

    /// Forget the position of this subtree.
    pub fn reset(&self) {
        self.position.borrow_mut().take();
        for child in self.children.values() {
            child.reset();
        }
    }

    fn duplicate(&self) -> ModuleNode {
        ModuleNode {
            namespaced: self.namespaced,
            state: self.state.clone(),
            state_type: self.state_type,
            getters: self.getters.clone(),
            mutations: self.mutations.clone(),
            actions: self.actions.clone(),
            children: self
                .children
                .iter()
                .map(|(key, child)| (key.clone(), Rc::new(child.duplicate())))
                .collect(),
            position: RefCell::new(None),
        }
    }
}

/// A typed handle to a module node.
///
/// Clones share the node, so a clone is the same module. Use
/// [`Module::duplicate`] for an independent copy.
pub struct Module<S = Value> {
    pub(crate) node: Rc<ModuleNode>,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for Module<S> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _state: PhantomData,
        }
    }
}

impl<S> fmt::Debug for Module<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = self.node.position.borrow();
        f.debug_struct("Module")
            .field("state", &self.node.state_type.name)
            .field("namespaced", &self.node.namespaced)
            .field("path", &position.as_ref().map(|p| p.path.to_string()))
            .field("children", &self.node.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: State> Module<S> {
    pub fn builder() -> ModuleBuilder<S> {
        ModuleBuilder {
            namespaced: true,
            state: None,
            getters: None,
            mutations: None,
            actions: None,
            children: BTreeMap::new(),
            _state: PhantomData,
        }
    }

    /// Deep copy with a fresh identity. Children are duplicated too.
    pub fn duplicate(&self) -> Module<S> {
        Module {
            node: Rc::new(self.node.duplicate()),
            _state: PhantomData,
        }
    }

    /// Whether two handles are the same module.
    pub fn ptr_eq(&self, other: &Module<S>) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    pub fn is_compiled(&self) -> bool {
        self.node.is_compiled()
    }

    /// Path assigned at compilation.
    pub fn path(&self) -> Result<Path> {
        self.node.path()
    }

    /// Namespace assigned at compilation.
    pub fn namespace(&self) -> Result<String> {
        self.node.namespace()
    }

    /// This module's context in `store`.
    ///
    /// The path is resolved on use, so the context can be created before the
    /// module is registered.
    pub fn context(&self, store: &Store) -> Context<S> {
        Context::new(Rc::new(StoreBackend::new(store, self.node.clone())))
    }
}

/// Builder for [`Module`].
pub struct ModuleBuilder<S = Value> {
    namespaced: bool,
    state: Option<StateFactory>,
    getters: Option<Rc<dyn Blueprint>>,
    mutations: Option<Rc<dyn Blueprint>>,
    actions: Option<Rc<dyn Blueprint>>,
    children: BTreeMap<String, Rc<ModuleNode>>,
    _state: PhantomData<fn() -> S>,
}

impl<S: State> ModuleBuilder<S> {
    /// Whether members are addressed under this module's key. Defaults to
    /// true.
    #[must_use]
    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    /// Initial state factory, called whenever the module's state is created.
    #[must_use]
    pub fn state(mut self, factory: impl Fn() -> S + 'static) -> Self {
        self.state = Some(Rc::new(move || {
            serde_json::to_value(factory()).map_err(EngineError::from)
        }));
        self
    }

    #[must_use]
    pub fn state_default(self) -> Self
    where
        S: Default,
    {
        self.state(S::default)
    }

    #[must_use]
    pub fn getters<G>(self) -> Self
    where
        G: Getters<State = S> + Default,
    {
        self.getters_with(G::default)
    }

    /// Getters built by `factory` on every compilation.
    #[must_use]
    pub fn getters_with<G>(mut self, factory: impl Fn() -> G + 'static) -> Self
    where
        G: Getters<State = S>,
    {
        self.getters = Some(Rc::new(GettersBlueprint::new(factory)));
        self
    }

    #[must_use]
    pub fn mutations<M>(self) -> Self
    where
        M: Mutations<State = S> + Default,
    {
        self.mutations_with(M::default)
    }

    #[must_use]
    pub fn mutations_with<M>(mut self, factory: impl Fn() -> M + 'static) -> Self
    where
        M: Mutations<State = S>,
    {
        self.mutations = Some(Rc::new(MutationsBlueprint::new(factory)));
        self
    }

    #[must_use]
    pub fn actions<A>(self) -> Self
    where
        A: Actions<State = S> + Default,
    {
        self.actions_with(A::default)
    }

    #[must_use]
    pub fn actions_with<A>(mut self, factory: impl Fn() -> A + 'static) -> Self
    where
        A: Actions<State = S>,
    {
        self.actions = Some(Rc::new(ActionsBlueprint::new(factory)));
        self
    }

    /// Nest `child` under `key`. The child keeps its identity, so the same
    /// module cannot be nested at two positions.
    #[must_use]
    pub fn module<C>(mut self, key: &str, child: &Module<C>) -> Self {
        self.children.insert(key.to_string(), child.node.clone());
        self
    }

    pub fn build(self) -> Module<S> {
        Module {
            node: Rc::new(ModuleNode {
                namespaced: self.namespaced,
                state: self.state,
                state_type: StateType::of::<S>(),
                getters: self.getters,
                mutations: self.mutations,
                actions: self.actions,
                children: self.children,
                position: RefCell::new(None),
            }),
            _state: PhantomData,
        }
    }
}
