//! smartstore: class-style typed modules over the smartstore engine.
//!
//! A module is declared as plain structs:
//! - a state type (anything serde can round-trip)
//! - optional `Getters`, `Mutations` and `Actions` blueprints, each listing
//!   its members in a member table
//! - nested modules, by key
//!
//! [`create_store`] compiles the module tree into an engine definition,
//! builds the store, and binds one fresh instance of every blueprint to its
//! module's [`Context`]. Modules can be attached later with
//! [`register_module`] and their behaviour swapped with [`hot_update`].
//! [`inject`] binds a blueprint to a [`Stub`] instead, for unit tests.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use smartstore::{
//!     boxed, create_store, ActionContext, ActionMembers, ActionResult, Actions, GetterContext,
//!     GetterMembers, Getters, Module, MutationContext, MutationMembers, Mutations, Result,
//!     StoreOptions, Value,
//! };
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Counter {
//!     value: i64,
//! }
//!
//! #[derive(Default)]
//! struct CounterGetters;
//!
//! impl CounterGetters {
//!     fn double(&self, cx: &GetterContext<Counter>) -> Result<i64> {
//!         Ok(cx.state()?.value * 2)
//!     }
//! }
//!
//! impl Getters for CounterGetters {
//!     type State = Counter;
//!
//!     fn define(members: &mut GetterMembers<Self>) {
//!         members.getter("double", Self::double);
//!     }
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
//! #[derive(Default)]
//! struct CounterActions;
//!
//! impl CounterActions {
//!     fn inc_twice<'a>(&'a self, cx: &'a ActionContext<Counter>, n: i64) -> ActionResult<'a, ()> {
//!         boxed(async move {
//!             cx.commit("inc", n)?;
//!             cx.commit("inc", n)
//!         })
//!     }
//! }
//!
//! impl Actions for CounterActions {
//!     type State = Counter;
//!
//!     fn define(members: &mut ActionMembers<Self>) {
//!         members.action("incTwice", Self::inc_twice);
//!     }
//! }
//!
//! let counter = Module::<Counter>::builder()
//!     .state_default()
//!     .getters::<CounterGetters>()
//!     .mutations::<CounterMutations>()
//!     .actions::<CounterActions>()
//!     .build();
//! let root = Module::<Value>::builder().module("counter", &counter).build();
//! let store = create_store(&root, StoreOptions::default())?;
//!
//! store.commit("counter/inc", 1.into())?;
//! assert_eq!(store.getter("counter/double")?, 2);
//! assert_eq!(counter.context(&store).state()?.value, 1);
//! # Ok::<(), smartstore::Error>(())
//! ```

mod actions;
mod blueprint;
mod context;
mod error;
mod getters;
mod guard;
mod inject;
mod module;
mod mutations;
mod store;

pub use smartstore_engine as engine;
pub use smartstore_engine::{
    path, ActionRecord, Diagnostic, Diagnostics, MutationRecord, Path, RegisterOptions, Store,
    StoreOptions, Value,
};

pub use actions::{boxed, ActionContext, ActionMembers, ActionResult};
pub use blueprint::{Actions, Getters, Mutations, State};
pub use context::{
    ActionMap, CommitOptions, Context, DispatchOptions, MutationMap, Pending, ScopedGetters,
};
pub use error::{Error, Result};
pub use getters::{GetterContext, GetterMembers};
pub use inject::{inject, inject_with, kind, Injectable, Injected, Stub};
pub use module::{Module, ModuleBuilder};
pub use mutations::{MutationContext, MutationMembers};
pub use store::{create_store, hot_update, register_module, unregister_module};
