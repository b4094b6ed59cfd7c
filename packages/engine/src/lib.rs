//! smartstore engine: a namespaced module store.
//!
//! The engine owns the pieces a module compiler builds on:
//! - `Store`: the global state tree plus flattened getter/mutation/action
//!   registries, commit/dispatch routing and subscribers
//! - `ModuleDefinition`: the engine-native module tree a store is built from
//! - `Path`: validated module paths
//! - `Diagnostics`: a non-fatal reporting channel for misuse warnings
//!
//! Handlers are plain closures over `serde_json::Value`. Everything is
//! single-threaded; actions return boxed local futures.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use smartstore_engine::{ModuleDefinition, Store, StoreOptions, Value};
//!
//! let mut counter = ModuleDefinition::new();
//! counter.state = Some(Rc::new(|| Ok(serde_json::json!({ "value": 0 }))));
//! counter.mutations.insert(
//!     "inc".to_string(),
//!     Rc::new(|state: &mut Value, _payload: Value| {
//!         let next = state["value"].as_i64().unwrap_or(0) + 1;
//!         state["value"] = next.into();
//!         Ok(())
//!     }),
//! );
//!
//! let mut root = ModuleDefinition::new();
//! root.modules.insert("counter".to_string(), counter);
//!
//! let store = Store::new(root, StoreOptions::default()).unwrap();
//! store.commit("counter/inc", Value::Null).unwrap();
//! assert_eq!(store.state()["counter"]["value"], 1);
//! ```

pub use serde_json::Value;

mod definition;
mod diagnostics;
mod error;
mod path;
mod registry;
mod store;
pub mod tree;

pub use definition::{
    child_namespace, ActionFuture, ActionHandler, GetterHandler, GetterMethod, GetterValue,
    ModuleDefinition, MutationHandler, StateFactory,
};
pub use diagnostics::{Diagnostic, Diagnostics, DIAGNOSTICS_ENV};
pub use error::{Error, HandlerKind, Result};
pub use path::{Path, PathError};
pub use store::{
    ActionRecord, MutationRecord, Plugin, RegisterOptions, Store, StoreOptions, SubscriptionId,
    WeakStore,
};
