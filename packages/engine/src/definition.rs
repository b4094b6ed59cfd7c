//! The module definition tree the engine is constructed from.
//!
//! A definition describes one module: whether it is namespaced, how to build
//! its initial state, its getter/mutation/action handlers and its nested
//! modules. Handlers are plain closures; the engine does not know where they
//! come from.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde_json::Value;

use crate::{Error, Path};

/// Builds the initial state of a module.
pub type StateFactory = Rc<dyn Fn() -> Result<Value, Error>>;

/// A zero-argument getter.
pub type GetterHandler = Rc<dyn Fn() -> Result<GetterValue, Error>>;

/// A mutation: receives the module-local state and the payload.
pub type MutationHandler = Rc<dyn Fn(&mut Value, Value) -> Result<(), Error>>;

/// The deferred result of an action.
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<Value, Error>>>>;

/// An action: receives the payload and returns a deferred result.
pub type ActionHandler = Rc<dyn Fn(Value) -> ActionFuture>;

/// A method-style getter body, called with one argument.
pub type GetterMethod = Rc<dyn Fn(Value) -> Result<Value, Error>>;

/// What a getter evaluates to.
#[derive(Clone)]
pub enum GetterValue {
    /// A computed value.
    Value(Value),
    /// A method-style getter; call it with an argument to get a value.
    Method(GetterMethod),
}

impl GetterValue {
    /// The computed value, failing for method-style getters.
    pub fn into_value(self, name: &str) -> Result<Value, Error> {
        match self {
            GetterValue::Value(value) => Ok(value),
            GetterValue::Method(_) => Err(Error::IsAMethod {
                name: name.to_string(),
            }),
        }
    }

    /// Call a method-style getter, failing for computed getters.
    pub fn call(self, name: &str, arg: Value) -> Result<Value, Error> {
        match self {
            GetterValue::Method(method) => method(arg),
            GetterValue::Value(_) => Err(Error::NotAMethod {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for GetterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GetterValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            GetterValue::Method(_) => f.write_str("Method(..)"),
        }
    }
}

/// A module definition: the engine-native form of one module and its
/// nested modules.
#[derive(Clone)]
pub struct ModuleDefinition {
    pub namespaced: bool,
    /// Initial state factory. Absent means an empty object.
    pub state: Option<StateFactory>,
    pub getters: BTreeMap<String, GetterHandler>,
    pub mutations: BTreeMap<String, MutationHandler>,
    pub actions: BTreeMap<String, ActionHandler>,
    pub modules: BTreeMap<String, ModuleDefinition>,
}

impl ModuleDefinition {
    /// An empty, namespaced definition.
    pub fn new() -> Self {
        Self {
            namespaced: true,
            state: None,
            getters: BTreeMap::new(),
            mutations: BTreeMap::new(),
            actions: BTreeMap::new(),
            modules: BTreeMap::new(),
        }
    }

    /// Build the initial state of this module and all nested modules.
    ///
    /// Each nested module's state is stored under its key, so a module with
    /// children must produce an object.
    pub fn build_state(&self) -> Result<Value, Error> {
        self.build_state_at(&Path::root())
    }

    pub(crate) fn build_state_at(&self, path: &Path) -> Result<Value, Error> {
        let mut state = match &self.state {
            Some(factory) => factory()?,
            None => Value::Object(Default::default()),
        };
        if self.modules.is_empty() {
            return Ok(state);
        }

        let object = state
            .as_object_mut()
            .ok_or_else(|| Error::StateNotObject { path: path.clone() })?;
        for (key, child) in &self.modules {
            object.insert(key.clone(), child.build_state_at(&path.child(key)?)?);
        }
        Ok(state)
    }
}

impl Default for ModuleDefinition {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDefinition")
            .field("namespaced", &self.namespaced)
            .field("state", &self.state.is_some())
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("modules", &self.modules)
            .finish()
    }
}

/// Namespace of the child module `key`.
///
/// A namespaced parent passes its own namespace down; a non-namespaced
/// parent passes nothing, so the child is addressed by its own segment
/// only. A namespaced child adds `key/`, a non-namespaced child adds
/// nothing.
pub fn child_namespace(
    parent_namespace: &str,
    parent_namespaced: bool,
    key: &str,
    child_namespaced: bool,
) -> String {
    let segment = if child_namespaced {
        format!("{}/", key)
    } else {
        String::new()
    };
    if parent_namespaced {
        format!("{}{}", parent_namespace, segment)
    } else {
        segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn namespace_composition() {
        assert_eq!(child_namespace("", true, "foo", true), "foo/");
        assert_eq!(child_namespace("foo/", true, "bar", true), "foo/bar/");
        assert_eq!(child_namespace("foo/", true, "bar", false), "foo/");
        // A non-namespaced parent does not pass its prefix down.
        assert_eq!(child_namespace("foo/", false, "baz", true), "baz/");
        assert_eq!(child_namespace("foo/", false, "baz", false), "");
    }

    #[test]
    fn build_state_nests_children() {
        let mut child = ModuleDefinition::new();
        child.state = Some(Rc::new(|| Ok(json!({ "value": 1 }))));

        let mut root = ModuleDefinition::new();
        root.modules.insert("foo".to_string(), child);

        assert_eq!(
            root.build_state().unwrap(),
            json!({ "foo": { "value": 1 } })
        );
    }

    #[test]
    fn build_state_rejects_scalar_parent() {
        let mut root = ModuleDefinition::new();
        root.state = Some(Rc::new(|| Ok(json!(3))));
        root.modules.insert("foo".to_string(), ModuleDefinition::new());

        assert!(matches!(
            root.build_state(),
            Err(Error::StateNotObject { .. })
        ));
    }

    #[test]
    fn getter_value_kinds() {
        let computed = GetterValue::Value(json!(2));
        assert!(computed.clone().call("double", json!(1)).is_err());
        assert_eq!(computed.into_value("double").unwrap(), json!(2));

        let method = GetterValue::Method(Rc::new(|arg: Value| {
            Ok(json!(arg.as_i64().unwrap_or(0) + 1))
        }));
        assert_eq!(method.clone().call("add", json!(4)).unwrap(), json!(5));
        assert!(method.into_value("add").is_err());
    }
}
