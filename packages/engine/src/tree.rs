//! Navigation of the global state tree by module path.
//!
//! Module states are nested objects: the state of module `foo/bar` lives at
//! `state["foo"]["bar"]`. These helpers only descend through objects.

use serde_json::Value;

use crate::{Error, Path};

/// Get the state sub-tree at `path`.
pub fn get<'a>(state: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = state;
    for key in path.iter() {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Get a mutable reference to the state sub-tree at `path`.
pub fn get_mut<'a>(state: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut current = state;
    for key in path.iter() {
        current = current.as_object_mut()?.get_mut(key)?;
    }
    Some(current)
}

/// Insert `value` at `path`, returning the previous value if any.
///
/// The parent must already exist and be an object; intermediate modules are
/// never created implicitly. Inserting at the root replaces the whole tree.
pub fn insert(state: &mut Value, path: &Path, value: Value) -> Result<Option<Value>, Error> {
    let (Some(parent_path), Some(key)) = (path.parent(), path.last()) else {
        return Ok(Some(std::mem::replace(state, value)));
    };

    let parent = get_mut(state, &parent_path).ok_or_else(|| Error::StateNotFound {
        path: parent_path.clone(),
    })?;
    let object = parent
        .as_object_mut()
        .ok_or(Error::StateNotObject { path: parent_path })?;
    Ok(object.insert(key.to_string(), value))
}

/// Remove the value at `path`, returning it if it existed.
pub fn remove(state: &mut Value, path: &Path) -> Option<Value> {
    let parent_path = path.parent()?;
    let key = path.last()?;
    get_mut(state, &parent_path)?.as_object_mut()?.remove(key)
}
