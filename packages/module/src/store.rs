//! Store construction, dynamic registration and hot updates.

use smartstore_engine::{Error as EngineError, Path, RegisterOptions, Store, StoreOptions};

use crate::blueprint::State;
use crate::module::Module;
use crate::{Error, Result};

/// Compile `root` and build a store from it.
///
/// Member instances are bound by a plugin that runs before any plugin in
/// `options`.
pub fn create_store<S: State>(root: &Module<S>, options: StoreOptions) -> Result<Store> {
    let compiled = root.node.compile(Path::root(), String::new())?;
    let injection = compiled.injection;

    let mut options = options;
    options.plugins.insert(
        0,
        Box::new(move |store: &Store| injection(store).map_err(EngineError::from)),
    );
    tracing::debug!(plugins = options.plugins.len(), "creating store");
    Ok(Store::new(compiled.definition, options)?)
}

/// `None` and `""` mean the root namespace; anything else ends in `/`.
fn normalize_namespace(namespace: Option<&str>) -> String {
    match namespace {
        None | Some("") => String::new(),
        Some(ns) if ns.ends_with('/') => ns.to_string(),
        Some(ns) => format!("{}/", ns),
    }
}

/// Attach `module` to a live store at `path` (e.g. `"a/b"`).
///
/// `namespace` is the prefix of the module's own members.
pub fn register_module<S: State>(
    store: &Store,
    path: &str,
    namespace: Option<&str>,
    module: &Module<S>,
    options: RegisterOptions,
) -> Result<()> {
    let path = Path::parse(path)?;
    let namespace = normalize_namespace(namespace);
    let was_compiled = module.is_compiled();

    let compiled = module.node.compile(path.clone(), namespace.clone())?;
    if let Err(e) = store.register_module(&path, &namespace, &compiled.definition, options) {
        if !was_compiled {
            module.node.reset();
        }
        return Err(e.into());
    }
    tracing::debug!(module = %path, namespace = %namespace, "registering module");
    (compiled.injection)(store)
}

/// Detach `module` and its state from the store.
pub fn unregister_module<S: State>(store: &Store, module: &Module<S>) -> Result<()> {
    let path = module.path()?;
    store.unregister_module(&path).map_err(|e| match e {
        EngineError::ModuleNotFound { path } => Error::NotRegistered { path },
        other => other.into(),
    })
}

/// Swap the behaviour of a live store for the one described by `root`,
/// keeping every existing state value.
///
/// Modules of `root` that already exist keep their state and take the
/// namespace `root` gives them; every member instance is rebuilt and
/// rebound. On error the store keeps its previous handlers.
pub fn hot_update<S: State>(store: &Store, root: &Module<S>) -> Result<()> {
    let compiled = root.node.compile(Path::root(), String::new())?;
    store.hot_update(compiled.definition)?;
    tracing::debug!("rebinding members after hot update");
    (compiled.injection)(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_normalization() {
        assert_eq!(normalize_namespace(None), "");
        assert_eq!(normalize_namespace(Some("")), "");
        assert_eq!(normalize_namespace(Some("foo")), "foo/");
        assert_eq!(normalize_namespace(Some("foo/")), "foo/");
        assert_eq!(normalize_namespace(Some("foo/bar")), "foo/bar/");
    }
}
