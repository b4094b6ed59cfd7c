//! Registered modules and the flattened handler index.
//!
//! Modules are kept in a trie keyed by module path. After every structural
//! change (construction, registration, unregistration, hot update) the
//! flattened index is rebuilt from the trie; a change that would produce a
//! duplicate flattened name is rejected before anything is modified.

use std::collections::BTreeMap;

use crate::definition::{
    child_namespace, ActionHandler, GetterHandler, ModuleDefinition, MutationHandler,
};
use crate::error::HandlerKind;
use crate::{Error, Path};

/// One registered module: its resolved namespace and local handlers.
#[derive(Clone)]
pub(crate) struct RawModule {
    pub namespaced: bool,
    pub namespace: String,
    pub getters: BTreeMap<String, GetterHandler>,
    pub mutations: BTreeMap<String, MutationHandler>,
    pub actions: BTreeMap<String, ActionHandler>,
}

impl RawModule {
    fn new(definition: &ModuleDefinition, namespace: String) -> Self {
        Self {
            namespaced: definition.namespaced,
            namespace,
            getters: definition.getters.clone(),
            mutations: definition.mutations.clone(),
            actions: definition.actions.clone(),
        }
    }

    fn replace_handlers(&mut self, definition: &ModuleDefinition) {
        self.getters = definition.getters.clone();
        self.mutations = definition.mutations.clone();
        self.actions = definition.actions.clone();
    }
}

/// A prefix trie of modules keyed by module key.
#[derive(Clone, Default)]
pub(crate) struct ModuleTrie {
    module: Option<RawModule>,
    children: BTreeMap<String, ModuleTrie>,
}

impl ModuleTrie {
    /// Build the trie for a definition whose root lives under `namespace`.
    fn from_definition(definition: &ModuleDefinition, namespace: String) -> Self {
        let children = definition
            .modules
            .iter()
            .map(|(key, child)| {
                let child_ns =
                    child_namespace(&namespace, definition.namespaced, key, child.namespaced);
                (key.clone(), ModuleTrie::from_definition(child, child_ns))
            })
            .collect();
        Self {
            module: Some(RawModule::new(definition, namespace)),
            children,
        }
    }

    fn get_node(&self, path: &Path) -> Option<&ModuleTrie> {
        let mut current = self;
        for key in path.iter() {
            current = current.children.get(key)?;
        }
        Some(current)
    }

    fn get_node_mut(&mut self, path: &Path) -> Option<&mut ModuleTrie> {
        let mut current = self;
        for key in path.iter() {
            current = current.children.get_mut(key)?;
        }
        Some(current)
    }

    fn get(&self, path: &Path) -> Option<&RawModule> {
        self.get_node(path)?.module.as_ref()
    }

    /// Remove and return the subtree at a non-root path.
    fn remove_subtree(&mut self, path: &Path) -> Option<ModuleTrie> {
        let parent = self.get_node_mut(&path.parent()?)?;
        parent.children.remove(path.last()?)
    }

    /// Visit every module with its path, parents before children.
    fn walk<'a>(&'a self, path: Path, visit: &mut dyn FnMut(&Path, &'a RawModule)) {
        if let Some(module) = &self.module {
            visit(&path, module);
        }
        for (key, child) in &self.children {
            let mut components = path.components.clone();
            components.push(key.clone());
            child.walk(Path { components }, visit);
        }
    }

    /// Replace handlers in place, adding modules that do not exist yet.
    ///
    /// Every module named by `definition` takes the namespace its position
    /// in the new tree implies. Returns the definitions of added subtrees so
    /// their state can be created.
    fn merge(
        &mut self,
        definition: &ModuleDefinition,
        path: &Path,
        namespace: String,
        added: &mut Vec<(Path, ModuleDefinition)>,
    ) -> Result<(), Error> {
        let module = self
            .module
            .as_mut()
            .ok_or_else(|| Error::ModuleNotFound { path: path.clone() })?;
        module.replace_handlers(definition);
        module.namespaced = definition.namespaced;
        module.namespace = namespace.clone();

        for (key, child_def) in &definition.modules {
            let child_path = path.child(key)?;
            let child_ns =
                child_namespace(&namespace, definition.namespaced, key, child_def.namespaced);
            match self.children.get_mut(key) {
                Some(child) => child.merge(child_def, &child_path, child_ns, added)?,
                None => {
                    self.children.insert(
                        key.clone(),
                        ModuleTrie::from_definition(child_def, child_ns),
                    );
                    added.push((child_path, child_def.clone()));
                }
            }
        }
        Ok(())
    }
}

/// A mutation handler together with the module it mutates.
#[derive(Clone)]
pub(crate) struct MutationEntry {
    pub path: Path,
    pub handler: MutationHandler,
}

/// Flattened `namespace + name` lookup tables.
#[derive(Default)]
pub(crate) struct Index {
    getters: BTreeMap<String, GetterHandler>,
    mutations: BTreeMap<String, MutationEntry>,
    actions: BTreeMap<String, ActionHandler>,
}

impl Index {
    fn build(trie: &ModuleTrie) -> Result<Index, Error> {
        let mut index = Index::default();
        let mut duplicate = None;

        trie.walk(Path::root(), &mut |path, module| {
            if duplicate.is_some() {
                return;
            }
            for (name, getter) in &module.getters {
                let key = format!("{}{}", module.namespace, name);
                if index.getters.insert(key.clone(), getter.clone()).is_some() {
                    duplicate = Some((HandlerKind::Getter, key));
                    return;
                }
            }
            for (name, handler) in &module.mutations {
                let key = format!("{}{}", module.namespace, name);
                let entry = MutationEntry {
                    path: path.clone(),
                    handler: handler.clone(),
                };
                if index.mutations.insert(key.clone(), entry).is_some() {
                    duplicate = Some((HandlerKind::Mutation, key));
                    return;
                }
            }
            for (name, action) in &module.actions {
                let key = format!("{}{}", module.namespace, name);
                if index.actions.insert(key.clone(), action.clone()).is_some() {
                    duplicate = Some((HandlerKind::Action, key));
                    return;
                }
            }
        });

        match duplicate {
            Some((kind, name)) => Err(Error::DuplicateKey { kind, name }),
            None => Ok(index),
        }
    }
}

/// A merged, indexed trie waiting to replace the live one.
pub(crate) struct HotUpdate {
    trie: ModuleTrie,
    index: Index,
    added: Vec<(Path, ModuleDefinition)>,
}

impl HotUpdate {
    /// Subtrees new to the store, whose state still has to be created.
    pub fn added(&self) -> &[(Path, ModuleDefinition)] {
        &self.added
    }
}

/// The module trie plus its flattened index.
pub(crate) struct Registry {
    trie: ModuleTrie,
    index: Index,
}

impl Registry {
    pub fn new(root: &ModuleDefinition) -> Result<Self, Error> {
        let trie = ModuleTrie::from_definition(root, String::new());
        let index = Index::build(&trie)?;
        Ok(Self { trie, index })
    }

    /// Swap in a candidate trie if it indexes cleanly.
    fn commit(&mut self, candidate: ModuleTrie) -> Result<(), Error> {
        self.index = Index::build(&candidate)?;
        self.trie = candidate;
        Ok(())
    }

    pub fn register(
        &mut self,
        path: &Path,
        namespace: String,
        definition: &ModuleDefinition,
    ) -> Result<(), Error> {
        let (Some(parent), Some(key)) = (path.parent(), path.last()) else {
            return Err(Error::RootModule);
        };
        if self.trie.get(&parent).is_none() {
            return Err(Error::ModuleNotFound { path: parent });
        }
        if self.trie.get(path).is_some() {
            return Err(Error::ModuleExists { path: path.clone() });
        }

        let mut candidate = self.trie.clone();
        let parent_node = candidate
            .get_node_mut(&parent)
            .ok_or_else(|| Error::ModuleNotFound {
                path: parent.clone(),
            })?;
        parent_node.children.insert(
            key.to_string(),
            ModuleTrie::from_definition(definition, namespace),
        );
        self.commit(candidate)
    }

    pub fn unregister(&mut self, path: &Path) -> Result<(), Error> {
        if path.is_root() {
            return Err(Error::RootModule);
        }
        let mut candidate = self.trie.clone();
        candidate
            .remove_subtree(path)
            .ok_or_else(|| Error::ModuleNotFound { path: path.clone() })?;
        self.commit(candidate)
    }

    /// Merge `definition` into a copy of the trie and index it, without
    /// touching the live registry.
    pub fn prepare_hot_update(&self, definition: &ModuleDefinition) -> Result<HotUpdate, Error> {
        let mut trie = self.trie.clone();
        let mut added = Vec::new();
        trie.merge(definition, &Path::root(), String::new(), &mut added)?;
        let index = Index::build(&trie)?;
        Ok(HotUpdate { trie, index, added })
    }

    pub fn apply(&mut self, update: HotUpdate) {
        self.trie = update.trie;
        self.index = update.index;
    }

    #[cfg(test)]
    fn hot_update(
        &mut self,
        definition: &ModuleDefinition,
    ) -> Result<Vec<(Path, ModuleDefinition)>, Error> {
        let update = self.prepare_hot_update(definition)?;
        let added = update.added.clone();
        self.apply(update);
        Ok(added)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.trie.get(path).is_some()
    }

    /// Keys of the modules nested directly under `path`.
    pub fn child_keys(&self, path: &Path) -> Vec<String> {
        self.trie
            .get_node(path)
            .map(|node| node.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn namespace_of(&self, path: &Path) -> Option<&str> {
        self.trie.get(path).map(|m| m.namespace.as_str())
    }

    pub fn getter(&self, name: &str) -> Option<GetterHandler> {
        self.index.getters.get(name).cloned()
    }

    pub fn getter_names(&self) -> Vec<String> {
        self.index.getters.keys().cloned().collect()
    }

    pub fn mutation(&self, name: &str) -> Option<MutationEntry> {
        self.index.mutations.get(name).cloned()
    }

    pub fn action(&self, name: &str) -> Option<ActionHandler> {
        self.index.actions.get(name).cloned()
    }

    pub fn has_mutation(&self, name: &str) -> bool {
        self.index.mutations.contains_key(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.index.actions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::GetterValue;
    use crate::path;
    use serde_json::json;
    use std::rc::Rc;

    fn counter(namespaced: bool) -> ModuleDefinition {
        let mut def = ModuleDefinition::new();
        def.namespaced = namespaced;
        def.getters.insert(
            "double".to_string(),
            Rc::new(|| Ok(GetterValue::Value(json!(2)))),
        );
        def.mutations
            .insert("inc".to_string(), Rc::new(|_state, _payload| Ok(())));
        def
    }

    #[test]
    fn flattens_with_namespaces() {
        let mut root = ModuleDefinition::new();
        root.modules.insert("foo".to_string(), counter(true));
        root.modules.insert("plain".to_string(), {
            let mut def = ModuleDefinition::new();
            def.namespaced = false;
            def.mutations
                .insert("reset".to_string(), Rc::new(|_state, _payload| Ok(())));
            def
        });

        let registry = Registry::new(&root).unwrap();
        assert!(registry.has_mutation("foo/inc"));
        assert!(registry.has_mutation("reset"));
        assert!(!registry.has_mutation("plain/reset"));
        assert_eq!(registry.getter_names(), vec!["foo/double".to_string()]);
        assert_eq!(
            registry.mutation("foo/inc").unwrap().path,
            path!("foo")
        );
    }

    #[test]
    fn duplicate_names_fail_fast() {
        let mut root = ModuleDefinition::new();
        root.modules.insert("a".to_string(), counter(false));
        root.modules.insert("b".to_string(), counter(false));

        assert!(matches!(
            Registry::new(&root),
            Err(Error::DuplicateKey {
                kind: HandlerKind::Getter,
                ..
            })
        ));
    }

    #[test]
    fn failed_register_leaves_registry_unchanged() {
        let mut root = ModuleDefinition::new();
        root.modules.insert("a".to_string(), counter(false));
        let mut registry = Registry::new(&root).unwrap();

        let err = registry.register(&path!("b"), String::new(), &counter(false));
        assert!(matches!(err, Err(Error::DuplicateKey { .. })));
        assert!(!registry.contains(&path!("b")));
        assert!(registry.has_mutation("inc"));
    }

    #[test]
    fn register_and_unregister() {
        let mut registry = Registry::new(&ModuleDefinition::new()).unwrap();

        registry
            .register(&path!("foo"), "foo/".to_string(), &counter(true))
            .unwrap();
        assert!(registry.has_mutation("foo/inc"));
        assert_eq!(registry.namespace_of(&path!("foo")), Some("foo/"));

        assert!(matches!(
            registry.register(&path!("foo"), "foo/".to_string(), &counter(true)),
            Err(Error::ModuleExists { .. })
        ));
        assert!(matches!(
            registry.register(&path!("missing/foo"), String::new(), &counter(true)),
            Err(Error::ModuleNotFound { .. })
        ));

        registry.unregister(&path!("foo")).unwrap();
        assert!(!registry.has_mutation("foo/inc"));
        assert!(matches!(
            registry.unregister(&Path::root()),
            Err(Error::RootModule)
        ));
    }

    #[test]
    fn hot_update_reports_added_modules() {
        let mut root = ModuleDefinition::new();
        root.modules.insert("foo".to_string(), counter(true));
        let mut registry = Registry::new(&root).unwrap();

        let mut next = ModuleDefinition::new();
        next.modules.insert("foo".to_string(), ModuleDefinition::new());
        next.modules.insert("bar".to_string(), counter(true));

        let added = registry.hot_update(&next).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].0, path!("bar"));
        // foo's handlers were replaced by the empty definition.
        assert!(!registry.has_mutation("foo/inc"));
        assert!(registry.has_mutation("bar/inc"));
    }

    #[test]
    fn hot_update_follows_new_namespaces() {
        let mut root = ModuleDefinition::new();
        root.modules.insert("foo".to_string(), counter(true));
        let mut registry = Registry::new(&root).unwrap();

        let mut next = ModuleDefinition::new();
        next.modules.insert("foo".to_string(), counter(false));

        registry.hot_update(&next).unwrap();
        assert_eq!(registry.namespace_of(&path!("foo")), Some(""));
        assert!(registry.has_mutation("inc"));
        assert!(!registry.has_mutation("foo/inc"));
    }
}
