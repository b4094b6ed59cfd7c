mod common;

use serde_json::json;

use common::{counter, plain_counter, Counter, CounterMutations};
use smartstore::{
    create_store, engine, hot_update, path, Error, Module, StoreOptions, Value,
};

#[test]
fn test_generates_state_and_members() {
    let foo = counter(1);
    let root = Module::<Value>::builder().module("foo", &foo).build();
    let store = create_store(&root, StoreOptions::default()).unwrap();

    assert_eq!(store.state(), json!({ "foo": { "value": 1 } }));
    assert_eq!(
        store.getter_names(),
        vec!["foo/double", "foo/plus", "foo/quadruple"]
    );
    assert!(store.has_mutation("foo/inc"));
    assert!(store.has_mutation("foo/reset"));
    assert!(store.has_action("foo/incAsync"));
    assert!(!store.has_mutation("inc"));

    assert_eq!(foo.path().unwrap(), path!("foo"));
    assert_eq!(foo.namespace().unwrap(), "foo/");
}

#[test]
fn test_nested_modules_state_and_namespaces() {
    let baz = counter(3);
    let bar = Module::<Counter>::builder()
        .state(|| Counter { value: 2 })
        .module("baz", &baz)
        .build();
    let foo = counter(1);
    let root = Module::<Value>::builder()
        .module("foo", &foo)
        .module("bar", &bar)
        .build();
    let store = create_store(&root, StoreOptions::default()).unwrap();

    assert_eq!(
        store.state(),
        json!({
            "foo": { "value": 1 },
            "bar": { "value": 2, "baz": { "value": 3 } }
        })
    );
    assert_eq!(baz.namespace().unwrap(), "bar/baz/");
    store.commit("bar/baz/inc", json!(4)).unwrap();
    assert_eq!(store.state()["bar"]["baz"]["value"], 7);
    assert_eq!(store.state()["bar"]["value"], 2);
}

#[test]
fn test_module_keys_are_plain_strings() {
    let profile = counter(1);
    let root = Module::<Value>::builder()
        .module("user-profile", &profile)
        .build();
    let store = create_store(&root, StoreOptions::default()).unwrap();

    assert_eq!(store.state(), json!({ "user-profile": { "value": 1 } }));
    assert_eq!(profile.namespace().unwrap(), "user-profile/");
    store.commit("user-profile/inc", json!(2)).unwrap();
    assert_eq!(store.getter("user-profile/double").unwrap(), 6);
}

#[test]
fn test_non_namespaced_child_uses_parent_namespace() {
    let child = plain_counter(1);
    let root = Module::<Value>::builder().module("child", &child).build();
    let store = create_store(&root, StoreOptions::default()).unwrap();

    assert!(store.has_mutation("inc"));
    assert!(!store.has_mutation("child/inc"));
    assert_eq!(child.namespace().unwrap(), "");

    // The state still lives under the module's key.
    store.commit("inc", json!(1)).unwrap();
    assert_eq!(store.state()["child"]["value"], 2);
    assert_eq!(store.getter("double").unwrap(), 4);
}

#[test]
fn test_namespace_short_circuits_below_non_namespaced_parent() {
    let baz = counter(0);
    let bar = Module::<Counter>::builder()
        .namespaced(false)
        .state_default()
        .mutations::<CounterMutations>()
        .module("baz", &baz)
        .build();
    let foo = Module::<Counter>::builder()
        .state_default()
        .module("bar", &bar)
        .build();
    let root = Module::<Value>::builder().module("foo", &foo).build();
    let store = create_store(&root, StoreOptions::default()).unwrap();

    assert_eq!(bar.namespace().unwrap(), "foo/");
    assert_eq!(baz.namespace().unwrap(), "baz/");
    assert!(store.has_mutation("foo/inc"));
    assert!(store.has_mutation("baz/inc"));

    store.commit("baz/inc", json!(5)).unwrap();
    assert_eq!(store.state()["foo"]["bar"]["baz"]["value"], 5);

    // bar's own mutation, addressed under foo's namespace, keeps baz intact.
    store.commit("foo/inc", json!(1)).unwrap();
    assert_eq!(
        store.state()["foo"]["bar"],
        json!({ "value": 1, "baz": { "value": 5 } })
    );
}

#[test]
fn test_same_module_at_two_paths_fails() {
    let shared = counter(0);
    let root = Module::<Value>::builder()
        .module("a", &shared)
        .module("b", &shared)
        .build();

    let err = create_store(&root, StoreOptions::default()).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, Error::ModuleReused { .. }));
    assert!(message.starts_with("[smartstore]"));
    assert!(message.contains("'a'"));
    assert!(message.contains("'b'"));
}

#[test]
fn test_duplicate_allows_reuse() {
    let shared = counter(0);
    let copy = shared.duplicate();
    let root = Module::<Value>::builder()
        .module("a", &shared)
        .module("b", &copy)
        .build();
    let store = create_store(&root, StoreOptions::default()).unwrap();

    store.commit("b/inc", json!(2)).unwrap();
    assert_eq!(store.state(), json!({ "a": { "value": 0 }, "b": { "value": 2 } }));
    assert!(!shared.ptr_eq(&copy));
    assert!(shared.clone().ptr_eq(&shared));
}

#[test]
fn test_compiling_again_at_same_path_is_idempotent() {
    let foo = counter(1);
    let root = Module::<Value>::builder().module("foo", &foo).build();
    let store = create_store(&root, StoreOptions::default()).unwrap();
    store.commit("foo/inc", json!(1)).unwrap();

    hot_update(&store, &root).unwrap();
    assert_eq!(foo.path().unwrap(), path!("foo"));
    assert_eq!(store.state(), json!({ "foo": { "value": 2 } }));
    assert_eq!(store.getter("foo/double").unwrap(), 4);
}

#[test]
fn test_flattened_name_collision_fails_fast() {
    let left = plain_counter(0);
    let right = plain_counter(0);
    let root = Module::<Value>::builder()
        .module("left", &left)
        .module("right", &right)
        .build();

    let err = create_store(&root, StoreOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::Engine(engine::Error::DuplicateKey { .. })
    ));
}

#[test]
fn test_uncompiled_module_reports_lazily() {
    let foo = counter(0);
    assert!(!foo.is_compiled());
    assert!(matches!(foo.path(), Err(Error::NotCompiled { .. })));

    // A context can be taken before compilation and fails only when used.
    let store = create_store(&Module::<Value>::builder().build(), StoreOptions::default())
        .unwrap();
    let cx = foo.context(&store);
    assert!(matches!(cx.namespace(), Err(Error::NotCompiled { .. })));
    assert!(matches!(cx.commit("inc", 1), Err(Error::NotCompiled { .. })));
}
