use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use smartstore_engine::{
    path, ActionFuture, Diagnostic, Diagnostics, Error, GetterValue, ModuleDefinition,
    RegisterOptions, Store, StoreOptions, Value, WeakStore,
};

fn counter(namespaced: bool, start: i64) -> ModuleDefinition {
    let mut def = ModuleDefinition::new();
    def.namespaced = namespaced;
    def.state = Some(Rc::new(move || Ok(json!({ "value": start }))));
    def.mutations.insert(
        "inc".to_string(),
        Rc::new(|state: &mut Value, payload: Value| {
            let next = state["value"].as_i64().unwrap_or(0) + payload.as_i64().unwrap_or(1);
            state["value"] = json!(next);
            Ok(())
        }),
    );
    def
}

#[test]
fn test_nested_namespaces() {
    let mut bar = counter(true, 5);
    bar.modules.insert("baz".to_string(), counter(true, 7));

    let mut foo = counter(false, 1);
    foo.modules.insert("bar".to_string(), bar);

    let mut root = ModuleDefinition::new();
    root.modules.insert("foo".to_string(), foo);

    let store = Store::new(root, StoreOptions::default()).unwrap();
    assert_eq!(
        store.state(),
        json!({
            "foo": {
                "value": 1,
                "bar": { "value": 5, "baz": { "value": 7 } }
            }
        })
    );

    // foo is not namespaced and does not pass its prefix down.
    assert!(store.has_mutation("inc"));
    assert!(store.has_mutation("bar/inc"));
    assert!(store.has_mutation("bar/baz/inc"));
    assert_eq!(store.namespace_of(&path!("foo/bar/baz")).unwrap(), "bar/baz/");

    store.commit("bar/baz/inc", json!(3)).unwrap();
    assert_eq!(store.state()["foo"]["bar"]["baz"]["value"], json!(10));
}

#[test]
fn test_getters_read_through_store() {
    let store_slot: Rc<RefCell<Option<WeakStore>>> = Rc::default();

    let mut foo = counter(true, 2);
    let slot = store_slot.clone();
    foo.getters.insert(
        "double".to_string(),
        Rc::new(move || {
            let store = slot.borrow().as_ref().and_then(|w| w.upgrade());
            let value = store
                .and_then(|s| s.state_at(&path!("foo")))
                .map(|s| s["value"].as_i64().unwrap_or(0))
                .unwrap_or(0);
            Ok(GetterValue::Value(json!(value * 2)))
        }),
    );
    foo.getters.insert(
        "plus".to_string(),
        Rc::new(|| {
            Ok(GetterValue::Method(Rc::new(|arg: Value| {
                Ok(json!(arg.as_i64().unwrap_or(0) + 1))
            })))
        }),
    );

    let mut root = ModuleDefinition::new();
    root.modules.insert("foo".to_string(), foo);

    let slot = store_slot.clone();
    let options = StoreOptions::default().with_plugin(move |store| {
        *slot.borrow_mut() = Some(store.downgrade());
        Ok(())
    });
    let store = Store::new(root, options).unwrap();

    assert_eq!(store.getter("foo/double").unwrap(), json!(4));
    assert_eq!(store.call_getter("foo/plus", json!(1)).unwrap(), json!(2));
    assert!(matches!(
        store.getter("foo/plus"),
        Err(Error::IsAMethod { .. })
    ));
    assert!(matches!(
        store.getter("double"),
        Err(Error::UnknownGetter { .. })
    ));
    assert_eq!(
        store.getter_names(),
        vec!["foo/double".to_string(), "foo/plus".to_string()]
    );
}

#[tokio::test]
async fn test_dispatch_runs_action() {
    let store_slot: Rc<RefCell<Option<WeakStore>>> = Rc::default();

    let mut foo = counter(true, 0);
    let slot = store_slot.clone();
    foo.actions.insert(
        "incTwice".to_string(),
        Rc::new(move |payload: Value| -> ActionFuture {
            let store = slot.borrow().as_ref().and_then(|w| w.upgrade());
            Box::pin(async move {
                let Some(store) = store else {
                    return Ok(Value::Null);
                };
                store.commit("foo/inc", payload.clone())?;
                store.commit("foo/inc", payload)?;
                Ok::<_, Error>(store.state()["foo"]["value"].clone())
            })
        }),
    );

    let mut root = ModuleDefinition::new();
    root.modules.insert("foo".to_string(), foo);

    let slot = store_slot.clone();
    let options = StoreOptions::default().with_plugin(move |store| {
        *slot.borrow_mut() = Some(store.downgrade());
        Ok(())
    });
    let store = Store::new(root, options).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe_action(move |record, _| sink.borrow_mut().push(record.name.clone()));

    let result = store.dispatch("foo/incTwice", json!(2)).await.unwrap();
    assert_eq!(result, json!(4));
    assert_eq!(seen.borrow().as_slice(), &["foo/incTwice".to_string()]);
}

#[test]
fn test_collision_leaves_store_unchanged() {
    let mut root = ModuleDefinition::new();
    root.modules.insert("a".to_string(), counter(false, 1));
    let store = Store::new(root, StoreOptions::default()).unwrap();

    let result = store.register_module(
        &path!("b"),
        "",
        &counter(false, 9),
        RegisterOptions::default(),
    );
    assert!(matches!(result, Err(Error::DuplicateKey { .. })));
    assert_eq!(store.state(), json!({ "a": { "value": 1 } }));
    assert!(!store.has_module(&path!("b")));

    store.commit("inc", json!(1)).unwrap();
    assert_eq!(store.state(), json!({ "a": { "value": 2 } }));
}

#[test]
fn test_hot_update_adds_new_modules() {
    let mut root = ModuleDefinition::new();
    root.modules.insert("foo".to_string(), counter(true, 1));
    let store = Store::new(root, StoreOptions::default()).unwrap();
    store.commit("foo/inc", json!(1)).unwrap();

    let mut next = ModuleDefinition::new();
    next.modules.insert("foo".to_string(), counter(true, 100));
    next.modules.insert("bar".to_string(), counter(true, 3));
    store.hot_update(next).unwrap();

    // Existing state untouched, new module initialised.
    assert_eq!(
        store.state(),
        json!({ "foo": { "value": 2 }, "bar": { "value": 3 } })
    );
    store.commit("bar/inc", json!(1)).unwrap();
    assert_eq!(store.state()["bar"]["value"], json!(4));
}

#[test]
fn test_diagnostics_hook() {
    let seen = Rc::new(RefCell::new(Vec::<Diagnostic>::new()));
    let sink = seen.clone();
    let options = StoreOptions::default()
        .with_diagnostics(Diagnostics::off().with_hook(move |d| sink.borrow_mut().push(d.clone())));
    let store = Store::new(ModuleDefinition::new(), options).unwrap();

    store.diagnostics().report(Diagnostic {
        code: "custom",
        message: "hello".to_string(),
    });
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].to_string(), "[smartstore] hello");
}

#[test]
fn test_handler_errors_propagate() {
    let mut root = ModuleDefinition::new();
    root.mutations.insert(
        "fail".to_string(),
        Rc::new(|_state: &mut Value, _payload: Value| {
            Err(Error::handler(std::io::Error::other("nope")))
        }),
    );
    let store = Store::new(root, StoreOptions::default()).unwrap();

    let err = store.commit("fail", Value::Null).unwrap_err();
    assert_eq!(err.to_string(), "nope");
}
