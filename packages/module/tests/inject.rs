mod common;

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use common::{Counter, CounterActions, CounterGetters, CounterMutations};
use smartstore::{
    boxed, inject, inject_with, ActionContext, ActionMembers, ActionResult, Actions, Diagnostic,
    Diagnostics, Error, Injected, Stub, Value,
};

type Log = Rc<RefCell<Vec<(String, Value)>>>;

fn recording(log: &Log) -> Stub {
    let commits = log.clone();
    let dispatches = log.clone();
    Stub::new()
        .commit(move |name, payload| {
            commits.borrow_mut().push((format!("commit:{}", name), payload));
            Ok(())
        })
        .dispatch(move |name, payload| {
            dispatches
                .borrow_mut()
                .push((format!("dispatch:{}", name), payload));
            Ok(json!(42))
        })
}

#[test]
fn test_getters_use_stubbed_state_and_getters() {
    let stub = Stub::new()
        .state(Counter { value: 5 })
        .unwrap()
        .getter("double", json!(100));
    let getters: Injected<CounterGetters> = inject(stub).unwrap();

    assert_eq!(getters.get::<i64>("double").unwrap(), 10);
    assert_eq!(getters.call::<_, i64>("plus", 1).unwrap(), 6);
    // Sibling reads go through the stubbed getters.
    assert_eq!(getters.get::<i64>("quadruple").unwrap(), 200);

    let cx = getters.getter_context().unwrap();
    assert_eq!(cx.state().unwrap(), Counter { value: 5 });
    assert_eq!(cx.getters().unwrap().names(), &["double"]);
}

#[test]
fn test_mutations_apply_to_stub_state() {
    let mutations: Injected<CounterMutations> =
        inject(Stub::new().state(Counter { value: 1 }).unwrap()).unwrap();

    mutations.apply("inc", 4).unwrap();
    assert_eq!(mutations.state_as::<Counter>().unwrap().value, 5);
    mutations.apply("reset", ()).unwrap();
    assert_eq!(mutations.state_value().unwrap(), json!({ "value": 0 }));

    assert!(matches!(
        mutations.apply("missing", ()),
        Err(Error::UnknownMember { .. })
    ));
}

#[test]
fn test_mutations_need_state() {
    let mutations: Injected<CounterMutations> = inject(Stub::new()).unwrap();
    assert!(matches!(
        mutations.apply("inc", 1),
        Err(Error::NotProvided { ref member }) if member == "state"
    ));
}

#[tokio::test]
async fn test_actions_call_stubs_with_names_and_payloads() {
    let log: Log = Rc::default();
    let actions: Injected<CounterActions> = inject(
        recording(&log)
            .state(Counter { value: 7 })
            .unwrap(),
    )
    .unwrap();

    assert_eq!(actions.run("incAsync", 3).await.unwrap(), 7);
    assert_eq!(actions.run("incViaDispatch", 2).await.unwrap(), 42);
    actions.run("incTwice", 1).await.unwrap();

    assert_eq!(
        log.borrow().as_slice(),
        &[
            ("commit:inc".to_string(), json!(3)),
            ("dispatch:incAsync".to_string(), json!(2)),
            ("commit:inc".to_string(), json!(1)),
            ("commit:inc".to_string(), json!(1)),
        ]
    );
}

#[derive(Default)]
struct Chain;

impl Chain {
    fn first<'a>(&'a self, cx: &'a ActionContext, n: i64) -> ActionResult<'a, Value> {
        boxed(async move { cx.local("second", n).await })
    }

    fn second<'a>(&'a self, cx: &'a ActionContext, n: i64) -> ActionResult<'a, i64> {
        boxed(async move {
            cx.commit("record", n)?;
            Ok::<_, Error>(n * 2)
        })
    }
}

impl Actions for Chain {
    type State = Value;

    fn define(members: &mut ActionMembers<Self>) {
        members
            .action("first", Self::first)
            .action("second", Self::second);
    }
}

#[tokio::test]
async fn test_local_action_calls_are_reported() {
    let log: Log = Rc::default();
    let seen = Rc::new(RefCell::new(Vec::<Diagnostic>::new()));
    let sink = seen.clone();
    let stub = recording(&log)
        .diagnostics(Diagnostics::off().with_hook(move |d| sink.borrow_mut().push(d.clone())));
    let chain = inject_with(Chain, stub).unwrap();

    assert_eq!(chain.run("first", 4).await.unwrap(), 8);
    assert_eq!(log.borrow().len(), 1);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].code, "action-self-call");
    assert!(seen[0].message.contains("'first'"));
    assert!(seen[0].message.contains("'second'"));
}
