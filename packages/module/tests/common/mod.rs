//! Blueprints shared by the integration tests.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use smartstore::{
    boxed, ActionContext, ActionMembers, ActionResult, Actions, GetterContext, GetterMembers,
    Getters, Module, MutationContext, MutationMembers, Mutations, Result,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub value: i64,
}

#[derive(Default)]
pub struct CounterGetters;

impl CounterGetters {
    fn double(&self, cx: &GetterContext<Counter>) -> Result<i64> {
        Ok(cx.state()?.value * 2)
    }

    fn quadruple(&self, cx: &GetterContext<Counter>) -> Result<i64> {
        Ok(cx.getters()?.get::<i64>("double")? * 2)
    }

    fn plus(&self, cx: &GetterContext<Counter>, n: i64) -> Result<i64> {
        Ok(cx.state()?.value + n)
    }
}

impl Getters for CounterGetters {
    type State = Counter;

    fn define(members: &mut GetterMembers<Self>) {
        members
            .getter("double", Self::double)
            .getter("quadruple", Self::quadruple)
            .method("plus", Self::plus);
    }
}

#[derive(Default)]
pub struct CounterMutations;

impl CounterMutations {
    fn inc(&self, cx: &mut MutationContext<'_, Counter>, n: i64) -> Result<()> {
        cx.state.value += n;
        Ok(())
    }

    fn reset(&self, cx: &mut MutationContext<'_, Counter>, _: ()) -> Result<()> {
        cx.state.value = 0;
        Ok(())
    }
}

impl Mutations for CounterMutations {
    type State = Counter;

    fn define(members: &mut MutationMembers<Self>) {
        members
            .mutation("inc", Self::inc)
            .mutation("reset", Self::reset);
    }
}

/// Multiplies every increment by ten.
#[derive(Default)]
pub struct TenfoldMutations;

impl TenfoldMutations {
    fn inc(&self, cx: &mut MutationContext<'_, Counter>, n: i64) -> Result<()> {
        cx.state.value += n * 10;
        Ok(())
    }
}

impl Mutations for TenfoldMutations {
    type State = Counter;

    fn define(members: &mut MutationMembers<Self>) {
        members.mutation("inc", Self::inc);
    }
}

#[derive(Default)]
pub struct CounterActions;

impl CounterActions {
    fn inc_async<'a>(&'a self, cx: &'a ActionContext<Counter>, n: i64) -> ActionResult<'a, i64> {
        boxed(async move {
            cx.commit("inc", n)?;
            cx.state().map(|state| state.value)
        })
    }

    fn inc_twice<'a>(&'a self, cx: &'a ActionContext<Counter>, n: i64) -> ActionResult<'a, ()> {
        boxed(async move {
            let mutations = cx.mutations()?;
            mutations.call("inc", n)?;
            mutations.call("inc", n)
        })
    }

    fn inc_via_dispatch<'a>(
        &'a self,
        cx: &'a ActionContext<Counter>,
        n: i64,
    ) -> ActionResult<'a, i64> {
        boxed(async move { cx.dispatch_as::<_, i64>("incAsync", n).await })
    }
}

impl Actions for CounterActions {
    type State = Counter;

    fn define(members: &mut ActionMembers<Self>) {
        members
            .action("incAsync", Self::inc_async)
            .action("incTwice", Self::inc_twice)
            .action("incViaDispatch", Self::inc_via_dispatch);
    }
}

/// A fully declared counter module starting at `start`.
pub fn counter(start: i64) -> Module<Counter> {
    Module::<Counter>::builder()
        .state(move || Counter { value: start })
        .getters::<CounterGetters>()
        .mutations::<CounterMutations>()
        .actions::<CounterActions>()
        .build()
}

/// Like [`counter`], but not namespaced.
pub fn plain_counter(start: i64) -> Module<Counter> {
    Module::<Counter>::builder()
        .namespaced(false)
        .state(move || Counter { value: start })
        .getters::<CounterGetters>()
        .mutations::<CounterMutations>()
        .build()
}
