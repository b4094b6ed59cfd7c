//! Self-access diagnostics for live member instances.
//!
//! Members are meant to reach sibling members through the store (getters
//! through `getters()`, mutations through a commit, actions through a
//! dispatch). Direct `local` access still works, but when diagnostics are on
//! the guard reports which member reached which.

use std::cell::RefCell;

use smartstore_engine::{Diagnostic, Diagnostics, HandlerKind};

pub(crate) struct Guard {
    kind: HandlerKind,
    diagnostics: Option<Diagnostics>,
    active: RefCell<Vec<String>>,
}

impl Guard {
    /// A guard that only tracks anything when `diagnostics` is enabled.
    pub fn new(kind: HandlerKind, diagnostics: &Diagnostics) -> Self {
        Self {
            kind,
            diagnostics: diagnostics.is_enabled().then(|| diagnostics.clone()),
            active: RefCell::new(Vec::new()),
        }
    }

    /// Mark `name` as running until the returned scope is dropped.
    pub fn enter(&self, name: &str) -> Scope<'_> {
        if self.diagnostics.is_none() {
            return Scope { guard: None };
        }
        self.active.borrow_mut().push(name.to_string());
        Scope {
            guard: Some((self, name.to_string())),
        }
    }

    /// Report a direct access to `accessed` from inside another member.
    pub fn check_local(&self, accessed: &str) {
        let Some(diagnostics) = &self.diagnostics else {
            return;
        };
        let accessor = match self.active.borrow().last() {
            Some(accessor) if accessor != accessed => accessor.clone(),
            _ => return,
        };
        diagnostics.report(self.diagnostic(&accessor, accessed));
    }

    fn diagnostic(&self, accessor: &str, accessed: &str) -> Diagnostic {
        let (code, advice) = match self.kind {
            HandlerKind::Getter => ("getter-self-access", "read it through getters()"),
            HandlerKind::Mutation => ("mutation-self-call", "commit it from an action"),
            HandlerKind::Action => ("action-self-call", "dispatch it or use actions()"),
        };
        Diagnostic {
            code,
            message: format!(
                "{} '{}' accessed {} '{}' directly; {} instead",
                self.kind, accessor, self.kind, accessed, advice
            ),
        }
    }
}

/// Keeps a member marked as active.
pub(crate) struct Scope<'a> {
    guard: Option<(&'a Guard, String)>,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        let Some((guard, name)) = &self.guard else {
            return;
        };
        let mut active = guard.active.borrow_mut();
        // Async members may finish out of order.
        if let Some(pos) = active.iter().rposition(|n| n == name) {
            active.remove(pos);
        }
    }
}
