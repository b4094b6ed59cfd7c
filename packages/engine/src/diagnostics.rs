//! Non-fatal diagnostics channel.
//!
//! Diagnostics report misuse that does not break the store (for example a
//! getter reading a sibling getter directly instead of through the store).
//! They are logged through `tracing` and optionally forwarded to a hook.

use std::fmt;
use std::rc::Rc;

/// Environment variable that overrides the default diagnostics mode.
///
/// `off` disables diagnostics, `warn` enables them. Any other value (or no
/// value) falls back to the build profile: enabled in debug builds.
pub const DIAGNOSTICS_ENV: &str = "SMARTSTORE_DIAGNOSTICS";

/// A single diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable identifier of the diagnostic kind.
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[smartstore] {}", self.message)
    }
}

type Hook = Rc<dyn Fn(&Diagnostic)>;

/// Diagnostics configuration carried by a store.
#[derive(Clone)]
pub struct Diagnostics {
    enabled: bool,
    hook: Option<Hook>,
}

impl Diagnostics {
    /// Diagnostics switched off. Guard rails are skipped entirely.
    pub fn off() -> Self {
        Self {
            enabled: false,
            hook: None,
        }
    }

    /// Diagnostics switched on, logged as warnings.
    pub fn warn() -> Self {
        Self {
            enabled: true,
            hook: None,
        }
    }

    /// Resolve the mode from [`DIAGNOSTICS_ENV`] and the build profile.
    pub fn from_env() -> Self {
        match std::env::var(DIAGNOSTICS_ENV).as_deref() {
            Ok("off") => Self::off(),
            Ok("warn") => Self::warn(),
            _ if cfg!(debug_assertions) => Self::warn(),
            _ => Self::off(),
        }
    }

    /// Forward every reported diagnostic to `hook`, and enable reporting.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn(&Diagnostic) + 'static) -> Self {
        self.enabled = true;
        self.hook = Some(Rc::new(hook));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Report a diagnostic. No-op when disabled.
    pub fn report(&self, diagnostic: Diagnostic) {
        if !self.enabled {
            return;
        }
        tracing::warn!(code = diagnostic.code, "{}", diagnostic);
        if let Some(hook) = &self.hook {
            hook(&diagnostic);
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::from_env()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("enabled", &self.enabled)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn sample() -> Diagnostic {
        Diagnostic {
            code: "test",
            message: "something odd".to_string(),
        }
    }

    #[test]
    fn hook_receives_reports() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let diagnostics = Diagnostics::off().with_hook(move |d| sink.borrow_mut().push(d.clone()));

        assert!(diagnostics.is_enabled());
        diagnostics.report(sample());
        assert_eq!(seen.borrow().as_slice(), &[sample()]);
    }

    #[test]
    fn off_drops_reports() {
        let diagnostics = Diagnostics::off();
        assert!(!diagnostics.is_enabled());
        diagnostics.report(sample());
    }

    #[test]
    fn display_is_prefixed() {
        assert_eq!(sample().to_string(), "[smartstore] something odd");
    }
}
