//! Optional event hooks invoked synchronously from the run loop.

use crate::subprocess::Subprocess;

/// Callback receiving the process the event concerns.
pub type Hook = Box<dyn FnMut(&Subprocess) + Send>;

/// The three lifecycle hooks. Any of them may be unset.
#[derive(Default)]
pub struct Hooks {
    pub(crate) on_start: Option<Hook>,
    pub(crate) on_wait: Option<Hook>,
    pub(crate) on_timeout: Option<Hook>,
}

impl Hooks {
    /// Fired right after a process is spawned and registered.
    pub(crate) fn started(&mut self, subprocess: &Subprocess) {
        if let Some(hook) = self.on_start.as_mut() {
            hook(subprocess);
        }
    }

    /// Fired once per reaped process, after its final output drain.
    pub(crate) fn waited(&mut self, subprocess: &Subprocess) {
        if let Some(hook) = self.on_wait.as_mut() {
            hook(subprocess);
        }
    }

    /// Fired just before a process is force-terminated.
    pub(crate) fn timed_out(&mut self, subprocess: &Subprocess) {
        if let Some(hook) = self.on_timeout.as_mut() {
            hook(subprocess);
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_wait", &self.on_wait.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}
