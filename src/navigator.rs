use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard, PoisonError};

use url::Url;

/// Access to the host's location, modelled after `window.location` and `window.history`.
pub trait Navigator: Debug + Send + Sync {
    /// The URL of the currently displayed page.
    fn current_url(&self) -> Url;

    /// Navigate to `url`, leaving the app. Used to hand over to the authorization server.
    fn assign(&self, url: &Url);

    /// Replace the current history entry with `url` without reloading.
    /// Used to strip the callback parameters from the address bar.
    fn replace(&self, url: &Url);
}

/// In-process [`Navigator`] for non-browser hosts and tests.
///
/// Records every URL navigated to.
#[derive(Debug)]
pub struct MemoryNavigator {
    state: Mutex<NavigatorState>,
}

#[derive(Debug)]
struct NavigatorState {
    current: Url,
    assigned: Vec<Url>,
}

impl MemoryNavigator {
    pub fn new(current: Url) -> Self {
        Self {
            state: Mutex::new(NavigatorState {
                current,
                assigned: Vec::new(),
            }),
        }
    }

    /// Simulate the browser landing on `url`, e.g. after the authorization server redirected back.
    pub fn set_current(&self, url: Url) {
        self.state().current = url;
    }

    /// All URLs passed to [`Navigator::assign`], oldest first.
    pub fn assigned(&self) -> Vec<Url> {
        self.state().assigned.clone()
    }

    pub fn last_assigned(&self) -> Option<Url> {
        self.state().assigned.last().cloned()
    }

    fn state(&self) -> MutexGuard<'_, NavigatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> Url {
        self.state().current.clone()
    }

    fn assign(&self, url: &Url) {
        let mut state = self.state();
        state.assigned.push(url.clone());
        state.current = url.clone();
    }

    fn replace(&self, url: &Url) {
        self.state().current = url.clone();
    }
}

/// `url` without its query and fragment.
pub(crate) fn without_query(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url
}
