//! Navigation boundary.

use parking_lot::Mutex;

/// Where the application currently is, and how to move it.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    /// Navigate to `path`. With `replace` the current history entry is
    /// overwritten instead of pushing a new one.
    fn set_path(&self, path: &str, replace: bool);
}

/// Navigator that keeps its history in memory. Used by headless clients,
/// which have no router of their own.
#[derive(Debug)]
pub struct MemoryNavigator {
    history: Mutex<Vec<(String, bool)>>,
}

impl MemoryNavigator {
    pub fn new(initial_path: impl Into<String>) -> Self {
        Self {
            history: Mutex::new(vec![(initial_path.into(), false)]),
        }
    }

    /// Every navigation so far as `(path, replace)`, starting with the initial path.
    pub fn history(&self) -> Vec<(String, bool)> {
        self.history.lock().clone()
    }

    /// Number of navigations that replaced the current entry.
    pub fn replace_count(&self) -> usize {
        self.history
            .lock()
            .iter()
            .skip(1)
            .filter(|(_, replace)| *replace)
            .count()
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.history
            .lock()
            .last()
            .map(|(path, _)| path.clone())
            .unwrap_or_default()
    }

    fn set_path(&self, path: &str, replace: bool) {
        tracing::debug!(path, replace, "Navigating");
        self.history.lock().push((path.to_string(), replace));
    }
}
