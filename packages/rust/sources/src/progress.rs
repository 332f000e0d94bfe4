//! Progress callbacks for the fetch phase.

/// Receives fetch progress. Called from the task driving the fetch, never
/// from the spawned request tasks.
pub trait FetchProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each recipe fetch settles.
    fn recipe_fetched(&self, operation_id: &str, available: bool, current: usize, total: usize);
    /// Called once all inputs are in.
    fn done(&self, unavailable: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn recipe_fetched(
        &self,
        _operation_id: &str,
        _available: bool,
        _current: usize,
        _total: usize,
    ) {
    }
    fn done(&self, _unavailable: usize) {}
}
