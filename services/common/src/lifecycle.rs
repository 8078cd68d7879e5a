//! Component lifecycle state

/// Explicit lifecycle for start/stop-able components.
///
/// Components own their state instead of a bare running flag;
/// in-flight completions check [`Lifecycle::is_running`] before
/// mutating shared structures so a completion racing a shutdown
/// becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, never started
    Created,
    /// Accepting work
    Running,
    /// Shutdown requested, draining
    Stopping,
    /// Fully stopped
    Stopped,
}

impl Lifecycle {
    /// Whether the component should process new work.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}
