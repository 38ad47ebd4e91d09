//! Client session flags
//!
//! A small finite-state record for the per-session client flags that would
//! otherwise live as ambient globals: liveness (mounted/unmounted) and the
//! single-owner navigation claim. Reset transitions are explicit edges.

use crate::core::thread::ThreadId;

/// Per-session client state record
///
/// The navigation claim can succeed only after a thread id has been
/// recorded, which guarantees observers see the new identifier before any
/// navigation effect fires.
#[derive(Debug, Clone, Default)]
pub struct SessionFlags {
    mounted: bool,
    navigated: bool,
    thread: Option<ThreadId>,
}

impl SessionFlags {
    /// A freshly mounted session with no navigation claim.
    pub fn mounted() -> Self {
        Self {
            mounted: true,
            navigated: false,
            thread: None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn has_navigated(&self) -> bool {
        self.navigated
    }

    pub fn thread(&self) -> Option<&ThreadId> {
        self.thread.as_ref()
    }

    /// Record the thread identifier. Must happen before any navigation
    /// claim can succeed.
    pub fn set_thread(&mut self, thread: ThreadId) {
        self.thread = Some(thread);
    }

    /// Claim the navigation for this session.
    ///
    /// Returns the thread to navigate to exactly once; every later call is
    /// a no-op until [`reset_navigation`](Self::reset_navigation). Fails
    /// (returns `None`) while unmounted or before the thread id is set.
    pub fn claim_navigation(&mut self) -> Option<ThreadId> {
        if !self.mounted || self.navigated {
            return None;
        }
        let thread = self.thread.clone()?;
        self.navigated = true;
        Some(thread)
    }

    /// Explicit reset edge, e.g. a user-initiated "start over".
    pub fn reset_navigation(&mut self) {
        self.navigated = false;
    }

    /// Teardown edge: pending callbacks must check liveness before acting.
    pub fn unmount(&mut self) {
        self.mounted = false;
    }
}
