//! Change tokens: single-shot notifications of configuration edits.
//!
//! A token is armed at the tree's current generation and fires once any
//! later batch commits. It never resets: to observe the next edit, acquire a
//! fresh token from the tree. Because firing is decided by comparing
//! generations, an edit that lands between two acquisitions is never lost:
//! a token armed after it simply starts out unfired, and one armed before it
//! is already fired when awaited.

use tokio::sync::watch;

/// Single-shot, level-triggered change notification for a
/// [`ConfigTree`](super::ConfigTree).
#[derive(Clone, Debug)]
pub struct ChangeToken {
    rx: watch::Receiver<u64>,
    armed_at: u64,
}

impl ChangeToken {
    pub(crate) fn new(rx: watch::Receiver<u64>) -> Self {
        let armed_at = *rx.borrow();
        Self { rx, armed_at }
    }

    /// Generation of the tree when this token was armed.
    pub fn generation(&self) -> u64 {
        self.armed_at
    }

    /// Whether at least one edit batch has committed since arming.
    pub fn has_changed(&self) -> bool {
        *self.rx.borrow() != self.armed_at
    }

    /// Wait until the token fires.
    ///
    /// Returns immediately if it already has. Returns `false` when the tree
    /// has been dropped and can no longer change.
    pub async fn changed(&mut self) -> bool {
        let armed_at = self.armed_at;
        self.rx.wait_for(|generation| *generation != armed_at).await.is_ok()
    }
}
