//! Change-token reload loop shared by clients and agents.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use aiconf_core::{ChangeToken, ConfigTree};

/// Something that re-reads its configuration when the tree changes.
#[async_trait]
pub(crate) trait OnChange: Send + Sync + 'static {
    /// Name for logs.
    fn watch_name(&self) -> String;

    async fn on_change(&self);
}

/// Spawn the loop that calls `target.on_change()` after every edit batch.
///
/// `token` must have been armed before `target` first read the tree. Each
/// cycle acquires the next token before calling `on_change`, so an edit that
/// lands during a reload fires the new token and triggers another cycle.
/// The loop holds only a weak reference and ends when `shutdown` fires or
/// the target is dropped.
pub(crate) fn spawn_watch_loop<T: OnChange>(
    target: &Arc<T>,
    tree: ConfigTree,
    mut token: ChangeToken,
    shutdown: CancellationToken,
) {
    let weak: Weak<T> = Arc::downgrade(target);
    let name = target.watch_name();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                alive = token.changed() => {
                    if !alive {
                        break;
                    }
                }
            }

            token = tree.change_token();
            let Some(target) = weak.upgrade() else {
                break;
            };
            target.on_change().await;
        }
        debug!(target = %name, "Watch loop stopped");
    });
}
