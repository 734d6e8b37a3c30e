//! Debounced saver task.
//!
//! State mutations mark dirty buckets on an unbounded channel. The saver
//! coalesces marks for a short window, then flushes each dirty bucket as
//! one whole-bucket write. A burst of chat traffic therefore costs one
//! database write per bucket, not one per message. The channel closing
//! triggers a final flush, which is how shutdown drains pending work.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::shadow::ShadowFile;
use super::Store;
use crate::state::{AppState, Bucket};

pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct Saver {
    state: Arc<Mutex<AppState>>,
    store: Arc<Store>,
    shadow: ShadowFile,
    rx: mpsc::UnboundedReceiver<Bucket>,
    debounce: Duration,
}

impl Saver {
    pub fn new(
        state: Arc<Mutex<AppState>>,
        store: Arc<Store>,
        shadow: ShadowFile,
        rx: mpsc::UnboundedReceiver<Bucket>,
    ) -> Self {
        Self {
            state,
            store,
            shadow,
            rx,
            debounce: DEBOUNCE,
        }
    }

    #[cfg(test)]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Run until the dirty channel closes, then flush once more and exit.
    pub async fn run(mut self) {
        loop {
            let Some(first) = self.rx.recv().await else {
                break;
            };
            let mut dirty = HashSet::new();
            dirty.insert(first);

            // Absorb marks until the window goes quiet.
            loop {
                match tokio::time::timeout(self.debounce, self.rx.recv()).await {
                    Ok(Some(bucket)) => {
                        dirty.insert(bucket);
                    }
                    Ok(None) => {
                        self.flush(&dirty);
                        return;
                    }
                    Err(_) => break,
                }
            }
            self.flush(&dirty);
        }
        debug!("saver channel closed, exiting");
    }

    fn flush(&self, dirty: &HashSet<Bucket>) {
        debug!(buckets = dirty.len(), "flushing dirty state");

        // Snapshot under the lock, write after releasing it.
        let (bots, personas, histories, sessions, usage) = {
            let state = self.state.lock().unwrap();
            (
                dirty.contains(&Bucket::Bots).then(|| state.bots()),
                dirty.contains(&Bucket::Personas).then(|| state.personas()),
                dirty
                    .contains(&Bucket::Messages)
                    .then(|| state.histories().clone()),
                dirty
                    .contains(&Bucket::Sessions)
                    .then(|| state.sessions().to_vec()),
                dirty.contains(&Bucket::Usage).then(|| state.usage.export()),
            )
        };

        if let Some(bots) = &bots {
            if let Err(err) = self.store.save_bots(bots) {
                error!(error = %err, "failed to persist bots");
            }
        }
        if let Some(personas) = &personas {
            if let Err(err) = self.store.save_personas(personas) {
                error!(error = %err, "failed to persist personas");
            }
        }
        if let Some(histories) = &histories {
            if let Err(err) = self.store.save_messages(histories) {
                error!(error = %err, "failed to persist messages");
            }
        }
        if let Some(sessions) = &sessions {
            if let Err(err) = self.store.save_sessions(sessions) {
                error!(error = %err, "failed to persist sessions");
            }
        }
        if let Some(usage) = &usage {
            if let Err(err) = self.store.save_usage(usage) {
                error!(error = %err, "failed to persist usage");
            }
        }
        // Keys are written through the store synchronously at the call
        // site, so a Keys mark needs no work here.

        // Mirror bots and personas to the shadow file whenever either
        // changed, refreshing the untouched half from state.
        if bots.is_some() || personas.is_some() {
            let (shadow_bots, shadow_personas) = {
                let state = self.state.lock().unwrap();
                (state.bots(), state.personas())
            };
            if let Err(err) = self.shadow.write(&shadow_bots, &shadow_personas) {
                error!(error = %err, "failed to write shadow snapshot");
            }
        }
    }
}
