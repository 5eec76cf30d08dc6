//! In-process wait/notify engine.
//!
//! A branch that reaches a standing barrier parks on the barrier's uuid and
//! yields its task. The first `done_with` for that uuid resolves every
//! parked receiver and is remembered, so a branch that parks after the
//! release resolves immediately.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::errors::{FlowControlError, Result};
use crate::model::BarrierResponseData;
use crate::service::WaitNotifyEngine;

#[derive(Debug)]
enum Slot {
    Waiting(Vec<oneshot::Sender<BarrierResponseData>>),
    Done(BarrierResponseData),
}

/// Park/resume engine keyed by correlation id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWaitNotify {
    slots: Arc<DashMap<String, Slot>>,
}

/// A parked branch.
#[derive(Debug)]
pub struct WaitHandle {
    correlation_id: String,
    inner: WaitInner,
}

#[derive(Debug)]
enum WaitInner {
    Ready(BarrierResponseData),
    Parked(oneshot::Receiver<BarrierResponseData>),
}

impl WaitHandle {
    /// The correlation id this handle is parked on.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns true if the response is already available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, WaitInner::Ready(_))
    }

    /// Suspends until the correlation id is released.
    pub async fn wait(self) -> Result<BarrierResponseData> {
        match self.inner {
            WaitInner::Ready(response) => Ok(response),
            WaitInner::Parked(rx) => rx.await.map_err(|_| {
                FlowControlError::notify(
                    self.correlation_id,
                    "wait/notify engine dropped before release",
                )
            }),
        }
    }
}

impl InMemoryWaitNotify {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks on `correlation_id`.
    #[must_use]
    pub fn await_done(&self, correlation_id: &str) -> WaitHandle {
        let mut slot = self
            .slots
            .entry(correlation_id.to_string())
            .or_insert_with(|| Slot::Waiting(Vec::new()));

        let inner = match slot.value_mut() {
            Slot::Done(response) => WaitInner::Ready(response.clone()),
            Slot::Waiting(senders) => {
                let (tx, rx) = oneshot::channel();
                senders.push(tx);
                WaitInner::Parked(rx)
            }
        };
        trace!(correlation_id, "Branch parked");

        WaitHandle {
            correlation_id: correlation_id.to_string(),
            inner,
        }
    }

    /// Number of branches currently parked on `correlation_id`.
    #[must_use]
    pub fn pending_waiters(&self, correlation_id: &str) -> usize {
        self.slots
            .get(correlation_id)
            .map_or(0, |slot| match slot.value() {
                Slot::Waiting(senders) => senders.len(),
                Slot::Done(_) => 0,
            })
    }

    /// The response released on `correlation_id`, if any.
    #[must_use]
    pub fn released(&self, correlation_id: &str) -> Option<BarrierResponseData> {
        self.slots
            .get(correlation_id)
            .and_then(|slot| match slot.value() {
                Slot::Done(response) => Some(response.clone()),
                Slot::Waiting(_) => None,
            })
    }

    /// Number of correlation ids the engine holds state for.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }
}

#[async_trait]
impl WaitNotifyEngine for InMemoryWaitNotify {
    async fn done_with(&self, correlation_id: &str, response: BarrierResponseData) -> Result<()> {
        let mut slot = self
            .slots
            .entry(correlation_id.to_string())
            .or_insert_with(|| Slot::Waiting(Vec::new()));

        let previous = std::mem::replace(slot.value_mut(), Slot::Done(response.clone()));
        match previous {
            Slot::Waiting(senders) => {
                debug!(
                    correlation_id,
                    waiters = senders.len(),
                    barrier_state = %response.barrier_state,
                    "Releasing parked branches"
                );
                for tx in senders {
                    // A receiver dropped by a cancelled branch is not an error.
                    let _ = tx.send(response.clone());
                }
            }
            Slot::Done(first) => {
                // Keep the first release.
                *slot.value_mut() = Slot::Done(first);
                trace!(correlation_id, "Ignoring repeated release");
            }
        }
        Ok(())
    }

    /// Removes the slots of deleted barriers. Branches still parked on one
    /// of them wake up with a notify error.
    async fn forget(&self, correlation_ids: &[String]) -> Result<()> {
        for id in correlation_ids {
            if let Some((_, Slot::Waiting(senders))) = self.slots.remove(id) {
                if !senders.is_empty() {
                    debug!(correlation_id = %id, waiters = senders.len(), "Dropping unreleased waiters");
                }
            }
        }
        Ok(())
    }
}
