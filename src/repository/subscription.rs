use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;

use crate::error::{DocbaseError, DocbaseResult};
use crate::store::{DocumentStore, ListenerId};

/// Shared off-switch between a subscription handle and its callbacks.
/// Unsubscribing or a terminal error flips it; deliveries check it first.
pub(crate) struct DeliveryState {
    active: AtomicBool,
}

impl DeliveryState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
        })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Holds the caller's error callback until its single permitted invocation.
pub(crate) struct ErrorSlot {
    callback: Mutex<Option<Box<dyn FnOnce(DocbaseError) + Send>>>,
}

impl ErrorSlot {
    pub(crate) fn new(callback: impl FnOnce(DocbaseError) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(Some(Box::new(callback))),
        })
    }

    pub(crate) fn fire(&self, error: DocbaseError) {
        let callback = self.callback.lock().unwrap().take();
        if let Some(callback) = callback {
            callback(error);
        }
    }
}

/// Handle for an active subscription. Dropping it or calling
/// [`Subscription::unsubscribe`] stops delivery; both are idempotent.
pub struct Subscription {
    store: Arc<dyn DocumentStore>,
    listener_id: ListenerId,
    delivery: Arc<DeliveryState>,
    detached: bool,
}

impl Subscription {
    pub(crate) fn new(
        store: Arc<dyn DocumentStore>,
        listener_id: ListenerId,
        delivery: Arc<DeliveryState>,
    ) -> Self {
        Self {
            store,
            listener_id,
            delivery,
            detached: false,
        }
    }

    /// Handle for a subscription that failed before it reached the store.
    /// Unsubscribing it is a no-op.
    pub(crate) fn failed(store: Arc<dyn DocumentStore>) -> Self {
        let delivery = DeliveryState::new();
        delivery.deactivate();
        Self {
            store,
            listener_id: 0,
            delivery,
            detached: true,
        }
    }

    /// Stops delivery and releases the store listener. Safe to call more
    /// than once; later calls do nothing.
    pub fn unsubscribe(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.delivery.deactivate();
        self.store.unlisten(self.listener_id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("listener_id", &self.listener_id)
            .field("detached", &self.detached)
            .finish()
    }
}

/// Stream adapter over a subscription: each item is one full snapshot, a
/// terminal error arrives as the final `Err` before the stream ends.
/// Dropping the stream unsubscribes.
pub struct Snapshots<T> {
    pub(crate) receiver: async_channel::Receiver<DocbaseResult<T>>,
    pub(crate) _subscription: Subscription,
}

impl<T> Stream for Snapshots<T> {
    type Item = DocbaseResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_next(cx)
    }
}
