//! Notification bus abstraction
//!
//! The application dispatches notifications on a process-wide bus. Waits
//! subscribe to a single channel and must detach when they settle, so a
//! [`Subscription`] deregisters itself on drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::notification::{Channel, Notification};

/// Subscribe side of the application's notification dispatch
pub trait NotificationBus: Send + Sync {
    /// Attach a listener to `channel`. The listener is live as soon as this
    /// returns and is removed when the returned subscription is dropped.
    fn subscribe(&self, channel: Channel) -> Subscription;

    /// Most recent notification dispatched on `channel`, if any
    fn last_notification(&self, channel: Channel) -> Option<Notification>;
}

/// A live listener on one channel
pub struct Subscription {
    channel: Channel,
    receiver: mpsc::UnboundedReceiver<Notification>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a receiver; `release` runs exactly once, when the subscription drops
    pub fn new(
        channel: Channel,
        receiver: mpsc::UnboundedReceiver<Notification>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            channel,
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Next notification, or `None` once the bus has closed this listener
    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }

    /// Buffered notification, without waiting
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

type Listener = (u64, mpsc::UnboundedSender<Notification>);

#[derive(Default)]
struct BusState {
    next_id: u64,
    listeners: HashMap<Channel, Vec<Listener>>,
    last: HashMap<Channel, Notification>,
    published: u64,
}

/// Isolated in-process bus
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a notification to every listener on its channel.
    ///
    /// Returns the number of listeners that received it.
    pub fn publish(&self, notification: Notification) -> usize {
        let channel = notification.channel();
        let mut state = self.state.lock();
        state.published += 1;

        let delivered = match state.listeners.get_mut(&channel) {
            Some(listeners) => {
                listeners.retain(|(_, tx)| tx.send(notification.clone()).is_ok());
                listeners.len()
            }
            None => 0,
        };
        state.last.insert(channel, notification);

        trace!(%channel, delivered, "notification published");
        delivered
    }

    /// Listeners currently attached to `channel`
    pub fn listener_count(&self, channel: Channel) -> usize {
        self.state
            .lock()
            .listeners
            .get(&channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Listeners attached across all channels
    pub fn total_listeners(&self) -> usize {
        self.state.lock().listeners.values().map(Vec::len).sum()
    }

    /// Total notifications published since creation
    pub fn published(&self) -> u64 {
        self.state.lock().published
    }

    /// Forget cached last notifications (listeners stay attached)
    pub fn clear_history(&self) {
        self.state.lock().last.clear();
    }
}

fn release_listener(state: &Weak<Mutex<BusState>>, channel: Channel, id: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock();
    if let Some(listeners) = state.listeners.get_mut(&channel) {
        listeners.retain(|(listener_id, _)| *listener_id != id);
        if listeners.is_empty() {
            state.listeners.remove(&channel);
        }
    }
    trace!(%channel, id, "listener released");
}

impl NotificationBus for InMemoryBus {
    fn subscribe(&self, channel: Channel) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.entry(channel).or_default().push((id, tx));
            id
        };
        trace!(%channel, id, "listener attached");

        let weak = Arc::downgrade(&self.state);
        Subscription::new(channel, rx, move || release_listener(&weak, channel, id))
    }

    fn last_notification(&self, channel: Channel) -> Option<Notification> {
        self.state.lock().last.get(&channel).cloned()
    }
}

impl fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("listeners", &self.total_listeners())
            .field("published", &self.published())
            .finish()
    }
}
