//! The publish rendezvous: parks publish requests until a subscription has
//! something to say.

use crate::error::CoreError;
use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};
use uaserve_types::service::NotificationMessage;

/// What a completed publish request carries back to the client.
#[derive(Debug, Clone)]
pub struct PublishResponse {
    pub subscription_id: u32,
    pub message: NotificationMessage,
    pub more_notifications: bool,
    pub available_sequence_numbers: Vec<u32>,
}

struct PendingPublish {
    arrived: Instant,
    tx: oneshot::Sender<Result<PublishResponse, CoreError>>,
}

/// Per-session rendezvous between publish requests and subscription output.
///
/// Requests that arrive while data is ready are answered inline; otherwise
/// they queue until a publishing tick produces something. Lock order is
/// always `pending` before the subscription list before any subscription's
/// own state; the tick path enters through [`dispatch_ready`] after the
/// subscription has released its lock.
///
/// [`dispatch_ready`]: PublishEngine::dispatch_ready
pub struct PublishEngine {
    max_pending: usize,
    subscriptions: Mutex<Vec<Arc<Subscription>>>,
    pending: Mutex<VecDeque<PendingPublish>>,
    /// Round-robin origin so equally-ready subscriptions take turns.
    cursor: AtomicUsize,
}

impl PublishEngine {
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending: max_pending.max(1),
            subscriptions: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn register(&self, subscription: Arc<Subscription>) {
        self.subscriptions.lock().push(subscription);
    }

    pub fn unregister(&self, subscription_id: u32) {
        self.subscriptions
            .lock()
            .retain(|s| s.id() != subscription_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Submits a publish request, returning the channel its response will
    /// arrive on.
    ///
    /// Answers inline when a subscription already has output. When the
    /// pending queue is full, the oldest parked request is completed with
    /// an error to make room, per the publish-pipeline contract.
    pub fn enqueue(&self) -> oneshot::Receiver<Result<PublishResponse, CoreError>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();

        if let Some(response) = self.take_ready() {
            let _ = tx.send(Ok(response));
            return rx;
        }

        // take_ready pruned closed subscriptions; an empty list here means
        // there is nothing that could ever answer
        if self.subscriptions.lock().is_empty() {
            let _ = tx.send(Err(CoreError::NoSubscription));
            return rx;
        }

        pending.push_back(PendingPublish {
            arrived: Instant::now(),
            tx,
        });
        if pending.len() > self.max_pending {
            if let Some(oldest) = pending.pop_front() {
                debug!("publish queue full, rejecting oldest request");
                let _ = oldest.tx.send(Err(CoreError::TooManyPublishRequests));
            }
        }
        rx
    }

    /// Pairs parked requests with ready subscriptions. Called after every
    /// productive publishing tick.
    pub fn dispatch_ready(&self) {
        let mut pending = self.pending.lock();
        while !pending.is_empty() {
            let Some(response) = self.take_ready() else {
                break;
            };
            // Receivers that gave up just drop the response
            if let Some(request) = pending.pop_front() {
                trace!(
                    "publish request answered by subscription {}",
                    response.subscription_id
                );
                let _ = request.tx.send(Ok(response));
            }
        }
    }

    /// Times out parked requests older than `max_age`.
    pub fn sweep_stale(&self, max_age: Duration) {
        let mut pending = self.pending.lock();
        let mut index = 0;
        while index < pending.len() {
            if pending[index].arrived.elapsed() > max_age {
                if let Some(request) = pending.remove(index) {
                    let _ = request.tx.send(Err(CoreError::PublishTimeout));
                }
            } else {
                index += 1;
            }
        }
    }

    /// Fails every parked request, e.g. when the owning session closes.
    pub fn fail_all(&self, error: impl Fn() -> CoreError) {
        let mut pending = self.pending.lock();
        for request in pending.drain(..) {
            let _ = request.tx.send(Err(error()));
        }
    }

    /// Finds the next subscription with deliverable output. Late
    /// subscriptions go first; ties rotate round-robin.
    fn take_ready(&self) -> Option<PublishResponse> {
        let subscriptions: Vec<Arc<Subscription>> = {
            let mut guard = self.subscriptions.lock();
            guard.retain(|s| !s.is_closed());
            guard.clone()
        };
        if subscriptions.is_empty() {
            return None;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % subscriptions.len();
        let rotated: Vec<&Arc<Subscription>> = subscriptions[start..]
            .iter()
            .chain(subscriptions[..start].iter())
            .collect();
        let (late, on_time): (Vec<_>, Vec<_>) =
            rotated.into_iter().partition(|s| s.is_late());

        for subscription in late.into_iter().chain(on_time) {
            if let Some(payload) = subscription.pop_publish_payload() {
                return Some(PublishResponse {
                    subscription_id: subscription.id(),
                    message: payload.message,
                    more_notifications: payload.more_notifications,
                    available_sequence_numbers: payload.available_sequence_numbers,
                });
            }
        }
        None
    }
}
