//! Subscriptions: publishing cadence, sequencing, keep-alives and the
//! retransmission queue.

use crate::error::CoreError;
use crate::monitored_item::{ItemLimits, MonitoredItem};
use crate::node_access::AttributeId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uaserve_types::monitoring::{DataChangeFilter, MonitoringMode, TimestampsToReturn};
use uaserve_types::service::{
    CreateSubscriptionParams, MonitoredItemNotification, NotificationMessage,
};
use uaserve_types::{NodeId, StatusCode};

/// Bounds imposed on client-requested subscription parameters.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionLimits {
    pub min_publishing_interval_ms: f64,
    pub max_publishing_interval_ms: f64,
    pub max_keep_alive_count: u32,
    pub max_lifetime_count: u32,
    pub max_monitored_items: u32,
    pub max_retransmission_queue: usize,
    pub item_limits: ItemLimits,
}

impl Default for SubscriptionLimits {
    fn default() -> Self {
        Self {
            min_publishing_interval_ms: 100.0,
            max_publishing_interval_ms: 3_600_000.0,
            max_keep_alive_count: 100,
            max_lifetime_count: 10_000,
            max_monitored_items: 10_000,
            max_retransmission_queue: 20,
            item_limits: ItemLimits::default(),
        }
    }
}

/// Where a subscription sits in its publishing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created, no tick yet.
    Creating,
    /// Last cycle delivered data through a publish request.
    Normal,
    /// Last cycle delivered a keep-alive.
    KeepAlive,
    /// A cycle produced something but no publish request was pending.
    Late,
    /// Expired or deleted.
    Closed,
}

/// Outcome of one publishing-timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A notification or keep-alive is waiting for a publish request.
    Ready,
    /// Nothing to send this cycle.
    Idle,
    /// The lifetime counter ran out; the subscription closed itself.
    Expired,
    /// Already closed.
    Closed,
}

/// What a serviced publish request carries back for this subscription.
#[derive(Debug, Clone)]
pub struct PublishPayload {
    pub message: NotificationMessage,
    pub more_notifications: bool,
    pub available_sequence_numbers: Vec<u32>,
}

struct SubState {
    publishing_interval_ms: f64,
    lifetime_count: u32,
    max_keep_alive_count: u32,
    max_notifications_per_publish: u32,
    publishing_enabled: bool,
    state: SubscriptionState,
    /// Cycles since a publish request last serviced this subscription.
    current_lifetime: u32,
    /// Idle cycles since the last message went out.
    current_keep_alive: u32,
    /// A keep-alive is due but has not been picked up yet.
    pending_keep_alive: bool,
    next_sequence: u32,
    next_item_id: u32,
    items: HashMap<u32, Arc<MonitoredItem>>,
    /// Sent-but-unacknowledged messages, oldest evicted when full.
    retransmission: BTreeMap<u32, NotificationMessage>,
    /// Built messages awaiting a publish request.
    ready: VecDeque<NotificationMessage>,
}

/// One subscription within a session.
pub struct Subscription {
    id: u32,
    priority: u8,
    limits: SubscriptionLimits,
    inner: Mutex<SubState>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    /// Creates the subscription, returning it with the revised parameters
    /// `(publishing_interval_ms, lifetime_count, max_keep_alive_count)`.
    pub fn new(
        id: u32,
        params: &CreateSubscriptionParams,
        limits: SubscriptionLimits,
    ) -> (Arc<Self>, (f64, u32, u32)) {
        let (interval, lifetime, keep_alive) = revise_parameters(
            params.requested_publishing_interval_ms,
            params.requested_lifetime_count,
            params.requested_max_keep_alive_count,
            &limits,
        );
        let subscription = Arc::new(Self {
            id,
            priority: params.priority,
            limits,
            inner: Mutex::new(SubState {
                publishing_interval_ms: interval,
                lifetime_count: lifetime,
                max_keep_alive_count: keep_alive,
                max_notifications_per_publish: params.max_notifications_per_publish,
                publishing_enabled: params.publishing_enabled,
                state: SubscriptionState::Creating,
                current_lifetime: 0,
                current_keep_alive: 0,
                pending_keep_alive: false,
                next_sequence: 1,
                next_item_id: 1,
                items: HashMap::new(),
                retransmission: BTreeMap::new(),
                ready: VecDeque::new(),
            }),
            timer: Mutex::new(None),
        });
        (subscription, (interval, lifetime, keep_alive))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SubscriptionState::Closed
    }

    pub fn is_late(&self) -> bool {
        self.state() == SubscriptionState::Late
    }

    pub fn publishing_interval_ms(&self) -> f64 {
        self.inner.lock().publishing_interval_ms
    }

    pub fn monitored_item_count(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Spawns the publishing timer. `on_ready` fires after any tick that
    /// produced something deliverable.
    pub fn start(self: &Arc<Self>, on_ready: impl Fn() + Send + Sync + 'static) {
        let subscription = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                let interval_ms = subscription.publishing_interval_ms();
                tokio::time::sleep(Duration::from_millis(interval_ms.max(1.0) as u64)).await;
                match subscription.on_publishing_tick() {
                    TickOutcome::Ready => on_ready(),
                    TickOutcome::Idle => {}
                    TickOutcome::Expired => {
                        on_ready();
                        return;
                    }
                    TickOutcome::Closed => return,
                }
            }
        });
        *self.timer.lock() = Some(task);
    }

    /// Runs one publishing cycle: lifetime accounting, notification
    /// assembly and keep-alive scheduling.
    pub fn on_publishing_tick(&self) -> TickOutcome {
        let mut state = self.inner.lock();
        if state.state == SubscriptionState::Closed {
            return TickOutcome::Closed;
        }

        state.current_lifetime += 1;
        if state.current_lifetime >= state.lifetime_count {
            warn!(
                "subscription {} expired after {} unserviced cycles",
                self.id, state.current_lifetime
            );
            close_locked(&mut state);
            return TickOutcome::Expired;
        }

        let mut notifications: Vec<MonitoredItemNotification> = Vec::new();
        if state.publishing_enabled {
            let items: Vec<Arc<MonitoredItem>> = state.items.values().cloned().collect();
            for item in items {
                notifications.extend(item.drain_notifications());
            }
        }

        if notifications.is_empty() {
            state.current_keep_alive += 1;
            if state.current_keep_alive >= state.max_keep_alive_count {
                state.current_keep_alive = 0;
                state.pending_keep_alive = true;
            }
        } else {
            state.current_keep_alive = 0;
            state.pending_keep_alive = false;
            let chunk_size = if state.max_notifications_per_publish == 0 {
                notifications.len()
            } else {
                state.max_notifications_per_publish as usize
            };
            let mut remaining = notifications;
            while !remaining.is_empty() {
                let tail = remaining.split_off(chunk_size.min(remaining.len()));
                let sequence = consume_sequence(&mut state);
                let message = NotificationMessage {
                    sequence_number: sequence,
                    publish_time: chrono::Utc::now(),
                    notifications: remaining,
                };
                state.retransmission.insert(sequence, message.clone());
                while state.retransmission.len() > self.limits.max_retransmission_queue {
                    if let Some((&oldest, _)) = state.retransmission.iter().next() {
                        state.retransmission.remove(&oldest);
                    }
                }
                state.ready.push_back(message);
                remaining = tail;
            }
        }

        if !state.ready.is_empty() || state.pending_keep_alive {
            state.state = SubscriptionState::Late;
            TickOutcome::Ready
        } else {
            TickOutcome::Idle
        }
    }

    /// Hands the next deliverable message to a publish request, if any.
    ///
    /// Servicing a subscription resets its lifetime counter. Keep-alives
    /// report the sequence number the next data message will carry without
    /// consuming it, and are never retransmittable.
    pub fn pop_publish_payload(&self) -> Option<PublishPayload> {
        let mut state = self.inner.lock();
        if state.state == SubscriptionState::Closed {
            return None;
        }

        if let Some(message) = state.ready.pop_front() {
            state.state = SubscriptionState::Normal;
            state.current_lifetime = 0;
            state.current_keep_alive = 0;
            let more = !state.ready.is_empty() || state.pending_keep_alive;
            return Some(PublishPayload {
                message,
                more_notifications: more,
                available_sequence_numbers: state.retransmission.keys().copied().collect(),
            });
        }

        if state.pending_keep_alive {
            state.pending_keep_alive = false;
            state.state = SubscriptionState::KeepAlive;
            state.current_lifetime = 0;
            state.current_keep_alive = 0;
            let message = NotificationMessage::keep_alive(state.next_sequence);
            return Some(PublishPayload {
                message,
                more_notifications: false,
                available_sequence_numbers: state.retransmission.keys().copied().collect(),
            });
        }

        None
    }

    /// Acknowledges a previously delivered message, releasing it from the
    /// retransmission queue.
    pub fn acknowledge(&self, sequence_number: u32) -> StatusCode {
        let mut state = self.inner.lock();
        if state.retransmission.remove(&sequence_number).is_some() {
            trace!(
                "subscription {} acknowledged sequence {}",
                self.id,
                sequence_number
            );
            StatusCode::Good
        } else {
            StatusCode::BadSequenceNumberUnknown
        }
    }

    /// Returns a retained message for Republish.
    pub fn republish(&self, sequence_number: u32) -> Result<NotificationMessage, CoreError> {
        let state = self.inner.lock();
        state
            .retransmission
            .get(&sequence_number)
            .cloned()
            .ok_or(CoreError::MessageNotAvailable {
                sequence: sequence_number,
            })
    }

    /// Resets the lifetime and keep-alive counters. Every subscription-scoped
    /// service call counts as client activity.
    pub fn reset_lifetime(&self) {
        let mut state = self.inner.lock();
        state.current_lifetime = 0;
        state.current_keep_alive = 0;
    }

    /// Applies new subscription parameters, returning the revised triple.
    pub fn modify(
        &self,
        requested_publishing_interval_ms: f64,
        requested_lifetime_count: u32,
        requested_max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
    ) -> (f64, u32, u32) {
        let (interval, lifetime, keep_alive) = revise_parameters(
            requested_publishing_interval_ms,
            requested_lifetime_count,
            requested_max_keep_alive_count,
            &self.limits,
        );
        let mut state = self.inner.lock();
        state.publishing_interval_ms = interval;
        state.lifetime_count = lifetime;
        state.max_keep_alive_count = keep_alive;
        state.max_notifications_per_publish = max_notifications_per_publish;
        state.current_lifetime = 0;
        state.current_keep_alive = 0;
        debug!(
            "subscription {} modified: interval {}ms lifetime {} keep-alive {}",
            self.id, interval, lifetime, keep_alive
        );
        (interval, lifetime, keep_alive)
    }

    pub fn set_publishing_mode(&self, enabled: bool) {
        let mut state = self.inner.lock();
        state.publishing_enabled = enabled;
        state.current_lifetime = 0;
        state.current_keep_alive = 0;
    }

    /// Creates a monitored item inside this subscription.
    #[allow(clippy::too_many_arguments)]
    pub fn create_monitored_item(
        &self,
        node_id: NodeId,
        attribute_id: AttributeId,
        index_range: Option<String>,
        monitoring_mode: MonitoringMode,
        client_handle: u32,
        sampling_interval_ms: f64,
        queue_size: u32,
        discard_oldest: bool,
        filter: Option<DataChangeFilter>,
        timestamps_to_return: TimestampsToReturn,
        eu_range: f64,
    ) -> Result<Arc<MonitoredItem>, CoreError> {
        let mut state = self.inner.lock();
        if state.state == SubscriptionState::Closed {
            return Err(CoreError::SubscriptionNotFound { id: self.id });
        }
        if state.items.len() >= self.limits.max_monitored_items as usize {
            return Err(CoreError::TooManyOperations);
        }
        let item_id = state.next_item_id;
        state.next_item_id += 1;
        let item = Arc::new(MonitoredItem::new(
            item_id,
            node_id,
            attribute_id,
            index_range,
            monitoring_mode,
            client_handle,
            sampling_interval_ms,
            queue_size,
            discard_oldest,
            filter,
            timestamps_to_return,
            eu_range,
            self.limits.item_limits,
        ));
        state.items.insert(item_id, Arc::clone(&item));
        state.current_lifetime = 0;
        Ok(item)
    }

    pub fn get_monitored_item(&self, item_id: u32) -> Option<Arc<MonitoredItem>> {
        self.inner.lock().items.get(&item_id).cloned()
    }

    /// Terminates and removes a monitored item, returning it so the caller
    /// can drop its scheduler registration.
    pub fn remove_monitored_item(&self, item_id: u32) -> Result<Arc<MonitoredItem>, CoreError> {
        let mut state = self.inner.lock();
        let item = state
            .items
            .remove(&item_id)
            .ok_or(CoreError::MonitoredItemNotFound { id: item_id })?;
        state.current_lifetime = 0;
        drop(state);
        item.terminate();
        Ok(item)
    }

    /// Closes the subscription: stops the timer and terminates every item.
    /// Idempotent. Returns the items so the caller can unregister them.
    pub fn close(&self) -> Vec<Arc<MonitoredItem>> {
        let items = {
            let mut state = self.inner.lock();
            if state.state == SubscriptionState::Closed {
                return Vec::new();
            }
            close_locked(&mut state)
        };
        if let Some(task) = self.timer.lock().take() {
            task.abort();
        }
        debug!("subscription {} closed", self.id);
        items
    }
}

/// Marks the subscription closed and terminates its items, returning them.
fn close_locked(state: &mut SubState) -> Vec<Arc<MonitoredItem>> {
    state.state = SubscriptionState::Closed;
    state.ready.clear();
    state.pending_keep_alive = false;
    let items: Vec<Arc<MonitoredItem>> = state.items.drain().map(|(_, item)| item).collect();
    for item in &items {
        item.terminate();
    }
    items
}

fn consume_sequence(state: &mut SubState) -> u32 {
    let sequence = state.next_sequence;
    state.next_sequence = state.next_sequence.wrapping_add(1);
    if state.next_sequence == 0 {
        state.next_sequence = 1;
    }
    sequence
}

fn revise_parameters(
    requested_interval_ms: f64,
    requested_lifetime: u32,
    requested_keep_alive: u32,
    limits: &SubscriptionLimits,
) -> (f64, u32, u32) {
    let interval = if !requested_interval_ms.is_finite()
        || requested_interval_ms < limits.min_publishing_interval_ms
    {
        limits.min_publishing_interval_ms
    } else {
        requested_interval_ms.min(limits.max_publishing_interval_ms)
    };
    let keep_alive = requested_keep_alive.clamp(1, limits.max_keep_alive_count);
    // Lifetime must give the client at least three keep-alive windows
    let lifetime = requested_lifetime
        .max(keep_alive.saturating_mul(3))
        .min(limits.max_lifetime_count);
    (interval, lifetime, keep_alive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uaserve_types::{DataValue, Variant};

    fn test_limits() -> SubscriptionLimits {
        SubscriptionLimits {
            min_publishing_interval_ms: 100.0,
            max_publishing_interval_ms: 60_000.0,
            max_keep_alive_count: 10,
            max_lifetime_count: 1000,
            max_monitored_items: 100,
            max_retransmission_queue: 3,
            item_limits: ItemLimits::default(),
        }
    }

    fn test_subscription(params: CreateSubscriptionParams) -> (Arc<Subscription>, (f64, u32, u32)) {
        Subscription::new(1, &params, test_limits())
    }

    fn add_reporting_item(subscription: &Subscription) -> Arc<MonitoredItem> {
        subscription
            .create_monitored_item(
                NodeId::numeric(2, 1001),
                AttributeId::Value,
                None,
                MonitoringMode::Reporting,
                5,
                100.0,
                10,
                true,
                None,
                TimestampsToReturn::Both,
                0.0,
            )
            .unwrap()
    }

    #[test]
    fn test_parameter_revision() {
        let (_, revised) = test_subscription(CreateSubscriptionParams {
            requested_publishing_interval_ms: 0.0,
            requested_lifetime_count: 5,
            requested_max_keep_alive_count: 4,
            ..Default::default()
        });
        // Interval raised to the floor, lifetime raised to 3x keep-alive
        assert_eq!(revised, (100.0, 12, 4));

        let (_, revised) = test_subscription(CreateSubscriptionParams {
            requested_publishing_interval_ms: 1e9,
            requested_lifetime_count: 999_999,
            requested_max_keep_alive_count: 50,
            ..Default::default()
        });
        assert_eq!(revised, (60_000.0, 1000, 10));
    }

    #[test]
    fn test_data_tick_builds_sequenced_message() {
        let (subscription, _) = test_subscription(Default::default());
        let item = add_reporting_item(&subscription);
        item.record_value(DataValue::new(Variant::Double(1.0)));

        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Ready);
        assert!(subscription.is_late());

        let payload = subscription.pop_publish_payload().unwrap();
        assert_eq!(payload.message.sequence_number, 1);
        assert_eq!(payload.message.notifications.len(), 1);
        assert!(!payload.more_notifications);
        assert_eq!(payload.available_sequence_numbers, vec![1]);
        assert_eq!(subscription.state(), SubscriptionState::Normal);
    }

    #[test]
    fn test_keep_alive_does_not_consume_sequence() {
        let (subscription, _) = test_subscription(CreateSubscriptionParams {
            requested_max_keep_alive_count: 2,
            ..Default::default()
        });
        let item = add_reporting_item(&subscription);

        // Two idle ticks reach the keep-alive deadline
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Idle);
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Ready);

        let payload = subscription.pop_publish_payload().unwrap();
        assert!(payload.message.is_keep_alive());
        assert_eq!(payload.message.sequence_number, 1);
        assert_eq!(subscription.state(), SubscriptionState::KeepAlive);
        // Keep-alives are not retransmittable
        assert!(payload.available_sequence_numbers.is_empty());
        assert!(matches!(
            subscription.republish(1),
            Err(CoreError::MessageNotAvailable { sequence: 1 })
        ));

        // The next data message carries the sequence the keep-alive peeked
        item.record_value(DataValue::new(Variant::Double(1.0)));
        subscription.on_publishing_tick();
        let payload = subscription.pop_publish_payload().unwrap();
        assert_eq!(payload.message.sequence_number, 1);
    }

    #[test]
    fn test_lifetime_expiry_closes_subscription() {
        let (subscription, _) = test_subscription(CreateSubscriptionParams {
            requested_lifetime_count: 3,
            requested_max_keep_alive_count: 1,
            ..Default::default()
        });
        let item = add_reporting_item(&subscription);

        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Ready);
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Ready);
        // The third consecutive unserviced cycle exhausts the lifetime of 3
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Expired);
        assert!(subscription.is_closed());
        assert!(item.is_terminated());
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Closed);
    }

    #[test]
    fn test_client_activity_defers_keep_alive() {
        let (subscription, _) = test_subscription(CreateSubscriptionParams {
            requested_max_keep_alive_count: 2,
            ..Default::default()
        });
        add_reporting_item(&subscription);

        // One idle cycle toward the keep-alive deadline, then activity
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Idle);
        subscription.reset_lifetime();

        // The counter restarted, so the next cycle is still idle
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Idle);
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Ready);
        let payload = subscription.pop_publish_payload().unwrap();
        assert!(payload.message.is_keep_alive());
    }

    #[test]
    fn test_servicing_resets_lifetime() {
        let (subscription, _) = test_subscription(CreateSubscriptionParams {
            requested_lifetime_count: 3,
            requested_max_keep_alive_count: 1,
            ..Default::default()
        });
        add_reporting_item(&subscription);

        for _ in 0..10 {
            let outcome = subscription.on_publishing_tick();
            assert_eq!(outcome, TickOutcome::Ready);
            assert!(subscription.pop_publish_payload().is_some());
        }
        assert!(!subscription.is_closed());
    }

    #[test]
    fn test_acknowledge_releases_retransmission() {
        let (subscription, _) = test_subscription(Default::default());
        let item = add_reporting_item(&subscription);
        item.record_value(DataValue::new(Variant::Double(1.0)));
        subscription.on_publishing_tick();
        subscription.pop_publish_payload().unwrap();

        assert!(subscription.republish(1).is_ok());
        assert_eq!(subscription.acknowledge(1), StatusCode::Good);
        assert_eq!(
            subscription.acknowledge(1),
            StatusCode::BadSequenceNumberUnknown
        );
        assert!(subscription.republish(1).is_err());
    }

    #[test]
    fn test_retransmission_queue_evicts_oldest() {
        let (subscription, _) = test_subscription(Default::default());
        let item = add_reporting_item(&subscription);

        // Limit is 3; five delivered messages leave sequences 3..=5
        for i in 0..5 {
            item.record_value(DataValue::new(Variant::Double(i as f64)));
            subscription.on_publishing_tick();
            subscription.pop_publish_payload().unwrap();
        }
        assert!(subscription.republish(1).is_err());
        assert!(subscription.republish(2).is_err());
        assert!(subscription.republish(3).is_ok());
        assert!(subscription.republish(5).is_ok());
    }

    #[test]
    fn test_publishing_disabled_suppresses_data() {
        let (subscription, _) = test_subscription(CreateSubscriptionParams {
            publishing_enabled: false,
            requested_max_keep_alive_count: 1,
            ..Default::default()
        });
        let item = add_reporting_item(&subscription);
        item.record_value(DataValue::new(Variant::Double(1.0)));

        // Data stays queued on the item; only keep-alives flow
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Ready);
        let payload = subscription.pop_publish_payload().unwrap();
        assert!(payload.message.is_keep_alive());
        assert!(item.has_notifications());

        subscription.set_publishing_mode(true);
        assert_eq!(subscription.on_publishing_tick(), TickOutcome::Ready);
        let payload = subscription.pop_publish_payload().unwrap();
        assert!(!payload.message.is_keep_alive());
    }

    #[test]
    fn test_max_notifications_chunks_into_multiple_messages() {
        let (subscription, _) = test_subscription(CreateSubscriptionParams {
            max_notifications_per_publish: 2,
            ..Default::default()
        });
        let item = add_reporting_item(&subscription);
        for i in 0..5 {
            item.record_value(DataValue::new(Variant::Double(i as f64)));
        }

        subscription.on_publishing_tick();
        let first = subscription.pop_publish_payload().unwrap();
        assert_eq!(first.message.notifications.len(), 2);
        assert!(first.more_notifications);
        let second = subscription.pop_publish_payload().unwrap();
        assert!(second.more_notifications);
        let third = subscription.pop_publish_payload().unwrap();
        assert_eq!(third.message.notifications.len(), 1);
        assert!(!third.more_notifications);
        assert!(subscription.pop_publish_payload().is_none());
    }

    #[test]
    fn test_close_is_idempotent_and_terminates_items() {
        let (subscription, _) = test_subscription(Default::default());
        let item = add_reporting_item(&subscription);
        let closed = subscription.close();
        assert_eq!(closed.len(), 1);
        assert!(item.is_terminated());
        assert!(subscription.close().is_empty());
        assert!(subscription.pop_publish_payload().is_none());
    }

    #[test]
    fn test_remove_monitored_item() {
        let (subscription, _) = test_subscription(Default::default());
        let item = add_reporting_item(&subscription);
        let removed = subscription.remove_monitored_item(item.id()).unwrap();
        assert!(removed.is_terminated());
        assert!(matches!(
            subscription.remove_monitored_item(item.id()),
            Err(CoreError::MonitoredItemNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_on_ready_callback() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let (subscription, revised) = test_subscription(CreateSubscriptionParams {
            requested_publishing_interval_ms: 100.0,
            requested_max_keep_alive_count: 1,
            ..Default::default()
        });
        assert_eq!(revised.0, 100.0);
        add_reporting_item(&subscription);

        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = Arc::clone(&fired);
        subscription.start(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Step the paused clock so each publishing cycle is observed
        // rather than coalesced into a single late tick
        for _ in 0..7 {
            tokio::time::advance(Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
        }
        // Keep-alive every cycle with keep-alive count 1
        assert!(fired.load(Ordering::SeqCst) >= 2);
        subscription.close();
    }
}
