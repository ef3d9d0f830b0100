//! Monitored items: sampling, filtering and the bounded notification queue.

use crate::node_access::{AttributeId, NodeAccessor};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::trace;
use uaserve_types::monitoring::{DataChangeFilter, MonitoringMode, TimestampsToReturn};
use uaserve_types::service::MonitoredItemNotification;
use uaserve_types::{DataValue, NodeId};

/// Bounds the engine imposes on client-requested monitoring parameters.
#[derive(Debug, Clone, Copy)]
pub struct ItemLimits {
    pub min_sampling_interval_ms: f64,
    pub max_queue_size: u32,
}

impl Default for ItemLimits {
    fn default() -> Self {
        Self {
            min_sampling_interval_ms: 50.0,
            max_queue_size: 1000,
        }
    }
}

/// Mutable state guarded by the item lock.
struct ItemState {
    client_handle: u32,
    sampling_interval_ms: f64,
    queue_size: u32,
    discard_oldest: bool,
    monitoring_mode: MonitoringMode,
    filter: Option<DataChangeFilter>,
    timestamps_to_return: TimestampsToReturn,
    queue: VecDeque<DataValue>,
    /// Sticky until the queue is next drained.
    overflow: bool,
    /// Last value the filter admitted; deadbands compare against this, not
    /// against the last raw sample.
    last_value: Option<DataValue>,
    eu_range: f64,
    terminated: bool,
}

/// A single monitored attribute with its notification queue.
///
/// All mutable state sits behind one mutex; sampling ticks, service calls
/// and subscription drains contend on it briefly and never hold it across
/// an await point.
pub struct MonitoredItem {
    id: u32,
    node_id: NodeId,
    attribute_id: AttributeId,
    index_range: Option<String>,
    limits: ItemLimits,
    inner: Mutex<ItemState>,
}

impl MonitoredItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
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
        limits: ItemLimits,
    ) -> Self {
        let sampling_interval_ms = revise_sampling_interval(sampling_interval_ms, &limits);
        let queue_size = revise_queue_size(queue_size, &limits);
        Self {
            id,
            node_id,
            attribute_id,
            index_range,
            limits,
            inner: Mutex::new(ItemState {
                client_handle,
                sampling_interval_ms,
                queue_size,
                discard_oldest,
                monitoring_mode,
                filter,
                timestamps_to_return,
                queue: VecDeque::new(),
                overflow: false,
                last_value: None,
                eu_range,
                terminated: false,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn sampling_interval_ms(&self) -> f64 {
        self.inner.lock().sampling_interval_ms
    }

    pub fn revised_queue_size(&self) -> u32 {
        self.inner.lock().queue_size
    }

    pub fn monitoring_mode(&self) -> MonitoringMode {
        self.inner.lock().monitoring_mode
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.lock().terminated
    }

    pub fn has_notifications(&self) -> bool {
        !self.inner.lock().queue.is_empty()
    }

    /// Reads the attribute through the accessor and records the result.
    ///
    /// Called from sampling tasks. Returns whether a notification was
    /// queued.
    pub fn sample(&self, accessor: &dyn NodeAccessor) -> bool {
        // Check cheaply before paying for the read
        {
            let state = self.inner.lock();
            if state.terminated || state.monitoring_mode == MonitoringMode::Disabled {
                return false;
            }
        }
        let value =
            accessor.read_attribute(&self.node_id, self.attribute_id, self.index_range.as_deref());
        self.record_value(value)
    }

    /// Applies the filter to a sampled value and queues it when admitted.
    ///
    /// Terminated or disabled items record nothing; a tick racing with
    /// termination observes the flag here and delivers no late value.
    pub fn record_value(&self, mut value: DataValue) -> bool {
        let mut state = self.inner.lock();
        if state.terminated || state.monitoring_mode == MonitoringMode::Disabled {
            return false;
        }

        let admitted = match &state.filter {
            Some(filter) => filter.admits(state.last_value.as_ref(), &value, state.eu_range),
            None => true,
        };
        if !admitted {
            return false;
        }

        if value.server_timestamp.is_none() {
            value.server_timestamp = Some(chrono::Utc::now());
        }
        state.last_value = Some(value.clone());

        if state.monitoring_mode != MonitoringMode::Reporting {
            return false;
        }

        if state.queue.len() >= state.queue_size as usize {
            if state.queue_size == 1 {
                // Single-slot queue overwrites silently
                state.queue.clear();
            } else if state.discard_oldest {
                state.queue.pop_front();
                state.overflow = true;
            } else {
                state.queue.pop_back();
                state.overflow = true;
            }
        }
        state.queue.push_back(value);
        trace!(
            "monitored item {} queued notification (depth {})",
            self.id,
            state.queue.len()
        );
        true
    }

    /// Takes all queued notifications, applying the timestamp policy and the
    /// overflow bit.
    ///
    /// The overflow bit lands on the newest drained value and the sticky
    /// flag resets once reported.
    pub fn drain_notifications(&self) -> Vec<MonitoredItemNotification> {
        let mut state = self.inner.lock();
        let overflow = state.overflow;
        state.overflow = false;
        let timestamps = state.timestamps_to_return;
        let client_handle = state.client_handle;
        let drained: Vec<DataValue> = state.queue.drain(..).collect();
        drop(state);

        let last_index = drained.len().saturating_sub(1);
        drained
            .into_iter()
            .enumerate()
            .map(|(index, mut value)| {
                if overflow && index == last_index {
                    value.status = value.status.with_overflow_bit();
                }
                apply_timestamps(&mut value, timestamps);
                MonitoredItemNotification {
                    client_handle,
                    value,
                }
            })
            .collect()
    }

    /// Changes the monitoring mode.
    ///
    /// Disabling clears the queue; re-entering Reporting requeues the last
    /// admitted value so the client sees the current state promptly.
    pub fn set_monitoring_mode(&self, mode: MonitoringMode) {
        let mut state = self.inner.lock();
        if state.terminated || state.monitoring_mode == mode {
            return;
        }
        let previous = state.monitoring_mode;
        state.monitoring_mode = mode;
        match mode {
            MonitoringMode::Disabled => {
                state.queue.clear();
                state.overflow = false;
            }
            MonitoringMode::Reporting => {
                if previous != MonitoringMode::Reporting {
                    if let Some(last) = state.last_value.clone() {
                        if state.queue.len() < state.queue_size as usize {
                            state.queue.push_back(last);
                        }
                    }
                }
            }
            MonitoringMode::Sampling => {}
        }
    }

    /// Applies new monitoring parameters, returning the revised interval and
    /// queue size.
    ///
    /// Shrinking the queue drops the oldest entries to fit and marks an
    /// overflow.
    pub fn modify(
        &self,
        client_handle: u32,
        sampling_interval_ms: f64,
        queue_size: u32,
        discard_oldest: bool,
        filter: Option<DataChangeFilter>,
        timestamps_to_return: TimestampsToReturn,
    ) -> (f64, u32) {
        let revised_interval = revise_sampling_interval(sampling_interval_ms, &self.limits);
        let revised_queue = revise_queue_size(queue_size, &self.limits);

        let mut state = self.inner.lock();
        state.client_handle = client_handle;
        state.sampling_interval_ms = revised_interval;
        state.discard_oldest = discard_oldest;
        state.filter = filter;
        state.timestamps_to_return = timestamps_to_return;
        state.queue_size = revised_queue;
        while state.queue.len() > revised_queue as usize {
            state.queue.pop_front();
            state.overflow = true;
        }
        (revised_interval, revised_queue)
    }

    /// Marks the item terminated and empties its queue. Idempotent.
    pub fn terminate(&self) {
        let mut state = self.inner.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        state.queue.clear();
        state.overflow = false;
        trace!("monitored item {} terminated", self.id);
    }
}

fn revise_sampling_interval(requested: f64, limits: &ItemLimits) -> f64 {
    if !requested.is_finite() || requested < limits.min_sampling_interval_ms {
        limits.min_sampling_interval_ms
    } else {
        requested
    }
}

fn revise_queue_size(requested: u32, limits: &ItemLimits) -> u32 {
    requested.clamp(1, limits.max_queue_size)
}

fn apply_timestamps(value: &mut DataValue, timestamps: TimestampsToReturn) {
    match timestamps {
        TimestampsToReturn::Source => value.server_timestamp = None,
        TimestampsToReturn::Server => value.source_timestamp = None,
        TimestampsToReturn::Both => {}
        TimestampsToReturn::Neither | TimestampsToReturn::Invalid => {
            value.source_timestamp = None;
            value.server_timestamp = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uaserve_types::monitoring::{DataChangeTrigger, DeadbandType};
    use uaserve_types::{StatusCode, Variant};

    fn test_item(queue_size: u32, discard_oldest: bool) -> MonitoredItem {
        MonitoredItem::new(
            1,
            NodeId::numeric(2, 1001),
            AttributeId::Value,
            None,
            MonitoringMode::Reporting,
            77,
            100.0,
            queue_size,
            discard_oldest,
            None,
            TimestampsToReturn::Both,
            0.0,
            ItemLimits::default(),
        )
    }

    fn value(v: f64) -> DataValue {
        DataValue::new(Variant::Double(v))
    }

    #[test]
    fn test_parameter_revision() {
        let item = test_item(0, true);
        assert_eq!(item.revised_queue_size(), 1);

        let limits = ItemLimits::default();
        assert_eq!(revise_sampling_interval(-1.0, &limits), 50.0);
        assert_eq!(revise_sampling_interval(0.0, &limits), 50.0);
        assert_eq!(revise_sampling_interval(f64::NAN, &limits), 50.0);
        assert_eq!(revise_sampling_interval(250.0, &limits), 250.0);
        assert_eq!(revise_queue_size(5000, &limits), 1000);
    }

    #[test]
    fn test_queue_never_exceeds_bound() {
        let item = test_item(3, true);
        for i in 0..10 {
            item.record_value(value(i as f64));
        }
        let drained = item.drain_notifications();
        assert_eq!(drained.len(), 3);
    }

    #[test]
    fn test_discard_oldest_keeps_newest_values() {
        let item = test_item(2, true);
        item.record_value(value(1000.0));
        item.record_value(value(1001.0));
        item.record_value(value(1002.0));

        let drained = item.drain_notifications();
        let values: Vec<f64> = drained.iter().filter_map(|n| n.value.as_f64()).collect();
        assert_eq!(values, vec![1001.0, 1002.0]);
        // Overflow bit sits on the newest drained value
        assert_eq!(drained[0].value.status, StatusCode::Good);
        assert_eq!(drained[1].value.status, StatusCode::GoodWithOverflowBit);
    }

    #[test]
    fn test_discard_newest_overwrites_last_slot() {
        let item = test_item(2, false);
        item.record_value(value(1000.0));
        item.record_value(value(1001.0));
        item.record_value(value(1002.0));

        let drained = item.drain_notifications();
        let values: Vec<f64> = drained.iter().filter_map(|n| n.value.as_f64()).collect();
        assert_eq!(values, vec![1000.0, 1002.0]);
        assert_eq!(drained[1].value.status, StatusCode::GoodWithOverflowBit);
    }

    #[test]
    fn test_single_slot_queue_has_no_overflow_bit() {
        let item = test_item(1, true);
        item.record_value(value(1.0));
        item.record_value(value(2.0));
        let drained = item.drain_notifications();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].value.as_f64(), Some(2.0));
        assert_eq!(drained[0].value.status, StatusCode::Good);
    }

    #[test]
    fn test_overflow_flag_resets_after_drain() {
        let item = test_item(2, true);
        for i in 0..3 {
            item.record_value(value(i as f64));
        }
        item.drain_notifications();
        item.record_value(value(10.0));
        let drained = item.drain_notifications();
        assert_eq!(drained[0].value.status, StatusCode::Good);
    }

    #[test]
    fn test_deadband_compares_against_last_admitted_value() {
        let item = MonitoredItem::new(
            1,
            NodeId::numeric(2, 1001),
            AttributeId::Value,
            None,
            MonitoringMode::Reporting,
            0,
            100.0,
            10,
            true,
            Some(DataChangeFilter {
                trigger: DataChangeTrigger::StatusValue,
                deadband_type: DeadbandType::Absolute,
                deadband_value: 8.0,
            }),
            TimestampsToReturn::Both,
            0.0,
            ItemLimits::default(),
        );

        assert!(item.record_value(value(40.0)));
        // 48 is within the deadband of 40
        assert!(!item.record_value(value(48.0)));
        // 49 exceeds the deadband of 40, even though it is within 8 of 48
        assert!(item.record_value(value(49.0)));
        let drained = item.drain_notifications();
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn test_sampling_mode_filters_but_does_not_queue() {
        let item = test_item(5, true);
        item.set_monitoring_mode(MonitoringMode::Sampling);
        assert!(!item.record_value(value(1.0)));
        assert!(!item.has_notifications());

        // Returning to reporting requeues the last admitted value
        item.set_monitoring_mode(MonitoringMode::Reporting);
        let drained = item.drain_notifications();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].value.as_f64(), Some(1.0));
    }

    #[test]
    fn test_disabled_clears_queue_and_records_nothing() {
        let item = test_item(5, true);
        item.record_value(value(1.0));
        item.set_monitoring_mode(MonitoringMode::Disabled);
        assert!(!item.has_notifications());
        assert!(!item.record_value(value(2.0)));
    }

    #[test]
    fn test_terminate_is_idempotent_and_final() {
        let item = test_item(5, true);
        item.record_value(value(1.0));
        item.terminate();
        item.terminate();
        assert!(item.is_terminated());
        assert!(!item.record_value(value(2.0)));
        assert!(item.drain_notifications().is_empty());
    }

    #[test]
    fn test_client_handle_is_echoed() {
        let item = test_item(5, true);
        item.record_value(value(1.0));
        let drained = item.drain_notifications();
        assert_eq!(drained[0].client_handle, 77);
    }

    #[test]
    fn test_modify_shrinks_queue_from_the_front() {
        let item = test_item(5, true);
        for i in 0..5 {
            item.record_value(value(i as f64));
        }
        let (_, revised_queue) = item.modify(77, 100.0, 2, true, None, TimestampsToReturn::Both);
        assert_eq!(revised_queue, 2);
        let drained = item.drain_notifications();
        let values: Vec<f64> = drained.iter().filter_map(|n| n.value.as_f64()).collect();
        assert_eq!(values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_timestamp_policy_applied_on_drain() {
        let item = MonitoredItem::new(
            1,
            NodeId::numeric(2, 1001),
            AttributeId::Value,
            None,
            MonitoringMode::Reporting,
            0,
            100.0,
            5,
            true,
            None,
            TimestampsToReturn::Source,
            0.0,
            ItemLimits::default(),
        );
        item.record_value(value(1.0));
        let drained = item.drain_notifications();
        assert!(drained[0].value.source_timestamp.is_some());
        assert!(drained[0].value.server_timestamp.is_none());
    }
}
