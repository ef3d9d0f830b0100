//! Shared sampling scheduler: one timer task per distinct sampling rate.

use crate::monitored_item::MonitoredItem;
use crate::node_access::NodeAccessor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

struct RateGroup {
    items: Arc<Mutex<Vec<Weak<MonitoredItem>>>>,
    task: JoinHandle<()>,
}

/// Drives sampling for every monitored item in the server.
///
/// Items with the same revised sampling interval share one tokio task. The
/// task holds only weak references, so dropping or terminating an item is
/// enough to stop its sampling; a drained task removes its own group from
/// the map under the map lock, so a group found in the map always has a
/// live loop behind it.
pub struct SamplingScheduler {
    accessor: Arc<dyn NodeAccessor>,
    groups: Arc<Mutex<HashMap<u64, RateGroup>>>,
}

impl SamplingScheduler {
    pub fn new(accessor: Arc<dyn NodeAccessor>) -> Self {
        Self {
            accessor,
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Adds an item to the group for its current sampling interval,
    /// spawning the group's timer task if needed.
    pub fn register(&self, item: &Arc<MonitoredItem>) {
        let rate_ms = (item.sampling_interval_ms().max(1.0)).round() as u64;
        let mut groups = self.groups.lock();

        if let Some(group) = groups.get(&rate_ms) {
            group.items.lock().push(Arc::downgrade(item));
            return;
        }

        let items = Arc::new(Mutex::new(vec![Arc::downgrade(item)]));
        let task = spawn_rate_task(
            rate_ms,
            Arc::clone(&items),
            Arc::clone(&self.groups),
            Arc::clone(&self.accessor),
        );
        groups.insert(rate_ms, RateGroup { items, task });
        debug!("sampling group started at {}ms", rate_ms);
    }

    /// Removes an item from its rate group, typically before re-registering
    /// it at a new rate after a modify.
    pub fn unregister(&self, item: &Arc<MonitoredItem>) {
        let groups = self.groups.lock();
        for group in groups.values() {
            group
                .items
                .lock()
                .retain(|weak| !weak.upgrade().is_some_and(|other| Arc::ptr_eq(&other, item)));
        }
    }

    /// Stops every sampling task.
    pub fn shutdown(&self) {
        let mut groups = self.groups.lock();
        for (rate_ms, group) in groups.drain() {
            group.task.abort();
            trace!("sampling group at {}ms stopped", rate_ms);
        }
    }
}

impl Drop for SamplingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_rate_task(
    rate_ms: u64,
    items: Arc<Mutex<Vec<Weak<MonitoredItem>>>>,
    groups: Arc<Mutex<HashMap<u64, RateGroup>>>,
    accessor: Arc<dyn NodeAccessor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(rate_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;

            // Snapshot live items under the lock, sample outside it
            let live: Vec<Arc<MonitoredItem>> = {
                let mut guard = items.lock();
                guard.retain(|weak| {
                    weak.upgrade().is_some_and(|item| !item.is_terminated())
                });
                guard.iter().filter_map(Weak::upgrade).collect()
            };

            if live.is_empty() {
                // Exit must be atomic with register: re-check under the map
                // lock so an item registered after the snapshot keeps the
                // loop alive. Lock order is map before items, matching
                // register.
                let mut groups = groups.lock();
                if !items.lock().is_empty() {
                    continue;
                }
                let ours = groups
                    .get(&rate_ms)
                    .is_some_and(|group| Arc::ptr_eq(&group.items, &items));
                if ours {
                    groups.remove(&rate_ms);
                }
                debug!("sampling group at {}ms drained, stopping", rate_ms);
                return;
            }
            for item in live {
                item.sample(accessor.as_ref());
            }
        }
    })
}
