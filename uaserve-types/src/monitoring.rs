//! Monitoring modes, timestamp selection and the data-change filter.

use crate::variant::DataValue;
use serde::{Deserialize, Serialize};

/// How a monitored item participates in sampling and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MonitoringMode {
    /// Not sampling; the queue is frozen.
    Disabled,
    /// Sampling and filtering, but nothing is queued for publish.
    Sampling,
    /// Sampling, filtering and queueing notifications.
    #[default]
    Reporting,
}

/// Which timestamps a service response carries on its data values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimestampsToReturn {
    Source,
    Server,
    #[default]
    Both,
    Neither,
    /// Sentinel for an out-of-range wire value; rejected at validation.
    Invalid,
}

/// What kind of change makes a sampled value reportable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DataChangeTrigger {
    /// Only status changes are reported.
    Status,
    /// Status or value changes are reported.
    #[default]
    StatusValue,
    /// Status, value or timestamp changes are reported.
    StatusValueTimestamp,
}

/// Deadband applied to numeric value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeadbandType {
    #[default]
    None,
    /// Change must exceed `deadband_value` in engineering units.
    Absolute,
    /// Change must exceed `deadband_value` percent of the EU range.
    Percent,
}

/// Filter deciding which sampled values become notifications.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DataChangeFilter {
    pub trigger: DataChangeTrigger,
    pub deadband_type: DeadbandType,
    pub deadband_value: f64,
}

impl DataChangeFilter {
    /// Decides whether `new` is a reportable change relative to `old`.
    ///
    /// `old` is the last value the filter admitted, not merely the last value
    /// sampled; successive sub-deadband drifts therefore cannot creep past
    /// the deadband unreported. `eu_range` is the width of the engineering
    /// unit range, used only for percent deadbands.
    pub fn admits(&self, old: Option<&DataValue>, new: &DataValue, eu_range: f64) -> bool {
        let old = match old {
            Some(old) => old,
            // First sample is always reportable
            None => return true,
        };

        let status_changed = old.status != new.status;
        match self.trigger {
            DataChangeTrigger::Status => status_changed,
            DataChangeTrigger::StatusValue => {
                status_changed || self.value_changed(old, new, eu_range)
            }
            DataChangeTrigger::StatusValueTimestamp => {
                status_changed
                    || self.value_changed(old, new, eu_range)
                    || old.source_timestamp != new.source_timestamp
            }
        }
    }

    fn value_changed(&self, old: &DataValue, new: &DataValue, eu_range: f64) -> bool {
        match self.deadband_type {
            DeadbandType::None => old.value != new.value,
            DeadbandType::Absolute => match (old.as_f64(), new.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() > self.deadband_value,
                // Non-numeric values fall back to exact comparison
                _ => old.value != new.value,
            },
            DeadbandType::Percent => match (old.as_f64(), new.as_f64()) {
                (Some(a), Some(b)) if eu_range > 0.0 => {
                    (a - b).abs() > self.deadband_value * eu_range / 100.0
                }
                _ => old.value != new.value,
            },
        }
    }
}

/// Client-requested monitoring parameters for a monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringParameters {
    /// Opaque handle echoed back in every notification for this item.
    pub client_handle: u32,
    pub sampling_interval_ms: f64,
    pub queue_size: u32,
    /// When the queue is full: `true` drops the oldest entry, `false`
    /// overwrites the newest slot in place.
    pub discard_oldest: bool,
    pub filter: Option<DataChangeFilter>,
}

impl Default for MonitoringParameters {
    fn default() -> Self {
        Self {
            client_handle: 0,
            sampling_interval_ms: 1000.0,
            queue_size: 1,
            discard_oldest: true,
            filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;
    use crate::variant::Variant;

    fn good(value: f64) -> DataValue {
        DataValue::new(Variant::Double(value))
    }

    #[test]
    fn test_first_sample_always_admitted() {
        let filter = DataChangeFilter {
            deadband_type: DeadbandType::Absolute,
            deadband_value: 100.0,
            ..Default::default()
        };
        assert!(filter.admits(None, &good(0.0), 0.0));
    }

    #[test]
    fn test_absolute_deadband_boundary() {
        let filter = DataChangeFilter {
            trigger: DataChangeTrigger::StatusValue,
            deadband_type: DeadbandType::Absolute,
            deadband_value: 8.0,
        };
        let base = good(40.0);
        // Exactly at the deadband is suppressed, strictly beyond is admitted
        assert!(!filter.admits(Some(&base), &good(48.0), 0.0));
        assert!(filter.admits(Some(&base), &good(48.1), 0.0));
        assert!(filter.admits(Some(&base), &good(31.9), 0.0));
    }

    #[test]
    fn test_percent_deadband_uses_eu_range() {
        let filter = DataChangeFilter {
            trigger: DataChangeTrigger::StatusValue,
            deadband_type: DeadbandType::Percent,
            deadband_value: 10.0,
        };
        // 10% of a 0..200 range is 20
        assert!(!filter.admits(Some(&good(100.0)), &good(115.0), 200.0));
        assert!(filter.admits(Some(&good(100.0)), &good(125.0), 200.0));
    }

    #[test]
    fn test_status_trigger_ignores_value_changes() {
        let filter = DataChangeFilter {
            trigger: DataChangeTrigger::Status,
            ..Default::default()
        };
        assert!(!filter.admits(Some(&good(1.0)), &good(2.0), 0.0));

        let mut degraded = good(1.0);
        degraded.status = StatusCode::BadTimeout;
        assert!(filter.admits(Some(&good(1.0)), &degraded, 0.0));
    }

    #[test]
    fn test_timestamp_trigger_reports_timestamp_only_change() {
        let filter = DataChangeFilter {
            trigger: DataChangeTrigger::StatusValueTimestamp,
            ..Default::default()
        };
        let old = good(5.0);
        let mut new = old.clone();
        new.source_timestamp = old.source_timestamp.map(|t| t + chrono::Duration::seconds(1));
        assert!(filter.admits(Some(&old), &new, 0.0));
    }

    #[test]
    fn test_deadband_falls_back_for_non_numeric() {
        let filter = DataChangeFilter {
            trigger: DataChangeTrigger::StatusValue,
            deadband_type: DeadbandType::Absolute,
            deadband_value: 10.0,
        };
        let old = DataValue::new(Variant::String("a".into()));
        let new = DataValue::new(Variant::String("b".into()));
        assert!(filter.admits(Some(&old), &new, 0.0));
    }
}
