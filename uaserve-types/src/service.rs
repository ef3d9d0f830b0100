//! Request and result structs for the session, subscription, monitored-item,
//! publish and browse services.

use crate::identity::IdentityToken;
use crate::monitoring::{MonitoringMode, MonitoringParameters, TimestampsToReturn};
use crate::node_id::NodeId;
use crate::status::StatusCode;
use crate::variant::DataValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque per-session secret the client must echo on every request.
///
/// 32 bytes of process-local randomness; unguessable, never derived from the
/// session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthenticationToken([u8; 32]);

impl AuthenticationToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AuthenticationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Client parameters for CreateSession.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionParams {
    pub session_name: String,
    /// Requested session idle timeout; revised within server bounds.
    pub requested_timeout_ms: f64,
    /// DER bytes of the client application certificate, when the channel is
    /// secured.
    pub client_certificate: Option<Vec<u8>>,
}

/// Server response to CreateSession.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResult {
    pub session_id: NodeId,
    pub authentication_token: AuthenticationToken,
    pub revised_timeout_ms: f64,
    pub server_nonce: Vec<u8>,
}

/// Client parameters for ActivateSession.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateSessionParams {
    pub identity_token: IdentityToken,
}

/// Server response to ActivateSession.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateSessionResult {
    /// Fresh nonce; a new one is issued on every activation, including
    /// re-activation over the same channel.
    pub server_nonce: Vec<u8>,
}

/// Client parameters for CreateSubscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionParams {
    pub requested_publishing_interval_ms: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub publishing_enabled: bool,
    pub priority: u8,
}

impl Default for CreateSubscriptionParams {
    fn default() -> Self {
        Self {
            requested_publishing_interval_ms: 1000.0,
            requested_lifetime_count: 60,
            requested_max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }
}

/// Server response to CreateSubscription, with revised parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionResult {
    pub subscription_id: u32,
    pub revised_publishing_interval_ms: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

/// Client parameters for ModifySubscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifySubscriptionParams {
    pub subscription_id: u32,
    pub requested_publishing_interval_ms: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
}

/// Server response to ModifySubscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifySubscriptionResult {
    pub revised_publishing_interval_ms: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

/// Client parameters for SetPublishingMode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPublishingModeParams {
    pub publishing_enabled: bool,
    pub subscription_ids: Vec<u32>,
}

/// Client parameters for DeleteSubscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSubscriptionsParams {
    pub subscription_ids: Vec<u32>,
}

/// The node class of an address-space node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeClass {
    Object,
    Variable,
    Method,
    ObjectType,
    VariableType,
    ReferenceType,
    DataType,
    View,
}

/// One monitored item to create within a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemCreateRequest {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub index_range: Option<String>,
    pub monitoring_mode: MonitoringMode,
    pub params: MonitoringParameters,
}

/// Per-item result of CreateMonitoredItems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemCreateResult {
    pub status: StatusCode,
    pub monitored_item_id: u32,
    pub revised_sampling_interval_ms: f64,
    pub revised_queue_size: u32,
}

impl MonitoredItemCreateResult {
    /// A failed per-item result; ids and revised values are zeroed.
    pub fn error(status: StatusCode) -> Self {
        Self {
            status,
            monitored_item_id: 0,
            revised_sampling_interval_ms: 0.0,
            revised_queue_size: 0,
        }
    }
}

/// One monitored item to modify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemModifyRequest {
    pub monitored_item_id: u32,
    pub params: MonitoringParameters,
}

/// Per-item result of ModifyMonitoredItems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemModifyResult {
    pub status: StatusCode,
    pub revised_sampling_interval_ms: f64,
    pub revised_queue_size: u32,
}

impl MonitoredItemModifyResult {
    pub fn error(status: StatusCode) -> Self {
        Self {
            status,
            revised_sampling_interval_ms: 0.0,
            revised_queue_size: 0,
        }
    }
}

/// Client parameters for SetMonitoringMode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMonitoringModeParams {
    pub subscription_id: u32,
    pub monitoring_mode: MonitoringMode,
    pub monitored_item_ids: Vec<u32>,
}

/// Acknowledgement of a previously received notification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: u32,
    pub sequence_number: u32,
}

/// Client parameters for Publish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishParams {
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

/// One data-change notification inside a notification message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemNotification {
    /// The client handle of the monitored item that produced this value.
    pub client_handle: u32,
    pub value: DataValue,
}

/// A sequenced batch of notifications delivered through Publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub publish_time: DateTime<Utc>,
    /// Empty for keep-alive messages.
    pub notifications: Vec<MonitoredItemNotification>,
}

impl NotificationMessage {
    /// A keep-alive message: sequenced but carrying no notifications.
    pub fn keep_alive(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            publish_time: Utc::now(),
            notifications: Vec::new(),
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Client parameters for Republish.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RepublishParams {
    pub subscription_id: u32,
    pub retransmit_sequence_number: u32,
}

/// One browse origin and its traversal constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseDescription {
    pub node_id: NodeId,
    /// Reference type to follow; `None` follows all references.
    pub reference_type_id: Option<NodeId>,
    pub include_subtypes: bool,
    /// Bitmask of [`NodeClass`] values to include; 0 includes all.
    pub node_class_mask: u32,
}

/// A reference discovered while browsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    pub node_id: NodeId,
    pub browse_name: String,
    pub display_name: String,
    pub node_class: NodeClass,
}

/// Per-origin result of Browse or BrowseNext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseResult {
    pub status: StatusCode,
    /// Present when more references remain than fit in one response.
    pub continuation_point: Option<Vec<u8>>,
    pub references: Vec<ReferenceDescription>,
}

impl BrowseResult {
    pub fn error(status: StatusCode) -> Self {
        Self {
            status,
            continuation_point: None,
            references: Vec::new(),
        }
    }
}

/// Client parameters for Browse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseParams {
    pub view_id: Option<NodeId>,
    pub requested_max_references_per_node: u32,
    pub nodes_to_browse: Vec<BrowseDescription>,
    pub timestamps_to_return: TimestampsToReturn,
}

/// Client parameters for BrowseNext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseNextParams {
    /// When set, the named continuation points are released without
    /// returning any further references.
    pub release_continuation_points: bool,
    pub continuation_points: Vec<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_tokens_are_unique() {
        let a = AuthenticationToken::generate();
        let b = AuthenticationToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 64);
    }

    #[test]
    fn test_keep_alive_message_is_empty() {
        let msg = NotificationMessage::keep_alive(7);
        assert!(msg.is_keep_alive());
        assert_eq!(msg.sequence_number, 7);
    }

    #[test]
    fn test_error_results_are_zeroed() {
        let result = MonitoredItemCreateResult::error(StatusCode::BadNodeIdUnknown);
        assert_eq!(result.monitored_item_id, 0);
        assert!(result.status.is_bad());

        let browse = BrowseResult::error(StatusCode::BadNodeIdUnknown);
        assert!(browse.references.is_empty());
        assert!(browse.continuation_point.is_none());
    }
}
