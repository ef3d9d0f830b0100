//! Shared OPC UA data model and service types for uaserve.
//!
//! This crate contains the value types exchanged between the subscription
//! engine and the request-dispatch layer:
//!
//! - [`NodeId`] and the well-known node-id name index
//! - [`Variant`], [`DataValue`] and [`StatusCode`]
//! - [`IdentityToken`] variants used at session activation
//! - Monitoring parameters and the [`DataChangeFilter`]
//! - Per-service request/result structs
//!
//! Wire encoding is out of scope; these types are the in-process contract
//! only (all of them are serde-serializable for diagnostics and config).

pub mod identity;
pub mod monitoring;
pub mod node_id;
pub mod service;
pub mod status;
pub mod variant;

pub use identity::IdentityToken;
pub use monitoring::{
    DataChangeFilter, DataChangeTrigger, DeadbandType, MonitoringMode, MonitoringParameters,
    TimestampsToReturn,
};
pub use node_id::{NodeId, NodeIdIdentifier, WellKnownNodes};
pub use service::{
    AuthenticationToken, BrowseDescription, BrowseResult, MonitoredItemCreateRequest,
    MonitoredItemCreateResult, MonitoredItemModifyResult, MonitoredItemNotification, NodeClass,
    NotificationMessage, ReferenceDescription, SubscriptionAcknowledgement,
};
pub use status::StatusCode;
pub use variant::{DataValue, Variant};
