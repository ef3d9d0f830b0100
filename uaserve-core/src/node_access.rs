//! The seam between the subscription engine and the address space.

use uaserve_types::service::{NodeClass, ReferenceDescription};
use uaserve_types::{DataValue, NodeId};

/// The node attributes a monitored item can sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeId {
    NodeId,
    NodeClass,
    BrowseName,
    DisplayName,
    Description,
    Value,
    DataType,
    AccessLevel,
    EventNotifier,
}

impl AttributeId {
    /// Decodes the wire attribute id; unknown values are rejected.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(AttributeId::NodeId),
            2 => Some(AttributeId::NodeClass),
            3 => Some(AttributeId::BrowseName),
            4 => Some(AttributeId::DisplayName),
            5 => Some(AttributeId::Description),
            13 => Some(AttributeId::Value),
            14 => Some(AttributeId::DataType),
            17 => Some(AttributeId::AccessLevel),
            12 => Some(AttributeId::EventNotifier),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            AttributeId::NodeId => 1,
            AttributeId::NodeClass => 2,
            AttributeId::BrowseName => 3,
            AttributeId::DisplayName => 4,
            AttributeId::Description => 5,
            AttributeId::EventNotifier => 12,
            AttributeId::Value => 13,
            AttributeId::DataType => 14,
            AttributeId::AccessLevel => 17,
        }
    }
}

/// Metadata about an address-space node, including its outgoing references.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub node_class: NodeClass,
    pub browse_name: String,
    pub references: Vec<ReferenceDescription>,
    /// Width of the engineering-unit range, when the node declares one.
    /// Percent deadbands are evaluated against this.
    pub eu_range: Option<f64>,
}

/// Read access to the address space.
///
/// The engine never owns the address space; the embedding server provides
/// one. Implementations must be cheap to call from sampling tasks.
pub trait NodeAccessor: Send + Sync {
    /// Reads one attribute of a node, applying an optional index range.
    ///
    /// Missing nodes or attributes are reported through the status code on
    /// the returned value, not through an error.
    fn read_attribute(
        &self,
        node_id: &NodeId,
        attribute_id: AttributeId,
        index_range: Option<&str>,
    ) -> DataValue;

    /// Looks up a node's metadata for browsing and item creation.
    fn find_object(&self, node_id: &NodeId) -> Option<NodeInfo>;
}
