//! NodeId - typed identifier of an address-space entity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Errors from parsing or constructing a [`NodeId`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("invalid node id string: {0}")]
    InvalidFormat(String),

    #[error("invalid namespace index: {0}")]
    InvalidNamespace(u16),

    #[error("unknown well-known node name: {0}")]
    UnknownName(String),
}

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum NodeIdIdentifier {
    Numeric(u32),
    String(String),
    Guid(Uuid),
    ByteString(Vec<u8>),
}

/// Identifies an address-space entity.
///
/// Structural equality on namespace index and identifier; immutable once
/// constructed. The namespace index must be below `0xFFFF`; the
/// constructors panic on the reserved index in every build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: NodeIdIdentifier,
}

impl NodeId {
    /// Creates a numeric node id.
    pub fn numeric(namespace: u16, value: u32) -> Self {
        assert!(namespace < 0xFFFF, "reserved namespace index");
        Self {
            namespace,
            identifier: NodeIdIdentifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        assert!(namespace < 0xFFFF, "reserved namespace index");
        Self {
            namespace,
            identifier: NodeIdIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    pub fn guid(namespace: u16, value: Uuid) -> Self {
        assert!(namespace < 0xFFFF, "reserved namespace index");
        Self {
            namespace,
            identifier: NodeIdIdentifier::Guid(value),
        }
    }

    /// Creates a byte-string node id.
    pub fn byte_string(namespace: u16, value: Vec<u8>) -> Self {
        assert!(namespace < 0xFFFF, "reserved namespace index");
        Self {
            namespace,
            identifier: NodeIdIdentifier::ByteString(value),
        }
    }

    /// The null node id (ns=0, i=0).
    pub const fn null() -> Self {
        Self {
            namespace: 0,
            identifier: NodeIdIdentifier::Numeric(0),
        }
    }

    /// Returns whether this is the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == NodeIdIdentifier::Numeric(0)
    }

    /// Returns the numeric value if this is a numeric identifier.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            NodeIdIdentifier::Numeric(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            NodeIdIdentifier::Numeric(v) => write!(f, "i={}", v),
            NodeIdIdentifier::String(v) => write!(f, "s={}", v),
            NodeIdIdentifier::Guid(v) => write!(f, "g={}", v),
            NodeIdIdentifier::ByteString(v) => write!(f, "b={}", hex_encode(v)),
        }
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    /// Parses `ns=<n>;{i|s|g|b}=<value>` (namespace prefix optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns_str, rest) = tail
                    .split_once(';')
                    .ok_or_else(|| NodeIdError::InvalidFormat(s.to_string()))?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| NodeIdError::InvalidFormat(s.to_string()))?;
                if ns == 0xFFFF {
                    return Err(NodeIdError::InvalidNamespace(ns));
                }
                (ns, rest)
            }
            None => (0, s),
        };

        let identifier = if let Some(v) = rest.strip_prefix("i=") {
            NodeIdIdentifier::Numeric(
                v.parse()
                    .map_err(|_| NodeIdError::InvalidFormat(s.to_string()))?,
            )
        } else if let Some(v) = rest.strip_prefix("s=") {
            NodeIdIdentifier::String(v.to_string())
        } else if let Some(v) = rest.strip_prefix("g=") {
            NodeIdIdentifier::Guid(
                Uuid::parse_str(v).map_err(|_| NodeIdError::InvalidFormat(s.to_string()))?,
            )
        } else if let Some(v) = rest.strip_prefix("b=") {
            NodeIdIdentifier::ByteString(
                hex_decode(v).ok_or_else(|| NodeIdError::InvalidFormat(s.to_string()))?,
            )
        } else {
            return Err(NodeIdError::InvalidFormat(s.to_string()));
        };

        Ok(Self {
            namespace,
            identifier,
        })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Reverse index of well-known numeric node ids in namespace 0.
///
/// Built once at first use and never mutated afterwards; lookups go through
/// explicit accessors rather than ambient globals.
pub struct WellKnownNodes {
    by_name: HashMap<&'static str, u32>,
    by_value: HashMap<u32, &'static str>,
}

/// The subset of standard namespace-0 nodes the engine refers to.
const WELL_KNOWN: &[(&str, u32)] = &[
    ("RootFolder", 84),
    ("ObjectsFolder", 85),
    ("TypesFolder", 86),
    ("ViewsFolder", 87),
    ("Server", 2253),
    ("Server_ServerArray", 2254),
    ("Server_NamespaceArray", 2255),
    ("Server_ServerStatus", 2256),
    ("Server_ServerStatus_State", 2259),
    ("Server_ServerStatus_CurrentTime", 2258),
    ("Server_ServerStatus_StartTime", 2257),
    ("Server_ServerDiagnostics", 2274),
];

static WELL_KNOWN_NODES: OnceLock<WellKnownNodes> = OnceLock::new();

impl WellKnownNodes {
    /// Returns the process-wide index, building it on first access.
    pub fn get() -> &'static WellKnownNodes {
        WELL_KNOWN_NODES.get_or_init(|| {
            let mut by_name = HashMap::new();
            let mut by_value = HashMap::new();
            for &(name, value) in WELL_KNOWN {
                by_name.insert(name, value);
                by_value.insert(value, name);
            }
            WellKnownNodes { by_name, by_value }
        })
    }

    /// Resolves a symbolic name to its namespace-0 node id.
    pub fn resolve(&self, name: &str) -> Result<NodeId, NodeIdError> {
        self.by_name
            .get(name)
            .map(|&v| NodeId::numeric(0, v))
            .ok_or_else(|| NodeIdError::UnknownName(name.to_string()))
    }

    /// Returns the symbolic name of a namespace-0 numeric node id, if known.
    pub fn name_of(&self, node_id: &NodeId) -> Option<&'static str> {
        if node_id.namespace != 0 {
            return None;
        }
        node_id.as_numeric().and_then(|v| self.by_value.get(&v).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        assert_eq!(NodeId::numeric(2, 1001), NodeId::numeric(2, 1001));
        assert_ne!(NodeId::numeric(2, 1001), NodeId::numeric(3, 1001));
        assert_ne!(NodeId::numeric(2, 1001), NodeId::string(2, "1001"));
    }

    #[test]
    fn test_display_roundtrip() {
        let cases = [
            NodeId::numeric(0, 84),
            NodeId::numeric(2, 1001),
            NodeId::string(1, "Device.Temperature"),
            NodeId::guid(4, Uuid::new_v4()),
            NodeId::byte_string(3, vec![0xDE, 0xAD, 0xBE, 0xEF]),
        ];
        for node_id in cases {
            let parsed: NodeId = node_id.to_string().parse().unwrap();
            assert_eq!(parsed, node_id);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;x=5".parse::<NodeId>().is_err());
        assert!("ns=65535;i=5".parse::<NodeId>().is_err());
        assert!("i=notanumber".parse::<NodeId>().is_err());
    }

    #[test]
    #[should_panic(expected = "reserved namespace index")]
    fn test_constructor_rejects_reserved_namespace() {
        NodeId::numeric(0xFFFF, 1);
    }

    #[test]
    fn test_null() {
        assert!(NodeId::null().is_null());
        assert!(!NodeId::numeric(0, 84).is_null());
        assert_eq!(NodeId::default(), NodeId::null());
    }

    #[test]
    fn test_well_known_index() {
        let index = WellKnownNodes::get();
        let root = index.resolve("RootFolder").unwrap();
        assert_eq!(root, NodeId::numeric(0, 84));
        assert_eq!(index.name_of(&root), Some("RootFolder"));

        // Unknown names are an error, not an empty result
        assert!(index.resolve("NoSuchNode").is_err());
        // Non-ns0 ids never resolve
        assert_eq!(index.name_of(&NodeId::numeric(1, 84)), None);
    }
}
