use serde::Serialize;

/// What a node is, and therefore how it participates in the network
///
/// Expressed as a tagged variant dispatched through small capability
/// predicates instead of a type hierarchy.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Host,
    Router,
    Switch,
}

impl NodeKind {
    /// Whether nodes of this kind relay packets between their interfaces
    /// once activated
    pub fn has_forwarding(self) -> bool {
        matches!(self, NodeKind::Router)
    }

    /// Whether nodes of this kind carry IP addresses and routes
    pub fn is_addressable(self) -> bool {
        !matches!(self, NodeKind::Switch)
    }
}

/// Declarative description of a single node
///
/// Interfaces accumulate in link-declaration order; a link that does not name
/// its endpoint interface gets an auto-assigned `<node>-eth<N>` name.
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
    pub interfaces: Vec<InterfaceSpec>,
}

impl NodeSpec {
    pub fn interface(&self, name: &str) -> Option<&InterfaceSpec> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub(crate) fn next_interface_name(&self) -> String {
        format!("{}-eth{}", self.name, self.interfaces.len())
    }
}

pub struct InterfaceSpec {
    pub name: String,
}

/// Declarative description of a single link between two interfaces
pub struct LinkSpec {
    pub a: LinkEndpoint,
    pub b: LinkEndpoint,
    pub bandwidth_mbps: u64,
}

pub struct LinkEndpoint {
    pub node: String,
    pub interface: String,
}

/// Index of a node in its [`TopologyGraph`](super::TopologyGraph)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct NodeId(pub(crate) usize);

/// Index of a link in its [`TopologyGraph`](super::TopologyGraph)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LinkId(pub(crate) usize);
