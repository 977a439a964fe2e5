//! Declarative topology description
//!
//! A [`TopologyGraph`] is built fully in memory and validated before any
//! emulation backend is involved.

mod plan;
mod spec;

pub use plan::{AddressBinding, AddressPlan, AddressRole, RouteEntry};
pub use spec::{InterfaceSpec, LinkEndpoint, LinkId, LinkSpec, NodeId, NodeKind, NodeSpec};

use crate::error::SpecError;

/// Options for a single link declaration
///
/// Endpoint interfaces are auto-named `<node>-eth<N>` by link order unless
/// set explicitly.
#[derive(Default)]
pub struct LinkOpts {
    pub interface_a: Option<String>,
    pub interface_b: Option<String>,
    pub bandwidth_mbps: u64,
}

impl LinkOpts {
    pub fn bandwidth_mbps(bandwidth_mbps: u64) -> Self {
        Self {
            bandwidth_mbps,
            ..Self::default()
        }
    }

    pub fn interface_a(mut self, name: impl Into<String>) -> Self {
        self.interface_a = Some(name.into());
        self
    }

    pub fn interface_b(mut self, name: impl Into<String>) -> Self {
        self.interface_b = Some(name.into());
        self
    }
}

/// The declarative network description: nodes plus the ordered list of links
/// between them
///
/// Purely in-memory; materialization happens in
/// [`builder`](crate::builder).
#[derive(Default)]
pub struct TopologyGraph {
    nodes: Vec<NodeSpec>,
    links: Vec<LinkSpec>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a node. Fails if the name is already taken.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeId, SpecError> {
        let name = name.into();
        if self.index_of(&name).is_some() {
            return Err(SpecError::DuplicateNode(name));
        }

        self.nodes.push(NodeSpec {
            name,
            kind,
            interfaces: Vec::new(),
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Declares a link between two nodes
    ///
    /// On error the graph is left exactly as it was: all checks run before
    /// anything is recorded.
    pub fn add_link(&mut self, a: &str, b: &str, opts: LinkOpts) -> Result<LinkId, SpecError> {
        let a_idx = self
            .index_of(a)
            .ok_or_else(|| SpecError::UnknownNode(a.to_string()))?;
        let b_idx = self
            .index_of(b)
            .ok_or_else(|| SpecError::UnknownNode(b.to_string()))?;

        if a_idx == b_idx
            && let (Some(ia), Some(ib)) = (&opts.interface_a, &opts.interface_b)
            && ia == ib
        {
            return Err(SpecError::InterfaceInUse {
                node: a.to_string(),
                interface: ia.clone(),
            });
        }

        for (idx, explicit) in [(a_idx, &opts.interface_a), (b_idx, &opts.interface_b)] {
            if let Some(name) = explicit
                && self.nodes[idx].interface(name).is_some()
            {
                return Err(SpecError::InterfaceInUse {
                    node: self.nodes[idx].name.clone(),
                    interface: name.clone(),
                });
            }
        }

        let interface_a = opts
            .interface_a
            .unwrap_or_else(|| self.nodes[a_idx].next_interface_name());
        self.nodes[a_idx].interfaces.push(InterfaceSpec {
            name: interface_a.clone(),
        });

        // Named after interface_a is recorded, so a self-link still gets
        // distinct auto names
        let interface_b = opts
            .interface_b
            .unwrap_or_else(|| self.nodes[b_idx].next_interface_name());
        self.nodes[b_idx].interfaces.push(InterfaceSpec {
            name: interface_b.clone(),
        });

        self.links.push(LinkSpec {
            a: LinkEndpoint {
                node: a.to_string(),
                interface: interface_a,
            },
            b: LinkEndpoint {
                node: b.to_string(),
                interface: interface_b,
            },
            bandwidth_mbps: opts.bandwidth_mbps,
        });
        Ok(LinkId(self.links.len() - 1))
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.index_of(name).map(|i| &self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.iter()
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_duplicate_node_names() {
        let mut graph = TopologyGraph::new();
        graph.add_node("r0", NodeKind::Router).unwrap();
        let err = graph.add_node("r0", NodeKind::Host).unwrap_err();
        assert!(matches!(err, SpecError::DuplicateNode(name) if name == "r0"));
    }

    #[test]
    fn link_to_undeclared_node_leaves_graph_unchanged() {
        let mut graph = TopologyGraph::new();
        graph.add_node("h1", NodeKind::Host).unwrap();

        let err = graph
            .add_link("h1", "s1", LinkOpts::bandwidth_mbps(50))
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownNode(name) if name == "s1"));

        assert!(graph.links().is_empty());
        assert!(graph.node("h1").unwrap().interfaces.is_empty());
    }

    #[test]
    fn interfaces_are_auto_named_by_link_order() {
        let mut graph = TopologyGraph::new();
        graph.add_node("h1", NodeKind::Host).unwrap();
        graph.add_node("s1", NodeKind::Switch).unwrap();
        graph.add_node("s3", NodeKind::Switch).unwrap();

        graph
            .add_link("h1", "s1", LinkOpts::bandwidth_mbps(50))
            .unwrap();
        graph
            .add_link("h1", "s3", LinkOpts::bandwidth_mbps(50))
            .unwrap();

        let names: Vec<_> = graph
            .node("h1")
            .unwrap()
            .interfaces
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, ["h1-eth0", "h1-eth1"]);
        assert_eq!(graph.node("s1").unwrap().interfaces[0].name, "s1-eth0");
    }

    #[test]
    fn explicit_interface_names_are_respected_and_unique() {
        let mut graph = TopologyGraph::new();
        graph.add_node("r0", NodeKind::Router).unwrap();
        graph.add_node("s1", NodeKind::Switch).unwrap();
        graph.add_node("s2", NodeKind::Switch).unwrap();

        graph
            .add_link(
                "s1",
                "r0",
                LinkOpts::bandwidth_mbps(50).interface_b("r0-eth0"),
            )
            .unwrap();
        let err = graph
            .add_link(
                "s2",
                "r0",
                LinkOpts::bandwidth_mbps(50).interface_b("r0-eth0"),
            )
            .unwrap_err();

        assert!(matches!(err, SpecError::InterfaceInUse { .. }));
        assert_eq!(graph.links().len(), 1);
        assert_eq!(graph.node("r0").unwrap().interfaces.len(), 1);
        assert_eq!(graph.node("s2").unwrap().interfaces.len(), 0);
    }
}
