use crate::error::SpecError;
use crate::ip::{Ipv4Cidr, Ipv4Net};
use crate::topology::TopologyGraph;
use std::net::Ipv4Addr;

/// Whether an address is bound when its link is created or by the
/// post-build configuration pass
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AddressRole {
    Primary,
    Secondary,
}

/// One interface address assignment
#[derive(Clone, Debug)]
pub struct AddressBinding {
    pub node: String,
    pub interface: String,
    pub address: Ipv4Cidr,
    pub role: AddressRole,
}

/// One static route: traffic for `destination` leaves `node` via the
/// `via` gateway
///
/// The default route is the entry whose destination is `0.0.0.0/0`.
#[derive(Clone, Debug)]
pub struct RouteEntry {
    pub node: String,
    pub destination: Ipv4Net,
    pub via: Ipv4Addr,
}

/// The static table of per-interface addresses and routes for every node
///
/// A single plan feeds both build phases: the builder binds primary
/// addresses at link-creation time (the shape the backend's link API
/// dictates) and the route configurator applies everything else after the
/// topology exists.
#[derive(Clone, Default)]
pub struct AddressPlan {
    bindings: Vec<AddressBinding>,
    routes: Vec<RouteEntry>,
}

impl AddressPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(
        &mut self,
        node: impl Into<String>,
        interface: impl Into<String>,
        address: Ipv4Cidr,
        role: AddressRole,
    ) {
        self.bindings.push(AddressBinding {
            node: node.into(),
            interface: interface.into(),
            address,
            role,
        });
    }

    pub fn add_route(&mut self, node: impl Into<String>, destination: Ipv4Net, via: Ipv4Addr) {
        self.routes.push(RouteEntry {
            node: node.into(),
            destination,
            via,
        });
    }

    pub fn add_default_route(&mut self, node: impl Into<String>, via: Ipv4Addr) {
        self.add_route(node, Ipv4Net::DEFAULT, via);
    }

    /// The primary address for an interface, if the plan has one
    pub fn primary(&self, node: &str, interface: &str) -> Option<Ipv4Cidr> {
        self.bindings
            .iter()
            .find(|b| b.role == AddressRole::Primary && b.node == node && b.interface == interface)
            .map(|b| b.address)
    }

    /// All bindings for a node, in plan order
    pub fn bindings_for<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a AddressBinding> {
        self.bindings.iter().filter(move |b| b.node == node)
    }

    /// All secondary bindings for a node, in plan order
    pub fn secondaries<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a AddressBinding> {
        self.bindings
            .iter()
            .filter(move |b| b.role == AddressRole::Secondary && b.node == node)
    }

    pub fn routes_for<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a RouteEntry> {
        self.routes.iter().filter(move |r| r.node == node)
    }

    pub fn bindings(&self) -> &[AddressBinding] {
        &self.bindings
    }

    /// Checks the plan against a topology before anything is materialized
    ///
    /// Rejects bindings and routes for undeclared nodes, addressing on
    /// switches, and overlapping subnets across one node's interfaces. An
    /// address naming an interface the node never gets is deliberately left
    /// to the configuration pass, which reports it as a `ConfigError`.
    pub fn validate(&self, graph: &TopologyGraph) -> Result<(), SpecError> {
        for binding in &self.bindings {
            let node = graph
                .node(&binding.node)
                .ok_or_else(|| SpecError::UnknownPlanNode(binding.node.clone()))?;
            if !node.kind.is_addressable() {
                return Err(SpecError::AddressedSwitch(binding.node.clone()));
            }
        }
        for route in &self.routes {
            let node = graph
                .node(&route.node)
                .ok_or_else(|| SpecError::UnknownPlanNode(route.node.clone()))?;
            if !node.kind.is_addressable() {
                return Err(SpecError::AddressedSwitch(route.node.clone()));
            }
        }

        // No two interfaces of one node may live in overlapping subnets
        for (i, first) in self.bindings.iter().enumerate() {
            for second in &self.bindings[i + 1..] {
                if first.node != second.node || first.interface == second.interface {
                    continue;
                }
                if first.address.network().overlaps(&second.address.network()) {
                    return Err(SpecError::OverlappingSubnets {
                        node: first.node.clone(),
                        first: first.address,
                        second: second.address,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::{LinkOpts, NodeKind};

    fn graph() -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        graph.add_node("r0", NodeKind::Router).unwrap();
        graph.add_node("s1", NodeKind::Switch).unwrap();
        graph.add_node("h1", NodeKind::Host).unwrap();
        graph
            .add_link("s1", "r0", LinkOpts::bandwidth_mbps(50))
            .unwrap();
        graph
            .add_link("h1", "s1", LinkOpts::bandwidth_mbps(50))
            .unwrap();
        graph
    }

    #[test]
    fn accepts_disjoint_subnets() {
        let mut plan = AddressPlan::new();
        plan.assign(
            "h1",
            "h1-eth0",
            "10.0.0.100/24".parse().unwrap(),
            AddressRole::Primary,
        );
        plan.assign(
            "h1",
            "h1-eth1",
            "10.0.1.100/24".parse().unwrap(),
            AddressRole::Secondary,
        );
        plan.add_default_route("h1", "10.0.0.1".parse().unwrap());

        plan.validate(&graph()).unwrap();
    }

    #[test]
    fn rejects_overlapping_subnets_on_one_node() {
        let mut plan = AddressPlan::new();
        plan.assign(
            "h1",
            "h1-eth0",
            "10.0.0.100/24".parse().unwrap(),
            AddressRole::Primary,
        );
        plan.assign(
            "h1",
            "h1-eth1",
            "10.0.0.101/24".parse().unwrap(),
            AddressRole::Secondary,
        );

        let err = plan.validate(&graph()).unwrap_err();
        assert!(matches!(err, SpecError::OverlappingSubnets { .. }));
    }

    #[test]
    fn rejects_unknown_node_and_switch_addressing() {
        let mut plan = AddressPlan::new();
        plan.assign(
            "h9",
            "h9-eth0",
            "10.0.0.9/24".parse().unwrap(),
            AddressRole::Primary,
        );
        assert!(matches!(
            plan.validate(&graph()).unwrap_err(),
            SpecError::UnknownPlanNode(_)
        ));

        let mut plan = AddressPlan::new();
        plan.assign(
            "s1",
            "s1-eth0",
            "10.0.0.2/24".parse().unwrap(),
            AddressRole::Primary,
        );
        assert!(matches!(
            plan.validate(&graph()).unwrap_err(),
            SpecError::AddressedSwitch(_)
        ));
    }

    #[test]
    fn primary_lookup_ignores_secondaries() {
        let mut plan = AddressPlan::new();
        plan.assign(
            "h1",
            "h1-eth1",
            "10.0.1.100/24".parse().unwrap(),
            AddressRole::Secondary,
        );
        assert_eq!(plan.primary("h1", "h1-eth1"), None);
        assert_eq!(plan.secondaries("h1").count(), 1);
    }
}
