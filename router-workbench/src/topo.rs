//! The built-in dual-router deployment
//!
//! Two routers, four switched segments, two dual-homed hosts. h1 and h2
//! each default-route via their first router; the static routes keep
//! second-subnet traffic on the second interface instead of the default
//! gateway.

use emu_topology::topology::{AddressPlan, AddressRole, LinkOpts, NodeKind, TopologyGraph};

const BANDWIDTH_MBPS: u64 = 50;

pub fn dual_router() -> anyhow::Result<(TopologyGraph, AddressPlan)> {
    let mut graph = TopologyGraph::new();
    for router in ["r0", "r1"] {
        graph.add_node(router, NodeKind::Router)?;
    }
    for switch in ["s1", "s2", "s3", "s4"] {
        graph.add_node(switch, NodeKind::Switch)?;
    }
    for host in ["h1", "h2"] {
        graph.add_node(host, NodeKind::Host)?;
    }

    // Router uplinks first, then host links; interface names follow
    // link-declaration order
    for (switch, router) in [("s1", "r0"), ("s2", "r0"), ("s3", "r1"), ("s4", "r1")] {
        graph.add_link(switch, router, LinkOpts::bandwidth_mbps(BANDWIDTH_MBPS))?;
    }
    for (host, switch) in [("h1", "s1"), ("h1", "s3"), ("h2", "s2"), ("h2", "s4")] {
        graph.add_link(host, switch, LinkOpts::bandwidth_mbps(BANDWIDTH_MBPS))?;
    }

    let mut plan = AddressPlan::new();
    let addresses = [
        ("r0", "r0-eth0", "10.0.0.1/24", AddressRole::Primary),
        ("r0", "r0-eth1", "10.0.2.1/24", AddressRole::Secondary),
        ("r1", "r1-eth0", "10.0.1.1/24", AddressRole::Primary),
        ("r1", "r1-eth1", "10.0.3.1/24", AddressRole::Secondary),
        ("h1", "h1-eth0", "10.0.0.100/24", AddressRole::Primary),
        ("h1", "h1-eth1", "10.0.1.100/24", AddressRole::Secondary),
        ("h2", "h2-eth0", "10.0.2.100/24", AddressRole::Primary),
        ("h2", "h2-eth1", "10.0.3.100/24", AddressRole::Secondary),
    ];
    for (node, interface, address, role) in addresses {
        plan.assign(node, interface, address.parse()?, role);
    }

    plan.add_default_route("h1", "10.0.0.1".parse()?);
    plan.add_default_route("h2", "10.0.2.1".parse()?);
    plan.add_route("h1", "10.0.3.0/24".parse()?, "10.0.1.1".parse()?);
    plan.add_route("h2", "10.0.1.0/24".parse()?, "10.0.3.1".parse()?);

    plan.validate(&graph)?;
    Ok((graph, plan))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn built_in_deployment_is_valid() {
        let (graph, plan) = dual_router().unwrap();
        assert_eq!(graph.nodes().count(), 8);
        assert_eq!(graph.links().len(), 8);
        assert_eq!(plan.secondaries("h1").count(), 1);
        assert_eq!(plan.routes_for("h2").count(), 2);
    }
}
