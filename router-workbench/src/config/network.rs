use anyhow::Context;
use emu_topology::ip::{Ipv4Cidr, Ipv4Net};
use emu_topology::topology::{AddressPlan, AddressRole, LinkOpts, NodeKind, TopologyGraph};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Deserialize, Clone)]
pub struct TopologyJson {
    nodes: Vec<NodeJson>,
    links: Vec<LinkJson>,
}

#[derive(Deserialize, Clone)]
struct NodeJson {
    id: String,
    #[serde(rename = "type")]
    #[serde(default = "default_node_kind")]
    kind: NodeKindJson,
    /// Interface names must match the names the links produce (explicit
    /// names, or `<node>-eth<N>` in link-declaration order)
    #[serde(default)]
    interfaces: Vec<InterfaceJson>,
    #[serde(default)]
    routes: Vec<RouteJson>,
}

fn default_node_kind() -> NodeKindJson {
    NodeKindJson::Host
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
enum NodeKindJson {
    Host,
    Router,
    Switch,
}

#[serde_as]
#[derive(Deserialize, Clone)]
struct InterfaceJson {
    name: String,
    /// The first address is the primary one, bound at link creation; the
    /// rest are secondaries applied post-build
    #[serde_as(as = "Vec<DisplayFromStr>")]
    addresses: Vec<Ipv4Cidr>,
}

#[serde_as]
#[derive(Deserialize, Clone)]
struct RouteJson {
    #[serde_as(as = "DisplayFromStr")]
    destination: Ipv4Net,
    #[serde_as(as = "DisplayFromStr")]
    via: Ipv4Addr,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct LinkJson {
    a: String,
    b: String,
    #[serde(default)]
    interface_a: Option<String>,
    #[serde(default)]
    interface_b: Option<String>,
    bandwidth_mbps: u64,
}

pub fn load(path: &Path) -> anyhow::Result<(TopologyGraph, AddressPlan)> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read network graph from {}", path.display()))?;
    let json: TopologyJson = serde_json::from_str(&raw).context("invalid network graph JSON")?;
    into_topology(json)
}

fn into_topology(json: TopologyJson) -> anyhow::Result<(TopologyGraph, AddressPlan)> {
    let mut graph = TopologyGraph::new();
    for node in &json.nodes {
        let kind = match node.kind {
            NodeKindJson::Host => NodeKind::Host,
            NodeKindJson::Router => NodeKind::Router,
            NodeKindJson::Switch => NodeKind::Switch,
        };
        graph.add_node(&node.id, kind)?;
    }

    for link in &json.links {
        let mut opts = LinkOpts::bandwidth_mbps(link.bandwidth_mbps);
        if let Some(name) = &link.interface_a {
            opts = opts.interface_a(name);
        }
        if let Some(name) = &link.interface_b {
            opts = opts.interface_b(name);
        }
        graph.add_link(&link.a, &link.b, opts)?;
    }

    let mut plan = AddressPlan::new();
    for node in &json.nodes {
        for interface in &node.interfaces {
            for (i, address) in interface.addresses.iter().enumerate() {
                let role = if i == 0 {
                    AddressRole::Primary
                } else {
                    AddressRole::Secondary
                };
                plan.assign(&node.id, &interface.name, *address, role);
            }
        }
        for route in &node.routes {
            plan.add_route(&node.id, route.destination, route.via);
        }
    }

    plan.validate(&graph)?;
    Ok((graph, plan))
}
