//! Materializes a declarative topology into backend resources

use crate::backend::{Backend, LinkEnd};
use crate::error::BuildError;
use crate::live::{LiveInterface, LiveNetwork, LiveNode};
use crate::topology::{AddressPlan, NodeKind, TopologyGraph};
use tracing::{debug, info, warn};

pub struct NetworkBuilder;

impl NetworkBuilder {
    /// Creates every node and link of `graph` inside `backend`, binding the
    /// plan's primary addresses at link-creation time
    ///
    /// Nodes are created first (forwarding nodes stay inactive until all
    /// links exist), then links in declaration order. On any backend
    /// failure, everything created so far is released before the error
    /// propagates: no partial network is ever left running.
    pub fn build(
        graph: &TopologyGraph,
        plan: &AddressPlan,
        backend: &mut dyn Backend,
    ) -> Result<LiveNetwork, BuildError> {
        // Spec problems are caught before the backend is touched
        plan.validate(graph)?;

        let mut live = LiveNetwork::new();

        for spec in graph.nodes() {
            let created = match spec.kind {
                NodeKind::Switch => backend.create_switch(&spec.name),
                NodeKind::Host => backend.create_host(&spec.name),
                NodeKind::Router => backend.create_router(&spec.name),
            };
            if let Err(source) = created {
                Self::rollback(&mut live, backend);
                return Err(BuildError::Backend {
                    resource: format!("node {}", spec.name),
                    source,
                });
            }

            debug!(node = %spec.name, kind = ?spec.kind, "node created");
            live.push_node(LiveNode::new(spec.name.clone(), spec.kind));
        }

        for link in graph.links() {
            let address_a = plan.primary(&link.a.node, &link.a.interface);
            let address_b = plan.primary(&link.b.node, &link.b.interface);

            let created = backend.create_link(
                LinkEnd {
                    node: &link.a.node,
                    interface: &link.a.interface,
                    address: address_a,
                },
                LinkEnd {
                    node: &link.b.node,
                    interface: &link.b.interface,
                    address: address_b,
                },
                link.bandwidth_mbps,
            );
            if let Err(source) = created {
                Self::rollback(&mut live, backend);
                return Err(BuildError::Backend {
                    resource: format!(
                        "link {}:{} <-> {}:{}",
                        link.a.node, link.a.interface, link.b.node, link.b.interface
                    ),
                    source,
                });
            }

            live.record_link(&link.a.node, &link.a.interface);
            for (end, address) in [(&link.a, address_a), (&link.b, address_b)] {
                if let Some(node) = live.get_mut(&end.node) {
                    node.interfaces.push(LiveInterface {
                        name: end.interface.clone(),
                        addresses: address.into_iter().collect(),
                    });
                }
            }
            debug!(
                a = %format!("{}:{}", link.a.node, link.a.interface),
                b = %format!("{}:{}", link.b.node, link.b.interface),
                bandwidth_mbps = link.bandwidth_mbps,
                "link created"
            );
        }

        info!(
            nodes = graph.nodes().count(),
            links = graph.links().len(),
            "network materialized"
        );
        Ok(live)
    }

    fn rollback(live: &mut LiveNetwork, backend: &mut dyn Backend) {
        warn!("build failed, releasing partially created resources");
        live.teardown(backend);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::error::SpecError;
    use crate::ip::Ipv4Cidr;
    use crate::topology::{AddressRole, LinkOpts};

    fn small_topology() -> (TopologyGraph, AddressPlan) {
        let mut graph = TopologyGraph::new();
        graph.add_node("r0", NodeKind::Router).unwrap();
        graph.add_node("s1", NodeKind::Switch).unwrap();
        graph.add_node("h1", NodeKind::Host).unwrap();
        graph
            .add_link(
                "s1",
                "r0",
                LinkOpts::bandwidth_mbps(50).interface_b("r0-eth0"),
            )
            .unwrap();
        graph
            .add_link("h1", "s1", LinkOpts::bandwidth_mbps(50))
            .unwrap();

        let mut plan = AddressPlan::new();
        plan.assign(
            "r0",
            "r0-eth0",
            "10.0.0.1/24".parse().unwrap(),
            AddressRole::Primary,
        );
        plan.assign(
            "h1",
            "h1-eth0",
            "10.0.0.100/24".parse().unwrap(),
            AddressRole::Primary,
        );
        plan.add_default_route("h1", "10.0.0.1".parse().unwrap());

        (graph, plan)
    }

    #[test]
    fn build_materializes_nodes_links_and_primary_addresses() {
        let (graph, plan) = small_topology();
        let mut backend = InMemoryBackend::new();

        let live = NetworkBuilder::build(&graph, &plan, &mut backend).unwrap();

        assert_eq!(backend.node_count(), 3);
        assert_eq!(backend.link_count(), 2);

        let r0 = live.get("r0").unwrap();
        assert_eq!(r0.interfaces()[0].name(), "r0-eth0");
        assert_eq!(
            r0.interfaces()[0].addresses(),
            ["10.0.0.1/24".parse::<Ipv4Cidr>().unwrap()]
        );
        assert_eq!(live.interfaces("h1").unwrap().len(), 1);
        assert_eq!(live.interfaces("s1").unwrap().len(), 2);
    }

    #[test]
    fn build_then_teardown_leaves_no_backend_resources() {
        let (graph, plan) = small_topology();
        let mut backend = InMemoryBackend::new();

        let mut live = NetworkBuilder::build(&graph, &plan, &mut backend).unwrap();
        live.teardown(&mut backend);

        assert!(backend.is_empty());
    }

    #[test]
    fn failed_build_rolls_back_everything() {
        let (graph, plan) = small_topology();
        let mut backend = InMemoryBackend::with_link_capacity(1);

        let err = NetworkBuilder::build(&graph, &plan, &mut backend).unwrap_err();
        assert!(matches!(err, BuildError::Backend { .. }));
        assert!(backend.is_empty());
    }

    #[test]
    fn spec_error_is_raised_before_the_backend_is_touched() {
        let (mut graph, mut plan) = small_topology();
        // Second subnet on h1 overlapping the first
        graph.add_node("s3", NodeKind::Switch).unwrap();
        graph
            .add_link("h1", "s3", LinkOpts::bandwidth_mbps(50))
            .unwrap();
        plan.assign(
            "h1",
            "h1-eth1",
            "10.0.0.101/24".parse().unwrap(),
            AddressRole::Secondary,
        );

        let mut backend = InMemoryBackend::new();
        let err = NetworkBuilder::build(&graph, &plan, &mut backend).unwrap_err();

        assert!(matches!(
            err,
            BuildError::Spec(SpecError::OverlappingSubnets { .. })
        ));
        assert!(backend.is_empty());
        assert!(backend.journal().lock().is_empty());
    }
}
