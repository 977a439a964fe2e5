//! Post-build configuration pass: address bindings and static routes
//!
//! A multi-homed host has a default route via its first router; without an
//! explicit route for the second path, return traffic over the second
//! interface would chase the wrong gateway. This pass installs exactly the
//! addresses and routes the plan declares for that purpose, and verifies
//! that every binding found an interface to land on.

use crate::backend::Backend;
use crate::error::{ConfigError, NodeConfigError};
use crate::live::{LiveNetwork, LiveNode};
use crate::topology::AddressPlan;
use tracing::debug;

pub struct RouteConfigurator;

impl RouteConfigurator {
    /// Applies the plan's address bindings and route entries to the live
    /// network
    ///
    /// Every binding is checked against the node's interfaces, so a primary
    /// binding the builder could not attach anywhere surfaces here instead
    /// of leaving the node silently unaddressed. Idempotent: addresses and
    /// routes that are already present (primaries bound at link creation
    /// included) are skipped, never duplicated and never an error. A failure
    /// is fatal for that node's configuration only; the remaining nodes are
    /// still configured and all failures are reported together.
    pub fn apply(
        live: &mut LiveNetwork,
        plan: &AddressPlan,
        backend: &mut dyn Backend,
    ) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        for name in live.node_names() {
            let Some(node) = live.get_mut(&name) else {
                continue;
            };
            if let Err(e) = Self::configure_node(node, plan, backend) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { errors })
        }
    }

    fn configure_node(
        node: &mut LiveNode,
        plan: &AddressPlan,
        backend: &mut dyn Backend,
    ) -> Result<(), NodeConfigError> {
        let name = node.name().to_string();

        for binding in plan.bindings_for(&name) {
            let Some(interface) = node.interface_mut(&binding.interface) else {
                return Err(NodeConfigError::UnknownInterface {
                    node: name.clone(),
                    interface: binding.interface.clone(),
                });
            };
            if interface.addresses.contains(&binding.address) {
                debug!(node = %name, address = %binding.address, "address already bound, skipping");
                continue;
            }

            backend
                .set_interface_address(&name, &binding.interface, binding.address)
                .map_err(|source| NodeConfigError::Backend {
                    node: name.clone(),
                    source,
                })?;
            interface.addresses.push(binding.address);
            debug!(node = %name, interface = %binding.interface, address = %binding.address, "secondary address bound");
        }

        for route in plan.routes_for(&name) {
            if node.routes.contains(&(route.destination, route.via)) {
                debug!(node = %name, destination = %route.destination, "route already installed, skipping");
                continue;
            }

            backend
                .add_route(&name, route.destination, route.via)
                .map_err(|source| NodeConfigError::Backend {
                    node: name.clone(),
                    source,
                })?;
            node.routes.push((route.destination, route.via));
            debug!(node = %name, destination = %route.destination, via = %route.via, "route installed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::{InMemoryBackend, Op};
    use crate::builder::NetworkBuilder;
    use crate::topology::{AddressRole, LinkOpts, NodeKind, TopologyGraph};

    fn dual_homed_host() -> (TopologyGraph, AddressPlan) {
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
        plan.add_route(
            "h1",
            "10.0.3.0/24".parse().unwrap(),
            "10.0.1.1".parse().unwrap(),
        );

        (graph, plan)
    }

    #[test]
    fn applying_the_same_plan_twice_changes_nothing() {
        let (graph, plan) = dual_homed_host();
        let mut backend = InMemoryBackend::new();
        let mut live = NetworkBuilder::build(&graph, &plan, &mut backend).unwrap();

        RouteConfigurator::apply(&mut live, &plan, &mut backend).unwrap();
        let addresses_after_first: Vec<_> = live.get("h1").unwrap().interfaces()[1]
            .addresses()
            .to_vec();
        let routes_after_first = live.get("h1").unwrap().routes().to_vec();
        let ops_after_first = backend.journal().lock().len();

        RouteConfigurator::apply(&mut live, &plan, &mut backend).unwrap();

        let h1 = live.get("h1").unwrap();
        assert_eq!(h1.interfaces()[1].addresses(), addresses_after_first);
        assert_eq!(h1.routes(), routes_after_first);
        // No further backend operations were issued
        assert_eq!(backend.journal().lock().len(), ops_after_first);
    }

    #[test]
    fn primary_binding_for_a_missing_interface_is_reported() {
        let (graph, mut plan) = dual_homed_host();
        // Typo'd interface: the builder finds no link endpoint to bind it to
        plan.assign(
            "h1",
            "h1-eth9",
            "10.0.9.100/24".parse().unwrap(),
            AddressRole::Primary,
        );

        let mut backend = InMemoryBackend::new();
        let mut live = NetworkBuilder::build(&graph, &plan, &mut backend).unwrap();
        let err = RouteConfigurator::apply(&mut live, &plan, &mut backend).unwrap_err();

        assert_eq!(err.errors.len(), 1);
        assert!(matches!(
            &err.errors[0],
            NodeConfigError::UnknownInterface { node, interface }
                if node == "h1" && interface == "h1-eth9"
        ));
    }

    #[test]
    fn unknown_interface_fails_that_node_but_not_the_others() {
        let (mut graph, mut plan) = dual_homed_host();
        graph.add_node("h2", NodeKind::Host).unwrap();
        graph
            .add_link("h2", "s1", LinkOpts::bandwidth_mbps(50))
            .unwrap();
        plan.assign(
            "h2",
            "h2-eth7",
            "10.0.0.101/24".parse().unwrap(),
            AddressRole::Secondary,
        );

        let mut backend = InMemoryBackend::new();
        let mut live = NetworkBuilder::build(&graph, &plan, &mut backend).unwrap();
        let err = RouteConfigurator::apply(&mut live, &plan, &mut backend).unwrap_err();

        assert_eq!(err.errors.len(), 1);
        assert!(matches!(
            &err.errors[0],
            NodeConfigError::UnknownInterface { node, interface }
                if node == "h2" && interface == "h2-eth7"
        ));

        // h1 was still fully configured
        let h1 = live.get("h1").unwrap();
        assert_eq!(h1.interfaces()[1].addresses().len(), 1);
        assert_eq!(h1.routes().len(), 2);
        assert!(
            backend
                .journal()
                .lock()
                .iter()
                .any(|op| matches!(op, Op::AddRoute { node, .. } if node == "h1"))
        );
    }
}
