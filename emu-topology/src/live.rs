//! Live (materialized) network state
//!
//! Mirrors what exists inside the backend after a successful build: nodes,
//! their interfaces and addresses, installed routes, and the forwarding
//! state machine of router nodes.

use crate::backend::Backend;
use crate::error::BackendError;
use crate::ip::{Ipv4Cidr, Ipv4Net};
use crate::topology::NodeKind;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Lifecycle of a router's IP forwarding flag
///
/// Forwarding is enabled on the way to `Active` and disabled again on the
/// way out, strictly before the router's interfaces are torn down. A router
/// must never be observed forwarding while `Inactive`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ForwardingState {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

/// A backend-created interface and the addresses bound to it
#[derive(Debug)]
pub struct LiveInterface {
    pub(crate) name: String,
    pub(crate) addresses: Vec<Ipv4Cidr>,
}

impl LiveInterface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addresses(&self) -> &[Ipv4Cidr] {
        &self.addresses
    }
}

/// An activated instance of a node spec inside the backend
#[derive(Debug)]
pub struct LiveNode {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) interfaces: Vec<LiveInterface>,
    pub(crate) routes: Vec<(Ipv4Net, Ipv4Addr)>,
    pub(crate) forwarding: ForwardingState,
}

impl LiveNode {
    pub(crate) fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            interfaces: Vec::new(),
            routes: Vec::new(),
            forwarding: ForwardingState::Inactive,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn interfaces(&self) -> &[LiveInterface] {
        &self.interfaces
    }

    pub fn routes(&self) -> &[(Ipv4Net, Ipv4Addr)] {
        &self.routes
    }

    pub fn has_forwarding(&self) -> bool {
        self.kind.has_forwarding()
    }

    pub fn forwarding_state(&self) -> ForwardingState {
        self.forwarding
    }

    pub(crate) fn interface(&self, name: &str) -> Option<&LiveInterface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub(crate) fn interface_mut(&mut self, name: &str) -> Option<&mut LiveInterface> {
        self.interfaces.iter_mut().find(|i| i.name == name)
    }

    /// Enables IP forwarding; the node becomes usable for routing only once
    /// this returns
    pub(crate) fn activate(&mut self, backend: &mut dyn Backend) -> Result<(), BackendError> {
        if !self.has_forwarding() || self.forwarding == ForwardingState::Active {
            return Ok(());
        }

        self.forwarding = ForwardingState::Activating;
        if let Err(e) = backend.set_forwarding(&self.name, true) {
            self.forwarding = ForwardingState::Inactive;
            return Err(e);
        }
        self.forwarding = ForwardingState::Active;
        debug!(node = %self.name, "forwarding enabled");
        Ok(())
    }

    /// Disables IP forwarding. Must run before the node's interfaces are
    /// released, so a half-destroyed router never keeps relaying.
    pub(crate) fn deactivate(&mut self, backend: &mut dyn Backend) -> Result<(), BackendError> {
        if !self.has_forwarding() || self.forwarding == ForwardingState::Inactive {
            return Ok(());
        }

        self.forwarding = ForwardingState::Deactivating;
        backend.set_forwarding(&self.name, false)?;
        self.forwarding = ForwardingState::Inactive;
        debug!(node = %self.name, "forwarding disabled");
        Ok(())
    }
}

/// Handle to the materialized network
///
/// Owned exclusively by the runner for the duration of a session; the route
/// configurator and the reachability sweep read and mutate it only under the
/// runner's direction.
#[derive(Debug)]
pub struct LiveNetwork {
    nodes: Vec<LiveNode>,
    // One endpoint per created link, enough to release it again
    links: Vec<(String, String)>,
}

impl LiveNetwork {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub(crate) fn push_node(&mut self, node: LiveNode) {
        self.nodes.push(node);
    }

    pub(crate) fn record_link(&mut self, node: &str, interface: &str) {
        self.links.push((node.to_string(), interface.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&LiveNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut LiveNode> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    pub fn interfaces(&self, name: &str) -> Option<&[LiveInterface]> {
        self.get(name).map(|n| n.interfaces())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LiveNode> {
        self.nodes.iter()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &LiveNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Host)
    }

    pub fn routers(&self) -> impl Iterator<Item = &LiveNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Router)
    }

    pub(crate) fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    /// Marks every forwarding node active, enabling IP forwarding on it
    ///
    /// Runs only after every link exists; the builder never activates.
    pub fn activate_forwarding_nodes(
        &mut self,
        backend: &mut dyn Backend,
    ) -> Result<(), BackendError> {
        for node in &mut self.nodes {
            node.activate(backend)?;
        }
        Ok(())
    }

    /// Releases everything this network owns inside the backend
    ///
    /// Routers are deactivated first (forwarding off before interface
    /// teardown), then links, then nodes. Backend failures during teardown
    /// are logged and skipped so the rest of the state is still released.
    pub fn teardown(&mut self, backend: &mut dyn Backend) {
        for node in &mut self.nodes {
            if let Err(e) = node.deactivate(backend) {
                warn!(node = %node.name, error = %e, "failed to deactivate router during teardown");
            }
        }

        for (node, interface) in self.links.drain(..) {
            if let Err(e) = backend.remove_link(&node, &interface) {
                warn!(%node, %interface, error = %e, "failed to remove link during teardown");
            }
        }

        for node in self.nodes.drain(..) {
            if let Err(e) = backend.remove_node(&node.name) {
                warn!(node = %node.name, error = %e, "failed to remove node during teardown");
            }
        }
    }
}
