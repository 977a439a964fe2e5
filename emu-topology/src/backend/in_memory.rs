//! Reference backend: models nodes, L2 segments, routing tables and the
//! forwarding flag, and resolves `ping` probes by walking the emulated
//! tables hop by hop.

use crate::backend::{Backend, LinkEnd};
use crate::error::BackendError;
use crate::ip::{Ipv4Cidr, Ipv4Net};
use crate::topology::NodeKind;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

const MAX_HOPS: usize = 16;

/// One journaled backend operation
///
/// Tests use the journal to assert resource accounting and ordering
/// properties (e.g. forwarding disabled before a router's interfaces are
/// released).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    CreateNode {
        node: String,
        kind: NodeKind,
    },
    CreateLink {
        a: String,
        b: String,
    },
    RemoveLink {
        node: String,
        interface: String,
    },
    RemoveNode {
        node: String,
    },
    SetAddress {
        node: String,
        interface: String,
        address: Ipv4Cidr,
    },
    AddRoute {
        node: String,
        destination: Ipv4Net,
        via: Ipv4Addr,
    },
    SetForwarding {
        node: String,
        enabled: bool,
    },
    Start,
    Stop,
}

struct EmulatedInterface {
    name: String,
    addresses: Vec<Ipv4Cidr>,
}

struct EmulatedNode {
    name: String,
    kind: NodeKind,
    forwarding: bool,
    interfaces: Vec<EmulatedInterface>,
    routes: Vec<(Ipv4Net, Ipv4Addr)>,
}

impl EmulatedNode {
    fn interface(&self, name: &str) -> Option<&EmulatedInterface> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

struct EmulatedLink {
    a: (String, String),
    b: (String, String),
    #[allow(dead_code)]
    bandwidth_mbps: u64,
}

impl EmulatedLink {
    fn touches(&self, node: &str, interface: &str) -> bool {
        (self.a.0 == node && self.a.1 == interface) || (self.b.0 == node && self.b.1 == interface)
    }

    fn peer_of(&self, node: &str, interface: &str) -> Option<(&str, &str)> {
        if self.a.0 == node && self.a.1 == interface {
            Some((&self.b.0, &self.b.1))
        } else if self.b.0 == node && self.b.1 == interface {
            Some((&self.a.0, &self.a.1))
        } else {
            None
        }
    }
}

/// A row of a node's effective routing table: connected subnets derived from
/// interface addresses plus the installed static routes
struct RouteRow {
    destination: Ipv4Net,
    via: Option<Ipv4Addr>,
    interface: String,
}

/// In-memory emulation of the namespace engine
#[derive(Default)]
pub struct InMemoryBackend {
    nodes: Vec<EmulatedNode>,
    links: Vec<EmulatedLink>,
    started: bool,
    link_capacity: Option<usize>,
    journal: Arc<Mutex<Vec<Op>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of concurrently existing links, so tests can trigger
    /// resource exhaustion mid-build
    pub fn with_link_capacity(capacity: usize) -> Self {
        Self {
            link_capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Shared handle to the operation journal
    pub fn journal(&self) -> Arc<Mutex<Vec<Op>>> {
        self.journal.clone()
    }

    /// True when no node or link resource exists anymore
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn forwarding_enabled(&self, node: &str) -> Option<bool> {
        self.node(node).map(|n| n.forwarding).ok()
    }

    fn node(&self, name: &str) -> Result<&EmulatedNode, BackendError> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| BackendError::NoSuchNode(name.to_string()))
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut EmulatedNode, BackendError> {
        self.nodes
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| BackendError::NoSuchNode(name.to_string()))
    }

    fn create_node(&mut self, name: &str, kind: NodeKind) -> Result<(), BackendError> {
        if self.node(name).is_ok() {
            return Err(BackendError::Failed(format!("node {name} already exists")));
        }

        self.nodes.push(EmulatedNode {
            name: name.to_string(),
            kind,
            forwarding: false,
            interfaces: Vec::new(),
            routes: Vec::new(),
        });
        self.journal.lock().push(Op::CreateNode {
            node: name.to_string(),
            kind,
        });
        Ok(())
    }

    fn attach_interface(
        &mut self,
        end: &LinkEnd<'_>,
    ) -> Result<(), BackendError> {
        let node = self.node_mut(end.node)?;
        if node.interface(end.interface).is_some() {
            return Err(BackendError::Failed(format!(
                "interface {} already exists on {}",
                end.interface, end.node
            )));
        }

        node.interfaces.push(EmulatedInterface {
            name: end.interface.to_string(),
            addresses: end.address.into_iter().collect(),
        });
        Ok(())
    }

    /// The node's effective routing table. Connected subnets come first,
    /// static routes after; lookup disambiguates by prefix length anyway.
    fn routing_table(&self, node: &EmulatedNode) -> Vec<RouteRow> {
        let mut rows = Vec::new();
        for interface in &node.interfaces {
            for address in &interface.addresses {
                rows.push(RouteRow {
                    destination: address.network(),
                    via: None,
                    interface: interface.name.clone(),
                });
            }
        }
        for (destination, via) in &node.routes {
            // The route is usable only if some interface is attached to the
            // gateway's subnet
            let egress = node.interfaces.iter().find(|i| {
                i.addresses.iter().any(|a| a.network().contains(*via))
            });
            if let Some(egress) = egress {
                rows.push(RouteRow {
                    destination: *destination,
                    via: Some(*via),
                    interface: egress.name.clone(),
                });
            }
        }
        rows
    }

    /// Longest-prefix match over the node's routing table
    fn lookup(&self, node: &EmulatedNode, destination: Ipv4Addr) -> Option<(Ipv4Addr, String)> {
        self.routing_table(node)
            .into_iter()
            .filter(|row| row.destination.contains(destination))
            .max_by_key(|row| row.destination.prefix())
            .map(|row| (row.via.unwrap_or(destination), row.interface))
    }

    fn owns(&self, node: &EmulatedNode, address: Ipv4Addr) -> bool {
        node.interfaces
            .iter()
            .any(|i| i.addresses.iter().any(|a| a.address == address))
    }

    fn owner_of(&self, address: Ipv4Addr) -> Option<&EmulatedNode> {
        self.nodes.iter().find(|n| self.owns(n, address))
    }

    /// Resolves which neighbor answers for `target` on the L2 segment behind
    /// `(node, interface)`. Switches are transparent: the search floods
    /// through them, but never through hosts or routers.
    fn neighbor(&self, node: &str, interface: &str, target: Ipv4Addr) -> Option<&EmulatedNode> {
        let mut visited: HashSet<(&str, &str)> = HashSet::new();
        let mut pending: Vec<(&str, &str)> = Vec::new();

        let first = self
            .links
            .iter()
            .find_map(|l| l.peer_of(node, interface))?;
        pending.push(first);

        while let Some((peer_node, peer_interface)) = pending.pop() {
            if !visited.insert((peer_node, peer_interface)) {
                continue;
            }

            let peer = self.node(peer_node).ok()?;
            if peer
                .interface(peer_interface)
                .is_some_and(|i| i.addresses.iter().any(|a| a.address == target))
            {
                return Some(peer);
            }

            if peer.kind == NodeKind::Switch {
                for other in &peer.interfaces {
                    if other.name == peer_interface {
                        continue;
                    }
                    if let Some(next) = self
                        .links
                        .iter()
                        .find_map(|l| l.peer_of(peer_node, &other.name))
                    {
                        pending.push(next);
                    }
                }
            }
        }

        None
    }

    /// Walks a packet from `from` towards `destination`, one L3 hop at a
    /// time. Transit nodes relay only while they are forwarding-enabled
    /// routers.
    fn deliver(&self, from: &str, destination: Ipv4Addr) -> bool {
        let mut current = match self.node(from) {
            Ok(node) => node,
            Err(_) => return false,
        };

        for _ in 0..MAX_HOPS {
            if self.owns(current, destination) {
                return true;
            }
            if current.name != from && !(current.kind == NodeKind::Router && current.forwarding) {
                debug!(node = %current.name, "packet dropped: node does not forward");
                return false;
            }

            let Some((next_hop, egress)) = self.lookup(current, destination) else {
                debug!(node = %current.name, %destination, "packet dropped: no route");
                return false;
            };
            let Some(next) = self.neighbor(&current.name, &egress, next_hop) else {
                debug!(node = %current.name, %next_hop, "packet dropped: next hop unresolved");
                return false;
            };
            current = next;
        }

        false
    }

    /// Emulates an echo request plus its reply: the forward walk towards
    /// `destination` and the reverse walk back to the selected source
    /// address must both succeed.
    fn probe(&self, source: &str, destination: Ipv4Addr) -> Result<bool, BackendError> {
        let node = self.node(source)?;

        let Some((next_hop, egress)) = self.lookup(node, destination) else {
            return Ok(false);
        };
        let Some(source_address) = self.source_address(node, &egress, next_hop) else {
            return Ok(false);
        };

        if !self.deliver(source, destination) {
            return Ok(false);
        }
        let Some(owner) = self.owner_of(destination) else {
            return Ok(false);
        };
        Ok(self.deliver(owner.name.as_str(), source_address))
    }

    /// Source address selection: prefer the egress interface address that
    /// shares a subnet with the next hop
    fn source_address(
        &self,
        node: &EmulatedNode,
        egress: &str,
        next_hop: Ipv4Addr,
    ) -> Option<Ipv4Addr> {
        let interface = node.interface(egress)?;
        interface
            .addresses
            .iter()
            .find(|a| a.network().contains(next_hop))
            .or_else(|| interface.addresses.first())
            .map(|a| a.address)
    }

    fn exec_ping(&self, node: &str, args: &[&str]) -> Result<String, BackendError> {
        if !self.started {
            return Err(BackendError::Failed("network is not started".to_string()));
        }

        let mut count: u32 = 1;
        let mut destination = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match *arg {
                "-c" => {
                    count = iter
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| BackendError::Failed("ping: bad count".to_string()))?;
                }
                // Probe deadline; irrelevant for the in-memory walk
                "-W" => {
                    iter.next();
                }
                other => {
                    destination = Some(other.parse::<Ipv4Addr>().map_err(|_| {
                        BackendError::Failed(format!("ping: unknown host {other}"))
                    })?);
                }
            }
        }
        let destination =
            destination.ok_or_else(|| BackendError::Failed("ping: missing host".to_string()))?;

        let reachable = self.probe(node, destination)?;
        let received = if reachable { count } else { 0 };
        let loss = if reachable { 0 } else { 100 };
        Ok(format!(
            "PING {destination} ({destination}): 56 data bytes\n\
             --- {destination} ping statistics ---\n\
             {count} packets transmitted, {received} received, {loss}% packet loss\n"
        ))
    }

    fn exec_route(&self, node: &str) -> Result<String, BackendError> {
        let node = self.node(node)?;
        let mut out = String::from(
            "Kernel IP routing table\nDestination     Gateway         Genmask         Iface\n",
        );
        for row in self.routing_table(node) {
            let genmask = row.destination.mask();
            let dest = row.destination.to_string();
            let dest = dest.split('/').next().unwrap_or_default().to_string();
            let gateway = row
                .via
                .map(|v| v.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            out.push_str(&format!(
                "{dest:<15} {gateway:<15} {genmask:<15} {}\n",
                row.interface
            ));
        }
        Ok(out)
    }
}

impl Backend for InMemoryBackend {
    fn create_switch(&mut self, name: &str) -> Result<(), BackendError> {
        self.create_node(name, NodeKind::Switch)
    }

    fn create_host(&mut self, name: &str) -> Result<(), BackendError> {
        self.create_node(name, NodeKind::Host)
    }

    fn create_router(&mut self, name: &str) -> Result<(), BackendError> {
        self.create_node(name, NodeKind::Router)
    }

    fn create_link(
        &mut self,
        a: LinkEnd<'_>,
        b: LinkEnd<'_>,
        bandwidth_mbps: u64,
    ) -> Result<(), BackendError> {
        if let Some(capacity) = self.link_capacity
            && self.links.len() >= capacity
        {
            return Err(BackendError::ResourcesExhausted(format!(
                "link capacity of {capacity} reached"
            )));
        }

        // Both nodes must exist before any interface is attached
        self.node(a.node)?;
        self.node(b.node)?;

        self.attach_interface(&a)?;
        if let Err(e) = self.attach_interface(&b) {
            // Undo the first attachment so a failed call leaves no trace
            let node = self.node_mut(a.node)?;
            node.interfaces.retain(|i| i.name != a.interface);
            return Err(e);
        }

        self.links.push(EmulatedLink {
            a: (a.node.to_string(), a.interface.to_string()),
            b: (b.node.to_string(), b.interface.to_string()),
            bandwidth_mbps,
        });
        self.journal.lock().push(Op::CreateLink {
            a: format!("{}:{}", a.node, a.interface),
            b: format!("{}:{}", b.node, b.interface),
        });
        Ok(())
    }

    fn remove_link(&mut self, node: &str, interface: &str) -> Result<(), BackendError> {
        let Some(position) = self.links.iter().position(|l| l.touches(node, interface)) else {
            return Err(BackendError::NoSuchInterface {
                node: node.to_string(),
                interface: interface.to_string(),
            });
        };

        let link = self.links.remove(position);
        for (end_node, end_interface) in [&link.a, &link.b] {
            if let Ok(n) = self.node_mut(end_node) {
                n.interfaces.retain(|i| &i.name != end_interface);
            }
        }
        self.journal.lock().push(Op::RemoveLink {
            node: node.to_string(),
            interface: interface.to_string(),
        });
        Ok(())
    }

    fn remove_node(&mut self, name: &str) -> Result<(), BackendError> {
        self.node(name)?;

        // Links still attached to the node go away with it, including the
        // peer's interface
        let (attached, remaining): (Vec<_>, Vec<_>) = self
            .links
            .drain(..)
            .partition(|l| l.a.0 == name || l.b.0 == name);
        self.links = remaining;
        for link in attached {
            for (end_node, end_interface) in [&link.a, &link.b] {
                if let Ok(n) = self.node_mut(end_node) {
                    n.interfaces.retain(|i| &i.name != end_interface);
                }
            }
        }

        self.nodes.retain(|n| n.name != name);
        self.journal.lock().push(Op::RemoveNode {
            node: name.to_string(),
        });
        Ok(())
    }

    fn set_interface_address(
        &mut self,
        node: &str,
        interface: &str,
        address: Ipv4Cidr,
    ) -> Result<(), BackendError> {
        let node_name = node.to_string();
        let node = self.node_mut(node)?;
        let Some(target) = node.interfaces.iter_mut().find(|i| i.name == interface) else {
            return Err(BackendError::NoSuchInterface {
                node: node_name,
                interface: interface.to_string(),
            });
        };

        // Mirrors the kernel: adding an address twice is an error, callers
        // are responsible for idempotence
        if target.addresses.contains(&address) {
            return Err(BackendError::Failed(format!(
                "address {address} already bound to {interface} on {node_name}"
            )));
        }

        target.addresses.push(address);
        self.journal.lock().push(Op::SetAddress {
            node: node_name,
            interface: interface.to_string(),
            address,
        });
        Ok(())
    }

    fn add_route(
        &mut self,
        node: &str,
        destination: Ipv4Net,
        via: Ipv4Addr,
    ) -> Result<(), BackendError> {
        let node_name = node.to_string();
        let node = self.node_mut(node)?;
        if node.routes.contains(&(destination, via)) {
            return Err(BackendError::Failed(format!(
                "route {destination} via {via} already installed on {node_name}"
            )));
        }

        node.routes.push((destination, via));
        self.journal.lock().push(Op::AddRoute {
            node: node_name,
            destination,
            via,
        });
        Ok(())
    }

    fn set_forwarding(&mut self, node: &str, enabled: bool) -> Result<(), BackendError> {
        let node_name = node.to_string();
        let node = self.node_mut(node)?;
        node.forwarding = enabled;
        self.journal.lock().push(Op::SetForwarding {
            node: node_name,
            enabled,
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.started = true;
        self.journal.lock().push(Op::Start);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.started = false;
        self.journal.lock().push(Op::Stop);
        Ok(())
    }

    fn exec(&mut self, node: &str, command: &str) -> Result<String, BackendError> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        match tokens.split_first() {
            Some((&"ping", args)) => self.exec_ping(node, args),
            Some((&"route", [])) => self.exec_route(node),
            _ => Err(BackendError::UnsupportedCommand(command.to_string())),
        }
    }
}
