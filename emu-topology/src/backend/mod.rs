//! The emulation engine consumed by the builder and configurator
//!
//! The real network-namespace/virtual-interface engine is an external
//! collaborator; everything in this crate reaches it through the [`Backend`]
//! trait. [`InMemoryBackend`] is the reference implementation used by the
//! test suite and the workbench.

mod in_memory;

pub use in_memory::{InMemoryBackend, Op};

use crate::error::BackendError;
use crate::ip::{Ipv4Cidr, Ipv4Net};
use std::net::Ipv4Addr;

/// One end of a link creation request
///
/// The primary address rides along with link creation because that is the
/// shape of the underlying engine's link API; all later addressing goes
/// through [`Backend::set_interface_address`].
pub struct LinkEnd<'a> {
    pub node: &'a str,
    pub interface: &'a str,
    pub address: Option<Ipv4Cidr>,
}

/// Node/link primitives of the emulation engine
///
/// Implementations are expected to fail loudly (instead of silently
/// ignoring a request) so that the builder can roll back partial state.
pub trait Backend {
    fn create_switch(&mut self, name: &str) -> Result<(), BackendError>;
    fn create_host(&mut self, name: &str) -> Result<(), BackendError>;
    fn create_router(&mut self, name: &str) -> Result<(), BackendError>;

    fn create_link(
        &mut self,
        a: LinkEnd<'_>,
        b: LinkEnd<'_>,
        bandwidth_mbps: u64,
    ) -> Result<(), BackendError>;

    /// Removes the link attached to the given interface, releasing both
    /// endpoint interfaces
    fn remove_link(&mut self, node: &str, interface: &str) -> Result<(), BackendError>;

    fn remove_node(&mut self, name: &str) -> Result<(), BackendError>;

    fn set_interface_address(
        &mut self,
        node: &str,
        interface: &str,
        address: Ipv4Cidr,
    ) -> Result<(), BackendError>;

    fn add_route(
        &mut self,
        node: &str,
        destination: Ipv4Net,
        via: Ipv4Addr,
    ) -> Result<(), BackendError>;

    /// Toggles the node-wide IP forwarding flag (the kernel-equivalent state
    /// of one emulated node, not a process-wide global)
    fn set_forwarding(&mut self, node: &str, enabled: bool) -> Result<(), BackendError>;

    fn start(&mut self) -> Result<(), BackendError>;
    fn stop(&mut self) -> Result<(), BackendError>;

    /// Runs a command inside a node, returning its output
    fn exec(&mut self, node: &str, command: &str) -> Result<String, BackendError>;
}
