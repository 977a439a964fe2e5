use crate::ip::Ipv4Cidr;
use thiserror::Error;

/// A malformed or unresolvable topology declaration
///
/// Always raised before any backend resource is touched.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("duplicate node name: {0}")]
    DuplicateNode(String),
    #[error("link references undeclared node: {0}")]
    UnknownNode(String),
    #[error("interface {interface} on {node} is already attached to a link")]
    InterfaceInUse { node: String, interface: String },
    #[error("address plan references undeclared node: {0}")]
    UnknownPlanNode(String),
    #[error("switch {0} cannot carry addresses or routes")]
    AddressedSwitch(String),
    #[error("overlapping subnets on node {node}: {first} and {second}")]
    OverlappingSubnets {
        node: String,
        first: Ipv4Cidr,
        second: Ipv4Cidr,
    },
}

/// An error reported by the emulation backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no such node: {0}")]
    NoSuchNode(String),
    #[error("no such interface: {interface} on {node}")]
    NoSuchInterface { node: String, interface: String },
    #[error("backend out of resources: {0}")]
    ResourcesExhausted(String),
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error("{0}")]
    Failed(String),
}

/// The backend could not materialize part of the topology
///
/// By the time this error surfaces, every resource created by the failed
/// build has been released again.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("failed to materialize {resource}: {source}")]
    Backend {
        resource: String,
        source: BackendError,
    },
}

/// Route or address application failed for a single node
#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("address plan names interface {interface}, which {node} does not have")]
    UnknownInterface { node: String, interface: String },
    #[error("backend rejected configuration of {node}: {source}")]
    Backend {
        node: String,
        source: BackendError,
    },
}

/// Aggregated per-node configuration failures
///
/// Configuration of the remaining nodes continues after a node fails, so a
/// single pass reports everything that is wrong with the plan.
#[derive(Debug, Error)]
#[error("configuration failed: {}", join_errors(.errors))]
pub struct ConfigError {
    pub errors: Vec<NodeConfigError>,
}

fn join_errors(errors: &[NodeConfigError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Umbrella error for a full runner sequence
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
}
