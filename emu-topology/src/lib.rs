//! Topology construction and routing configuration for emulated multi-subnet
//! networks
//!
//! The crate is split along the build pipeline: a declarative
//! [`topology::TopologyGraph`] plus [`topology::AddressPlan`] are materialized
//! by [`builder::NetworkBuilder`] through a [`backend::Backend`], then
//! [`routing::RouteConfigurator`] installs secondary addresses and static
//! routes, and [`runner::Runner`] drives the whole sequence including the
//! reachability sweep and teardown.

pub mod backend;
pub mod builder;
pub mod error;
pub mod ip;
pub mod live;
pub mod routing;
pub mod runner;
pub mod topology;
