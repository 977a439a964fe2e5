//! Orchestration: build → configure → activate → start → verify → session →
//! stop
//!
//! The runner owns the backend and the live network handle for the whole
//! sequence. Everything before `start` aborts with full rollback; the
//! reachability sweep and the session report failures but never prevent
//! teardown.

use crate::backend::Backend;
use crate::builder::NetworkBuilder;
use crate::error::RunError;
use crate::live::LiveNetwork;
use crate::routing::RouteConfigurator;
use crate::topology::{AddressPlan, TopologyGraph};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{info, warn};

/// Result of one echo probe between two hosts
#[derive(Clone, Serialize)]
pub struct ProbeOutcome {
    pub from: String,
    pub to: String,
    pub destination: Ipv4Addr,
    pub reachable: bool,
}

/// Aggregated result of the all-pairs reachability sweep
///
/// An unreachable pair is data, not an error: the sweep always completes
/// and the report is surfaced at the end of the run.
#[derive(Clone, Default, Serialize)]
pub struct ReachabilityReport {
    pub probes: Vec<ProbeOutcome>,
}

impl ReachabilityReport {
    pub fn all_reachable(&self) -> bool {
        self.probes.iter().all(|p| p.reachable)
    }

    pub fn loss_ratio(&self) -> f64 {
        if self.probes.is_empty() {
            return 0.0;
        }
        let lost = self.probes.iter().filter(|p| !p.reachable).count();
        lost as f64 / self.probes.len() as f64
    }
}

impl Display for ReachabilityReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for probe in &self.probes {
            writeln!(
                f,
                "{} -> {} ({}): {}",
                probe.from,
                probe.to,
                probe.destination,
                if probe.reachable { "ok" } else { "unreachable" }
            )?;
        }
        let received = self.probes.iter().filter(|p| p.reachable).count();
        write!(
            f,
            "*** Results: {:.0}% dropped ({}/{} received)",
            self.loss_ratio() * 100.0,
            received,
            self.probes.len()
        )
    }
}

/// Operator hand-off points while the network is live
///
/// Both hooks run between `start` and teardown; errors are logged and never
/// prevent teardown.
pub trait Session {
    /// Called once the network is started, before the reachability sweep
    fn network_started(
        &mut self,
        live: &LiveNetwork,
        backend: &mut dyn Backend,
    ) -> anyhow::Result<()> {
        let _ = (live, backend);
        Ok(())
    }

    /// Called after the sweep (if any), with its report
    fn run(
        &mut self,
        live: &LiveNetwork,
        backend: &mut dyn Backend,
        report: Option<&ReachabilityReport>,
    ) -> anyhow::Result<()>;
}

pub struct Runner<B: Backend> {
    graph: TopologyGraph,
    plan: AddressPlan,
    backend: B,
    probe_timeout: Duration,
}

impl<B: Backend> Runner<B> {
    pub fn new(graph: TopologyGraph, plan: AddressPlan, backend: B) -> Self {
        Self {
            graph,
            plan,
            backend,
            probe_timeout: Duration::from_secs(1),
        }
    }

    /// Bounds each individual reachability probe
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Drives the full sequence and returns the reachability report (when
    /// the sweep was requested)
    pub fn run(
        &mut self,
        check_reachability: bool,
        mut session: Option<&mut dyn Session>,
    ) -> Result<Option<ReachabilityReport>, RunError> {
        let mut live = NetworkBuilder::build(&self.graph, &self.plan, &mut self.backend)?;

        if let Err(e) = RouteConfigurator::apply(&mut live, &self.plan, &mut self.backend) {
            live.teardown(&mut self.backend);
            return Err(e.into());
        }

        // Every link exists and every address is bound; only now do the
        // forwarding nodes go active
        if let Err(e) = live.activate_forwarding_nodes(&mut self.backend) {
            live.teardown(&mut self.backend);
            return Err(RunError::Backend(e));
        }

        if let Err(e) = self.backend.start() {
            live.teardown(&mut self.backend);
            return Err(RunError::Backend(e));
        }
        info!("network started");

        if let Some(session) = session.as_mut()
            && let Err(e) = session.network_started(&live, &mut self.backend)
        {
            warn!(error = %e, "session start hook failed");
        }

        let report = check_reachability.then(|| self.ping_all(&live));

        if let Some(session) = session.as_mut()
            && let Err(e) = session.run(&live, &mut self.backend, report.as_ref())
        {
            warn!(error = %e, "interactive session ended with an error");
        }

        live.teardown(&mut self.backend);
        self.backend.stop()?;
        info!("network stopped");

        Ok(report)
    }

    /// Probes every ordered host pair, once per destination address, so a
    /// multi-homed host is checked over each of its paths
    ///
    /// A failed probe (including a backend error) marks that pair
    /// unreachable and the sweep continues.
    fn ping_all(&mut self, live: &LiveNetwork) -> ReachabilityReport {
        let hosts: Vec<(String, Vec<Ipv4Addr>)> = live
            .hosts()
            .map(|h| {
                let addresses = h
                    .interfaces()
                    .iter()
                    .flat_map(|i| i.addresses().iter().map(|a| a.address))
                    .collect();
                (h.name().to_string(), addresses)
            })
            .collect();

        let timeout_secs = self.probe_timeout.as_secs().max(1);
        let mut report = ReachabilityReport::default();
        for (from, _) in &hosts {
            for (to, addresses) in &hosts {
                if from == to {
                    continue;
                }
                for destination in addresses {
                    let command = format!("ping -c 1 -W {timeout_secs} {destination}");
                    let reachable = match self.backend.exec(from, &command) {
                        Ok(output) => {
                            parse_ping(&output).is_some_and(|(_, received)| received > 0)
                        }
                        Err(e) => {
                            warn!(%from, %destination, error = %e, "probe failed to execute");
                            false
                        }
                    };
                    report.probes.push(ProbeOutcome {
                        from: from.clone(),
                        to: to.clone(),
                        destination: *destination,
                        reachable,
                    });
                }
            }
        }

        info!(
            probes = report.probes.len(),
            loss = %format!("{:.0}%", report.loss_ratio() * 100.0),
            "reachability sweep finished"
        );
        report
    }
}

/// Extracts `(transmitted, received)` from a ping summary line
fn parse_ping(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().find(|l| l.contains("packets transmitted"))?;
    let mut parts = line.split(',');
    let transmitted = parts.next()?.trim().split(' ').next()?.parse().ok()?;
    let received = parts.next()?.trim().split(' ').next()?.parse().ok()?;
    Some((transmitted, received))
}
