//! Operator-facing session: routing-table dump, reachability report, and an
//! interactive prompt against the live network

use anyhow::Context;
use emu_topology::backend::Backend;
use emu_topology::live::LiveNetwork;
use emu_topology::runner::{ReachabilityReport, Session};
use std::io::{self, BufRead, Write};

pub struct OperatorSession {
    interactive: bool,
}

impl OperatorSession {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }

    fn prompt_loop(&self, live: &LiveNetwork, backend: &mut dyn Backend) -> anyhow::Result<()> {
        println!("*** Interactive session (type 'help' for commands)");
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        loop {
            print!("workbench> ");
            io::stdout().flush().context("failed to flush stdout")?;

            let Some(line) = lines.next() else {
                break;
            };
            let line = line.context("failed to read from stdin")?;
            let line = line.trim();

            match line {
                "" => {}
                "exit" | "quit" => break,
                "help" => {
                    println!("  nodes              list nodes");
                    println!("  <node> <command>   run a command on a node (e.g. h1 ping -c 1 -W 1 10.0.2.100)");
                    println!("  exit               stop the network and leave");
                }
                "nodes" => {
                    for node in live.nodes() {
                        println!("  {} ({:?})", node.name(), node.kind());
                    }
                }
                other => match other.split_once(' ') {
                    Some((node, command)) => match backend.exec(node, command) {
                        Ok(output) => print!("{output}"),
                        Err(e) => println!("error: {e}"),
                    },
                    None => println!("unknown command: {other}"),
                },
            }
        }

        Ok(())
    }
}

impl Session for OperatorSession {
    fn network_started(
        &mut self,
        live: &LiveNetwork,
        backend: &mut dyn Backend,
    ) -> anyhow::Result<()> {
        for router in live.routers() {
            println!("*** Routing table on {}", router.name());
            match backend.exec(router.name(), "route") {
                Ok(output) => print!("{output}"),
                Err(e) => println!("error: {e}"),
            }
        }
        Ok(())
    }

    fn run(
        &mut self,
        live: &LiveNetwork,
        backend: &mut dyn Backend,
        report: Option<&ReachabilityReport>,
    ) -> anyhow::Result<()> {
        if let Some(report) = report {
            println!("*** Reachability");
            println!("{report}");
        }

        if self.interactive {
            self.prompt_loop(live, backend)?;
        }
        Ok(())
    }
}
